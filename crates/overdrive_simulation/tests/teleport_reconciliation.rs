//! Blink prediction + reconciliation между authority и клиентом
//!
//! Клиент телепортируется сразу, authority валидирует TeleportRequest.
//! Confirm → pending закрыт, позиция не трогается; reject → клиент
//! snap'ается к authority и теряет предсказанный cooldown.

use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use overdrive_simulation::abilities::TeleportRejection;
use overdrive_simulation::net::{NetInbox, NetOutbox};
use overdrive_simulation::scenario::{LinkedApps, Side, PLAYER, TICK};
use overdrive_simulation::*;

const BLINK: u8 = 3;

fn assert_near(actual: Option<Vec3>, expected: Vec3) {
    let actual = actual.expect("vehicle exists");
    assert!(actual.distance(expected) < 1e-3, "expected {:?}, got {:?}", expected, actual);
}

fn blink_on_cooldown(apps: &LinkedApps, side: Side) -> bool {
    let Some(vehicle) = apps.entity(side, PLAYER) else {
        return false;
    };
    apps.app(side)
        .world()
        .resource::<ActiveEffects>()
        .has_tag(vehicle, GameplayTag::Cooldown(AbilityKind::Blink))
}

fn blink_state(apps: &LinkedApps, side: Side) -> Option<ActivationState> {
    apps.abilities(side, PLAYER).map(|abilities| abilities.state(AbilityKind::Blink))
}

fn blink_pending(apps: &LinkedApps) -> usize {
    apps.abilities(Side::Client, PLAYER)
        .and_then(VehicleAbilities::blink)
        .map(|blink| blink.pending.len())
        .unwrap_or_default()
}

#[test]
fn test_predicted_blink_confirmed() {
    let mut apps = LinkedApps::new(7, AbilityTuning::default());
    apps.spawn_vehicle(PLAYER, Transform::from_xyz(0.0, 0.5, 0.0), 400.0);

    apps.input(Side::Client, PLAYER, BLINK, true);
    apps.step();

    let destination = Vec3::new(0.0, 0.5, -10.0);
    // Клиент уже там (prediction), authority исполнил request в этом же tick
    assert_near(apps.translation(Side::Client, PLAYER), destination);
    assert_near(apps.translation(Side::Authority, PLAYER), destination);
    assert_eq!(blink_pending(&apps), 1);
    assert_eq!(apps.energy(Side::Authority, PLAYER), Some(50.0));

    apps.step();
    assert_eq!(blink_pending(&apps), 0);
    assert_near(apps.translation(Side::Client, PLAYER), destination);
    assert_eq!(apps.energy(Side::Client, PLAYER), Some(50.0));

    let last = apps
        .abilities(Side::Client, PLAYER)
        .and_then(VehicleAbilities::blink)
        .and_then(|blink| blink.last_confirmed());
    assert_eq!(last, Some(0));
}

#[test]
fn test_rejected_blink_snaps_back_to_authority() {
    let mut apps = LinkedApps::new(7, AbilityTuning::default());
    apps.spawn_vehicle(PLAYER, Transform::from_xyz(0.0, 0.5, 0.0), 400.0);
    // Стена, о которой клиент не знает
    apps.authority.world_mut().spawn((
        Obstacle {
            half_extents: Vec3::new(5.0, 3.0, 0.5),
        },
        Transform::from_xyz(0.0, 0.5, -6.0),
    ));

    apps.input(Side::Client, PLAYER, BLINK, true);
    apps.step();
    assert_near(apps.translation(Side::Client, PLAYER), Vec3::new(0.0, 0.5, -10.0));
    assert_near(apps.translation(Side::Authority, PLAYER), Vec3::new(0.0, 0.5, 0.0));

    assert!(blink_on_cooldown(&apps, Side::Client));

    apps.step();
    assert_near(apps.translation(Side::Client, PLAYER), Vec3::new(0.0, 0.5, 0.0));
    assert_eq!(blink_pending(&apps), 0);
    // Отказ ничего не стоит
    assert_eq!(apps.energy(Side::Authority, PLAYER), Some(100.0));
    assert_eq!(apps.energy(Side::Client, PLAYER), Some(100.0));

    // Предсказанный cooldown снят: обе стороны снова готовы
    assert!(!blink_on_cooldown(&apps, Side::Authority));
    assert!(!blink_on_cooldown(&apps, Side::Client));
    assert_eq!(blink_state(&apps, Side::Client), Some(ActivationState::Inactive));
    assert_eq!(blink_state(&apps, Side::Authority), Some(ActivationState::Inactive));
}

#[test]
fn test_confirmed_blink_keeps_later_movement() {
    let mut apps = LinkedApps::new(7, AbilityTuning::default());
    apps.spawn_vehicle(PLAYER, Transform::from_xyz(0.0, 0.5, 0.0), 400.0);

    apps.input(Side::Client, PLAYER, BLINK, true);
    apps.step();
    assert_eq!(blink_pending(&apps), 1);

    // Host сдвинул машину, пока confirm был в пути
    let moved = Vec3::new(0.0, 0.5, -14.0);
    let client_player = apps.entity(Side::Client, PLAYER).expect("client player");
    if let Some(mut transform) = apps.client.world_mut().get_mut::<Transform>(client_player) {
        transform.translation = moved;
    }

    apps.step();
    assert_eq!(blink_pending(&apps), 0);
    assert_near(apps.translation(Side::Client, PLAYER), moved);
    assert!(blink_on_cooldown(&apps, Side::Client));
    assert_eq!(blink_state(&apps, Side::Client), Some(ActivationState::CoolingDown));
}

#[test]
fn test_lost_cues_do_not_break_reconciliation() {
    let mut apps = LinkedApps::new(7, AbilityTuning::default());
    apps.drop_unreliable = true;
    apps.spawn_vehicle(PLAYER, Transform::from_xyz(0.0, 0.5, 0.0), 400.0);

    apps.input(Side::Client, PLAYER, BLINK, true);
    apps.run(2);

    assert_eq!(blink_pending(&apps), 0);
    assert_near(apps.translation(Side::Client, PLAYER), Vec3::new(0.0, 0.5, -10.0));
}

#[test]
fn test_request_for_unknown_vehicle_is_rejected() {
    let mut authority = create_simulation_app(NetRole::Authority, 1, AbilityTuning::default());
    authority
        .insert_resource(Time::<Fixed>::from_duration(TICK))
        .insert_resource(TimeUpdateStrategy::ManualDuration(TICK));
    authority.update();

    authority.world_mut().resource_mut::<NetInbox>().push(NetMessage::TeleportRequest {
        vehicle: VehicleId(99),
        seq: 5,
        destination: [0.0, 0.0, -10.0],
        linear_velocity: [0.0; 3],
        angular_velocity: [0.0; 3],
    });
    authority.update();

    let sent: Vec<_> = authority.world_mut().resource_mut::<NetOutbox>().drain();
    assert!(sent.iter().any(|envelope| matches!(
        envelope.message,
        NetMessage::TeleportRejected {
            vehicle: VehicleId(99),
            seq: 5,
            reason: TeleportRejection::UnknownVehicle,
            ..
        }
    )));
}

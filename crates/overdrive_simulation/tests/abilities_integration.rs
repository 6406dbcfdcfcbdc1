//! Abilities integration test
//!
//! Authority + клиент гоняются через `LinkedApps` (реальный FixedUpdate, RON wire).
//!
//! Проверяем:
//! - TorqueBoost: 400 → 600 → ровно 400, energy и multiplier сходятся на клиенте
//! - Trail: zones жгут соперника, но никогда spawner'а
//! - Zone expiry: ни одного DOT handle после despawn
//! - Impulse: falloff, vehicle multiplier, тела вне радиуса и на клиенте не тронуты
//! - Authority refusal откатывает предсказание клиента

use bevy::prelude::*;
use bevy_rapier3d::prelude::Velocity;
use overdrive_simulation::scenario::{LinkedApps, Side, PLAYER, RIVAL};
use overdrive_simulation::*;

const BOOST: u8 = 1;
const IMPULSE: u8 = 2;
const TRAIL: u8 = 4;

/// Helper: игрок в начале координат лицом к -Z
fn linked_with_player(tuning: AbilityTuning) -> LinkedApps {
    let mut apps = LinkedApps::new(42, tuning);
    apps.spawn_vehicle(PLAYER, Transform::from_xyz(0.0, 0.5, 0.0), 400.0);
    apps
}

fn torque_multiplier(apps: &LinkedApps, side: Side) -> Option<f32> {
    let entity = apps.entity(side, PLAYER)?;
    apps.app(side)
        .world()
        .get::<VehicleAttributes>(entity)
        .map(VehicleAttributes::torque_multiplier)
}

#[test]
fn test_torque_boost_round_trip_restores_exact_base() {
    let mut apps = linked_with_player(AbilityTuning::default());

    apps.input(Side::Client, PLAYER, BOOST, true);
    apps.step();

    assert_eq!(apps.max_torque(Side::Authority, PLAYER), Some(600.0));
    // Клиент предсказывает Active, но torque не трогает
    assert_eq!(apps.max_torque(Side::Client, PLAYER), Some(400.0));
    assert_eq!(
        apps.abilities(Side::Client, PLAYER).map(|a| a.state(AbilityKind::TorqueBoost)),
        Some(ActivationState::Active)
    );

    apps.run(60);
    let drained = apps.energy(Side::Authority, PLAYER).expect("energy");
    assert!(drained < 100.0, "boost должен тратить energy, got {}", drained);

    apps.input(Side::Client, PLAYER, BOOST, false);
    apps.step();

    assert_eq!(apps.max_torque(Side::Authority, PLAYER), Some(400.0));
    assert_eq!(
        apps.abilities(Side::Authority, PLAYER).map(|a| a.state(AbilityKind::TorqueBoost)),
        Some(ActivationState::Inactive)
    );

    // Regen доводит до max, клиент видит то же значение
    apps.run(600);
    assert_eq!(apps.energy(Side::Authority, PLAYER), Some(100.0));
    assert_eq!(apps.energy(Side::Client, PLAYER), Some(100.0));
}

#[test]
fn test_torque_multiplier_replicates_to_client() {
    let mut apps = linked_with_player(AbilityTuning::default());

    apps.input(Side::Client, PLAYER, BOOST, true);
    apps.run(3);

    assert_eq!(torque_multiplier(&apps, Side::Authority), Some(1.5));
    assert_eq!(torque_multiplier(&apps, Side::Client), Some(1.5));
    // Клиент только наблюдает multiplier, torque у него base
    assert_eq!(apps.max_torque(Side::Client, PLAYER), Some(400.0));

    apps.input(Side::Client, PLAYER, BOOST, false);
    apps.run(3);

    assert_eq!(torque_multiplier(&apps, Side::Authority), Some(1.0));
    assert_eq!(torque_multiplier(&apps, Side::Client), Some(1.0));
}

#[test]
fn test_torque_boost_exhaustion_notifies_client() {
    let mut tuning = AbilityTuning::default();
    tuning.energy.regen_amount = 0.0;
    tuning.torque_boost.drain_per_second = 200.0;
    let mut apps = linked_with_player(tuning);

    apps.input(Side::Client, PLAYER, BOOST, true);
    // 100 energy / 200 per second = 0.5s, плюс запас на доставку
    apps.run(60);

    assert_eq!(apps.energy(Side::Authority, PLAYER), Some(0.0));
    assert_eq!(apps.max_torque(Side::Authority, PLAYER), Some(400.0));
    for side in [Side::Authority, Side::Client] {
        assert!(
            !apps.abilities(side, PLAYER).expect("abilities").get(AbilityKind::TorqueBoost).is_active(),
            "{:?} всё ещё boosting",
            side
        );
    }
}

#[test]
fn test_authority_refusal_rolls_back_client_prediction() {
    let mut apps = linked_with_player(AbilityTuning::default());

    // Authority знает больше клиента: energy почти нет
    let vehicle = apps.entity(Side::Authority, PLAYER).expect("vehicle");
    apps.authority
        .world_mut()
        .get_mut::<VehicleAttributes>(vehicle)
        .expect("attributes")
        .set_energy(2.0);

    apps.input(Side::Client, PLAYER, BOOST, true);
    apps.step();
    assert_eq!(apps.max_torque(Side::Authority, PLAYER), Some(400.0));
    assert_eq!(
        apps.abilities(Side::Client, PLAYER).map(|a| a.state(AbilityKind::TorqueBoost)),
        Some(ActivationState::Active)
    );

    apps.step();
    assert_eq!(
        apps.abilities(Side::Client, PLAYER).map(|a| a.state(AbilityKind::TorqueBoost)),
        Some(ActivationState::Inactive)
    );
    assert_eq!(apps.energy(Side::Client, PLAYER), Some(2.0));
}

#[test]
fn test_trail_zones_burn_rival_but_never_spawner() {
    let mut apps = linked_with_player(AbilityTuning::default());
    // Соперник прямо за игроком: zone центр в (0, 0.5, 2)
    apps.spawn_vehicle(RIVAL, Transform::from_xyz(0.0, 0.5, 3.0), 400.0);

    apps.input(Side::Authority, PLAYER, TRAIL, true);
    apps.run(30);
    apps.input(Side::Authority, PLAYER, TRAIL, false);
    apps.step();

    assert!(apps.zone_count() >= 1);
    assert_eq!(apps.health(Side::Authority, PLAYER), Some(100));
    let rival_health = apps.health(Side::Authority, RIVAL).expect("rival health");
    assert!(rival_health < 100, "соперник должен гореть, health {}", rival_health);

    // Zones не живут на клиенте
    let client = apps.client.world_mut();
    assert_eq!(client.query::<&DamageZone>().iter(client).count(), 0);
}

#[test]
fn test_zone_expiry_releases_every_dot() {
    let mut tuning = AbilityTuning::default();
    tuning.damage_zone.lifespan = 1.0;
    let mut apps = linked_with_player(tuning);
    apps.spawn_vehicle(RIVAL, Transform::from_xyz(0.0, 0.5, 3.0), 400.0);
    let rival = apps.entity(Side::Authority, RIVAL).expect("rival");

    apps.input(Side::Authority, PLAYER, TRAIL, true);
    apps.step();
    apps.input(Side::Authority, PLAYER, TRAIL, false);
    apps.step();

    assert_eq!(apps.zone_count(), 1);
    assert!(apps
        .authority
        .world()
        .resource::<ActiveEffects>()
        .has_tag(rival, GameplayTag::Burning));

    apps.run(120);
    assert_eq!(apps.zone_count(), 0);
    assert!(!apps
        .authority
        .world()
        .resource::<ActiveEffects>()
        .has_tag(rival, GameplayTag::Burning));

    // После expiry урон больше не идёт
    let health = apps.health(Side::Authority, RIVAL);
    apps.run(60);
    assert_eq!(apps.health(Side::Authority, RIVAL), health);
}

#[test]
fn test_despawned_rival_leaves_no_effects() {
    let mut apps = linked_with_player(AbilityTuning::default());
    apps.spawn_vehicle(RIVAL, Transform::from_xyz(0.0, 0.5, 3.0), 400.0);
    let rival = apps.entity(Side::Authority, RIVAL).expect("rival");

    apps.input(Side::Authority, PLAYER, TRAIL, true);
    apps.run(10);
    apps.authority.world_mut().despawn(rival);
    apps.run(10);

    let effects = apps.authority.world().resource::<ActiveEffects>();
    assert_eq!(effects.count_for(rival), 0);
    assert!(apps.entity(Side::Authority, RIVAL).is_none());

    // Replication помнит только живые машины
    let replicated = apps.authority.world().resource::<net::ReplicatedAttributes>();
    assert!(replicated.last_sent(RIVAL).is_none());
    assert!(replicated.last_sent(PLAYER).is_some());
    assert_eq!(replicated.len(), 1);
}

#[test]
fn test_impulse_falloff_and_vehicle_multiplier() {
    let mut apps = linked_with_player(AbilityTuning::default());
    let near = apps.spawn_prop(Vec3::new(2.0, 0.5, 0.0));
    let far = apps.spawn_prop(Vec3::new(6.0, 0.5, 0.0));
    let outside = apps.spawn_prop(Vec3::new(20.0, 0.5, 0.0));
    apps.spawn_vehicle(RIVAL, Transform::from_xyz(-2.0, 0.5, 0.0), 400.0);
    // Клиентская копия prop'а: физику на клиенте никто не трогает
    let client_prop = apps
        .client
        .world_mut()
        .spawn((PhysicsProp, Transform::from_xyz(2.0, 0.5, 0.0)))
        .id();

    apps.input(Side::Client, PLAYER, IMPULSE, true);
    apps.step();

    let client_speed = |apps: &LinkedApps, entity: Entity| {
        apps.client
            .world()
            .get::<Velocity>(entity)
            .map(|v| v.linvel.length() + v.angvel.length())
            .unwrap_or_default()
    };
    let client_rival = apps.entity(Side::Client, RIVAL).expect("client rival");
    assert_eq!(client_speed(&apps, client_prop), 0.0);
    assert_eq!(client_speed(&apps, client_rival), 0.0);

    let world = apps.authority.world();
    let speed = |entity: Entity| world.get::<Velocity>(entity).map(|v| v.linvel.length()).unwrap_or_default();

    assert!(speed(near) > speed(far), "near {} far {}", speed(near), speed(far));
    assert!(speed(far) > 0.0);
    assert_eq!(speed(outside), 0.0);

    // Тот же радиус, но машина получает vehicle_multiplier
    let rival = apps.entity(Side::Authority, RIVAL).expect("rival");
    assert!((speed(rival) - speed(near) * 0.5).abs() < 1e-3);

    // Сам источник не толкается, energy списана только на authority
    let player = apps.entity(Side::Authority, PLAYER).expect("player");
    assert_eq!(speed(player), 0.0);
    assert_eq!(apps.energy(Side::Authority, PLAYER), Some(70.0));

    // ImpulseCue дошёл до клиента, тела всё ещё стоят
    apps.run(2);
    assert_eq!(client_speed(&apps, client_prop), 0.0);
    assert_eq!(client_speed(&apps, client_rival), 0.0);
}

#[test]
fn test_unknown_input_id_is_ignored() {
    let mut apps = linked_with_player(AbilityTuning::default());

    apps.input(Side::Client, PLAYER, 0, true);
    apps.input(Side::Client, PLAYER, 42, true);
    apps.run(3);

    let abilities = apps.abilities(Side::Authority, PLAYER).expect("abilities");
    for kind in AbilityKind::ALL {
        assert_eq!(abilities.state(kind), ActivationState::Inactive);
    }
    assert_eq!(apps.energy(Side::Authority, PLAYER), Some(100.0));
}

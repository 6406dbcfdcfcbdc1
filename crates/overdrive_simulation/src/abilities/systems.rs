//! Ability dispatcher systems
//!
//! - `dispatch_ability_commands`: Press/Release/ForceEnd/teleport команды
//! - `run_ability_tasks`: scheduler fire → ability.tick
//! - `refresh_cooldown_states`: CoolingDown → Inactive
//! - `teardown_abilities_on_remove`: observer, машина удалена
//!
//! После каждого вызова ability её `AbilityOutput` разворачиваются в
//! events/outbox (`flush_outputs`).

use bevy::ecs::system::SystemParam;
use bevy::prelude::*;
use bevy_rapier3d::prelude::{Sleeping, Velocity};

use crate::attributes::VehicleAttributes;
use crate::components::{Drivetrain, Vehicle, VehicleId};
use crate::config::AbilityTuning;
use crate::effects::ActiveEffects;
use crate::net::{Envelope, NetMessage, NetOutbox, NetRole};
use crate::physics::CollisionWorld;
use crate::scheduler::TaskScheduler;
use crate::zone::SpawnZoneRequest;

use super::{
    Ability, AbilityCommand, AbilityContext, AbilityCue, AbilityEnded, AbilityKind, AbilityOutput, EndReason,
    ImpulseBurst, InputOrigin, VehicleAbilities,
};

/// Общие ресурсы/writers всех ability систем
#[derive(SystemParam)]
pub struct AbilityServices<'w> {
    pub tuning: Res<'w, AbilityTuning>,
    pub role: Res<'w, NetRole>,
    pub effects: ResMut<'w, ActiveEffects>,
    pub scheduler: ResMut<'w, TaskScheduler>,
    pub collision: Res<'w, CollisionWorld>,
    pub outbox: ResMut<'w, NetOutbox>,
    pub zones: EventWriter<'w, SpawnZoneRequest>,
    pub bursts: EventWriter<'w, ImpulseBurst>,
    pub cues: EventWriter<'w, AbilityCue>,
    pub ended: EventWriter<'w, AbilityEnded>,
}

pub type VehicleAbilityQuery = (
    &'static Vehicle,
    &'static mut VehicleAbilities,
    &'static mut VehicleAttributes,
    &'static mut Drivetrain,
    &'static mut Transform,
    Option<&'static mut Velocity>,
    Option<&'static mut Sleeping>,
);

/// Строит AbilityContext для машины и вызывает `f`. Outputs флашатся после.
///
/// false = машины нет (или нет обязательных компонентов).
fn with_vehicle(
    services: &mut AbilityServices,
    vehicles: &mut Query<VehicleAbilityQuery>,
    entity: Entity,
    f: impl FnOnce(&mut VehicleAbilities, &mut AbilityContext),
) -> bool {
    let Ok((vehicle, mut abilities, mut attributes, mut drivetrain, mut transform, velocity, sleeping)) =
        vehicles.get_mut(entity)
    else {
        crate::log_warning(&format!("⚠️ Ability command for {:?} without vehicle components", entity));
        return false;
    };
    let vehicle_id = vehicle.id;

    let mut outputs = Vec::new();
    {
        let mut ctx = AbilityContext {
            vehicle: entity,
            vehicle_id,
            role: *services.role,
            tuning: &services.tuning,
            attributes: &mut attributes,
            drivetrain: &mut drivetrain,
            transform: &mut transform,
            velocity: velocity.map(Mut::into_inner),
            sleeping: sleeping.map(Mut::into_inner),
            effects: &mut *services.effects,
            scheduler: &mut services.scheduler,
            collision: &*services.collision,
            outputs: &mut outputs,
        };
        f(&mut abilities, &mut ctx);
    }

    flush_outputs(services, entity, vehicle_id, outputs);
    true
}

fn flush_outputs(services: &mut AbilityServices, vehicle: Entity, vehicle_id: VehicleId, outputs: Vec<AbilityOutput>) {
    let authority = services.role.is_authority();

    for output in outputs {
        match output {
            AbilityOutput::SpawnZone(request) => {
                if authority {
                    services.zones.write(request);
                }
            }
            AbilityOutput::ImpulseBurst(burst) => {
                if authority {
                    services.bursts.write(burst);
                }
            }
            AbilityOutput::Send(envelope) => services.outbox.push(envelope),
            AbilityOutput::Cue(cue) => {
                services.cues.write(AbilityCue { vehicle, cue });
            }
            AbilityOutput::Ended { ability, reason } => {
                services.ended.write(AbilityEnded {
                    vehicle,
                    ability,
                    reason,
                });
                if authority && reason.notifies_clients() {
                    services.outbox.push(Envelope::reliable(NetMessage::AbilityEnded {
                        vehicle: vehicle_id,
                        ability,
                    }));
                }
            }
        }
    }
}

fn press(abilities: &mut VehicleAbilities, ctx: &mut AbilityContext, kind: AbilityKind, origin: InputOrigin) {
    let result = abilities.get_mut(kind).activate(ctx);

    match result {
        Ok(()) => {
            // Клиент форвардит held abilities и Impulse; Blink шлёт свой TeleportRequest
            if !ctx.is_authority() && origin == InputOrigin::Local && kind != AbilityKind::Blink {
                ctx.emit(AbilityOutput::Send(Envelope::reliable(NetMessage::AbilityInput {
                    vehicle: ctx.vehicle_id,
                    input_id: kind.input_id(),
                    pressed: true,
                })));
            }
        }
        Err(error) => {
            crate::log(&format!("🚫 {} {:?} refused: {}", ctx.vehicle_id, kind, error));
            // Клиент уже предсказал Active: пусть закончит
            if ctx.is_authority() && origin == InputOrigin::Remote {
                ctx.emit(AbilityOutput::Ended {
                    ability: kind,
                    reason: EndReason::Refused,
                });
            }
        }
    }
}

fn release(abilities: &mut VehicleAbilities, ctx: &mut AbilityContext, kind: AbilityKind, origin: InputOrigin) {
    if !kind.is_held() {
        return;
    }
    abilities.get_mut(kind).end(ctx, EndReason::InputReleased);

    // Release форвардится всегда: end на authority idempotent
    if !ctx.is_authority() && origin == InputOrigin::Local {
        ctx.emit(AbilityOutput::Send(Envelope::reliable(NetMessage::AbilityInput {
            vehicle: ctx.vehicle_id,
            input_id: kind.input_id(),
            pressed: false,
        })));
    }
}

/// System: AbilityCommand → state machines
pub fn dispatch_ability_commands(
    mut commands: EventReader<AbilityCommand>,
    mut services: AbilityServices,
    mut vehicles: Query<VehicleAbilityQuery>,
) {
    for command in commands.read().copied().collect::<Vec<_>>() {
        match command {
            AbilityCommand::Press {
                vehicle,
                ability,
                origin,
            } => {
                with_vehicle(&mut services, &mut vehicles, vehicle, |abilities, ctx| {
                    press(abilities, ctx, ability, origin)
                });
            }
            AbilityCommand::Release {
                vehicle,
                ability,
                origin,
            } => {
                with_vehicle(&mut services, &mut vehicles, vehicle, |abilities, ctx| {
                    release(abilities, ctx, ability, origin)
                });
            }
            AbilityCommand::ForceEnd { vehicle, ability } => {
                with_vehicle(&mut services, &mut vehicles, vehicle, |abilities, ctx| {
                    abilities.get_mut(ability).end(ctx, EndReason::Cancelled);
                });
            }
            AbilityCommand::AuthorizeTeleport {
                vehicle,
                seq,
                destination,
                linear_velocity,
                angular_velocity,
            } => {
                if !services.role.is_authority() {
                    continue;
                }
                with_vehicle(&mut services, &mut vehicles, vehicle, |abilities, ctx| {
                    if let Ability::Blink(blink) = abilities.get_mut(AbilityKind::Blink) {
                        // Rejection уже отправлена клиенту внутри authorize
                        if let Err(reason) = blink.authorize(ctx, seq, destination, linear_velocity, angular_velocity) {
                            crate::log(&format!("🚫 {} teleport #{} refused: {}", ctx.vehicle_id, seq, reason));
                        }
                    }
                });
            }
            AbilityCommand::ReconcileTeleport { vehicle, seq, outcome } => {
                if services.role.is_authority() {
                    continue;
                }
                with_vehicle(&mut services, &mut vehicles, vehicle, |abilities, ctx| {
                    if let Ability::Blink(blink) = abilities.get_mut(AbilityKind::Blink) {
                        blink.reconcile(ctx, seq, outcome);
                    }
                });
            }
        }
    }
}

/// System: scheduler → periodic ticks (Trail spawn, TorqueBoost check)
pub fn run_ability_tasks(
    time: Res<Time>,
    mut services: AbilityServices,
    mut vehicles: Query<VehicleAbilityQuery>,
) {
    let fired = services.scheduler.advance(time.delta_secs());
    for task in fired {
        // Task мог быть отменён предыдущим fire в этом же tick
        if !services.scheduler.is_scheduled(task.token) {
            continue;
        }
        with_vehicle(&mut services, &mut vehicles, task.owner, |abilities, ctx| {
            abilities.get_mut(task.ability).tick(ctx, task.token);
        });
    }
}

/// System: истёкший cooldown marker → Inactive
pub fn refresh_cooldown_states(effects: Res<ActiveEffects>, mut vehicles: Query<(Entity, &mut VehicleAbilities)>) {
    for (entity, mut abilities) in vehicles.iter_mut() {
        for ability in abilities.iter_mut() {
            ability.refresh_cooldown(entity, &*effects);
        }
    }
}

/// Observer: машина удаляется → все handles и tasks отпущены
pub fn teardown_abilities_on_remove(
    trigger: Trigger<OnRemove, VehicleAbilities>,
    mut vehicles: Query<&mut VehicleAbilities>,
    mut effects: ResMut<ActiveEffects>,
    mut scheduler: ResMut<TaskScheduler>,
) {
    let entity = trigger.target();
    let Ok(mut abilities) = vehicles.get_mut(entity) else {
        return;
    };

    let mut released = 0;
    for ability in abilities.iter_mut() {
        if ability.teardown(&mut *effects, &mut scheduler) {
            released += 1;
        }
    }
    // Tasks этой машины, не привязанные к ability state
    released += scheduler.cancel_owner(entity);

    if released > 0 {
        crate::log(&format!("🧹 Teardown {:?}: released {} ability resources", entity, released));
    }
}

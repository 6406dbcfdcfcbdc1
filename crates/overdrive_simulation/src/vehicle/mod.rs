//! Vehicle host glue
//!
//! Entry points, которые видит остальной мир:
//! - `AbilityInputEvent` (input id pressed/released) → AbilityCommand
//! - `perform_teleport` (позиция + velocities + drivetrain snapshot)
//! - `reset_vehicle` + flip check
//! - energy accessors для UI
//! - `spawn_vehicle` со всеми компонентами и energy regen (authority)

use bevy::prelude::*;
use bevy_rapier3d::prelude::{Sleeping, Velocity};

use crate::abilities::{AbilityCommand, AbilityKind, InputOrigin, VehicleAbilities};
use crate::attributes::VehicleAttributes;
use crate::components::{Drivetrain, Vehicle, VehicleId};
use crate::config::AbilityTuning;
use crate::effects::{ActiveEffects, EffectContext, EffectService, EffectTemplate};
use crate::net::NetRole;

pub mod index;

pub use index::VehicleIndex;

/// Подъём при reset (м)
pub const RESET_LIFT: f32 = 0.5;
/// up·Y ниже этого = машина на боку/крыше
pub const FLIP_UP_THRESHOLD: f32 = 0.2;
/// Сколько подряд сэмплов "перевёрнута" до reset
pub const FLIP_SAMPLES_TO_RESET: u32 = 2;

/// Event: raw input от binding слоя
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbilityInputEvent {
    pub vehicle: Entity,
    pub input_id: u8,
    pub pressed: bool,
}

/// Event: host просит reset машины
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetVehicle {
    pub vehicle: Entity,
}

/// Счётчик flip check
#[derive(Component, Debug, Default, Clone, Copy)]
pub struct FlipMonitor {
    pub flipped_samples: u32,
}

/// Energy для UI
pub fn energy_of(attributes: &VehicleAttributes) -> f32 {
    attributes.energy()
}

pub fn max_energy_of(attributes: &VehicleAttributes) -> f32 {
    attributes.max_energy()
}

/// Телепорт: позиция меняется, ориентация и velocities сохраняются,
/// drivetrain snapshot переносится целиком, тело просыпается.
pub fn perform_teleport(
    transform: &mut Transform,
    velocity: Option<&mut Velocity>,
    sleeping: Option<&mut Sleeping>,
    drivetrain: &mut Drivetrain,
    destination: Vec3,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
) {
    let snapshot = drivetrain.snapshot();

    transform.translation = destination;
    if let Some(velocity) = velocity {
        velocity.linvel = linear_velocity;
        velocity.angvel = angular_velocity;
    }

    drivetrain.restore(&snapshot);
    if let Some(sleeping) = sleeping {
        sleeping.sleeping = false;
    }
}

/// Reset: +0.5м, yaw сохраняется, pitch/roll = 0, velocities = 0
pub fn reset_vehicle(transform: &mut Transform, velocity: Option<&mut Velocity>) {
    let (yaw, _, _) = transform.rotation.to_euler(EulerRot::YXZ);
    transform.translation.y += RESET_LIFT;
    transform.rotation = Quat::from_rotation_y(yaw);
    if let Some(velocity) = velocity {
        *velocity = Velocity::zero();
    }
}

pub fn is_flipped(transform: &Transform) -> bool {
    transform.up().dot(Vec3::Y) < FLIP_UP_THRESHOLD
}

/// System: input id → AbilityCommand (неизвестные id молча игнорируются)
pub fn route_ability_input(mut inputs: EventReader<AbilityInputEvent>, mut commands: EventWriter<AbilityCommand>) {
    for input in inputs.read() {
        let Some(ability) = AbilityKind::from_input_id(input.input_id) else {
            crate::log(&format!("Ignoring unknown ability input id {}", input.input_id));
            continue;
        };

        commands.write(if input.pressed {
            AbilityCommand::Press {
                vehicle: input.vehicle,
                ability,
                origin: InputOrigin::Local,
            }
        } else {
            AbilityCommand::Release {
                vehicle: input.vehicle,
                ability,
                origin: InputOrigin::Local,
            }
        });
    }
}

/// System: ResetVehicle events
pub fn handle_reset_requests(
    mut requests: EventReader<ResetVehicle>,
    mut vehicles: Query<(&mut Transform, Option<&mut Velocity>), With<Vehicle>>,
) {
    for request in requests.read() {
        if let Ok((mut transform, velocity)) = vehicles.get_mut(request.vehicle) {
            reset_vehicle(&mut transform, velocity.map(Mut::into_inner));
            crate::log_info(&format!("🔧 Vehicle {:?} reset", request.vehicle));
        }
    }
}

/// System: две подряд выборки "перевёрнута" → ResetVehicle
pub fn check_flipped_vehicles(
    mut vehicles: Query<(Entity, &Transform, &mut FlipMonitor), With<Vehicle>>,
    mut resets: EventWriter<ResetVehicle>,
) {
    for (entity, transform, mut monitor) in vehicles.iter_mut() {
        if !is_flipped(transform) {
            monitor.flipped_samples = 0;
            continue;
        }

        monitor.flipped_samples += 1;
        if monitor.flipped_samples >= FLIP_SAMPLES_TO_RESET {
            monitor.flipped_samples = 0;
            resets.write(ResetVehicle { vehicle: entity });
        }
    }
}

/// Спавн машины со всем ability стеком.
///
/// Energy regen вешается только на authority (на клиенте energy наблюдается).
pub fn spawn_vehicle(world: &mut World, id: VehicleId, transform: Transform, base_torque: f32) -> Entity {
    let tuning = world.get_resource::<AbilityTuning>().cloned().unwrap_or_default();
    let authority = world.get_resource::<NetRole>().is_some_and(|role| role.is_authority());

    let entity = world
        .spawn((
            Vehicle { id },
            transform,
            Drivetrain::new(base_torque),
            VehicleAttributes::new(tuning.energy.initial, tuning.energy.max),
            VehicleAbilities::default(),
            FlipMonitor::default(),
        ))
        .id();

    if authority && tuning.energy.regen_amount > 0.0 {
        let template = EffectTemplate::EnergyRegen {
            amount: tuning.energy.regen_amount,
            period: tuning.energy.regen_period,
        };
        if let Some(mut effects) = world.get_resource_mut::<ActiveEffects>() {
            effects.apply_effect(entity, &template, 1.0, EffectContext::from_source(entity, Some(entity)));
        }
    }

    crate::log_info(&format!("🚗 Spawned {} as {:?} (authority: {})", id, entity, authority));
    entity
}

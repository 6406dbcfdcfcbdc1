//! Vehicle компоненты: identity, drivetrain, препятствия
//!
//! Physics body state (Velocity, Sleeping, RigidBody): rapier компоненты,
//! сам шаг физики делает host. Мы только читаем/пишем состояние.

use bevy::prelude::*;
use bevy_rapier3d::prelude::{RigidBody, Sleeping, Velocity};
use serde::{Deserialize, Serialize};

use super::health::Health;

/// Stable network ID машины (одинаковый на authority и клиентах)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, Reflect)]
pub struct VehicleId(pub u32);

impl std::fmt::Display for VehicleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vehicle#{}", self.0)
    }
}

/// Машина игрока/соперника
///
/// Required Components: transform, rapier body state, Health, Drivetrain.
/// Attributes и abilities добавляет `spawn_vehicle` (им нужен tuning).
#[derive(Component, Debug, Clone, Copy, Default, Reflect)]
#[reflect(Component)]
#[require(Transform, Velocity, Sleeping, RigidBody, Health, Drivetrain)]
pub struct Vehicle {
    pub id: VehicleId,
}

/// Torque entry points, которые зовёт attribute layer
pub trait TorqueHost {
    fn apply_torque_multiplier(&mut self, multiplier: f32);
    fn restore_base_torque(&mut self);
}

/// Состояние одного колеса (суспензия + вращение)
#[derive(Debug, Clone, Copy, PartialEq, Default, Reflect)]
pub struct WheelState {
    pub suspension_offset: f32,
    pub spin_velocity: f32,
    pub steer_angle: f32,
}

/// Engine + wheels. Внешний physics host читает `max_torque`.
///
/// Инвариант: `base_torque` кэшируется один раз при создании и больше
/// не меняется ability логикой.
#[derive(Component, Debug, Clone, PartialEq, Reflect)]
#[reflect(Component)]
pub struct Drivetrain {
    base_torque: f32,
    pub max_torque: f32,
    pub engine_rpm: f32,
    pub gear: i32,
    pub wheels: Vec<WheelState>,
}

impl Default for Drivetrain {
    fn default() -> Self {
        Self::new(400.0)
    }
}

/// Полный mechanical snapshot (для телепорта без потери состояния)
#[derive(Debug, Clone, PartialEq)]
pub struct DrivetrainSnapshot {
    pub max_torque: f32,
    pub engine_rpm: f32,
    pub gear: i32,
    pub wheels: Vec<WheelState>,
}

impl Drivetrain {
    pub fn new(base_torque: f32) -> Self {
        Self {
            base_torque,
            max_torque: base_torque,
            engine_rpm: 0.0,
            gear: 1,
            wheels: vec![WheelState::default(); 4],
        }
    }

    pub fn base_torque(&self) -> f32 {
        self.base_torque
    }

    pub fn snapshot(&self) -> DrivetrainSnapshot {
        DrivetrainSnapshot {
            max_torque: self.max_torque,
            engine_rpm: self.engine_rpm,
            gear: self.gear,
            wheels: self.wheels.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: &DrivetrainSnapshot) {
        self.max_torque = snapshot.max_torque;
        self.engine_rpm = snapshot.engine_rpm;
        self.gear = snapshot.gear;
        self.wheels.clone_from(&snapshot.wheels);
    }
}

impl TorqueHost for Drivetrain {
    fn apply_torque_multiplier(&mut self, multiplier: f32) {
        self.max_torque = self.base_torque * multiplier;
    }

    fn restore_base_torque(&mut self) {
        self.max_torque = self.base_torque;
    }
}

/// Статичное препятствие (axis-aligned box) для ray cast / overlap
#[derive(Component, Debug, Clone, Copy, Default, Reflect)]
#[reflect(Component)]
#[require(Transform)]
pub struct Obstacle {
    pub half_extents: Vec3,
}

/// Свободный dynamic body (ящики, бочки), его толкает Impulse
#[derive(Component, Debug, Clone, Copy, Default, Reflect)]
#[reflect(Component)]
#[require(Transform, Velocity, Sleeping, RigidBody)]
pub struct PhysicsProp;

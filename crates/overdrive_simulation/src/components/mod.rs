//! Базовые ECS компоненты: Vehicle, Drivetrain, Health, Obstacle

pub mod health;
pub mod vehicle;

pub use health::{DamageDealt, Health};
pub use vehicle::{
    Drivetrain, DrivetrainSnapshot, Obstacle, PhysicsProp, TorqueHost, Vehicle, VehicleId, WheelState,
};

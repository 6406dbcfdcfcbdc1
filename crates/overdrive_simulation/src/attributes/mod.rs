//! Vehicle attributes: energy pool + torque multiplier
//!
//! Архитектура:
//! - `ResourceKind`: фиксированный реестр значений (без runtime type lookup)
//! - Каждая запись проходит clamp ДО того, как кто-то её увидит
//! - `TorqueMultiplier`: meta-attribute: изменение на authority пушит torque в host
//! - Клиенты только наблюдают (`apply_replicated` из AttributeDelta)

use bevy::prelude::*;

use crate::components::TorqueHost;

pub const MIN_TORQUE_MULTIPLIER: f32 = 0.1;
pub const MAX_TORQUE_MULTIPLIER: f32 = 5.0;
pub const MIN_MAX_ENERGY: f32 = 1.0;

/// Multiplier ближе этого к 1.0 = "вернуть base torque"
const NEUTRAL_MULTIPLIER_EPSILON: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Energy,
    MaxEnergy,
    TorqueMultiplier,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::Energy,
        ResourceKind::MaxEnergy,
        ResourceKind::TorqueMultiplier,
    ];

    fn slot(self) -> usize {
        match self {
            ResourceKind::Energy => 0,
            ResourceKind::MaxEnergy => 1,
            ResourceKind::TorqueMultiplier => 2,
        }
    }
}

/// Energy resource машины
///
/// Инварианты:
/// - 0 ≤ energy ≤ max_energy
/// - max_energy ≥ 1
/// - 0.1 ≤ torque_multiplier ≤ 5.0
#[derive(Component, Debug, Clone, PartialEq)]
pub struct VehicleAttributes {
    values: [f32; 3],
}

impl Default for VehicleAttributes {
    fn default() -> Self {
        Self::new(100.0, 100.0)
    }
}

impl VehicleAttributes {
    pub fn new(energy: f32, max_energy: f32) -> Self {
        let mut attributes = Self {
            values: [0.0, MIN_MAX_ENERGY, 1.0],
        };
        attributes.set_max_energy(max_energy);
        attributes.set_energy(energy);
        attributes
    }

    pub fn get(&self, kind: ResourceKind) -> f32 {
        self.values[kind.slot()]
    }

    /// Generic setter, clamp по правилам kind.
    ///
    /// TorqueMultiplier здесь только сохраняется; пуш в drivetrain идёт
    /// через `set_torque_multiplier`.
    pub fn set(&mut self, kind: ResourceKind, value: f32) {
        match kind {
            ResourceKind::Energy => self.set_energy(value),
            ResourceKind::MaxEnergy => self.set_max_energy(value),
            ResourceKind::TorqueMultiplier => {
                self.values[kind.slot()] = clamp_torque_multiplier(value);
            }
        }
    }

    pub fn energy(&self) -> f32 {
        self.get(ResourceKind::Energy)
    }

    pub fn max_energy(&self) -> f32 {
        self.get(ResourceKind::MaxEnergy)
    }

    pub fn torque_multiplier(&self) -> f32 {
        self.get(ResourceKind::TorqueMultiplier)
    }

    pub fn set_energy(&mut self, value: f32) {
        let max = self.max_energy();
        // NaN → 0, иначе clamp пропустит его дальше
        let value = if value.is_nan() { 0.0 } else { value };
        self.values[ResourceKind::Energy.slot()] = value.clamp(0.0, max);
    }

    /// Снижение max тянет energy за собой
    pub fn set_max_energy(&mut self, value: f32) {
        let value = if value.is_nan() { MIN_MAX_ENERGY } else { value };
        self.values[ResourceKind::MaxEnergy.slot()] = value.max(MIN_MAX_ENERGY);
        let energy = self.energy();
        self.set_energy(energy);
    }

    pub fn add_energy(&mut self, delta: f32) {
        self.set_energy(self.energy() + delta);
    }

    pub fn can_afford(&self, amount: f32) -> bool {
        self.energy() >= amount
    }

    /// Меняет multiplier; на authority при изменении пушит torque в host.
    ///
    /// Возвращает true если значение (после clamp) изменилось.
    pub fn set_torque_multiplier(&mut self, value: f32, authority: bool, host: &mut impl TorqueHost) -> bool {
        let clamped = clamp_torque_multiplier(value);
        let slot = ResourceKind::TorqueMultiplier.slot();
        if self.values[slot] == clamped {
            return false;
        }
        self.values[slot] = clamped;

        if authority {
            if (clamped - 1.0).abs() < NEUTRAL_MULTIPLIER_EPSILON {
                host.restore_base_torque();
            } else {
                host.apply_torque_multiplier(clamped);
            }
        }
        true
    }

    /// Клиент: значения с authority (тоже через clamp).
    ///
    /// Multiplier только сохраняется, torque клиент не трогает.
    pub fn apply_replicated(&mut self, energy: f32, max_energy: f32, torque_multiplier: f32) {
        self.set_max_energy(max_energy);
        self.set_energy(energy);
        self.set(ResourceKind::TorqueMultiplier, torque_multiplier);
    }
}

fn clamp_torque_multiplier(value: f32) -> f32 {
    if value.is_nan() {
        return 1.0;
    }
    value.clamp(MIN_TORQUE_MULTIPLIER, MAX_TORQUE_MULTIPLIER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Drivetrain;

    #[test]
    fn test_energy_clamped_to_range() {
        let mut attributes = VehicleAttributes::new(100.0, 100.0);

        for x in [-50.0, -0.001, 0.0, 42.5, 100.0, 100.001, 1.0e6] {
            attributes.set_energy(x);
            assert_eq!(attributes.energy(), x.clamp(0.0, 100.0), "input {}", x);
        }
    }

    #[test]
    fn test_max_energy_floor_and_energy_follows() {
        let mut attributes = VehicleAttributes::new(80.0, 100.0);

        attributes.set_max_energy(50.0);
        assert_eq!(attributes.max_energy(), 50.0);
        assert_eq!(attributes.energy(), 50.0);

        attributes.set_max_energy(0.0);
        assert_eq!(attributes.max_energy(), 1.0);
        assert_eq!(attributes.energy(), 1.0);
    }

    #[test]
    fn test_torque_multiplier_clamped() {
        let mut attributes = VehicleAttributes::default();
        let mut drivetrain = Drivetrain::new(400.0);

        for x in [-3.0, 0.0, 0.1, 0.75, 2.0, 5.0, 9.0] {
            attributes.set_torque_multiplier(x, true, &mut drivetrain);
            assert_eq!(attributes.torque_multiplier(), x.clamp(0.1, 5.0), "input {}", x);
        }
    }

    #[test]
    fn test_torque_push_only_on_authority() {
        let mut attributes = VehicleAttributes::default();
        let mut drivetrain = Drivetrain::new(400.0);

        assert!(attributes.set_torque_multiplier(1.5, false, &mut drivetrain));
        assert_eq!(drivetrain.max_torque, 400.0); // клиент не трогает torque

        let mut attributes = VehicleAttributes::default();
        assert!(attributes.set_torque_multiplier(1.5, true, &mut drivetrain));
        assert_eq!(drivetrain.max_torque, 600.0);

        assert!(attributes.set_torque_multiplier(1.005, true, &mut drivetrain));
        assert_eq!(drivetrain.max_torque, 400.0); // ≈1 → base
    }

    #[test]
    fn test_unchanged_multiplier_does_not_push() {
        let mut attributes = VehicleAttributes::default();
        let mut drivetrain = Drivetrain::new(400.0);
        drivetrain.max_torque = 123.0;

        assert!(!attributes.set_torque_multiplier(1.0, true, &mut drivetrain));
        assert_eq!(drivetrain.max_torque, 123.0);
    }

    #[test]
    fn test_registry_roundtrip_by_kind() {
        let mut attributes = VehicleAttributes::new(10.0, 20.0);
        attributes.set(ResourceKind::Energy, 500.0);
        attributes.set(ResourceKind::TorqueMultiplier, 0.0);

        assert_eq!(attributes.get(ResourceKind::Energy), 20.0);
        assert_eq!(attributes.get(ResourceKind::TorqueMultiplier), 0.1);
        assert_eq!(ResourceKind::ALL.len(), 3);
    }

    #[test]
    fn test_replicated_values_are_clamped() {
        let mut attributes = VehicleAttributes::default();

        attributes.apply_replicated(70.0, 60.0, 1.5);
        assert_eq!(attributes.max_energy(), 60.0);
        assert_eq!(attributes.energy(), 60.0);
        assert_eq!(attributes.torque_multiplier(), 1.5);

        attributes.apply_replicated(10.0, 60.0, 40.0);
        assert_eq!(attributes.torque_multiplier(), 5.0);
    }

    #[test]
    fn test_nan_is_clamped() {
        let mut attributes = VehicleAttributes::default();
        attributes.set_energy(f32::NAN);
        assert_eq!(attributes.energy(), 0.0);
    }
}

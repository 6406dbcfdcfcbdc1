//! Data-driven tuning для abilities и energy
//!
//! Все числа живут в `assets/config/abilities.ron`; дефолты совпадают с
//! балансом машины (метры, секунды). `#[serde(default)]` на каждой секции,
//! поэтому частичный RON файл валиден.
//!
//! ```ignore
//! let tuning = AbilityTuning::load("assets/config/abilities.ron")?;
//! app.insert_resource(tuning);
//! ```

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read tuning file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse tuning RON: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("invalid tuning value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Energy pool и regen
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnergyTuning {
    pub initial: f32,
    pub max: f32,
    /// +amount каждые period секунд (authority only, не на application)
    pub regen_amount: f32,
    pub regen_period: f32,
}

impl Default for EnergyTuning {
    fn default() -> Self {
        Self {
            initial: 100.0,
            max: 100.0,
            regen_amount: 5.0,
            regen_period: 0.5,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TorqueBoostTuning {
    pub multiplier: f32,
    /// Energy per second пока boost активен
    pub drain_per_second: f32,
    pub min_activate: f32,
    pub check_interval: f32,
}

impl Default for TorqueBoostTuning {
    fn default() -> Self {
        Self {
            multiplier: 1.5,
            drain_per_second: 20.0,
            min_activate: 5.0,
            check_interval: 0.1,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrailTuning {
    pub cost_per_spawn: f32,
    pub min_activate: f32,
    pub spawn_interval: f32,
    /// Local-space offset; forward машины = -Z, значит +Z = сзади
    pub rear_offset: [f32; 3],
    pub cooldown: f32,
}

impl Default for TrailTuning {
    fn default() -> Self {
        Self {
            cost_per_spawn: 2.0,
            min_activate: 5.0,
            spawn_interval: 0.1,
            rear_offset: [0.0, 0.0, 2.0],
            cooldown: 5.0,
        }
    }
}

/// Fire zone, которую оставляет Trail
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DamageZoneTuning {
    pub radius: f32,
    pub lifespan: f32,
    pub dot_period: f32,
    pub dot_damage: u32,
    pub dot_on_application: bool,
}

impl Default for DamageZoneTuning {
    fn default() -> Self {
        Self {
            radius: 2.0,
            lifespan: 10.0,
            dot_period: 0.5,
            dot_damage: 5,
            dot_on_application: true,
        }
    }
}

/// Как Blink отступает от препятствия
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ClearanceStrategy {
    /// hit point минус clearance вдоль луча
    #[default]
    RetreatAlongRay,
    /// Бинарный поиск box-overlap между origin и hit
    BinarySearch,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BlinkTuning {
    pub distance: f32,
    pub cost: f32,
    pub use_velocity_direction: bool,
    pub min_velocity: f32,
    pub clearance: f32,
    pub max_search_steps: u32,
    pub min_travel: f32,
    pub vehicle_half_extents: [f32; 3],
    /// Допуск authority при проверке дальности клиентского запроса
    pub server_tolerance: f32,
    pub cooldown: f32,
    pub strategy: ClearanceStrategy,
}

impl Default for BlinkTuning {
    fn default() -> Self {
        Self {
            distance: 10.0,
            cost: 50.0,
            use_velocity_direction: true,
            min_velocity: 5.0,
            clearance: 2.0,
            max_search_steps: 10,
            min_travel: 1.0,
            vehicle_half_extents: [1.0, 0.75, 2.25],
            server_tolerance: 1.0,
            cooldown: 15.0,
            strategy: ClearanceStrategy::RetreatAlongRay,
        }
    }
}

impl BlinkTuning {
    pub fn half_extents(&self) -> Vec3 {
        Vec3::from_array(self.vehicle_half_extents)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImpulseTuning {
    pub radius: f32,
    /// Базовый velocity change (m/s) в эпицентре
    pub strength: f32,
    pub cost: f32,
    pub affect_vehicles: bool,
    pub vehicle_multiplier: f32,
    pub lift_fraction: f32,
    pub cooldown: f32,
}

impl Default for ImpulseTuning {
    fn default() -> Self {
        Self {
            radius: 8.0,
            strength: 15.0,
            cost: 30.0,
            affect_vehicles: true,
            vehicle_multiplier: 0.5,
            lift_fraction: 0.3,
            cooldown: 10.0,
        }
    }
}

/// Полный баланс abilities (Resource)
#[derive(Resource, Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AbilityTuning {
    pub energy: EnergyTuning,
    pub torque_boost: TorqueBoostTuning,
    pub trail: TrailTuning,
    pub damage_zone: DamageZoneTuning,
    pub blink: BlinkTuning,
    pub impulse: ImpulseTuning,
}

impl AbilityTuning {
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let tuning: AbilityTuning = ron::from_str(text)?;
        tuning.validate()?;
        Ok(tuning)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }

    /// Читает файл если он есть, иначе дефолты
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be > 0, got {}", value),
                })
            }
        }

        fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be >= 0, got {}", value),
                })
            }
        }

        if self.energy.max < 1.0 {
            return Err(ConfigError::Invalid {
                field: "energy.max",
                reason: format!("must be >= 1, got {}", self.energy.max),
            });
        }
        non_negative("energy.initial", self.energy.initial)?;
        positive("energy.regen_period", self.energy.regen_period)?;

        positive("torque_boost.multiplier", self.torque_boost.multiplier)?;
        positive("torque_boost.check_interval", self.torque_boost.check_interval)?;
        non_negative("torque_boost.drain_per_second", self.torque_boost.drain_per_second)?;

        positive("trail.spawn_interval", self.trail.spawn_interval)?;
        non_negative("trail.cost_per_spawn", self.trail.cost_per_spawn)?;
        non_negative("trail.cooldown", self.trail.cooldown)?;

        positive("damage_zone.radius", self.damage_zone.radius)?;
        positive("damage_zone.lifespan", self.damage_zone.lifespan)?;
        positive("damage_zone.dot_period", self.damage_zone.dot_period)?;

        positive("blink.distance", self.blink.distance)?;
        non_negative("blink.clearance", self.blink.clearance)?;
        non_negative("blink.min_travel", self.blink.min_travel)?;
        non_negative("blink.cooldown", self.blink.cooldown)?;
        if self.blink.vehicle_half_extents.iter().any(|e| !(*e > 0.0)) {
            return Err(ConfigError::Invalid {
                field: "blink.vehicle_half_extents",
                reason: "all extents must be > 0".to_string(),
            });
        }

        positive("impulse.radius", self.impulse.radius)?;
        non_negative("impulse.strength", self.impulse.strength)?;
        non_negative("impulse.vehicle_multiplier", self.impulse.vehicle_multiplier)?;
        non_negative("impulse.cooldown", self.impulse.cooldown)?;

        Ok(())
    }
}

//! Health для всего, что может гореть в fire zone

use bevy::prelude::*;

/// Здоровье (машины, пропсы с HP)
///
/// Инвариант: 0 ≤ current ≤ max
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Reflect)]
#[reflect(Component)]
pub struct Health {
    pub current: u32,
    pub max: u32,
}

impl Default for Health {
    fn default() -> Self {
        Self::new(100)
    }
}

impl Health {
    pub fn new(max: u32) -> Self {
        Self { current: max, max }
    }

    pub fn is_alive(&self) -> bool {
        self.current > 0
    }

    pub fn take_damage(&mut self, amount: u32) {
        self.current = self.current.saturating_sub(amount);
    }

    pub fn heal(&mut self, amount: u32) {
        self.current = self.current.saturating_add(amount).min(self.max);
    }
}

/// Event: DOT тик нанёс урон
#[derive(Event, Debug, Clone)]
pub struct DamageDealt {
    pub source: Option<Entity>,
    pub target: Entity,
    pub damage: u32,
    pub remaining: u32,
}

//! Effect service: активные модификаторы и gameplay tags
//!
//! Архитектура:
//! - `ActiveEffects` (Resource): slot table с generational `EffectHandle`
//! - Stale handle → `remove_effect` возвращает false, ничего не делает
//! - Периодические эффекты (drain, regen, DOT) копят время в `advance`,
//!   executions применяет `tick_effects` (только authority)
//! - Tags (Cooldown, Burning, Boosting) выводятся из активных эффектов
//!
//! Abilities и zones видят сервис только через trait `EffectService`.

use bevy::ecs::entity::Entities;
use bevy::prelude::*;

use crate::abilities::AbilityKind;
use crate::attributes::VehicleAttributes;
use crate::components::{DamageDealt, Health};
use crate::net::NetRole;

#[cfg(test)]
mod effects_tests;

/// Opaque ссылка на применённый эффект
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectHandle {
    index: u32,
    generation: u32,
}

/// Маркеры, которые эффект выдаёт своей цели
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameplayTag {
    Cooldown(AbilityKind),
    Burning,
    Boosting,
}

/// Шаблон эффекта (что применять)
#[derive(Debug, Clone, PartialEq)]
pub enum EffectTemplate {
    /// Infinite, выдаёт `Boosting`. Torque пушит сама ability.
    TorqueMultiplier { multiplier: f32 },
    /// Infinite periodic: −per_second·period energy каждые period сек
    EnergyDrain { per_second: f32, period: f32 },
    /// Infinite periodic: +amount energy, без execute на application
    EnergyRegen { amount: f32, period: f32 },
    /// Timed marker `Cooldown(ability)`
    Cooldown { ability: AbilityKind, duration: f32 },
    /// Infinite periodic damage, выдаёт `Burning`
    DamageOverTime {
        damage_per_tick: u32,
        period: f32,
        execute_on_application: bool,
    },
}

impl EffectTemplate {
    pub fn granted_tag(&self) -> Option<GameplayTag> {
        match self {
            EffectTemplate::TorqueMultiplier { .. } => Some(GameplayTag::Boosting),
            EffectTemplate::Cooldown { ability, .. } => Some(GameplayTag::Cooldown(*ability)),
            EffectTemplate::DamageOverTime { .. } => Some(GameplayTag::Burning),
            EffectTemplate::EnergyDrain { .. } | EffectTemplate::EnergyRegen { .. } => None,
        }
    }

    fn period(&self) -> Option<f32> {
        match self {
            EffectTemplate::EnergyDrain { period, .. }
            | EffectTemplate::EnergyRegen { period, .. }
            | EffectTemplate::DamageOverTime { period, .. } => Some(*period),
            EffectTemplate::TorqueMultiplier { .. } | EffectTemplate::Cooldown { .. } => None,
        }
    }

    fn duration(&self) -> Option<f32> {
        match self {
            EffectTemplate::Cooldown { duration, .. } => Some(*duration),
            _ => None,
        }
    }

    fn executes_on_application(&self) -> bool {
        matches!(
            self,
            EffectTemplate::DamageOverTime {
                execute_on_application: true,
                ..
            }
        )
    }

    fn is_valid(&self) -> bool {
        match self.period() {
            Some(period) => period.is_finite() && period > 0.0,
            None => true,
        }
    }
}

/// Кто применил эффект (source = zone/ability owner, instigator = машина)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EffectContext {
    pub source: Option<Entity>,
    pub instigator: Option<Entity>,
}

impl EffectContext {
    pub fn from_source(source: Entity, instigator: Option<Entity>) -> Self {
        Self {
            source: Some(source),
            instigator,
        }
    }
}

/// Контракт effect-application сервиса
pub trait EffectService {
    /// None = эффект не применён (невалидный шаблон, level ≤ 0)
    fn apply_effect(
        &mut self,
        target: Entity,
        template: &EffectTemplate,
        level: f32,
        context: EffectContext,
    ) -> Option<EffectHandle>;

    /// false = handle уже невалиден (no-op)
    fn remove_effect(&mut self, handle: EffectHandle) -> bool;

    fn has_tag(&self, target: Entity, tag: GameplayTag) -> bool;
}

/// Что сделать с целью при срабатывании периода
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExecutionKind {
    Energy(f32),
    Damage(u32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodicExecution {
    pub handle: EffectHandle,
    pub target: Entity,
    pub context: EffectContext,
    pub kind: ExecutionKind,
}

#[derive(Debug, Clone)]
struct ActiveEffect {
    target: Entity,
    template: EffectTemplate,
    level: f32,
    context: EffectContext,
    remaining: Option<f32>,
    period_elapsed: f32,
}

impl ActiveEffect {
    fn execution(&self) -> Option<ExecutionKind> {
        match &self.template {
            EffectTemplate::EnergyDrain { per_second, period } => {
                Some(ExecutionKind::Energy(-per_second * period * self.level))
            }
            EffectTemplate::EnergyRegen { amount, .. } => Some(ExecutionKind::Energy(amount * self.level)),
            EffectTemplate::DamageOverTime { damage_per_tick, .. } => {
                let damage = (*damage_per_tick as f32 * self.level).round().max(0.0) as u32;
                Some(ExecutionKind::Damage(damage))
            }
            EffectTemplate::TorqueMultiplier { .. } | EffectTemplate::Cooldown { .. } => None,
        }
    }
}

#[derive(Debug, Default)]
struct EffectSlot {
    generation: u32,
    effect: Option<ActiveEffect>,
}

/// Все активные эффекты мира (одна таблица на side)
#[derive(Resource, Debug, Default)]
pub struct ActiveEffects {
    slots: Vec<EffectSlot>,
    free: Vec<u32>,
    pending: Vec<PeriodicExecution>,
}

impl ActiveEffects {
    pub fn is_active(&self, handle: EffectHandle) -> bool {
        self.slot(handle).is_some()
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.effect.is_some()).count()
    }

    pub fn count_for(&self, target: Entity) -> usize {
        self.slots
            .iter()
            .filter_map(|slot| slot.effect.as_ref())
            .filter(|effect| effect.target == target)
            .count()
    }

    /// Оставшееся время timed эффекта (None = infinite или stale)
    pub fn remaining(&self, handle: EffectHandle) -> Option<f32> {
        self.slot(handle).and_then(|effect| effect.remaining)
    }

    fn slot(&self, handle: EffectHandle) -> Option<&ActiveEffect> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.effect.as_ref()
    }

    fn release_slot(&mut self, index: u32) {
        if let Some(slot) = self.slots.get_mut(index as usize) {
            slot.effect = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index);
        }
    }

    /// Продвигает таймеры на dt.
    ///
    /// Возвращает executions (application + периодические) в порядке slot'ов.
    /// Истёкшие timed эффекты удаляются.
    pub fn advance(&mut self, dt: f32) -> Vec<PeriodicExecution> {
        let mut executions = std::mem::take(&mut self.pending);
        let mut expired = Vec::new();

        for (index, slot) in self.slots.iter_mut().enumerate() {
            let generation = slot.generation;
            let Some(effect) = slot.effect.as_mut() else {
                continue;
            };

            if let Some(period) = effect.template.period() {
                effect.period_elapsed += dt;
                while effect.period_elapsed >= period {
                    effect.period_elapsed -= period;
                    if let Some(kind) = effect.execution() {
                        executions.push(PeriodicExecution {
                            handle: EffectHandle {
                                index: index as u32,
                                generation,
                            },
                            target: effect.target,
                            context: effect.context,
                            kind,
                        });
                    }
                }
            }

            if let Some(remaining) = effect.remaining.as_mut() {
                *remaining -= dt;
                if *remaining <= 0.0 {
                    expired.push(index as u32);
                }
            }
        }

        for index in expired {
            self.release_slot(index);
        }

        executions
    }

    /// Удаляет эффекты целей, которых больше нет в мире
    pub fn purge_targets(&mut self, mut is_alive: impl FnMut(Entity) -> bool) -> usize {
        let dead: Vec<u32> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.effect
                    .as_ref()
                    .filter(|effect| !is_alive(effect.target))
                    .map(|_| index as u32)
            })
            .collect();

        let count = dead.len();
        for index in dead {
            self.release_slot(index);
        }
        self.pending.retain(|execution| is_alive(execution.target));
        count
    }
}

impl EffectService for ActiveEffects {
    fn apply_effect(
        &mut self,
        target: Entity,
        template: &EffectTemplate,
        level: f32,
        context: EffectContext,
    ) -> Option<EffectHandle> {
        if !template.is_valid() || !(level > 0.0) {
            return None;
        }

        let effect = ActiveEffect {
            target,
            template: template.clone(),
            level,
            context,
            remaining: template.duration(),
            period_elapsed: 0.0,
        };
        let immediate = if template.executes_on_application() {
            effect.execution()
        } else {
            None
        };

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(EffectSlot::default());
                (self.slots.len() - 1) as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.effect = Some(effect);
        let handle = EffectHandle {
            index,
            generation: slot.generation,
        };

        if let Some(kind) = immediate {
            self.pending.push(PeriodicExecution {
                handle,
                target,
                context,
                kind,
            });
        }

        Some(handle)
    }

    fn remove_effect(&mut self, handle: EffectHandle) -> bool {
        if !self.is_active(handle) {
            return false;
        }
        self.release_slot(handle.index);
        self.pending.retain(|execution| execution.handle != handle);
        true
    }

    fn has_tag(&self, target: Entity, tag: GameplayTag) -> bool {
        self.slots
            .iter()
            .filter_map(|slot| slot.effect.as_ref())
            .any(|effect| effect.target == target && effect.template.granted_tag() == Some(tag))
    }
}

/// System: продвигает эффекты, применяет executions
///
/// Executions меняют energy/health: только authority.
/// Клиент двигает таймеры (cooldown markers истекают локально), executions выбрасывает.
pub fn tick_effects(
    time: Res<Time>,
    role: Res<NetRole>,
    mut effects: ResMut<ActiveEffects>,
    mut attributes: Query<&mut VehicleAttributes>,
    mut health: Query<&mut Health>,
    mut damage_events: EventWriter<DamageDealt>,
) {
    let executions = effects.advance(time.delta_secs());
    if !role.is_authority() {
        return;
    }

    for execution in executions {
        match execution.kind {
            ExecutionKind::Energy(delta) => {
                if let Ok(mut attributes) = attributes.get_mut(execution.target) {
                    attributes.add_energy(delta);
                }
            }
            ExecutionKind::Damage(damage) => {
                let Ok(mut health) = health.get_mut(execution.target) else {
                    continue;
                };
                health.take_damage(damage);
                damage_events.write(DamageDealt {
                    source: execution.context.instigator.or(execution.context.source),
                    target: execution.target,
                    damage,
                    remaining: health.current,
                });
            }
        }
    }
}

/// System: эффекты на despawned целях удаляются
pub fn purge_orphaned_effects(entities: &Entities, mut effects: ResMut<ActiveEffects>) {
    let purged = effects.purge_targets(|entity| entities.contains(entity));
    if purged > 0 {
        crate::log_warning(&format!("🧹 Purged {} effects on despawned targets", purged));
    }
}

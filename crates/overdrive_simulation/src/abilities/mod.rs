//! Abilities машины: TorqueBoost, Trail, Blink, Impulse
//!
//! Архитектура:
//! - Closed enum `Ability` (одна state machine на вариант), uniform activate/tick/end
//! - `AbilityContext`: всё, что ability может трогать за один вызов
//! - Periodic логика через `TaskScheduler` (fire-and-requeue, cancel по token)
//! - Побочные эффекты вне машины (zones, impulse, сеть, cues): через `AbilityOutput`,
//!   их разворачивает dispatcher после вызова
//!
//! Authority правило: energy и torque меняет только authority. Клиент входит
//! в Active сразу (prediction), commit cooldown marker локально, но не тратит energy.

use bevy::prelude::*;
use bevy_rapier3d::prelude::{Sleeping, Velocity};
use serde::{Deserialize, Serialize};

use crate::attributes::VehicleAttributes;
use crate::components::{Drivetrain, VehicleId};
use crate::config::AbilityTuning;
use crate::effects::{EffectContext, EffectHandle, EffectService, EffectTemplate, GameplayTag};
use crate::net::{Envelope, NetRole};
use crate::physics::CollisionQuery;
use crate::scheduler::{TaskScheduler, TaskToken};
use crate::zone::SpawnZoneRequest;

pub mod blink;
pub mod error;
pub mod impulse;
pub mod systems;
pub mod torque_boost;
pub mod trail;

pub use blink::{BlinkState, PendingTeleport, TeleportOutcome};
pub use error::{ActivationError, TeleportRejection};
pub use impulse::{compute_impulse, ImpulseBurst, ImpulseState};
pub use systems::{AbilityServices, VehicleAbilityQuery};
pub use torque_boost::TorqueBoostState;
pub use trail::TrailState;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Reflect)]
pub enum AbilityKind {
    TorqueBoost,
    Trail,
    Blink,
    Impulse,
}

impl AbilityKind {
    pub const ALL: [AbilityKind; 4] = [
        AbilityKind::TorqueBoost,
        AbilityKind::Trail,
        AbilityKind::Blink,
        AbilityKind::Impulse,
    ];

    /// Input binding ID → ability (неизвестный ID игнорируется)
    pub fn from_input_id(input_id: u8) -> Option<Self> {
        match input_id {
            1 => Some(AbilityKind::TorqueBoost),
            2 => Some(AbilityKind::Impulse),
            3 => Some(AbilityKind::Blink),
            4 => Some(AbilityKind::Trail),
            _ => None,
        }
    }

    pub fn input_id(self) -> u8 {
        match self {
            AbilityKind::TorqueBoost => 1,
            AbilityKind::Impulse => 2,
            AbilityKind::Blink => 3,
            AbilityKind::Trail => 4,
        }
    }

    /// Held abilities живут до release; instant заканчиваются в activate
    pub fn is_held(self) -> bool {
        matches!(self, AbilityKind::TorqueBoost | AbilityKind::Trail)
    }

    fn slot(self) -> usize {
        match self {
            AbilityKind::TorqueBoost => 0,
            AbilityKind::Trail => 1,
            AbilityKind::Blink => 2,
            AbilityKind::Impulse => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect)]
pub enum ActivationState {
    #[default]
    Inactive,
    Active,
    CoolingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    InputReleased,
    Exhausted,
    /// Отмена снаружи (authority прислал AbilityEnded)
    Cancelled,
    /// Instant ability отработала
    Completed,
    /// Authority отказал в remote активации
    Refused,
    Teardown,
}

impl EndReason {
    /// Клиенту надо узнать об этом end (он сам его не вызвал)
    pub fn notifies_clients(self) -> bool {
        matches!(self, EndReason::Exhausted | EndReason::Refused | EndReason::Cancelled)
    }
}

/// Presentation cue (VFX/SFX слой вне симуляции)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CueKind {
    BlinkDeparture { origin: Vec3 },
    BlinkArrival { destination: Vec3 },
    Shockwave { origin: Vec3 },
}

/// Event: cue для presentation слоя
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct AbilityCue {
    pub vehicle: Entity,
    pub cue: CueKind,
}

/// Event: ability закончилась (единственное, что видит host)
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct AbilityEnded {
    pub vehicle: Entity,
    pub ability: AbilityKind,
    pub reason: EndReason,
}

/// Откуда пришёл Press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOrigin {
    /// Локальный input (клиент предсказывает, authority-host исполняет)
    Local,
    /// AbilityInput от клиента (только authority)
    Remote,
}

/// Event: команда ability dispatcher'у
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub enum AbilityCommand {
    Press {
        vehicle: Entity,
        ability: AbilityKind,
        origin: InputOrigin,
    },
    Release {
        vehicle: Entity,
        ability: AbilityKind,
        origin: InputOrigin,
    },
    ForceEnd {
        vehicle: Entity,
        ability: AbilityKind,
    },
    /// Authority: клиентский TeleportRequest
    AuthorizeTeleport {
        vehicle: Entity,
        seq: u32,
        destination: Vec3,
        linear_velocity: Vec3,
        angular_velocity: Vec3,
    },
    /// Клиент: ответ authority на TeleportRequest
    ReconcileTeleport {
        vehicle: Entity,
        seq: u32,
        outcome: TeleportOutcome,
    },
}

/// Что ability хочет сделать за пределами своей машины
#[derive(Debug, Clone, PartialEq)]
pub enum AbilityOutput {
    SpawnZone(SpawnZoneRequest),
    ImpulseBurst(ImpulseBurst),
    Send(Envelope),
    Cue(CueKind),
    Ended { ability: AbilityKind, reason: EndReason },
}

/// Всё, что доступно ability за один вызов
pub struct AbilityContext<'a> {
    pub vehicle: Entity,
    pub vehicle_id: VehicleId,
    pub role: NetRole,
    pub tuning: &'a AbilityTuning,
    pub attributes: &'a mut VehicleAttributes,
    pub drivetrain: &'a mut Drivetrain,
    pub transform: &'a mut Transform,
    pub velocity: Option<&'a mut Velocity>,
    pub sleeping: Option<&'a mut Sleeping>,
    pub effects: &'a mut dyn EffectService,
    pub scheduler: &'a mut TaskScheduler,
    pub collision: &'a dyn CollisionQuery,
    pub outputs: &'a mut Vec<AbilityOutput>,
}

impl AbilityContext<'_> {
    pub fn is_authority(&self) -> bool {
        self.role.is_authority()
    }

    pub fn on_cooldown(&self, ability: AbilityKind) -> bool {
        self.effects.has_tag(self.vehicle, GameplayTag::Cooldown(ability))
    }

    /// Gate: нет cooldown marker
    pub fn check_cooldown(&self, ability: AbilityKind) -> Result<(), ActivationError> {
        if self.on_cooldown(ability) {
            return Err(ActivationError::OnCooldown(ability));
        }
        Ok(())
    }

    /// Gate: energy ≥ required
    pub fn check_energy(&self, required: f32) -> Result<(), ActivationError> {
        let available = self.attributes.energy();
        if available < required {
            return Err(ActivationError::InsufficientEnergy { required, available });
        }
        Ok(())
    }

    /// Commit: cooldown marker (обе стороны) + списание energy (authority).
    ///
    /// Возвращает handle cooldown marker'а (если он был применён).
    pub fn commit(&mut self, ability: AbilityKind, cost: f32, cooldown: f32) -> Option<EffectHandle> {
        let marker = if cooldown > 0.0 {
            let template = EffectTemplate::Cooldown {
                ability,
                duration: cooldown,
            };
            let context = EffectContext::from_source(self.vehicle, Some(self.vehicle));
            self.effects.apply_effect(self.vehicle, &template, 1.0, context)
        } else {
            None
        };
        if cost > 0.0 && self.is_authority() {
            self.attributes.add_energy(-cost);
        }
        marker
    }

    pub fn emit(&mut self, output: AbilityOutput) {
        self.outputs.push(output);
    }

    fn state_after_end(&self, ability: AbilityKind) -> ActivationState {
        if self.on_cooldown(ability) {
            ActivationState::CoolingDown
        } else {
            ActivationState::Inactive
        }
    }

    fn finish(&mut self, ability: AbilityKind, reason: EndReason) -> ActivationState {
        self.emit(AbilityOutput::Ended { ability, reason });
        self.state_after_end(ability)
    }
}

/// Одна ability машины (closed variant set)
#[derive(Debug, Clone, PartialEq)]
pub enum Ability {
    TorqueBoost(TorqueBoostState),
    Trail(TrailState),
    Blink(BlinkState),
    Impulse(ImpulseState),
}

impl Ability {
    pub fn new(kind: AbilityKind) -> Self {
        match kind {
            AbilityKind::TorqueBoost => Ability::TorqueBoost(TorqueBoostState::default()),
            AbilityKind::Trail => Ability::Trail(TrailState::default()),
            AbilityKind::Blink => Ability::Blink(BlinkState::default()),
            AbilityKind::Impulse => Ability::Impulse(ImpulseState::default()),
        }
    }

    pub fn kind(&self) -> AbilityKind {
        match self {
            Ability::TorqueBoost(_) => AbilityKind::TorqueBoost,
            Ability::Trail(_) => AbilityKind::Trail,
            Ability::Blink(_) => AbilityKind::Blink,
            Ability::Impulse(_) => AbilityKind::Impulse,
        }
    }

    pub fn state(&self) -> ActivationState {
        match self {
            Ability::TorqueBoost(state) => state.activation,
            Ability::Trail(state) => state.activation,
            Ability::Blink(state) => state.activation,
            Ability::Impulse(state) => state.activation,
        }
    }

    fn state_mut(&mut self) -> &mut ActivationState {
        match self {
            Ability::TorqueBoost(state) => &mut state.activation,
            Ability::Trail(state) => &mut state.activation,
            Ability::Blink(state) => &mut state.activation,
            Ability::Impulse(state) => &mut state.activation,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == ActivationState::Active
    }

    pub fn activate(&mut self, ctx: &mut AbilityContext) -> Result<(), ActivationError> {
        if self.is_active() {
            return Err(ActivationError::AlreadyActive(self.kind()));
        }
        match self {
            Ability::TorqueBoost(state) => state.activate(ctx),
            Ability::Trail(state) => state.activate(ctx),
            Ability::Blink(state) => state.activate(ctx),
            Ability::Impulse(state) => state.activate(ctx),
        }
    }

    /// Periodic tick; чужой/stale token игнорируется
    pub fn tick(&mut self, ctx: &mut AbilityContext, token: TaskToken) {
        match self {
            Ability::TorqueBoost(state) => state.tick(ctx, token),
            Ability::Trail(state) => state.tick(ctx, token),
            Ability::Blink(_) | Ability::Impulse(_) => {}
        }
    }

    /// Idempotent: true только если ability реально была Active
    pub fn end(&mut self, ctx: &mut AbilityContext, reason: EndReason) -> bool {
        match self {
            Ability::TorqueBoost(state) => state.end(ctx, reason),
            Ability::Trail(state) => state.end(ctx, reason),
            // Instant: Active только внутри activate
            Ability::Blink(_) | Ability::Impulse(_) => false,
        }
    }

    /// Actor teardown: отпустить handles/tokens без побочных эффектов на машину
    pub fn teardown(&mut self, effects: &mut dyn EffectService, scheduler: &mut TaskScheduler) -> bool {
        let released = match self {
            Ability::TorqueBoost(state) => state.release(effects, scheduler),
            Ability::Trail(state) => state.release(scheduler),
            Ability::Blink(state) => {
                state.pending.clear();
                false
            }
            Ability::Impulse(_) => false,
        };
        *self.state_mut() = ActivationState::Inactive;
        released
    }

    /// CoolingDown → Inactive когда marker истёк
    pub fn refresh_cooldown(&mut self, vehicle: Entity, effects: &dyn EffectService) {
        let kind = self.kind();
        let state = self.state_mut();
        if *state == ActivationState::CoolingDown && !effects.has_tag(vehicle, GameplayTag::Cooldown(kind)) {
            *state = ActivationState::Inactive;
        }
    }
}

/// Все четыре ability машины
#[derive(Component, Debug, Clone, PartialEq)]
pub struct VehicleAbilities {
    slots: [Ability; 4],
}

impl Default for VehicleAbilities {
    fn default() -> Self {
        Self {
            slots: AbilityKind::ALL.map(Ability::new),
        }
    }
}

impl VehicleAbilities {
    pub fn get(&self, kind: AbilityKind) -> &Ability {
        &self.slots[kind.slot()]
    }

    pub fn get_mut(&mut self, kind: AbilityKind) -> &mut Ability {
        &mut self.slots[kind.slot()]
    }

    pub fn state(&self, kind: AbilityKind) -> ActivationState {
        self.get(kind).state()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Ability> {
        self.slots.iter_mut()
    }

    pub fn blink(&self) -> Option<&BlinkState> {
        match self.get(AbilityKind::Blink) {
            Ability::Blink(state) => Some(state),
            _ => None,
        }
    }
}

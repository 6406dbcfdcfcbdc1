//! TorqueBoost: held ability, multiplier на engine torque + drain energy
//!
//! Activate (energy ≥ min_activate) → Boosting effect; authority пушит
//! multiplier в drivetrain, вешает drain и periodic check.
//! Check: energy ≤ 0 → end(Exhausted).
//! End: снять оба handle, вернуть base torque (authority), отменить check.

use crate::effects::{EffectContext, EffectHandle, EffectService, EffectTemplate};
use crate::scheduler::{TaskScheduler, TaskToken};

use super::{AbilityContext, AbilityKind, ActivationError, ActivationState, EndReason};

const KIND: AbilityKind = AbilityKind::TorqueBoost;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TorqueBoostState {
    pub activation: ActivationState,
    boost_handle: Option<EffectHandle>,
    drain_handle: Option<EffectHandle>,
    check_task: Option<TaskToken>,
}

impl TorqueBoostState {
    pub fn holds_resources(&self) -> bool {
        self.boost_handle.is_some() || self.drain_handle.is_some() || self.check_task.is_some()
    }

    pub(super) fn activate(&mut self, ctx: &mut AbilityContext) -> Result<(), ActivationError> {
        let tuning = ctx.tuning.torque_boost.clone();
        ctx.check_cooldown(KIND)?;
        ctx.check_energy(tuning.min_activate)?;

        self.activation = ActivationState::Active;

        let context = EffectContext::from_source(ctx.vehicle, Some(ctx.vehicle));
        self.boost_handle = ctx.effects.apply_effect(
            ctx.vehicle,
            &EffectTemplate::TorqueMultiplier {
                multiplier: tuning.multiplier,
            },
            1.0,
            context,
        );

        if ctx.is_authority() {
            ctx.attributes
                .set_torque_multiplier(tuning.multiplier, true, &mut *ctx.drivetrain);

            if tuning.drain_per_second > 0.0 {
                self.drain_handle = ctx.effects.apply_effect(
                    ctx.vehicle,
                    &EffectTemplate::EnergyDrain {
                        per_second: tuning.drain_per_second,
                        period: tuning.check_interval,
                    },
                    1.0,
                    context,
                );
            }

            self.check_task = Some(ctx.scheduler.schedule_repeating(ctx.vehicle, KIND, tuning.check_interval));
        }

        crate::log_info(&format!(
            "🚀 {} TorqueBoost ×{} (torque {:.0})",
            ctx.vehicle_id, tuning.multiplier, ctx.drivetrain.max_torque
        ));
        Ok(())
    }

    pub(super) fn tick(&mut self, ctx: &mut AbilityContext, token: TaskToken) {
        if self.check_task != Some(token) || self.activation != ActivationState::Active {
            return;
        }
        if ctx.attributes.energy() <= 0.0 {
            self.end(ctx, EndReason::Exhausted);
        }
    }

    pub(super) fn end(&mut self, ctx: &mut AbilityContext, reason: EndReason) -> bool {
        if self.activation != ActivationState::Active {
            return false;
        }

        self.release(&mut *ctx.effects, &mut *ctx.scheduler);

        if ctx.is_authority() {
            ctx.attributes.set_torque_multiplier(1.0, true, &mut *ctx.drivetrain);
            // Multiplier мог уже быть 1.0 (ничего не запушено): base всё равно
            crate::components::TorqueHost::restore_base_torque(&mut *ctx.drivetrain);
        }

        self.activation = ctx.finish(KIND, reason);
        crate::log_info(&format!(
            "🛑 {} TorqueBoost ended ({:?}), torque {:.0}",
            ctx.vehicle_id, reason, ctx.drivetrain.max_torque
        ));
        true
    }

    /// Снимает handles и task. Каждый ресурс отпускается ровно один раз.
    pub(super) fn release(&mut self, effects: &mut dyn EffectService, scheduler: &mut TaskScheduler) -> bool {
        let mut released = false;
        if let Some(handle) = self.boost_handle.take() {
            effects.remove_effect(handle);
            released = true;
        }
        if let Some(handle) = self.drain_handle.take() {
            effects.remove_effect(handle);
            released = true;
        }
        if let Some(token) = self.check_task.take() {
            scheduler.cancel(token);
            released = true;
        }
        released
    }
}

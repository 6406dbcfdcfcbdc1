//! Trail: held ability, каждые spawn_interval оставляет fire zone сзади
//!
//! Activate → cycle сразу, потом periodic timer.
//! Cycle: energy < cost → end(Exhausted) без spawn; иначе authority списывает
//! cost и спавнит zone с rear offset. Zones живут сами по себе.

use bevy::prelude::*;

use crate::scheduler::{TaskScheduler, TaskToken};
use crate::zone::SpawnZoneRequest;

use super::{AbilityContext, AbilityKind, AbilityOutput, ActivationError, ActivationState, EndReason};

const KIND: AbilityKind = AbilityKind::Trail;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrailState {
    pub activation: ActivationState,
    spawn_task: Option<TaskToken>,
    /// Сколько zones заспавнено в текущей активации
    pub spawned: u32,
}

impl TrailState {
    pub fn has_timer(&self) -> bool {
        self.spawn_task.is_some()
    }

    pub(super) fn activate(&mut self, ctx: &mut AbilityContext) -> Result<(), ActivationError> {
        let tuning = ctx.tuning.trail.clone();
        ctx.check_cooldown(KIND)?;
        ctx.check_energy(tuning.min_activate)?;

        self.activation = ActivationState::Active;
        self.spawned = 0;
        ctx.commit(KIND, 0.0, tuning.cooldown);
        crate::log_info(&format!("🔥 {} Trail started", ctx.vehicle_id));

        self.spawn_cycle(ctx);

        // Cycle мог сразу исчерпать energy
        if self.activation == ActivationState::Active {
            self.spawn_task = Some(ctx.scheduler.schedule_repeating(ctx.vehicle, KIND, tuning.spawn_interval));
        }
        Ok(())
    }

    pub(super) fn tick(&mut self, ctx: &mut AbilityContext, token: TaskToken) {
        if self.spawn_task != Some(token) || self.activation != ActivationState::Active {
            return;
        }
        self.spawn_cycle(ctx);
    }

    fn spawn_cycle(&mut self, ctx: &mut AbilityContext) {
        let cost = ctx.tuning.trail.cost_per_spawn;
        if ctx.attributes.energy() < cost {
            self.end(ctx, EndReason::Exhausted);
            return;
        }

        if !ctx.is_authority() {
            return;
        }

        ctx.attributes.add_energy(-cost);
        let offset = Vec3::from_array(ctx.tuning.trail.rear_offset);
        let position = ctx.transform.translation + ctx.transform.rotation * offset;
        ctx.emit(AbilityOutput::SpawnZone(SpawnZoneRequest {
            spawner: ctx.vehicle,
            position,
            rotation: ctx.transform.rotation,
        }));
        self.spawned += 1;
    }

    pub(super) fn end(&mut self, ctx: &mut AbilityContext, reason: EndReason) -> bool {
        if self.activation != ActivationState::Active {
            return false;
        }

        self.release(&mut *ctx.scheduler);
        self.activation = ctx.finish(KIND, reason);
        crate::log_info(&format!(
            "🛑 {} Trail ended ({:?}) after {} zones",
            ctx.vehicle_id, reason, self.spawned
        ));
        true
    }

    pub(super) fn release(&mut self, scheduler: &mut TaskScheduler) -> bool {
        match self.spawn_task.take() {
            Some(token) => {
                scheduler.cancel(token);
                true
            }
            None => false,
        }
    }
}

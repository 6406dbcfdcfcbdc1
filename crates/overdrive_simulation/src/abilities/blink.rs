//! Blink: мгновенный телепорт на blink.distance с обходом препятствий
//!
//! Поток:
//! 1. Gate (energy ≥ cost, нет cooldown)
//! 2. Захват linear/angular velocity
//! 3. Направление: velocity (если быстрее min_velocity) иначе forward
//! 4. Ray cast origin → ideal endpoint; hit → отступ на clearance
//!    (или binary search box-overlap)
//! 5. Смещение < min_travel → отмена. Destination проверяется ДО commit,
//!    поэтому отмена ничего не стоит.
//! 6. Commit, cue на origin, телепорт
//!
//! Authority телепортирует сам и шлёт TeleportCue. Клиент предсказывает
//! телепорт локально, шлёт TeleportRequest и держит pending очередь до
//! TeleportConfirmed/TeleportRejected (last-confirmed-wins).

use bevy::prelude::*;

use crate::config::{BlinkTuning, ClearanceStrategy};
use crate::effects::EffectHandle;
use crate::net::{Envelope, NetMessage};
use crate::physics::CollisionQuery;

use super::{AbilityContext, AbilityKind, AbilityOutput, ActivationError, ActivationState, CueKind, EndReason, TeleportRejection};

const KIND: AbilityKind = AbilityKind::Blink;

/// Предсказанный телепорт, ждущий ответа authority
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingTeleport {
    pub seq: u32,
    pub origin: Vec3,
    pub destination: Vec3,
    /// Локальный cooldown marker; снимается если authority отказал
    pub cooldown: Option<EffectHandle>,
}

/// Ответ authority на TeleportRequest
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TeleportOutcome {
    Confirmed {
        destination: Vec3,
    },
    Rejected {
        position: Vec3,
        linear_velocity: Vec3,
        angular_velocity: Vec3,
        reason: TeleportRejection,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlinkState {
    pub activation: ActivationState,
    pub pending: Vec<PendingTeleport>,
    next_seq: u32,
    last_confirmed: Option<u32>,
}

/// Направление blink: velocity если машина едет быстрее порога, иначе forward
pub fn blink_direction(linear_velocity: Vec3, forward: Vec3, tuning: &BlinkTuning) -> Vec3 {
    if tuning.use_velocity_direction && linear_velocity.length() > tuning.min_velocity {
        linear_velocity.normalize()
    } else {
        forward.normalize_or_zero()
    }
}

/// Безопасная точка по направлению (ray cast + clearance strategy)
pub fn resolve_destination(
    origin: Vec3,
    direction: Vec3,
    tuning: &BlinkTuning,
    collision: &dyn CollisionQuery,
    ignore: Entity,
) -> Vec3 {
    let ideal = origin + direction * tuning.distance;
    let Some(hit) = collision.cast_ray(origin, ideal, Some(ignore)) else {
        return ideal;
    };

    match tuning.strategy {
        // Hit ближе clearance → остаёмся на origin (дальше отмена по min_travel)
        ClearanceStrategy::RetreatAlongRay => origin + direction * (hit.distance - tuning.clearance).max(0.0),
        ClearanceStrategy::BinarySearch => find_valid_location(
            origin,
            hit.point,
            tuning.half_extents() + Vec3::splat(tuning.clearance),
            tuning.max_search_steps,
            collision,
            ignore,
        ),
    }
}

/// Бинарный поиск между last-valid (origin) и blocked точкой.
/// Midpoint проверяется box overlap'ом размером с машину + clearance.
pub fn find_valid_location(
    origin: Vec3,
    blocked: Vec3,
    half_extents: Vec3,
    max_steps: u32,
    collision: &dyn CollisionQuery,
    ignore: Entity,
) -> Vec3 {
    let mut valid = origin;
    let mut invalid = blocked;

    for _ in 0..max_steps {
        let mid = (valid + invalid) * 0.5;
        if collision.overlap_blocking(mid, half_extents, Some(ignore)) {
            invalid = mid;
        } else {
            valid = mid;
        }
    }

    valid
}

impl BlinkState {
    pub fn last_confirmed(&self) -> Option<u32> {
        self.last_confirmed
    }

    pub(super) fn activate(&mut self, ctx: &mut AbilityContext) -> Result<(), ActivationError> {
        let tuning = ctx.tuning.blink.clone();
        ctx.check_cooldown(KIND)?;
        ctx.check_energy(tuning.cost)?;

        let (linear_velocity, angular_velocity) = match ctx.velocity.as_deref() {
            Some(velocity) => (velocity.linvel, velocity.angvel),
            None => return Err(ActivationError::MissingComponent("Velocity")),
        };

        let origin = ctx.transform.translation;
        let forward = ctx.transform.forward().as_vec3();
        let direction = blink_direction(linear_velocity, forward, &tuning);
        let destination = resolve_destination(origin, direction, &tuning, ctx.collision, ctx.vehicle);

        let travelled = origin.distance(destination);
        if travelled < tuning.min_travel {
            return Err(ActivationError::NoSafeDestination {
                travelled,
                minimum: tuning.min_travel,
            });
        }

        self.activation = ActivationState::Active;
        let cooldown = ctx.commit(KIND, tuning.cost, tuning.cooldown);
        ctx.emit(AbilityOutput::Cue(CueKind::BlinkDeparture { origin }));

        if ctx.is_authority() {
            execute_teleport(ctx, destination, linear_velocity, angular_velocity);
        } else {
            // Prediction: двигаемся сразу, authority подтвердит
            teleport_vehicle(ctx, destination, linear_velocity, angular_velocity);
            let seq = self.next_seq;
            self.next_seq = self.next_seq.wrapping_add(1);
            self.pending.push(PendingTeleport {
                seq,
                origin,
                destination,
                cooldown,
            });
            ctx.emit(AbilityOutput::Send(Envelope::reliable(NetMessage::TeleportRequest {
                vehicle: ctx.vehicle_id,
                seq,
                destination: destination.to_array(),
                linear_velocity: linear_velocity.to_array(),
                angular_velocity: angular_velocity.to_array(),
            })));
        }

        crate::log_info(&format!(
            "✨ {} Blink {:.1?} → {:.1?} ({:.1}m)",
            ctx.vehicle_id, origin, destination, travelled
        ));
        self.activation = ctx.finish(KIND, EndReason::Completed);
        Ok(())
    }

    /// Authority: проверка и исполнение клиентского TeleportRequest.
    ///
    /// Rejection сразу уходит клиенту с позицией authority.
    pub(super) fn authorize(
        &mut self,
        ctx: &mut AbilityContext,
        seq: u32,
        destination: Vec3,
        linear_velocity: Vec3,
        angular_velocity: Vec3,
    ) -> Result<(), TeleportRejection> {
        let result = self.validate_request(ctx, destination);

        match result {
            Ok(()) => {
                let tuning_cost = ctx.tuning.blink.cost;
                let tuning_cooldown = ctx.tuning.blink.cooldown;
                let origin = ctx.transform.translation;

                self.activation = ActivationState::Active;
                ctx.commit(KIND, tuning_cost, tuning_cooldown);
                ctx.emit(AbilityOutput::Cue(CueKind::BlinkDeparture { origin }));

                execute_teleport(ctx, destination, linear_velocity, angular_velocity);
                ctx.emit(AbilityOutput::Send(Envelope::reliable(NetMessage::TeleportConfirmed {
                    vehicle: ctx.vehicle_id,
                    seq,
                    destination: destination.to_array(),
                })));
                self.activation = ctx.finish(KIND, EndReason::Completed);
            }
            Err(reason) => {
                crate::log_warning(&format!("⛔ {} teleport #{} rejected: {}", ctx.vehicle_id, seq, reason));
                let (linear_velocity, angular_velocity) = ctx
                    .velocity
                    .as_deref()
                    .map(|velocity| (velocity.linvel, velocity.angvel))
                    .unwrap_or_default();
                ctx.emit(AbilityOutput::Send(Envelope::reliable(NetMessage::TeleportRejected {
                    vehicle: ctx.vehicle_id,
                    seq,
                    position: ctx.transform.translation.to_array(),
                    linear_velocity: linear_velocity.to_array(),
                    angular_velocity: angular_velocity.to_array(),
                    reason,
                })));
            }
        }

        result
    }

    fn validate_request(&self, ctx: &AbilityContext, destination: Vec3) -> Result<(), TeleportRejection> {
        let tuning = &ctx.tuning.blink;
        if ctx.on_cooldown(KIND) {
            return Err(TeleportRejection::OnCooldown);
        }
        if !ctx.attributes.can_afford(tuning.cost) {
            return Err(TeleportRejection::InsufficientEnergy);
        }

        let origin = ctx.transform.translation;
        let requested = origin.distance(destination);
        let allowed = tuning.distance + tuning.server_tolerance;
        if requested > allowed {
            return Err(TeleportRejection::TooFar { requested, allowed });
        }

        if ctx.collision.cast_ray(origin, destination, Some(ctx.vehicle)).is_some() {
            return Err(TeleportRejection::Blocked);
        }
        Ok(())
    }

    /// Клиент: ответ authority. Старые/повторные ответы игнорируются.
    ///
    /// Confirm только закрывает pending: предсказание уже применено, и host
    /// мог с тех пор сдвинуть машину. Reject снимает локальный cooldown и
    /// телепортирует обратно к authority (если нет более новых предсказаний).
    pub(super) fn reconcile(&mut self, ctx: &mut AbilityContext, seq: u32, outcome: TeleportOutcome) -> bool {
        if self.last_confirmed.is_some_and(|last| seq <= last) {
            return false;
        }
        self.last_confirmed = Some(seq);
        let answered = self.pending.iter().find(|pending| pending.seq == seq).copied();
        self.pending.retain(|pending| pending.seq > seq);

        let TeleportOutcome::Rejected {
            position,
            linear_velocity,
            angular_velocity,
            reason,
        } = outcome
        else {
            return true;
        };

        if let Some(marker) = answered.and_then(|pending| pending.cooldown) {
            ctx.effects.remove_effect(marker);
        }
        self.activation = ctx.state_after_end(KIND);

        // Более новые предсказания ещё в полёте: их позиция главнее
        if !self.pending.is_empty() {
            return true;
        }

        crate::log_warning(&format!(
            "↩️ {} teleport #{} rejected ({}), snapping back to {:.1?}",
            ctx.vehicle_id, seq, reason, position
        ));
        teleport_vehicle(ctx, position, linear_velocity, angular_velocity);
        true
    }
}

fn teleport_vehicle(ctx: &mut AbilityContext, destination: Vec3, linear_velocity: Vec3, angular_velocity: Vec3) {
    crate::vehicle::perform_teleport(
        &mut *ctx.transform,
        ctx.velocity.as_deref_mut(),
        ctx.sleeping.as_deref_mut(),
        &mut *ctx.drivetrain,
        destination,
        linear_velocity,
        angular_velocity,
    );
}

/// Authority: телепорт, потом (и только потом) broadcast cue
fn execute_teleport(ctx: &mut AbilityContext, destination: Vec3, linear_velocity: Vec3, angular_velocity: Vec3) {
    teleport_vehicle(ctx, destination, linear_velocity, angular_velocity);
    ctx.emit(AbilityOutput::Cue(CueKind::BlinkArrival { destination }));
    ctx.emit(AbilityOutput::Send(Envelope::unreliable(NetMessage::TeleportCue {
        vehicle: ctx.vehicle_id,
        destination: destination.to_array(),
    })));
}

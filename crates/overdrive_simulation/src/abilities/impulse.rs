//! Impulse: радиальная ударная волна вокруг машины
//!
//! Activate: gate, commit (cost + cooldown). Только authority выпускает
//! `ImpulseBurst`; `apply_impulse_bursts` толкает тела в радиусе и
//! уже после этого шлёт ImpulseCue. Клиенты видят результат через обычную
//! репликацию физики.

use bevy::prelude::*;
use bevy_rapier3d::prelude::{Sleeping, Velocity};

use crate::config::{AbilityTuning, ImpulseTuning};
use crate::net::{Envelope, NetMessage, NetOutbox};
use crate::physics::{CollisionQuery, CollisionWorld};
use crate::components::Vehicle;

use super::{AbilityContext, AbilityCue, AbilityKind, AbilityOutput, ActivationError, ActivationState, CueKind, EndReason};

const KIND: AbilityKind = AbilityKind::Impulse;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImpulseState {
    pub activation: ActivationState,
}

/// Event: authority просит толкнуть всё вокруг `origin`
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct ImpulseBurst {
    pub source: Entity,
    pub origin: Vec3,
}

/// Velocity change для тела (None = тело не затронуто)
///
/// Линейный falloff `1 − clamp(d/r, 0, 1)`, плюс вертикальный lift.
/// Mass-independent: результат сразу прибавляется к linvel.
pub fn compute_impulse(origin: Vec3, body_position: Vec3, is_vehicle: bool, tuning: &ImpulseTuning) -> Option<Vec3> {
    if is_vehicle && !tuning.affect_vehicles {
        return None;
    }

    let offset = body_position - origin;
    let distance = offset.length();
    if distance > tuning.radius {
        return None;
    }

    // Тело ровно в эпицентре: толкаем вверх
    let direction = offset.try_normalize().unwrap_or(Vec3::Y);
    let falloff = 1.0 - (distance / tuning.radius).clamp(0.0, 1.0);
    let mut magnitude = tuning.strength * falloff;
    if is_vehicle {
        magnitude *= tuning.vehicle_multiplier;
    }
    if magnitude <= 0.0 {
        return None;
    }

    Some(direction * magnitude + Vec3::Y * magnitude * tuning.lift_fraction)
}

impl ImpulseState {
    pub(super) fn activate(&mut self, ctx: &mut AbilityContext) -> Result<(), ActivationError> {
        let tuning = ctx.tuning.impulse.clone();
        ctx.check_cooldown(KIND)?;
        ctx.check_energy(tuning.cost)?;

        self.activation = ActivationState::Active;
        ctx.commit(KIND, tuning.cost, tuning.cooldown);

        if ctx.is_authority() {
            ctx.emit(AbilityOutput::ImpulseBurst(ImpulseBurst {
                source: ctx.vehicle,
                origin: ctx.transform.translation,
            }));
        }

        crate::log_info(&format!("💥 {} Impulse at {:.1?}", ctx.vehicle_id, ctx.transform.translation));
        self.activation = ctx.finish(KIND, EndReason::Completed);
        Ok(())
    }
}

/// System: ImpulseBurst → velocity change телам в радиусе (authority only)
///
/// Порядок: сначала все тела, потом cue (клиенты не видят cue раньше физики).
pub fn apply_impulse_bursts(
    tuning: Res<AbilityTuning>,
    collision: Res<CollisionWorld>,
    mut bursts: EventReader<ImpulseBurst>,
    mut bodies: Query<(&mut Velocity, Option<&mut Sleeping>)>,
    vehicles: Query<&Vehicle>,
    mut outbox: ResMut<NetOutbox>,
    mut cues: EventWriter<AbilityCue>,
) {
    for burst in bursts.read() {
        let hits = collision.bodies_in_sphere(burst.origin, tuning.impulse.radius, Some(burst.source));
        let mut pushed = 0;

        for hit in hits {
            let Some(delta) = compute_impulse(burst.origin, hit.position, hit.is_vehicle, &tuning.impulse) else {
                continue;
            };
            let Ok((mut velocity, sleeping)) = bodies.get_mut(hit.entity) else {
                continue;
            };
            velocity.linvel += delta;
            if let Some(mut sleeping) = sleeping {
                sleeping.sleeping = false;
            }
            pushed += 1;
        }

        crate::log(&format!("💥 Impulse from {:?} pushed {} bodies", burst.source, pushed));

        cues.write(AbilityCue {
            vehicle: burst.source,
            cue: CueKind::Shockwave { origin: burst.origin },
        });
        if let Ok(vehicle) = vehicles.get(burst.source) {
            outbox.push(Envelope::unreliable(NetMessage::ImpulseCue {
                vehicle: vehicle.id,
                origin: burst.origin.to_array(),
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_matches_offset() {
        let tuning = ImpulseTuning {
            lift_fraction: 0.0,
            ..ImpulseTuning::default()
        };
        let origin = Vec3::new(1.0, 0.0, 1.0);
        let body = Vec3::new(4.0, 0.0, 5.0);

        let impulse = compute_impulse(origin, body, false, &tuning).expect("in radius");
        let expected_dir = (body - origin).normalize();
        assert!((impulse.normalize() - expected_dir).length() < 1e-5);
    }

    #[test]
    fn test_magnitude_falls_off_monotonically() {
        let tuning = ImpulseTuning::default();
        let mut previous = f32::MAX;

        for step in 1..16 {
            let r = step as f32 * 0.5; // 0.5 .. 7.5 < radius
            let impulse = compute_impulse(Vec3::ZERO, Vec3::new(r, 0.0, 0.0), false, &tuning).expect("in radius");
            let magnitude = impulse.length();
            assert!(magnitude < previous, "r = {}", r);
            previous = magnitude;
        }
    }

    #[test]
    fn test_outside_radius_untouched() {
        let tuning = ImpulseTuning::default();
        assert!(compute_impulse(Vec3::ZERO, Vec3::new(8.5, 0.0, 0.0), false, &tuning).is_none());
        // На границе falloff = 0
        assert!(compute_impulse(Vec3::ZERO, Vec3::new(8.0, 0.0, 0.0), false, &tuning).is_none());
    }

    #[test]
    fn test_vehicle_multiplier_and_skip() {
        let tuning = ImpulseTuning::default();
        let body = Vec3::new(4.0, 0.0, 0.0);

        let prop = compute_impulse(Vec3::ZERO, body, false, &tuning).expect("prop");
        let car = compute_impulse(Vec3::ZERO, body, true, &tuning).expect("vehicle");
        assert!((car.length() - prop.length() * 0.5).abs() < 1e-4);

        let no_cars = ImpulseTuning {
            affect_vehicles: false,
            ..ImpulseTuning::default()
        };
        assert!(compute_impulse(Vec3::ZERO, body, true, &no_cars).is_none());
    }

    #[test]
    fn test_lift_is_added() {
        let tuning = ImpulseTuning::default();
        let impulse = compute_impulse(Vec3::ZERO, Vec3::new(4.0, 0.0, 0.0), false, &tuning).expect("in radius");
        // strength 15, falloff 0.5 → 7.5 по X и 7.5·0.3 вверх
        assert!((impulse.x - 7.5).abs() < 1e-4);
        assert!((impulse.y - 2.25).abs() < 1e-4);
    }
}

//! Damage zone: временная fire zone, которую оставляет Trail
//!
//! Архитектура:
//! - `DamageZone` держит DOT template, spawner и `OccupantTable`
//! - Максимум один handle на target; повторный enter = no-op
//! - Exit/teardown всегда чистит запись, даже если handle уже невалиден
//! - Lifespan истёк → release_all → despawn (никаких persistent DOT на целях)
//! - Всё apply/remove: только на authority
//!
//! Occupancy приходит через `ZoneOverlap` events: либо из proximity
//! детектора (`detect_zone_overlaps`), либо из rapier CollisionEvent bridge.

use bevy::prelude::*;
use bevy_rapier3d::prelude::{Collider, Sensor};

use crate::components::Health;
use crate::config::AbilityTuning;
use crate::effects::{ActiveEffects, EffectContext, EffectService, EffectTemplate};

pub mod occupants;

pub use occupants::{OccupantKey, OccupantTable};

#[cfg(test)]
mod zone_tests;

/// Zone entity (authority only)
#[derive(Component, Debug, Default)]
#[require(Transform, ZoneContacts)]
pub struct DamageZone {
    spawner: Option<Entity>,
    template: Option<EffectTemplate>,
    occupants: OccupantTable,
}

/// Сколько ещё живёт zone
#[derive(Component, Debug, Clone, Copy)]
pub struct ZoneLifespan {
    pub remaining: f32,
}

/// Радиус proximity детектора
#[derive(Component, Debug, Clone, Copy)]
pub struct ZoneRadius(pub f32);

/// Текущие contacts proximity детектора (не путать с occupants/handles)
#[derive(Component, Debug, Default, Clone)]
pub struct ZoneContacts(pub Vec<Entity>);

/// Event: Trail просит заспавнить zone
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct SpawnZoneRequest {
    pub spawner: Entity,
    pub position: Vec3,
    pub rotation: Quat,
}

/// Event: occupancy change
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneOverlap {
    Entered { zone: Entity, target: Entity },
    Exited { zone: Entity, target: Entity },
}

/// Источник occupancy events
#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZoneDetection {
    /// Sphere-vs-point каждый tick
    #[default]
    Proximity,
    /// Sensor CollisionEvent из rapier (host гоняет RapierPhysicsPlugin)
    RapierEvents,
}

impl DamageZone {
    /// Bind template + spawner (spawner не получает урон от своей zone)
    pub fn initialize(&mut self, spawner: Entity, template: EffectTemplate) {
        self.spawner = Some(spawner);
        self.template = Some(template);
    }

    pub fn spawner(&self) -> Option<Entity> {
        self.spawner
    }

    pub fn occupants(&self) -> &OccupantTable {
        &self.occupants
    }

    /// true если эффект применён
    pub fn on_enter(&mut self, zone: Entity, target: Entity, effects: &mut dyn EffectService) -> bool {
        if Some(target) == self.spawner || self.occupants.contains(target) {
            return false;
        }
        let Some(template) = self.template.as_ref() else {
            return false;
        };

        let context = EffectContext::from_source(zone, self.spawner);
        match effects.apply_effect(target, template, 1.0, context) {
            Some(handle) => {
                self.occupants.insert(target, handle);
                true
            }
            None => false,
        }
    }

    /// true если запись была. Invalid handle допустим, запись уходит всегда.
    pub fn on_exit(&mut self, target: Entity, effects: &mut dyn EffectService) -> bool {
        match self.occupants.remove(target) {
            Some(handle) => {
                effects.remove_effect(handle);
                true
            }
            None => false,
        }
    }

    /// Teardown: снимает все handles, таблица пустая после вызова
    pub fn release_all(&mut self, effects: &mut dyn EffectService) -> usize {
        let released = self.occupants.drain();
        for (_, handle) in &released {
            effects.remove_effect(*handle);
        }
        released.len()
    }
}

/// System: SpawnZoneRequest → zone entity
pub fn spawn_damage_zones(
    mut commands: Commands,
    tuning: Res<AbilityTuning>,
    mut requests: EventReader<SpawnZoneRequest>,
) {
    let zone_tuning = &tuning.damage_zone;
    let template = EffectTemplate::DamageOverTime {
        damage_per_tick: zone_tuning.dot_damage,
        period: zone_tuning.dot_period,
        execute_on_application: zone_tuning.dot_on_application,
    };

    for request in requests.read() {
        let mut zone = DamageZone::default();
        zone.initialize(request.spawner, template.clone());

        let entity = commands
            .spawn((
                zone,
                Transform::from_translation(request.position).with_rotation(request.rotation),
                ZoneLifespan {
                    remaining: zone_tuning.lifespan,
                },
                ZoneRadius(zone_tuning.radius),
                Collider::ball(zone_tuning.radius),
                Sensor,
            ))
            .id();

        crate::log(&format!(
            "🔥 Zone {:?} spawned at {:.1?} by {:?}",
            entity, request.position, request.spawner
        ));
    }
}

fn overlapping_targets(
    zone: Entity,
    center: Vec3,
    radius: f32,
    targets: &Query<(Entity, &Transform), (With<Health>, Without<DamageZone>)>,
) -> Vec<Entity> {
    let radius_sq = radius * radius;
    let mut inside: Vec<Entity> = targets
        .iter()
        .filter(|(entity, _)| *entity != zone)
        .filter(|(_, transform)| transform.translation.distance_squared(center) <= radius_sq)
        .map(|(entity, _)| entity)
        .collect();
    inside.sort();
    inside
}

/// System: новая zone сразу применяет DOT ко всем, кто уже внутри
pub fn begin_zone_overlaps(
    mut effects: ResMut<ActiveEffects>,
    mut zones: Query<(Entity, &Transform, &ZoneRadius, &mut DamageZone, &mut ZoneContacts), Added<DamageZone>>,
    targets: Query<(Entity, &Transform), (With<Health>, Without<DamageZone>)>,
) {
    for (zone_entity, transform, radius, mut zone, mut contacts) in zones.iter_mut() {
        let inside = overlapping_targets(zone_entity, transform.translation, radius.0, &targets);
        for target in &inside {
            zone.on_enter(zone_entity, *target, &mut *effects);
        }
        contacts.0 = inside;
    }
}

/// System: proximity детектор → ZoneOverlap events
pub fn detect_zone_overlaps(
    mut zones: Query<(Entity, &Transform, &ZoneRadius, &mut ZoneContacts), With<DamageZone>>,
    targets: Query<(Entity, &Transform), (With<Health>, Without<DamageZone>)>,
    mut overlaps: EventWriter<ZoneOverlap>,
) {
    let mut zone_list: Vec<_> = zones.iter_mut().collect();
    zone_list.sort_by_key(|(entity, ..)| *entity);

    for (zone, transform, radius, mut contacts) in zone_list {
        let inside = overlapping_targets(zone, transform.translation, radius.0, &targets);

        for target in contacts.0.iter().filter(|target| !inside.contains(target)) {
            overlaps.write(ZoneOverlap::Exited { zone, target: *target });
        }
        for target in inside.iter().filter(|target| !contacts.0.contains(target)) {
            overlaps.write(ZoneOverlap::Entered { zone, target: *target });
        }

        if contacts.0 != inside {
            contacts.0 = inside;
        }
    }
}

/// System: ZoneOverlap → on_enter / on_exit
pub fn handle_zone_overlaps(
    mut effects: ResMut<ActiveEffects>,
    mut zones: Query<&mut DamageZone>,
    mut overlaps: EventReader<ZoneOverlap>,
) {
    for overlap in overlaps.read() {
        match *overlap {
            ZoneOverlap::Entered { zone, target } => {
                if let Ok(mut damage_zone) = zones.get_mut(zone) {
                    damage_zone.on_enter(zone, target, &mut *effects);
                }
            }
            ZoneOverlap::Exited { zone, target } => {
                if let Ok(mut damage_zone) = zones.get_mut(zone) {
                    damage_zone.on_exit(target, &mut *effects);
                }
            }
        }
    }
}

/// System: lifespan → release_all → despawn
pub fn expire_damage_zones(
    mut commands: Commands,
    time: Res<Time>,
    mut effects: ResMut<ActiveEffects>,
    mut zones: Query<(Entity, &mut ZoneLifespan, &mut DamageZone)>,
) {
    let dt = time.delta_secs();
    for (entity, mut lifespan, mut zone) in zones.iter_mut() {
        lifespan.remaining -= dt;
        if lifespan.remaining > 0.0 {
            continue;
        }

        let released = zone.release_all(&mut *effects);
        crate::log(&format!("💨 Zone {:?} expired, released {} DOT handles", entity, released));
        commands.entity(entity).despawn();
    }
}

/// Observer: zone удалена любым путём → ни одного DOT handle не остаётся
pub fn release_zone_on_remove(
    trigger: Trigger<OnRemove, DamageZone>,
    mut zones: Query<&mut DamageZone>,
    mut effects: ResMut<ActiveEffects>,
) {
    if let Ok(mut zone) = zones.get_mut(trigger.target()) {
        let released = zone.release_all(&mut *effects);
        if released > 0 {
            crate::log(&format!("🧯 Zone {:?} removed with {} live handles", trigger.target(), released));
        }
    }
}

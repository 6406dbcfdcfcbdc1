//! Rapier sensor events → ZoneOverlap
//!
//! Когда host гоняет RapierPhysicsPlugin, sensor collider зоны генерирует
//! `CollisionEvent::Started/Stopped`. Bridge превращает их в те же
//! `ZoneOverlap` events, что и proximity детектор.

use bevy::prelude::*;
use bevy_rapier3d::prelude::CollisionEvent;

use crate::zone::{DamageZone, ZoneOverlap};

/// System: CollisionEvent (zone vs что угодно) → ZoneOverlap
pub fn translate_rapier_collisions(
    mut collisions: EventReader<CollisionEvent>,
    zones: Query<(), With<DamageZone>>,
    mut overlaps: EventWriter<ZoneOverlap>,
) {
    for event in collisions.read() {
        let (a, b, started) = match event {
            CollisionEvent::Started(a, b, _) => (*a, *b, true),
            CollisionEvent::Stopped(a, b, _) => (*a, *b, false),
        };

        // Zone vs zone игнорируем
        let (zone, target) = match (zones.contains(a), zones.contains(b)) {
            (true, false) => (a, b),
            (false, true) => (b, a),
            _ => continue,
        };

        overlaps.write(if started {
            ZoneOverlap::Entered { zone, target }
        } else {
            ZoneOverlap::Exited { zone, target }
        });
    }
}

//! Collision queries для abilities
//!
//! Архитектура:
//! - `CollisionWorld` (Resource) пересобирается каждый tick из Obstacle и Vehicle
//! - Ray cast (первый hit, один ignore entity), box overlap, sphere query тел
//! - Abilities видят только trait `CollisionQuery`: host может подставить
//!   свою реализацию поверх rapier query pipeline
//!
//! Шаг физики здесь не делается. Velocity/Sleeping это rapier компоненты,
//! их интегрирует host.

use bevy::prelude::*;
use bevy_rapier3d::prelude::{RigidBody, Sleeping, Velocity};

use crate::components::{Obstacle, Vehicle};
use crate::config::AbilityTuning;

pub mod rapier_bridge;

/// Первый blocking hit луча
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub point: Vec3,
    pub distance: f32,
    pub blocker: Entity,
}

/// Dynamic body внутри сферы
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyHit {
    pub entity: Entity,
    pub position: Vec3,
    pub is_vehicle: bool,
}

/// Контракт overlap/collision сервиса
pub trait CollisionQuery {
    fn cast_ray(&self, start: Vec3, end: Vec3, ignore: Option<Entity>) -> Option<RayHit>;

    /// true если box (center ± half_extents) пересекает что-то блокирующее
    fn overlap_blocking(&self, center: Vec3, half_extents: Vec3, ignore: Option<Entity>) -> bool;

    /// Все simulating bodies в радиусе, отсортированы по entity
    fn bodies_in_sphere(&self, center: Vec3, radius: f32, ignore: Option<Entity>) -> Vec<BodyHit>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_center(center: Vec3, half_extents: Vec3) -> Self {
        let half = half_extents.abs();
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }
}

/// Параметр t ∈ [0, 1], где отрезок [p0, p1] входит в AABB (slab test).
/// Старт внутри box → Some(0.0).
pub fn segment_aabb_enter_t(p0: Vec3, p1: Vec3, min: Vec3, max: Vec3) -> Option<f32> {
    let d = p1 - p0;
    let mut tmin = 0.0f32;
    let mut tmax = 1.0f32;
    for axis in 0..3 {
        let start = p0[axis];
        let dir = d[axis];
        if dir.abs() < 1e-6 {
            if start < min[axis] || start > max[axis] {
                return None;
            }
        } else {
            let inv = 1.0 / dir;
            let mut t0 = (min[axis] - start) * inv;
            let mut t1 = (max[axis] - start) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            tmin = tmin.max(t0);
            tmax = tmax.min(t1);
            if tmin > tmax {
                return None;
            }
        }
    }
    Some(tmin)
}

#[derive(Debug, Clone, Copy)]
struct BlockingBox {
    entity: Entity,
    bounds: Aabb,
}

#[derive(Debug, Clone, Copy)]
struct SimulatedBody {
    entity: Entity,
    position: Vec3,
    is_vehicle: bool,
}

/// Snapshot коллизий текущего tick
#[derive(Resource, Debug, Default)]
pub struct CollisionWorld {
    blockers: Vec<BlockingBox>,
    bodies: Vec<SimulatedBody>,
}

impl CollisionWorld {
    pub fn clear(&mut self) {
        self.blockers.clear();
        self.bodies.clear();
    }

    pub fn add_blocker(&mut self, entity: Entity, center: Vec3, half_extents: Vec3) {
        self.blockers.push(BlockingBox {
            entity,
            bounds: Aabb::from_center(center, half_extents),
        });
    }

    pub fn add_body(&mut self, entity: Entity, position: Vec3, is_vehicle: bool) {
        self.bodies.push(SimulatedBody {
            entity,
            position,
            is_vehicle,
        });
    }

    pub fn blocker_count(&self) -> usize {
        self.blockers.len()
    }
}

impl CollisionQuery for CollisionWorld {
    fn cast_ray(&self, start: Vec3, end: Vec3, ignore: Option<Entity>) -> Option<RayHit> {
        let length = start.distance(end);

        self.blockers
            .iter()
            .filter(|blocker| Some(blocker.entity) != ignore)
            .filter_map(|blocker| {
                segment_aabb_enter_t(start, end, blocker.bounds.min, blocker.bounds.max).map(|t| (t, blocker.entity))
            })
            // ties → меньший entity, порядок не зависит от порядка вставки
            .min_by(|(ta, ea), (tb, eb)| ta.total_cmp(tb).then_with(|| ea.cmp(eb)))
            .map(|(t, blocker)| RayHit {
                point: start.lerp(end, t),
                distance: t * length,
                blocker,
            })
    }

    fn overlap_blocking(&self, center: Vec3, half_extents: Vec3, ignore: Option<Entity>) -> bool {
        let probe = Aabb::from_center(center, half_extents);
        self.blockers
            .iter()
            .filter(|blocker| Some(blocker.entity) != ignore)
            .any(|blocker| blocker.bounds.intersects(&probe))
    }

    fn bodies_in_sphere(&self, center: Vec3, radius: f32, ignore: Option<Entity>) -> Vec<BodyHit> {
        let radius_sq = radius * radius;
        let mut hits: Vec<BodyHit> = self
            .bodies
            .iter()
            .filter(|body| Some(body.entity) != ignore)
            .filter(|body| body.position.distance_squared(center) <= radius_sq)
            .map(|body| BodyHit {
                entity: body.entity,
                position: body.position,
                is_vehicle: body.is_vehicle,
            })
            .collect();
        hits.sort_by_key(|hit| hit.entity);
        hits
    }
}

/// System: пересобирает CollisionWorld из ECS (начало FixedUpdate)
///
/// Obstacles и машины блокируют лучи; все Dynamic bodies: кандидаты для Impulse.
pub fn rebuild_collision_world(
    tuning: Res<AbilityTuning>,
    mut world: ResMut<CollisionWorld>,
    obstacles: Query<(Entity, &Transform, &Obstacle)>,
    bodies: Query<(Entity, &Transform, &RigidBody, Has<Vehicle>), (With<Velocity>, With<Sleeping>)>,
) {
    world.clear();

    for (entity, transform, obstacle) in obstacles.iter() {
        world.add_blocker(entity, transform.translation, obstacle.half_extents);
    }

    let vehicle_extents = tuning.blink.half_extents();
    for (entity, transform, body, is_vehicle) in bodies.iter() {
        if is_vehicle {
            world.add_blocker(entity, transform.translation, vehicle_extents);
        }
        if matches!(body, RigidBody::Dynamic) {
            world.add_body(entity, transform.translation, is_vehicle);
        }
    }
}

//! OVERDRIVE Simulation Core
//!
//! Vehicle ability economy на Bevy 0.16 (headless ECS)
//!
//! Архитектура:
//! - Energy/MaxEnergy/TorqueMultiplier: `VehicleAttributes` (clamping внутри)
//! - Timed/periodic модификаторы: `ActiveEffects` (handles, tags, DOT)
//! - Abilities (TorqueBoost, Trail, Blink, Impulse): closed enum state machines
//! - Fire zones от Trail: `DamageZone` с occupant handle table
//! - Authority/Client split: явные `NetMessage`, без implicit replication
//!
//! Физический шаг делает host (RapierPhysicsPlugin или движок снаружи);
//! симуляция только читает/пишет rapier компоненты.

use bevy::prelude::*;
use bevy_rapier3d::prelude::CollisionEvent;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

// Публичные модули
pub mod abilities;
pub mod attributes;
pub mod components;
pub mod config;
pub mod effects;
pub mod logger;
pub mod net;
pub mod physics;
pub mod scenario;
pub mod scheduler;
pub mod vehicle;
pub mod zone;

// Re-export базовых типов для удобства
pub use abilities::{
    AbilityCommand, AbilityCue, AbilityEnded, AbilityKind, ActivationError, ActivationState, CueKind, EndReason,
    VehicleAbilities,
};
pub use attributes::{ResourceKind, VehicleAttributes};
pub use components::*;
pub use config::{AbilityTuning, ConfigError};
pub use effects::{ActiveEffects, EffectHandle, EffectService, EffectTemplate, GameplayTag};
pub use logger::{init_logger, log, log_error, log_info, log_warning, set_log_level, set_logger, LogLevel, LogPrinter};
pub use net::{Envelope, NetMessage, NetRole};
pub use scheduler::TaskScheduler;
pub use vehicle::{spawn_vehicle, AbilityInputEvent, ResetVehicle, VehicleIndex};
pub use zone::{DamageZone, ZoneDetection};

/// Фазы одного fixed tick (строго по порядку)
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimulationSet {
    /// Collision snapshot (obstacles, vehicles, dynamic bodies)
    Collision,
    /// Входящие NetMessage → AbilityCommand / attributes
    Network,
    /// Локальный input → AbilityCommand
    Input,
    /// Ability state machines + periodic tasks + impulse
    Abilities,
    /// Fire zones (authority)
    Zones,
    /// Effect timers, DOT/energy executions, cooldown states
    Effects,
    /// Flip check + reset
    Vehicle,
    /// AttributeDelta клиентам (authority)
    Replication,
}

/// Главный plugin симуляции
///
/// Регистрирует всё в FixedUpdate (60Hz), фазы в порядке `SimulationSet`.
/// Role фиксируется при создании App.
pub struct SimulationPlugin {
    pub role: NetRole,
}

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        app
            // Tuning мог вставить host до plugin'а (загруженный из RON)
            .init_resource::<AbilityTuning>()
            .insert_resource(self.role)
            .init_resource::<ActiveEffects>()
            .init_resource::<TaskScheduler>()
            .init_resource::<physics::CollisionWorld>()
            .init_resource::<net::NetOutbox>()
            .init_resource::<net::NetInbox>()
            .init_resource::<VehicleIndex>()
            .init_resource::<net::ReplicatedAttributes>()
            .init_resource::<ZoneDetection>()
            .insert_resource(Time::<Fixed>::from_hz(60.0));

        // Регистрация событий
        app.add_event::<AbilityInputEvent>()
            .add_event::<ResetVehicle>()
            .add_event::<AbilityCommand>()
            .add_event::<AbilityCue>()
            .add_event::<AbilityEnded>()
            .add_event::<zone::SpawnZoneRequest>()
            .add_event::<zone::ZoneOverlap>()
            .add_event::<abilities::ImpulseBurst>()
            .add_event::<DamageDealt>()
            // Bridge читает его даже без RapierPhysicsPlugin
            .add_event::<CollisionEvent>();

        // Observers (lifecycle)
        app.add_observer(vehicle::index::index_vehicle_on_add)
            .add_observer(vehicle::index::unindex_vehicle_on_remove)
            .add_observer(abilities::systems::teardown_abilities_on_remove)
            .add_observer(zone::release_zone_on_remove);

        app.configure_sets(
            FixedUpdate,
            (
                SimulationSet::Collision,
                SimulationSet::Network,
                SimulationSet::Input,
                SimulationSet::Abilities,
                SimulationSet::Zones,
                SimulationSet::Effects,
                SimulationSet::Vehicle,
                SimulationSet::Replication,
            )
                .chain(),
        );

        app.add_systems(
            FixedUpdate,
            (
                // Фаза 1: collision snapshot
                physics::rebuild_collision_world.in_set(SimulationSet::Collision),
                // Фаза 2: сеть
                (
                    net::receive_on_authority.run_if(net::is_authority),
                    net::receive_on_client.run_if(net::is_client),
                )
                    .in_set(SimulationSet::Network),
                // Фаза 3: input
                vehicle::route_ability_input.in_set(SimulationSet::Input),
                // Фаза 4: abilities
                (
                    abilities::systems::dispatch_ability_commands,
                    abilities::systems::run_ability_tasks,
                    abilities::impulse::apply_impulse_bursts.run_if(net::is_authority),
                )
                    .chain()
                    .in_set(SimulationSet::Abilities),
            ),
        );

        app.add_systems(
            FixedUpdate,
            (
                // Фаза 5: zones (authority only)
                (
                    zone::spawn_damage_zones,
                    zone::begin_zone_overlaps,
                    zone::detect_zone_overlaps.run_if(resource_equals(ZoneDetection::Proximity)),
                    physics::rapier_bridge::translate_rapier_collisions
                        .run_if(resource_equals(ZoneDetection::RapierEvents)),
                    zone::handle_zone_overlaps,
                    zone::expire_damage_zones,
                )
                    .chain()
                    .run_if(net::is_authority)
                    .in_set(SimulationSet::Zones),
                // Фаза 6: effects
                (
                    effects::tick_effects,
                    effects::purge_orphaned_effects,
                    abilities::systems::refresh_cooldown_states,
                )
                    .chain()
                    .in_set(SimulationSet::Effects),
                // Фаза 7: vehicle upkeep
                (vehicle::check_flipped_vehicles, vehicle::handle_reset_requests)
                    .chain()
                    .in_set(SimulationSet::Vehicle),
                // Фаза 8: репликация
                net::replicate_attributes
                    .run_if(net::is_authority)
                    .in_set(SimulationSet::Replication),
            ),
        );
    }
}

/// Детерминистичный RNG resource (seeded)
#[derive(Resource)]
pub struct DeterministicRng {
    pub rng: ChaCha8Rng,
    pub seed: u64,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }
}

/// Создаёт minimal Bevy App для headless симуляции (без SimulationPlugin)
pub fn create_headless_app(seed: u64) -> App {
    let mut app = App::new();
    init_logger();
    app.add_plugins(MinimalPlugins)
        .insert_resource(DeterministicRng::new(seed))
        .insert_resource(Time::<Fixed>::from_hz(60.0)); // 60Hz FixedUpdate

    app
}

/// Headless App одной стороны (authority или клиент) со всем ability стеком
pub fn create_simulation_app(role: NetRole, seed: u64, tuning: AbilityTuning) -> App {
    let mut app = create_headless_app(seed);
    app.insert_resource(tuning).add_plugins(SimulationPlugin { role });
    app
}

/// Snapshot компонентов для сравнения детерминизма.
///
/// Одна строка на entity, отсортировано по index (entity ids детерминированы
/// при одинаковом порядке spawn).
pub fn world_snapshot<T>(world: &mut World) -> Vec<String>
where
    T: Component + std::fmt::Debug,
{
    let mut query = world.query::<(Entity, &T)>();
    let mut rows: Vec<(u32, String)> = query
        .iter(world)
        .map(|(entity, component)| (entity.index(), format!("{:?}", component)))
        .collect();
    rows.sort_by_key(|(index, _)| *index);

    rows.into_iter()
        .map(|(index, component)| format!("{}: {}", index, component))
        .collect()
}

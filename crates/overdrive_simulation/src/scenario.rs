//! Headless scenario: authority App + client App, связанные in-process transport
//!
//! - `LinkedApps`: две стороны, по одному fixed tick на `step`
//! - Вся сеть через `net::pump_between` (RON wire, unreliable можно терять)
//! - `Scenario`: seeded сцена (props/obstacles) + scripted inputs
//!
//! Используется binary и integration тестами.

use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use rand::Rng;
use std::time::Duration;

use crate::abilities::VehicleAbilities;
use crate::attributes::VehicleAttributes;
use crate::components::{Drivetrain, Health, Obstacle, PhysicsProp, VehicleId};
use crate::config::AbilityTuning;
use crate::net::{pump_between, NetRole};
use crate::vehicle::{spawn_vehicle, AbilityInputEvent, VehicleIndex};
use crate::zone::DamageZone;
use crate::{create_simulation_app, DeterministicRng};

/// Длина одного fixed tick (60Hz)
pub const TICK: Duration = Duration::from_nanos(16_666_667);

/// Какая сторона получает input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Authority,
    Client,
}

/// Authority + один клиент
pub struct LinkedApps {
    pub authority: App,
    pub client: App,
    /// Эмуляция потерь best-effort сообщений
    pub drop_unreliable: bool,
    tick: u64,
}

impl LinkedApps {
    pub fn new(seed: u64, tuning: AbilityTuning) -> Self {
        let mut authority = create_simulation_app(NetRole::Authority, seed, tuning.clone());
        let mut client = create_simulation_app(NetRole::Client, seed, tuning);

        for app in [&mut authority, &mut client] {
            app.insert_resource(Time::<Fixed>::from_duration(TICK))
                .insert_resource(TimeUpdateStrategy::ManualDuration(TICK));
            // Первый update: delta = 0, FixedUpdate не бежит
            app.update();
        }

        Self {
            authority,
            client,
            drop_unreliable: false,
            tick: 0,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn app(&self, side: Side) -> &App {
        match side {
            Side::Authority => &self.authority,
            Side::Client => &self.client,
        }
    }

    pub fn app_mut(&mut self, side: Side) -> &mut App {
        match side {
            Side::Authority => &mut self.authority,
            Side::Client => &mut self.client,
        }
    }

    /// Машина на обеих сторонах с одним VehicleId
    pub fn spawn_vehicle(&mut self, id: VehicleId, transform: Transform, base_torque: f32) -> (Entity, Entity) {
        let on_authority = spawn_vehicle(self.authority.world_mut(), id, transform, base_torque);
        let on_client = spawn_vehicle(self.client.world_mut(), id, transform, base_torque);
        (on_authority, on_client)
    }

    /// Статичная геометрия уровня (одинакова на обеих сторонах)
    pub fn spawn_obstacle(&mut self, center: Vec3, half_extents: Vec3) {
        for app in [&mut self.authority, &mut self.client] {
            app.world_mut()
                .spawn((Obstacle { half_extents }, Transform::from_translation(center)));
        }
    }

    /// Dynamic prop (только authority симулирует физику)
    pub fn spawn_prop(&mut self, position: Vec3) -> Entity {
        self.authority
            .world_mut()
            .spawn((PhysicsProp, Transform::from_translation(position)))
            .id()
    }

    pub fn entity(&self, side: Side, id: VehicleId) -> Option<Entity> {
        self.app(side).world().resource::<VehicleIndex>().get(id)
    }

    /// Raw input id (как от binding слоя) на стороне `side`
    pub fn input(&mut self, side: Side, id: VehicleId, input_id: u8, pressed: bool) {
        let Some(vehicle) = self.entity(side, id) else {
            crate::log_warning(&format!("⚠️ Input for unknown {} on {:?}", id, side));
            return;
        };
        self.app_mut(side).world_mut().send_event(AbilityInputEvent {
            vehicle,
            input_id,
            pressed,
        });
    }

    /// Один tick: client → wire → authority → wire → client
    pub fn step(&mut self) {
        self.client.update();
        pump_between(self.client.world_mut(), self.authority.world_mut(), self.drop_unreliable);

        self.authority.update();
        pump_between(self.authority.world_mut(), self.client.world_mut(), self.drop_unreliable);

        self.tick += 1;
    }

    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.step();
        }
    }

    pub fn energy(&self, side: Side, id: VehicleId) -> Option<f32> {
        let entity = self.entity(side, id)?;
        self.app(side)
            .world()
            .get::<VehicleAttributes>(entity)
            .map(VehicleAttributes::energy)
    }

    pub fn translation(&self, side: Side, id: VehicleId) -> Option<Vec3> {
        let entity = self.entity(side, id)?;
        self.app(side).world().get::<Transform>(entity).map(|t| t.translation)
    }

    pub fn max_torque(&self, side: Side, id: VehicleId) -> Option<f32> {
        let entity = self.entity(side, id)?;
        self.app(side).world().get::<Drivetrain>(entity).map(|d| d.max_torque)
    }

    pub fn health(&self, side: Side, id: VehicleId) -> Option<u32> {
        let entity = self.entity(side, id)?;
        self.app(side).world().get::<Health>(entity).map(|h| h.current)
    }

    pub fn abilities(&self, side: Side, id: VehicleId) -> Option<&VehicleAbilities> {
        let entity = self.entity(side, id)?;
        self.app(side).world().get::<VehicleAbilities>(entity)
    }

    pub fn zone_count(&mut self) -> usize {
        let world = self.authority.world_mut();
        world.query::<&DamageZone>().iter(world).count()
    }
}

/// Один scripted input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedInput {
    pub tick: u64,
    pub side: Side,
    pub vehicle: VehicleId,
    pub input_id: u8,
    pub pressed: bool,
}

#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    pub seed: u64,
    pub ticks: u64,
    pub props: usize,
    pub obstacles: usize,
    /// Половина стороны арены, где раскидываются props/obstacles
    pub arena_half_size: f32,
    pub drop_unreliable: bool,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            ticks: 900,
            props: 12,
            obstacles: 6,
            arena_half_size: 40.0,
            drop_unreliable: false,
        }
    }
}

/// Итог прогона
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSummary {
    pub ticks: u64,
    pub vehicles: Vec<VehicleSummary>,
    pub zones_alive: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleSummary {
    pub id: VehicleId,
    pub position: Vec3,
    pub energy: f32,
    pub client_energy: f32,
    pub max_torque: f32,
    pub health: u32,
}

pub const PLAYER: VehicleId = VehicleId(1);
pub const RIVAL: VehicleId = VehicleId(2);

pub struct Scenario {
    pub config: ScenarioConfig,
    pub apps: LinkedApps,
    script: Vec<ScriptedInput>,
}

impl Scenario {
    pub fn new(config: ScenarioConfig, tuning: AbilityTuning) -> Self {
        let mut apps = LinkedApps::new(config.seed, tuning);
        apps.drop_unreliable = config.drop_unreliable;

        // Игрок (клиент предсказывает) и соперник (authority-host) лицом к -Z
        apps.spawn_vehicle(PLAYER, Transform::from_xyz(0.0, 0.5, 0.0), 400.0);
        apps.spawn_vehicle(RIVAL, Transform::from_xyz(3.0, 0.5, 6.0), 400.0);

        let mut rng = DeterministicRng::new(config.seed);
        let half = config.arena_half_size;
        for _ in 0..config.obstacles {
            // Obstacles не ближе 15м к старту, чтобы Blink было куда прыгать
            let x = rng.rng.gen_range(-half..half);
            let z = rng.rng.gen_range(-half..-15.0_f32.min(half * 0.5));
            let half_extents = Vec3::new(rng.rng.gen_range(1.0..4.0), 2.0, rng.rng.gen_range(1.0..4.0));
            apps.spawn_obstacle(Vec3::new(x, 1.0, z), half_extents);
        }
        for _ in 0..config.props {
            let radius = rng.rng.gen_range(2.0..10.0_f32);
            let angle = rng.rng.gen_range(0.0..std::f32::consts::TAU);
            apps.spawn_prop(Vec3::new(radius * angle.cos(), 0.5, radius * angle.sin()));
        }

        Self {
            config,
            apps,
            script: default_script(),
        }
    }

    pub fn with_script(mut self, script: Vec<ScriptedInput>) -> Self {
        self.script = script;
        self
    }

    pub fn run(&mut self) -> ScenarioSummary {
        let mut script = self.script.clone();
        script.sort_by_key(|input| input.tick);
        let mut next = 0;

        for tick in 0..self.config.ticks {
            while next < script.len() && script[next].tick == tick {
                let input = script[next];
                self.apps.input(input.side, input.vehicle, input.input_id, input.pressed);
                next += 1;
            }
            self.apps.step();

            if tick % 120 == 0 {
                crate::log(&format!(
                    "Tick {}: player energy {:.1}, zones {}",
                    tick,
                    self.apps.energy(Side::Authority, PLAYER).unwrap_or_default(),
                    self.apps.zone_count()
                ));
            }
        }

        self.summary()
    }

    pub fn summary(&mut self) -> ScenarioSummary {
        let vehicles = [PLAYER, RIVAL]
            .into_iter()
            .map(|id| VehicleSummary {
                id,
                position: self.apps.translation(Side::Authority, id).unwrap_or_default(),
                energy: self.apps.energy(Side::Authority, id).unwrap_or_default(),
                client_energy: self.apps.energy(Side::Client, id).unwrap_or_default(),
                max_torque: self.apps.max_torque(Side::Authority, id).unwrap_or_default(),
                health: self.apps.health(Side::Authority, id).unwrap_or_default(),
            })
            .collect();

        ScenarioSummary {
            ticks: self.apps.tick(),
            vehicles,
            zones_alive: self.apps.zone_count(),
        }
    }
}

/// Демо: boost, trail соперника, blink и impulse игрока
pub fn default_script() -> Vec<ScriptedInput> {
    let press = |tick, side, vehicle, input_id| ScriptedInput {
        tick,
        side,
        vehicle,
        input_id,
        pressed: true,
    };
    let release = |tick, side, vehicle, input_id| ScriptedInput {
        tick,
        side,
        vehicle,
        input_id,
        pressed: false,
    };

    vec![
        press(10, Side::Client, PLAYER, 1),
        release(70, Side::Client, PLAYER, 1),
        press(90, Side::Authority, RIVAL, 4),
        release(150, Side::Authority, RIVAL, 4),
        press(200, Side::Client, PLAYER, 3),
        press(260, Side::Client, PLAYER, 2),
        // Неизвестный id: игнорируется
        press(300, Side::Client, PLAYER, 9),
    ]
}

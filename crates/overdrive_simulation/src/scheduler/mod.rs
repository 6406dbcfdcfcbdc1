//! Central per-tick scheduler для повторяющихся ability задач
//!
//! Fire-and-requeue: задача срабатывает каждые `interval` секунд, пока её
//! не отменят через `TaskToken`. Никаких блокирующих ожиданий: `advance`
//! возвращает список сработавших задач, их обрабатывает ability dispatcher
//! в том же FixedUpdate шаге.
//!
//! Token generational: cancel stale/повторного token = no-op.

use bevy::prelude::*;

use crate::abilities::AbilityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskToken {
    index: u32,
    generation: u32,
}

/// Сработавшая задача (owner = машина, kind = какая ability тикает)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredTask {
    pub token: TaskToken,
    pub owner: Entity,
    pub ability: AbilityKind,
}

#[derive(Debug, Clone)]
struct RepeatingTask {
    owner: Entity,
    ability: AbilityKind,
    interval: f32,
    elapsed: f32,
}

#[derive(Debug, Default)]
struct TaskSlot {
    generation: u32,
    task: Option<RepeatingTask>,
}

#[derive(Resource, Debug, Default)]
pub struct TaskScheduler {
    slots: Vec<TaskSlot>,
    free: Vec<u32>,
}

impl TaskScheduler {
    /// Регистрирует задачу; первый fire через `interval` секунд
    pub fn schedule_repeating(&mut self, owner: Entity, ability: AbilityKind, interval: f32) -> TaskToken {
        // interval ≤ 0 зациклил бы advance
        let interval = if interval.is_finite() { interval.max(f32::EPSILON) } else { 1.0 };

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(TaskSlot::default());
                (self.slots.len() - 1) as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.task = Some(RepeatingTask {
            owner,
            ability,
            interval,
            elapsed: 0.0,
        });

        TaskToken {
            index,
            generation: slot.generation,
        }
    }

    /// Idempotent: true только при первой отмене живого token
    pub fn cancel(&mut self, token: TaskToken) -> bool {
        let Some(slot) = self.slots.get_mut(token.index as usize) else {
            return false;
        };
        if slot.generation != token.generation || slot.task.is_none() {
            return false;
        }
        slot.task = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(token.index);
        true
    }

    pub fn is_scheduled(&self, token: TaskToken) -> bool {
        self.slots
            .get(token.index as usize)
            .is_some_and(|slot| slot.generation == token.generation && slot.task.is_some())
    }

    pub fn scheduled_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.task.is_some()).count()
    }

    /// Отменяет все задачи owner'а (teardown машины)
    pub fn cancel_owner(&mut self, owner: Entity) -> usize {
        let tokens: Vec<TaskToken> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.task.as_ref().is_some_and(|task| task.owner == owner))
            .map(|(index, slot)| TaskToken {
                index: index as u32,
                generation: slot.generation,
            })
            .collect();

        tokens.into_iter().filter(|token| self.cancel(*token)).count()
    }

    /// Продвигает время. Задача с большим dt срабатывает несколько раз
    /// (каждый fire = один tick ability).
    pub fn advance(&mut self, dt: f32) -> Vec<FiredTask> {
        let mut fired = Vec::new();

        for (index, slot) in self.slots.iter_mut().enumerate() {
            let generation = slot.generation;
            let Some(task) = slot.task.as_mut() else {
                continue;
            };

            task.elapsed += dt;
            while task.elapsed >= task.interval {
                task.elapsed -= task.interval;
                fired.push(FiredTask {
                    token: TaskToken {
                        index: index as u32,
                        generation,
                    },
                    owner: task.owner,
                    ability: task.ability,
                });
            }
        }

        fired
    }
}

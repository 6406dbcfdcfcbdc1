//! Generational occupant table для DamageZone
//!
//! Каждый occupant получает маленький стабильный index; side table
//! index → (target, handle) с явной проверкой generation. Удалённый
//! occupant инвалидирует свой key, slot переиспользуется.

use bevy::prelude::*;
use std::collections::HashMap;

use crate::effects::EffectHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OccupantKey {
    index: u16,
    generation: u16,
}

#[derive(Debug, Clone, Copy)]
struct Occupant {
    target: Entity,
    handle: EffectHandle,
}

#[derive(Debug, Default, Clone)]
struct OccupantSlot {
    generation: u16,
    occupant: Option<Occupant>,
}

#[derive(Debug, Default, Clone)]
pub struct OccupantTable {
    slots: Vec<OccupantSlot>,
    free: Vec<u16>,
    by_target: HashMap<Entity, OccupantKey>,
}

impl OccupantTable {
    pub fn len(&self) -> usize {
        self.by_target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_target.is_empty()
    }

    pub fn contains(&self, target: Entity) -> bool {
        self.by_target.contains_key(&target)
    }

    pub fn key_of(&self, target: Entity) -> Option<OccupantKey> {
        self.by_target.get(&target).copied()
    }

    /// Still-valid check: stale key → None
    pub fn resolve(&self, key: OccupantKey) -> Option<Entity> {
        let slot = self.slots.get(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.occupant.map(|occupant| occupant.target)
    }

    pub fn handle_of(&self, target: Entity) -> Option<EffectHandle> {
        let key = self.key_of(target)?;
        let slot = self.slots.get(key.index as usize)?;
        slot.occupant.map(|occupant| occupant.handle)
    }

    /// Вызывающий гарантирует, что target ещё не в таблице
    pub fn insert(&mut self, target: Entity, handle: EffectHandle) -> OccupantKey {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(OccupantSlot::default());
                (self.slots.len() - 1) as u16
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.occupant = Some(Occupant { target, handle });
        let key = OccupantKey {
            index,
            generation: slot.generation,
        };
        self.by_target.insert(target, key);
        key
    }

    /// Удаляет запись target, возвращает его handle
    pub fn remove(&mut self, target: Entity) -> Option<EffectHandle> {
        let key = self.by_target.remove(&target)?;
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let occupant = slot.occupant.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        Some(occupant.handle)
    }

    /// Очищает таблицу, отдаёт все handles (порядок по index)
    pub fn drain(&mut self) -> Vec<(Entity, EffectHandle)> {
        let mut released = Vec::with_capacity(self.by_target.len());
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(occupant) = slot.occupant.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u16);
                released.push((occupant.target, occupant.handle));
            }
        }
        self.by_target.clear();
        released
    }

    pub fn targets(&self) -> Vec<Entity> {
        self.slots
            .iter()
            .filter_map(|slot| slot.occupant.map(|occupant| occupant.target))
            .collect()
    }
}

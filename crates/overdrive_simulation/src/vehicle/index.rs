//! VehicleId → Entity (сетевые сообщения адресуют машины по id)

use bevy::prelude::*;
use std::collections::HashMap;

use crate::components::{Vehicle, VehicleId};

#[derive(Resource, Debug, Default)]
pub struct VehicleIndex {
    by_id: HashMap<VehicleId, Entity>,
}

impl VehicleIndex {
    pub fn get(&self, id: VehicleId) -> Option<Entity> {
        self.by_id.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Observer: новая машина
pub fn index_vehicle_on_add(trigger: Trigger<OnAdd, Vehicle>, vehicles: Query<&Vehicle>, mut index: ResMut<VehicleIndex>) {
    let entity = trigger.target();
    if let Ok(vehicle) = vehicles.get(entity) {
        if let Some(previous) = index.by_id.insert(vehicle.id, entity) {
            crate::log_warning(&format!("⚠️ {} re-registered ({:?} → {:?})", vehicle.id, previous, entity));
        }
    }
}

/// Observer: машина удалена
pub fn unindex_vehicle_on_remove(
    trigger: Trigger<OnRemove, Vehicle>,
    vehicles: Query<&Vehicle>,
    mut index: ResMut<VehicleIndex>,
) {
    let entity = trigger.target();
    if let Ok(vehicle) = vehicles.get(entity) {
        // Только если id всё ещё указывает на эту entity
        if index.by_id.get(&vehicle.id) == Some(&entity) {
            index.by_id.remove(&vehicle.id);
        }
    }
}

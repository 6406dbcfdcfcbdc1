//! Net systems: приём сообщений и репликация attributes

use bevy::prelude::*;
use std::collections::HashMap;

use crate::abilities::{AbilityCommand, AbilityCue, AbilityKind, CueKind, InputOrigin, TeleportOutcome, TeleportRejection};
use crate::attributes::VehicleAttributes;
use crate::components::{Vehicle, VehicleId};
use crate::vehicle::VehicleIndex;

use super::{Envelope, NetInbox, NetMessage, NetOutbox};

/// Значения, которые видит клиент
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttributeSnapshot {
    pub energy: f32,
    pub max_energy: f32,
    pub torque_multiplier: f32,
}

impl AttributeSnapshot {
    pub fn of(attributes: &VehicleAttributes) -> Self {
        Self {
            energy: attributes.energy(),
            max_energy: attributes.max_energy(),
            torque_multiplier: attributes.torque_multiplier(),
        }
    }
}

/// Последние отправленные клиентам значения (только живые машины)
#[derive(Resource, Debug, Default)]
pub struct ReplicatedAttributes {
    sent: HashMap<VehicleId, AttributeSnapshot>,
}

impl ReplicatedAttributes {
    pub fn last_sent(&self, vehicle: VehicleId) -> Option<AttributeSnapshot> {
        self.sent.get(&vehicle).copied()
    }

    pub fn len(&self) -> usize {
        self.sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}

/// System: входящие сообщения клиентов → AbilityCommand (authority)
pub fn receive_on_authority(
    mut inbox: ResMut<NetInbox>,
    index: Res<VehicleIndex>,
    mut commands: EventWriter<AbilityCommand>,
    mut outbox: ResMut<NetOutbox>,
) {
    for message in inbox.drain() {
        let vehicle_id = message.vehicle();
        let vehicle = index.get(vehicle_id);

        match message {
            NetMessage::AbilityInput { input_id, pressed, .. } => {
                let (Some(vehicle), Some(ability)) = (vehicle, AbilityKind::from_input_id(input_id)) else {
                    crate::log_warning(&format!("⚠️ Dropping input {} for {}", input_id, vehicle_id));
                    continue;
                };
                commands.write(if pressed {
                    AbilityCommand::Press {
                        vehicle,
                        ability,
                        origin: InputOrigin::Remote,
                    }
                } else {
                    AbilityCommand::Release {
                        vehicle,
                        ability,
                        origin: InputOrigin::Remote,
                    }
                });
            }
            NetMessage::TeleportRequest {
                seq,
                destination,
                linear_velocity,
                angular_velocity,
                ..
            } => match vehicle {
                Some(vehicle) => {
                    commands.write(AbilityCommand::AuthorizeTeleport {
                        vehicle,
                        seq,
                        destination: Vec3::from_array(destination),
                        linear_velocity: Vec3::from_array(linear_velocity),
                        angular_velocity: Vec3::from_array(angular_velocity),
                    });
                }
                None => {
                    outbox.push(Envelope::reliable(NetMessage::TeleportRejected {
                        vehicle: vehicle_id,
                        seq,
                        position: destination,
                        linear_velocity,
                        angular_velocity,
                        reason: TeleportRejection::UnknownVehicle,
                    }));
                }
            },
            other => {
                crate::log_warning(&format!("⚠️ Authority ignoring client-bound message {:?}", other));
            }
        }
    }
}

/// System: сообщения authority → локальное состояние клиента
pub fn receive_on_client(
    mut inbox: ResMut<NetInbox>,
    index: Res<VehicleIndex>,
    mut attributes: Query<&mut VehicleAttributes>,
    mut commands: EventWriter<AbilityCommand>,
    mut cues: EventWriter<AbilityCue>,
) {
    for message in inbox.drain() {
        let vehicle_id = message.vehicle();
        let Some(vehicle) = index.get(vehicle_id) else {
            crate::log_warning(&format!("⚠️ Message for unknown {}", vehicle_id));
            continue;
        };

        match message {
            NetMessage::AttributeDelta {
                energy,
                max_energy,
                torque_multiplier,
                ..
            } => {
                if let Ok(mut attributes) = attributes.get_mut(vehicle) {
                    attributes.apply_replicated(energy, max_energy, torque_multiplier);
                }
            }
            NetMessage::TeleportConfirmed { seq, destination, .. } => {
                commands.write(AbilityCommand::ReconcileTeleport {
                    vehicle,
                    seq,
                    outcome: TeleportOutcome::Confirmed {
                        destination: Vec3::from_array(destination),
                    },
                });
            }
            NetMessage::TeleportRejected {
                seq,
                position,
                linear_velocity,
                angular_velocity,
                reason,
                ..
            } => {
                commands.write(AbilityCommand::ReconcileTeleport {
                    vehicle,
                    seq,
                    outcome: TeleportOutcome::Rejected {
                        position: Vec3::from_array(position),
                        linear_velocity: Vec3::from_array(linear_velocity),
                        angular_velocity: Vec3::from_array(angular_velocity),
                        reason,
                    },
                });
            }
            NetMessage::AbilityEnded { ability, .. } => {
                commands.write(AbilityCommand::ForceEnd { vehicle, ability });
            }
            NetMessage::TeleportCue { destination, .. } => {
                cues.write(AbilityCue {
                    vehicle,
                    cue: CueKind::BlinkArrival {
                        destination: Vec3::from_array(destination),
                    },
                });
            }
            NetMessage::ImpulseCue { origin, .. } => {
                cues.write(AbilityCue {
                    vehicle,
                    cue: CueKind::Shockwave {
                        origin: Vec3::from_array(origin),
                    },
                });
            }
            other => {
                crate::log_warning(&format!("⚠️ Client ignoring authority-bound message {:?}", other));
            }
        }
    }
}

/// System: изменившиеся attributes → AttributeDelta (authority, конец tick).
/// Записи удалённых машин выкидываются.
pub fn replicate_attributes(
    vehicles: Query<(&Vehicle, &VehicleAttributes)>,
    mut replicated: ResMut<ReplicatedAttributes>,
    mut outbox: ResMut<NetOutbox>,
) {
    let mut current: Vec<(VehicleId, AttributeSnapshot)> = vehicles
        .iter()
        .map(|(vehicle, attributes)| (vehicle.id, AttributeSnapshot::of(attributes)))
        .collect();
    current.sort_by_key(|(id, _)| *id);

    replicated
        .sent
        .retain(|id, _| current.binary_search_by_key(id, |(current_id, _)| *current_id).is_ok());

    for (id, snapshot) in current {
        if replicated.sent.get(&id) == Some(&snapshot) {
            continue;
        }
        replicated.sent.insert(id, snapshot);
        outbox.push(Envelope::reliable(NetMessage::AttributeDelta {
            vehicle: id,
            energy: snapshot.energy,
            max_energy: snapshot.max_energy,
            torque_multiplier: snapshot.torque_multiplier,
        }));
    }
}

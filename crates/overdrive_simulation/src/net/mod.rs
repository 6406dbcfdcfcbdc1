//! Net contract между authority и клиентами
//!
//! Архитектура:
//! - `NetRole` выбирается при создании App (Authority | Client)
//! - `NetMessage` (serde): явные сообщения вместо implicit replication/RPC
//! - `NetOutbox` → transport → `NetInbox`; in-process transport = `deliver`
//!   (RON encode/decode, unreliable можно дропнуть)
//! - Клиент реконсилирует teleport (last-confirmed-wins), energy/max/torque
//!   multiplier приходят через AttributeDelta
//!
//! Reliable: AbilityInput, TeleportRequest, AttributeDelta, TeleportConfirmed,
//! TeleportRejected, AbilityEnded. Best-effort: TeleportCue, ImpulseCue.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::abilities::{AbilityKind, TeleportRejection};
use crate::components::VehicleId;

pub mod systems;

pub use systems::{
    receive_on_authority, receive_on_client, replicate_attributes, AttributeSnapshot, ReplicatedAttributes,
};

#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetRole {
    /// Server: единственный writer canonical state
    Authority,
    /// Предсказывает локально, реконсилирует по сообщениям authority
    Client,
}

impl NetRole {
    pub fn is_authority(&self) -> bool {
        matches!(self, NetRole::Authority)
    }
}

/// Run condition
pub fn is_authority(role: Res<NetRole>) -> bool {
    role.is_authority()
}

/// Run condition
pub fn is_client(role: Res<NetRole>) -> bool {
    !role.is_authority()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    Reliable,
    Unreliable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NetMessage {
    // client → authority
    AbilityInput {
        vehicle: VehicleId,
        input_id: u8,
        pressed: bool,
    },
    TeleportRequest {
        vehicle: VehicleId,
        seq: u32,
        destination: [f32; 3],
        linear_velocity: [f32; 3],
        angular_velocity: [f32; 3],
    },

    // authority → clients
    AttributeDelta {
        vehicle: VehicleId,
        energy: f32,
        max_energy: f32,
        torque_multiplier: f32,
    },
    TeleportConfirmed {
        vehicle: VehicleId,
        seq: u32,
        destination: [f32; 3],
    },
    /// Позиция и velocities authority: клиент телепортируется обратно
    TeleportRejected {
        vehicle: VehicleId,
        seq: u32,
        position: [f32; 3],
        linear_velocity: [f32; 3],
        angular_velocity: [f32; 3],
        reason: TeleportRejection,
    },
    AbilityEnded {
        vehicle: VehicleId,
        ability: AbilityKind,
    },
    TeleportCue {
        vehicle: VehicleId,
        destination: [f32; 3],
    },
    ImpulseCue {
        vehicle: VehicleId,
        origin: [f32; 3],
    },
}

impl NetMessage {
    pub fn vehicle(&self) -> VehicleId {
        match self {
            NetMessage::AbilityInput { vehicle, .. }
            | NetMessage::TeleportRequest { vehicle, .. }
            | NetMessage::AttributeDelta { vehicle, .. }
            | NetMessage::TeleportConfirmed { vehicle, .. }
            | NetMessage::TeleportRejected { vehicle, .. }
            | NetMessage::AbilityEnded { vehicle, .. }
            | NetMessage::TeleportCue { vehicle, .. }
            | NetMessage::ImpulseCue { vehicle, .. } => *vehicle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub channel: Channel,
    pub message: NetMessage,
}

impl Envelope {
    pub fn reliable(message: NetMessage) -> Self {
        Self {
            channel: Channel::Reliable,
            message,
        }
    }

    pub fn unreliable(message: NetMessage) -> Self {
        Self {
            channel: Channel::Unreliable,
            message,
        }
    }

    pub fn encode(&self) -> Result<String, NetError> {
        Ok(ron::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, NetError> {
        Ok(ron::from_str(text)?)
    }
}

#[derive(Debug, Error)]
pub enum NetError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] ron::Error),
    #[error("failed to decode message: {0}")]
    Decode(#[from] ron::error::SpannedError),
}

/// Исходящие сообщения этого side (копятся за tick)
#[derive(Resource, Debug, Default)]
pub struct NetOutbox {
    pending: Vec<Envelope>,
}

impl NetOutbox {
    pub fn push(&mut self, envelope: Envelope) {
        self.pending.push(envelope);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Envelope> {
        self.pending.iter()
    }

    pub fn drain(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.pending)
    }
}

/// Входящие сообщения (обрабатываются в начале следующего tick)
#[derive(Resource, Debug, Default)]
pub struct NetInbox {
    pending: Vec<NetMessage>,
}

impl NetInbox {
    pub fn push(&mut self, message: NetMessage) {
        self.pending.push(message);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn drain(&mut self) -> Vec<NetMessage> {
        std::mem::take(&mut self.pending)
    }
}

/// In-process transport: outbox → wire (RON) → inbox.
///
/// `drop_unreliable` эмулирует потерю best-effort пакетов.
/// Битое сообщение логируется и пропускается. Возвращает число доставленных.
pub fn deliver(outbox: &mut NetOutbox, inbox: &mut NetInbox, drop_unreliable: bool) -> usize {
    let mut delivered = 0;
    for envelope in outbox.drain() {
        if drop_unreliable && envelope.channel == Channel::Unreliable {
            continue;
        }

        let decoded = envelope.encode().and_then(|wire| Envelope::decode(&wire));
        match decoded {
            Ok(received) => {
                inbox.push(received.message);
                delivered += 1;
            }
            Err(error) => crate::log_error(&format!("❌ Net transport error: {}", error)),
        }
    }
    delivered
}

/// Переносит outbox одного World в inbox другого
pub fn pump_between(from: &mut World, to: &mut World, drop_unreliable: bool) -> usize {
    let Some(mut outbox) = from.get_resource_mut::<NetOutbox>() else {
        return 0;
    };
    let mut staged = NetOutbox {
        pending: outbox.drain(),
    };

    match to.get_resource_mut::<NetInbox>() {
        Some(mut inbox) => deliver(&mut staged, &mut inbox, drop_unreliable),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wire_roundtrip() {
        let envelope = Envelope::reliable(NetMessage::TeleportRejected {
            vehicle: VehicleId(3),
            seq: 9,
            position: [1.0, 2.0, 3.0],
            linear_velocity: [0.0, 0.0, -4.0],
            angular_velocity: [0.0; 3],
            reason: TeleportRejection::TooFar {
                requested: 14.0,
                allowed: 11.0,
            },
        });

        let wire = envelope.encode().expect("encode");
        assert_eq!(Envelope::decode(&wire).expect("decode"), envelope);
    }

    #[test]
    fn test_deliver_drops_only_unreliable() {
        let mut outbox = NetOutbox::default();
        let mut inbox = NetInbox::default();

        outbox.push(Envelope::reliable(NetMessage::AttributeDelta {
            vehicle: VehicleId(1),
            energy: 50.0,
            max_energy: 100.0,
            torque_multiplier: 1.0,
        }));
        outbox.push(Envelope::unreliable(NetMessage::ImpulseCue {
            vehicle: VehicleId(1),
            origin: [0.0; 3],
        }));

        assert_eq!(deliver(&mut outbox, &mut inbox, true), 1);
        assert!(outbox.is_empty());
        let received = inbox.drain();
        assert_eq!(received.len(), 1);
        assert!(matches!(received[0], NetMessage::AttributeDelta { .. }));
    }

    #[test]
    fn test_decode_garbage_is_error() {
        assert!(matches!(Envelope::decode("(channel: Nope"), Err(NetError::Decode(_))));
    }
}

//! Ability error taxonomy
//!
//! Ни одна из ошибок не уходит в host: dispatcher логирует и молча
//! отказывает в активации.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::AbilityKind;

/// Почему ability не стартовала (или отменилась сразу после старта)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActivationError {
    #[error("insufficient energy: need {required}, have {available}")]
    InsufficientEnergy { required: f32, available: f32 },
    #[error("{0:?} is on cooldown")]
    OnCooldown(AbilityKind),
    #[error("{0:?} is already active")]
    AlreadyActive(AbilityKind),
    #[error("missing component: {0}")]
    MissingComponent(&'static str),
    #[error("no safe destination: travelled {travelled:.2}m, need {minimum:.2}m")]
    NoSafeDestination { travelled: f32, minimum: f32 },
}

/// Authority отклонил клиентский teleport request
#[derive(Debug, Clone, Copy, PartialEq, Error, Serialize, Deserialize)]
pub enum TeleportRejection {
    #[error("requested destination is too far: {requested:.2}m > {allowed:.2}m")]
    TooFar { requested: f32, allowed: f32 },
    #[error("path to destination is blocked")]
    Blocked,
    #[error("insufficient energy")]
    InsufficientEnergy,
    #[error("blink is on cooldown")]
    OnCooldown,
    #[error("vehicle is not known to the authority")]
    UnknownVehicle,
}

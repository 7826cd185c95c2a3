//! Outbound events produced by the recognition state machine.

use crate::label::{Label, Name};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Message carried by every unknown-subject alert.
pub const UNKNOWN_ALERT_MESSAGE: &str = "Rosto desconhecido detectado!";

/// A confirmed change of the authoritative identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityEvent {
    pub label: Label,
    pub timestamp: DateTime<Utc>,
}

/// A throttled notification that an unknown face was confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertEvent {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    pub fn unknown_subject(timestamp: DateTime<Utc>) -> Self {
        Self {
            message: UNKNOWN_ALERT_MESSAGE.to_string(),
            timestamp,
        }
    }
}

/// Door actuation request issued when a known person is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DoorCommand {
    pub command: &'static str,
    pub user: Name,
}

impl DoorCommand {
    pub fn open(user: Name) -> Self {
        Self {
            command: "open",
            user,
        }
    }
}

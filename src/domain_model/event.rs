use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_EVENT_ID_LEN: usize = 255;

#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        EventId(s.to_owned())
    }
}

/// Event types the billing processor sends. Anything else lands in
/// `Unknown` and is acknowledged without dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    SubscriptionCreated,
    SubscriptionRenewed,
    SubscriptionCancelled,
    PaymentSucceeded,
    PaymentFailed,
    Unknown(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::SubscriptionCreated => "subscription.created",
            Self::SubscriptionRenewed => "subscription.renewed",
            Self::SubscriptionCancelled => "subscription.cancelled",
            Self::PaymentSucceeded => "payment.succeeded",
            Self::PaymentFailed => "payment.failed",
            Self::Unknown(other) => other,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        match s {
            "subscription.created" => Self::SubscriptionCreated,
            "subscription.renewed" => Self::SubscriptionRenewed,
            "subscription.cancelled" => Self::SubscriptionCancelled,
            "payment.succeeded" => Self::PaymentSucceeded,
            "payment.failed" => Self::PaymentFailed,
            other => Self::Unknown(other.to_owned()),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(EventKind::from(s.as_str()))
    }
}

/// Envelope as it arrives on the wire, after the signature has been checked.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    pub id: EventId,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct InboundEvent {
    pub event_id: EventId,
    pub kind: EventKind,
    pub created: Option<i64>,
    pub payload: serde_json::Value,
    pub received_signature: String,
}

impl InboundEvent {
    pub fn from_envelope(envelope: EventEnvelope, received_signature: impl Into<String>) -> Self {
        InboundEvent {
            event_id: envelope.id,
            kind: envelope.kind,
            created: envelope.created,
            payload: envelope.payload,
            received_signature: received_signature.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupStatus {
    Pending,
    Succeeded,
    Failed,
}

impl DedupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Marker that an event id was accepted for processing. Kept for the
/// redelivery horizon, together with the payload for operator replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupRecord {
    pub event_id: EventId,
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub status: DedupStatus,
    pub last_error: Option<String>,
    pub received_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DedupRecord {
    pub fn pending(event: &InboundEvent, now: DateTime<Utc>) -> Self {
        DedupRecord {
            event_id: event.event_id.clone(),
            kind: event.kind.clone(),
            payload: event.payload.clone(),
            status: DedupStatus::Pending,
            last_error: None,
            received_at: now,
            updated_at: now,
        }
    }

    pub fn to_event(&self) -> InboundEvent {
        InboundEvent {
            event_id: self.event_id.clone(),
            kind: self.kind.clone(),
            created: None,
            payload: self.payload.clone(),
            received_signature: String::new(),
        }
    }
}

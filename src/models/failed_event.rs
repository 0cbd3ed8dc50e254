// src/models/failed_event.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default retry budget for newly captured events.
pub const MAX_RETRIES: i32 = 5;

/// A billing event whose processing failed. The raw payload is stored
/// verbatim so the retry sweep can replay it once the fault clears.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailedEvent {
    pub id: Uuid,
    pub event_type: String,
    pub event_publisher: String,
    pub payload: serde_json::Value,
    pub error_message: String,
    pub retry_count: i32,
    pub max_retries: i32,
    pub status: FailedEventStatus,
    pub next_retry: DateTime<Utc>,
    pub tm_create: Option<DateTime<Utc>>,
    pub tm_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailedEventStatus {
    Pending,
    Retrying,
    Exhausted,
}

impl FailedEventStatus {
    pub fn from_str(s: &str) -> Self {
        match s {
            "retrying" => FailedEventStatus::Retrying,
            "exhausted" => FailedEventStatus::Exhausted,
            _ => FailedEventStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FailedEventStatus::Pending => "pending",
            FailedEventStatus::Retrying => "retrying",
            FailedEventStatus::Exhausted => "exhausted",
        }
    }
}

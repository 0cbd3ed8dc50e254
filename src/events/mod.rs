// src/events/mod.rs
pub mod handler;

pub use handler::EventHandler;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::BillingError;

/// Envelope shared by every event crossing the bus. `data` holds the
/// payload matching `data_type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub event_type: String,
    pub publisher: String,
    pub data_type: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    Tel,
    Extension,
    Sip,
    Line,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Address {
    #[serde(rename = "type")]
    pub address_type: AddressType,
    pub target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallEventData {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub source: Address,
    pub destination: Address,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub tm_progressing: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tm_hangup: Option<DateTime<Utc>>,
}

impl CallEventData {
    /// Extension-to-extension traffic stays inside the platform and is
    /// never charged.
    pub fn is_extension_call(&self) -> bool {
        self.source.address_type == AddressType::Extension
            && self.destination.address_type == AddressType::Extension
    }

    /// Connected seconds, zero when either timestamp is missing or the
    /// call never answered.
    pub fn duration_secs(&self) -> i64 {
        match (self.tm_progressing, self.tm_hangup) {
            (Some(start), Some(end)) if end > start => (end - start).num_seconds(),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageEventData {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub source: Address,
    pub targets: Vec<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NumberEventData {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub number: String,
    #[serde(default)]
    pub number_type: String,
}

impl NumberEventData {
    /// Virtual numbers are platform internal and carry no charge.
    pub fn is_virtual(&self) -> bool {
        self.number_type == "virtual"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailEventData {
    pub id: Uuid,
    pub customer_id: Uuid,
}

/// Outbound notifications, one per state change the service applies.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &Event) -> Result<(), BillingError>;
}

/// Inbound processing seam. The retry sweep replays stored payloads
/// through the same trait the live dispatcher implements.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventProcessor: Send + Sync {
    async fn process(&self, event: &Event) -> Result<(), BillingError>;
}

/// Publisher that only writes to the log stream. Stands in where no bus
/// is configured.
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &Event) -> Result<(), BillingError> {
        info!(
            "Event published: {} ({})",
            event.event_type, event.data_type
        );
        Ok(())
    }
}

/// Deterministic per-target billing reference for fan-out messages, so a
/// replayed message event cannot double-charge any target.
pub fn message_target_reference(message_id: &Uuid, target_index: usize) -> Uuid {
    Uuid::new_v5(message_id, format!("target-{}", target_index).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn extension_call_detection() {
        let mut data = CallEventData {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            source: Address {
                address_type: AddressType::Extension,
                target: "1001".to_string(),
            },
            destination: Address {
                address_type: AddressType::Extension,
                target: "1002".to_string(),
            },
            direction: None,
            tm_progressing: None,
            tm_hangup: None,
        };
        assert!(data.is_extension_call());

        data.destination.address_type = AddressType::Tel;
        assert!(!data.is_extension_call());
    }

    #[test]
    fn call_duration_from_timestamps() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 1, 12, 2, 30).unwrap();
        let data = CallEventData {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            source: Address {
                address_type: AddressType::Tel,
                target: "+15551230001".to_string(),
            },
            destination: Address {
                address_type: AddressType::Tel,
                target: "+15551230002".to_string(),
            },
            direction: None,
            tm_progressing: Some(start),
            tm_hangup: Some(end),
        };
        assert_eq!(data.duration_secs(), 150);

        // Never-answered calls have no progressing timestamp.
        let unanswered = CallEventData {
            tm_progressing: None,
            ..data
        };
        assert_eq!(unanswered.duration_secs(), 0);
    }

    #[tokio::test]
    async fn mock_publisher_receives_events() {
        let mut publisher = MockEventPublisher::new();
        publisher
            .expect_publish()
            .withf(|event| event.event_type == "account_updated")
            .times(1)
            .returning(|_| Ok(()));

        let event = Event {
            event_type: "account_updated".to_string(),
            publisher: "billing-manager".to_string(),
            data_type: "account".to_string(),
            data: serde_json::json!({}),
        };
        publisher.publish(&event).await.unwrap();
    }

    #[test]
    fn message_target_references_are_stable_and_distinct() {
        let message_id = Uuid::new_v4();
        let a = message_target_reference(&message_id, 0);
        let b = message_target_reference(&message_id, 1);
        assert_ne!(a, b);
        assert_eq!(a, message_target_reference(&message_id, 0));
    }
}

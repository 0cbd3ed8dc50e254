// src/services/failed_events.rs
use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, warn};

use crate::error::BillingError;
use crate::events::{Event, EventProcessor};
use crate::models::failed_event::{FailedEvent, FailedEventStatus, MAX_RETRIES};
use crate::store::Store;

/// Delay before the first replay attempt.
const FIRST_RETRY_DELAY_SECS: i64 = 60;

/// Base of the exponential backoff, in minutes: 5, 25, 125, 625.
const BACKOFF_BASE_MINUTES: i64 = 5;

const RETRY_BATCH_SIZE: i64 = 50;

pub struct RetrySummary {
    pub replayed: usize,
    pub rescheduled: usize,
    pub exhausted: usize,
}

/// Schedule for a failed replay attempt.
#[derive(Debug, PartialEq, Eq)]
pub struct RetryPlan {
    pub retry_count: i32,
    pub status: FailedEventStatus,
    pub next_retry: DateTime<Utc>,
}

/// Where an event goes after its replay attempt number `retry_count + 1`
/// fails at `now`.
pub fn next_attempt(retry_count: i32, max_retries: i32, now: DateTime<Utc>) -> RetryPlan {
    let new_count = retry_count + 1;
    if new_count >= max_retries {
        return RetryPlan {
            retry_count: new_count,
            status: FailedEventStatus::Exhausted,
            next_retry: now,
        };
    }
    let minutes = BACKOFF_BASE_MINUTES.pow(new_count as u32);
    RetryPlan {
        retry_count: new_count,
        status: FailedEventStatus::Retrying,
        next_retry: now + Duration::minutes(minutes),
    }
}

/// Durability layer for billing events that could not be applied. Events
/// are stored with their raw payload and replayed on a schedule until
/// they succeed or run out of attempts.
pub struct FailedEventService {
    store: Store,
}

impl FailedEventService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Persist a failed event for later replay.
    pub async fn save(
        &self,
        event: &Event,
        error_message: &str,
    ) -> Result<FailedEvent, BillingError> {
        let payload = serde_json::to_value(event)?;
        let next_retry = self.store.clock().now() + Duration::seconds(FIRST_RETRY_DELAY_SECS);
        self.store
            .failed_event_create(
                &event.event_type,
                &event.publisher,
                &payload,
                error_message,
                MAX_RETRIES,
                next_retry,
            )
            .await
    }

    /// Replay everything due. One bad event never blocks the rest of
    /// the batch.
    pub async fn retry_pending(
        &self,
        processor: &dyn EventProcessor,
    ) -> Result<RetrySummary, BillingError> {
        let now = self.store.clock().now();
        let due = self.store.failed_event_list_due(now, RETRY_BATCH_SIZE).await?;

        let mut summary = RetrySummary {
            replayed: 0,
            rescheduled: 0,
            exhausted: 0,
        };

        for item in due {
            match self.retry_one(processor, &item, now).await {
                Ok(Outcome::Replayed) => summary.replayed += 1,
                Ok(Outcome::Rescheduled) => summary.rescheduled += 1,
                Ok(Outcome::Exhausted) => summary.exhausted += 1,
                Err(e) => {
                    error!("Retry bookkeeping failed for event {}: {}", item.id, e);
                }
            }
        }

        if summary.replayed + summary.rescheduled + summary.exhausted > 0 {
            info!(
                "Retry sweep done: {} replayed, {} rescheduled, {} exhausted",
                summary.replayed, summary.rescheduled, summary.exhausted
            );
        }
        Ok(summary)
    }

    async fn retry_one(
        &self,
        processor: &dyn EventProcessor,
        item: &FailedEvent,
        now: DateTime<Utc>,
    ) -> Result<Outcome, BillingError> {
        // A payload that no longer deserializes can never succeed; park
        // it without burning a processor call.
        let event: Event = match serde_json::from_value(item.payload.clone()) {
            Ok(event) => event,
            Err(e) => {
                warn!("Failed event {} has an unreadable payload: {}", item.id, e);
                self.store
                    .failed_event_update_retry(
                        &item.id,
                        item.retry_count,
                        FailedEventStatus::Exhausted,
                        now,
                        &format!("unreadable payload: {}", e),
                    )
                    .await?;
                return Ok(Outcome::Exhausted);
            }
        };

        match processor.process(&event).await {
            Ok(()) => {
                self.store.failed_event_delete(&item.id).await?;
                info!("Failed event {} replayed successfully", item.id);
                Ok(Outcome::Replayed)
            }
            Err(process_err) => {
                let plan = next_attempt(item.retry_count, item.max_retries, now);
                let exhausted = plan.status == FailedEventStatus::Exhausted;
                self.store
                    .failed_event_update_retry(
                        &item.id,
                        plan.retry_count,
                        plan.status,
                        plan.next_retry,
                        &process_err.to_string(),
                    )
                    .await?;
                if exhausted {
                    warn!(
                        "Failed event {} exhausted after {} attempts",
                        item.id, plan.retry_count
                    );
                    Ok(Outcome::Exhausted)
                } else {
                    Ok(Outcome::Rescheduled)
                }
            }
        }
    }
}

enum Outcome {
    Replayed,
    Rescheduled,
    Exhausted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn backoff_grows_exponentially() {
        let now = Utc.with_ymd_and_hms(2026, 4, 1, 10, 0, 0).unwrap();

        let plan = next_attempt(0, MAX_RETRIES, now);
        assert_eq!(plan.retry_count, 1);
        assert_eq!(plan.status, FailedEventStatus::Retrying);
        assert_eq!(plan.next_retry, now + Duration::minutes(5));

        let plan = next_attempt(1, MAX_RETRIES, now);
        assert_eq!(plan.next_retry, now + Duration::minutes(25));

        let plan = next_attempt(2, MAX_RETRIES, now);
        assert_eq!(plan.next_retry, now + Duration::minutes(125));

        let plan = next_attempt(3, MAX_RETRIES, now);
        assert_eq!(plan.retry_count, 4);
        assert_eq!(plan.status, FailedEventStatus::Retrying);
        assert_eq!(plan.next_retry, now + Duration::minutes(625));
    }

    #[test]
    fn fifth_failure_exhausts() {
        let now = Utc.with_ymd_and_hms(2026, 4, 1, 10, 0, 0).unwrap();
        let plan = next_attempt(4, MAX_RETRIES, now);
        assert_eq!(plan.retry_count, 5);
        assert_eq!(plan.status, FailedEventStatus::Exhausted);
    }
}

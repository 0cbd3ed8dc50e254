// src/store/failed_events.rs
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::{FailedEvent, FailedEventStatus};
use crate::store::{map_db_err, Store};

const FAILED_EVENT_COLS: &str = "id, event_type, event_publisher, payload, error_message, \
     retry_count, max_retries, status, next_retry, tm_create, tm_update";

pub(crate) fn row_to_failed_event(row: &tokio_postgres::Row) -> FailedEvent {
    let status: String = row.get(7);
    FailedEvent {
        id: row.get(0),
        event_type: row.get(1),
        event_publisher: row.get(2),
        payload: row.get(3),
        error_message: row.get(4),
        retry_count: row.get(5),
        max_retries: row.get(6),
        status: FailedEventStatus::from_str(&status),
        next_retry: row.get(8),
        tm_create: row.get(9),
        tm_update: row.get(10),
    }
}

impl Store {
    pub async fn failed_event_create(
        &self,
        event_type: &str,
        event_publisher: &str,
        payload: &serde_json::Value,
        error_message: &str,
        max_retries: i32,
        next_retry: DateTime<Utc>,
    ) -> Result<FailedEvent, BillingError> {
        let id = Uuid::new_v4();
        let now = self.clock.now();

        let client = self
            .db_pool
            .get()
            .await
            .map_err(BillingError::Pool)?;

        let row = client
            .query_one(
                &*format!(
                    "INSERT INTO billing_failed_events
                     (id, event_type, event_publisher, payload, error_message, retry_count,
                      max_retries, status, next_retry, tm_create, tm_update)
                     VALUES ($1, $2, $3, $4, $5, 0, $6, $7, $8, $9, $9)
                     RETURNING {}",
                    FAILED_EVENT_COLS
                ),
                &[
                    &id,
                    &event_type,
                    &event_publisher,
                    &payload,
                    &error_message,
                    &max_retries,
                    &FailedEventStatus::Pending.as_str(),
                    &next_retry,
                    &now,
                ],
            )
            .await
            .map_err(map_db_err)?;

        let event = row_to_failed_event(&row);
        info!("Failed event saved: {} ({})", event.id, event_type);
        Ok(event)
    }

    /// Events whose retry is due at `now`, oldest first. Exhausted rows
    /// never come back.
    pub async fn failed_event_list_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<FailedEvent>, BillingError> {
        let client = self
            .db_pool
            .get()
            .await
            .map_err(BillingError::Pool)?;

        let rows = client
            .query(
                &*format!(
                    "SELECT {} FROM billing_failed_events
                     WHERE status != $1 AND next_retry <= $2
                     ORDER BY next_retry ASC
                     LIMIT $3",
                    FAILED_EVENT_COLS
                ),
                &[&FailedEventStatus::Exhausted.as_str(), &now, &limit],
            )
            .await?;

        Ok(rows.iter().map(row_to_failed_event).collect())
    }

    pub async fn failed_event_update_retry(
        &self,
        event_id: &Uuid,
        retry_count: i32,
        status: FailedEventStatus,
        next_retry: DateTime<Utc>,
        error_message: &str,
    ) -> Result<FailedEvent, BillingError> {
        let now = self.clock.now();
        let client = self
            .db_pool
            .get()
            .await
            .map_err(BillingError::Pool)?;

        let row = client
            .query_opt(
                &*format!(
                    "UPDATE billing_failed_events
                     SET retry_count = $1, status = $2, next_retry = $3,
                         error_message = $4, tm_update = $5
                     WHERE id = $6
                     RETURNING {}",
                    FAILED_EVENT_COLS
                ),
                &[
                    &retry_count,
                    &status.as_str(),
                    &next_retry,
                    &error_message,
                    &now,
                    &event_id,
                ],
            )
            .await?
            .ok_or(BillingError::NotFound)?;

        Ok(row_to_failed_event(&row))
    }

    /// Successful replays delete the row outright.
    pub async fn failed_event_delete(&self, event_id: &Uuid) -> Result<(), BillingError> {
        let client = self
            .db_pool
            .get()
            .await
            .map_err(BillingError::Pool)?;

        let deleted = client
            .execute("DELETE FROM billing_failed_events WHERE id = $1", &[&event_id])
            .await?;

        if deleted == 0 {
            return Err(BillingError::NotFound);
        }
        Ok(())
    }
}

// src/events/handler.rs
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::error::BillingError;
use crate::events::{
    message_target_reference, CallEventData, EmailEventData, Event, EventProcessor,
    MessageEventData, NumberEventData,
};
use crate::models::billing::{CostType, ReferenceType};
use crate::services::billing::BillingService;
use crate::services::failed_events::FailedEventService;

/// Applies inbound platform events to the ledger. Every branch is
/// replay safe, so a stored copy of the same event can run again after
/// a transient failure without double charging.
pub struct EventHandler {
    billing: Arc<BillingService>,
    failed_events: Arc<FailedEventService>,
}

impl EventHandler {
    pub fn new(billing: Arc<BillingService>, failed_events: Arc<FailedEventService>) -> Self {
        Self {
            billing,
            failed_events,
        }
    }

    /// Live dispatch entry point: failures are captured into the
    /// durability layer instead of being surfaced to the caller.
    pub async fn handle(&self, event: &Event) {
        if let Err(e) = self.process(event).await {
            error!("Event {} failed: {}", event.event_type, e);
            if let Err(save_err) = self.failed_events.save(event, &e.to_string()).await {
                error!(
                    "Could not persist failed event {}: {}",
                    event.event_type, save_err
                );
            }
        }
    }

    async fn handle_call_progressing(&self, event: &Event) -> Result<(), BillingError> {
        let data: CallEventData = serde_json::from_value(event.data.clone())?;

        let (reference_type, cost_type) = if data.is_extension_call() {
            (ReferenceType::CallExtension, CostType::CallExtension)
        } else if data.direction.as_deref() == Some("incoming") {
            (ReferenceType::Call, CostType::CallPstnIncoming)
        } else {
            (ReferenceType::Call, CostType::CallPstnOutgoing)
        };

        let billing = self
            .billing
            .billing_start(data.customer_id, reference_type, data.id, cost_type)
            .await?;
        info!("Call {} progressing (billing {})", data.id, billing.id);
        Ok(())
    }

    async fn handle_call_hangup(&self, event: &Event) -> Result<(), BillingError> {
        let data: CallEventData = serde_json::from_value(event.data.clone())?;

        let reference_type = if data.is_extension_call() {
            ReferenceType::CallExtension
        } else {
            ReferenceType::Call
        };

        let duration = data.duration_secs();
        match self
            .billing
            .billing_end(reference_type, &data.id, duration)
            .await
        {
            Ok(billing) => {
                info!(
                    "Call {} hung up after {}s (billing {})",
                    data.id, duration, billing.id
                );
                Ok(())
            }
            // A hangup for a call that never opened a window happens
            // when the call failed before progressing. Nothing to bill.
            Err(BillingError::NotFound) => {
                warn!("Hangup for unknown call {}; skipping", data.id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn handle_message_created(&self, event: &Event) -> Result<(), BillingError> {
        let data: MessageEventData = serde_json::from_value(event.data.clone())?;

        for (index, _target) in data.targets.iter().enumerate() {
            let reference_id = message_target_reference(&data.id, index);
            self.billing
                .billing_instant(
                    data.customer_id,
                    ReferenceType::Sms,
                    reference_id,
                    CostType::Sms,
                    1,
                )
                .await?;
        }
        info!(
            "Message {} billed for {} target(s)",
            data.id,
            data.targets.len()
        );
        Ok(())
    }

    async fn handle_email_created(&self, event: &Event) -> Result<(), BillingError> {
        let data: EmailEventData = serde_json::from_value(event.data.clone())?;
        self.billing
            .billing_instant(
                data.customer_id,
                ReferenceType::Email,
                data.id,
                CostType::Email,
                1,
            )
            .await?;
        Ok(())
    }

    async fn handle_number(&self, event: &Event, cost_type: CostType) -> Result<(), BillingError> {
        let data: NumberEventData = serde_json::from_value(event.data.clone())?;
        if data.is_virtual() {
            info!("Number {} is virtual; no charge", data.number);
            return Ok(());
        }
        self.billing
            .billing_instant(
                data.customer_id,
                ReferenceType::Number,
                data.id,
                cost_type,
                1,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl EventProcessor for EventHandler {
    async fn process(&self, event: &Event) -> Result<(), BillingError> {
        match event.event_type.as_str() {
            "call_progressing" => self.handle_call_progressing(event).await,
            "call_hangup" => self.handle_call_hangup(event).await,
            "message_created" => self.handle_message_created(event).await,
            "email_created" => self.handle_email_created(event).await,
            "number_created" => self.handle_number(event, CostType::NumberPurchase).await,
            "number_renewed" => self.handle_number(event, CostType::NumberRenew).await,
            other => {
                warn!("Ignoring unknown event type: {}", other);
                Ok(())
            }
        }
    }
}

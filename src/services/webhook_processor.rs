use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::cache::keys::webhook::ProcessedEventKey;
use crate::cache::RedisCache;
use crate::error::{AppError, ErrorCode};
use crate::payments::types::WebhookEventKind;
use crate::payments::PaymentGateway;
use crate::services::payment_verification::PaymentVerificationService;

const PROCESSED_EVENT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error)]
pub enum WebhookProcessorError {
    #[error("Payment gateway is not configured")]
    NotConfigured,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("Processing error: {0}")]
    ProcessingError(#[from] AppError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Confirmed {
        order_number: String,
        already_confirmed: bool,
    },
    Failed {
        gateway_order_id: String,
    },
    /// Accepted but needs no action (unknown order, unhandled event type, or
    /// an order that needs manual reconciliation)
    Ignored { event_type: String },
    Duplicate,
}

pub struct WebhookProcessor {
    gateway: Option<Arc<dyn PaymentGateway>>,
    verification: Arc<PaymentVerificationService>,
    cache: Option<RedisCache>,
}

impl WebhookProcessor {
    pub fn new(
        gateway: Option<Arc<dyn PaymentGateway>>,
        verification: Arc<PaymentVerificationService>,
        cache: Option<RedisCache>,
    ) -> Self {
        Self {
            gateway,
            verification,
            cache,
        }
    }

    /// Verify and apply one gateway delivery. `payload` must be the raw body
    /// exactly as received; the signature covers those bytes.
    pub async fn process_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        event_id: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookProcessorError> {
        let gateway = self
            .gateway
            .as_ref()
            .ok_or(WebhookProcessorError::NotConfigured)?;
        let signature = signature.ok_or(WebhookProcessorError::InvalidSignature)?;

        let verification = gateway
            .verify_webhook(payload, signature)
            .map_err(|e| WebhookProcessorError::InvalidPayload(e.to_string()))?;
        if !verification.valid {
            warn!(
                security_event = true,
                gateway = gateway.name(),
                reason = ?verification.reason,
                "Invalid webhook signature"
            );
            return Err(WebhookProcessorError::InvalidSignature);
        }

        let mut event = gateway
            .parse_webhook_event(payload)
            .map_err(|e| WebhookProcessorError::InvalidPayload(e.to_string()))?;
        event.event_id = event_id.map(str::to_string);

        // Fast path for redelivered events; confirmation itself is idempotent
        let dedup_key = event.event_id.as_deref().map(ProcessedEventKey::new);
        if let (Some(cache), Some(key)) = (&self.cache, &dedup_key) {
            match cache.set_if_absent(key, PROCESSED_EVENT_TTL).await {
                Ok(false) => {
                    info!(event_id = %key.event_id, "Webhook already processed");
                    return Ok(WebhookOutcome::Duplicate);
                }
                Ok(true) => {}
                Err(e) => warn!(error = %e, "webhook dedup check failed, processing anyway"),
            }
        }

        let result = self.apply(&event.event_type, event.kind, &event).await;

        if result.is_err() {
            if let (Some(cache), Some(key)) = (&self.cache, &dedup_key) {
                // Let the gateway's retry through
                if let Err(e) = cache.delete(key).await {
                    warn!(error = %e, "failed to clear webhook dedup marker");
                }
            }
        }
        result
    }

    async fn apply(
        &self,
        event_type: &str,
        kind: WebhookEventKind,
        event: &crate::payments::types::WebhookEvent,
    ) -> Result<WebhookOutcome, WebhookProcessorError> {
        let ignored = || WebhookOutcome::Ignored {
            event_type: event_type.to_string(),
        };

        let Some(gateway_order_id) = event.gateway_order_id.as_deref() else {
            warn!(event_type = %event_type, "webhook without gateway order id");
            return Ok(ignored());
        };

        match kind {
            WebhookEventKind::PaymentCaptured => {
                let Some(payment_id) = event.payment_id.as_deref() else {
                    warn!(event_type = %event_type, "capture webhook without payment id");
                    return Ok(ignored());
                };
                info!(
                    gateway_order_id = %gateway_order_id,
                    payment_id = %payment_id,
                    "Processing payment captured webhook"
                );
                match self
                    .verification
                    .confirm_by_gateway_order(gateway_order_id, payment_id)
                    .await
                {
                    Ok(confirmation) => Ok(WebhookOutcome::Confirmed {
                        order_number: confirmation.order.order_number,
                        already_confirmed: confirmation.already_confirmed,
                    }),
                    Err(e) if Self::is_terminal(&e) => {
                        warn!(
                            gateway_order_id = %gateway_order_id,
                            payment_id = %payment_id,
                            error = %e,
                            "captured payment needs reconciliation"
                        );
                        Ok(ignored())
                    }
                    Err(e) => {
                        error!(gateway_order_id = %gateway_order_id, error = %e, "Webhook processing failed");
                        Err(e.into())
                    }
                }
            }
            WebhookEventKind::PaymentFailed => {
                let reason = event
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| "payment failed at gateway".to_string());
                match self
                    .verification
                    .handle_gateway_failure(gateway_order_id, &reason)
                    .await
                {
                    Ok(_) => Ok(WebhookOutcome::Failed {
                        gateway_order_id: gateway_order_id.to_string(),
                    }),
                    Err(e) if Self::is_terminal(&e) => Ok(ignored()),
                    Err(e) => Err(e.into()),
                }
            }
            WebhookEventKind::Other => {
                info!(event_type = %event_type, "Unhandled webhook event type");
                Ok(ignored())
            }
        }
    }

    /// Errors a gateway retry cannot fix
    fn is_terminal(err: &AppError) -> bool {
        matches!(
            err.error_code(),
            ErrorCode::OrderNotFound | ErrorCode::OrderNotPending | ErrorCode::PaymentConflict
        )
    }
}

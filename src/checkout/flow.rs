//! Submit orchestration: Order Intake, the gateway window and verification

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::checkout::bridge::{GatewayOutcome, PaymentGatewayBridge};
use crate::checkout::client::{ApiError, CheckoutApi};
use crate::checkout::controller::{StepController, SubmitPermit};
use crate::checkout::error::CheckoutError;
use crate::error::ErrorCode;
use crate::types::{
    CouponRejectionReason, GatewayPayload, OrderCreationResult, OrderSummary,
    VerifyPaymentRequest,
};

const DEFAULT_VERIFY_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Confirmed { order: OrderSummary },
    /// Customer closed the gateway window; the pending order is reused on retry
    PaymentDismissed { order_number: String },
}

/// Payload kept after a failed verification so it can be retried
#[derive(Debug, Clone)]
struct PendingVerification {
    order_number: String,
    payload: GatewayPayload,
}

pub struct CheckoutFlow {
    controller: Arc<StepController>,
    api: Arc<dyn CheckoutApi>,
    bridge: Arc<dyn PaymentGatewayBridge>,
    verify_attempts: u32,
    retry_delay: Duration,
    pending: Mutex<Option<PendingVerification>>,
}

impl CheckoutFlow {
    pub fn new(
        controller: Arc<StepController>,
        api: Arc<dyn CheckoutApi>,
        bridge: Arc<dyn PaymentGatewayBridge>,
    ) -> Self {
        Self {
            controller,
            api,
            bridge,
            verify_attempts: DEFAULT_VERIFY_ATTEMPTS,
            retry_delay: Duration::from_millis(500),
            pending: Mutex::new(None),
        }
    }

    pub fn with_verify_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.verify_attempts = attempts.max(1);
        self.retry_delay = delay;
        self
    }

    pub fn controller(&self) -> &Arc<StepController> {
        &self.controller
    }

    pub async fn submit(&self) -> Result<SubmitOutcome, CheckoutError> {
        let (permit, request) = self.controller.begin_submit().await?;
        info!(
            payment_method = %request.payment_method,
            coupon = ?request.coupon_code,
            "submitting order"
        );

        let created = match self.api.create_order(&request).await {
            Ok(created) => created,
            Err(e) => return Err(self.intake_error(e).await),
        };

        match created {
            OrderCreationResult::Confirmed { order } => {
                self.controller.finish(&order.order_number).await;
                Ok(SubmitOutcome::Confirmed { order })
            }
            OrderCreationResult::AwaitingPayment {
                order,
                checkout,
                reused,
            } => {
                info!(
                    order_number = %order.order_number,
                    reused,
                    "opening gateway checkout"
                );
                match self.bridge.open(&checkout).await {
                    GatewayOutcome::Success(payload) => {
                        self.verify(order.order_number, payload, permit).await
                    }
                    GatewayOutcome::Cancelled => Ok(SubmitOutcome::PaymentDismissed {
                        order_number: order.order_number,
                    }),
                    GatewayOutcome::SdkLoadFailed { reason } => {
                        Err(CheckoutError::SdkLoadFailed { reason })
                    }
                }
            }
        }
    }

    /// Retry the last unconfirmed verification with the same order and payload
    pub async fn retry_verification(&self) -> Result<SubmitOutcome, CheckoutError> {
        let Some(pending) = self.pending.lock().await.clone() else {
            return Err(CheckoutError::validation("No payment awaiting confirmation"));
        };
        match self.confirm(&pending.order_number, &pending.payload).await {
            Ok(order) => {
                self.pending.lock().await.take();
                self.controller.finish(&order.order_number).await;
                Ok(SubmitOutcome::Confirmed { order })
            }
            Err(source) => Err(CheckoutError::PaymentUnconfirmed {
                order_number: pending.order_number,
                source,
            }),
        }
    }

    pub async fn has_unconfirmed_payment(&self) -> bool {
        self.pending.lock().await.is_some()
    }

    async fn verify(
        &self,
        order_number: String,
        payload: GatewayPayload,
        permit: SubmitPermit,
    ) -> Result<SubmitOutcome, CheckoutError> {
        match self.confirm(&order_number, &payload).await {
            Ok(order) => {
                self.controller.finish(&order.order_number).await;
                Ok(SubmitOutcome::Confirmed { order })
            }
            Err(source) => {
                error!(
                    order_number = %order_number,
                    payment_id = %payload.payment_id,
                    error = %source,
                    "payment taken but order not confirmed"
                );
                // No second payment attempt until this one is resolved
                permit.hold();
                *self.pending.lock().await = Some(PendingVerification {
                    order_number: order_number.clone(),
                    payload,
                });
                Err(CheckoutError::PaymentUnconfirmed {
                    order_number,
                    source,
                })
            }
        }
    }

    async fn confirm(
        &self,
        order_number: &str,
        payload: &GatewayPayload,
    ) -> Result<OrderSummary, ApiError> {
        let request = VerifyPaymentRequest {
            order_number: order_number.to_string(),
            payload: payload.clone(),
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.api.verify_payment(&request).await {
                Ok(confirmation) => return Ok(confirmation.order),
                Err(e) if e.retryable && attempt < self.verify_attempts => {
                    warn!(
                        order_number = %order_number,
                        attempt,
                        error = %e,
                        "verification failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Map an Order Intake failure and put the controller where the customer
    /// can fix it
    async fn intake_error(&self, e: ApiError) -> CheckoutError {
        match e.code {
            Some(ErrorCode::AddressNotFound) => {
                if let Err(nav) = self.controller.force_address_step().await {
                    warn!(error = %nav, "could not return to address step");
                }
                CheckoutError::AddressUnavailable
            }
            Some(ErrorCode::CouponRejected) => {
                if let Err(err) = self.controller.remove_coupon().await {
                    warn!(error = %err, "could not drop rejected coupon");
                }
                let (code, reason) = e
                    .coupon_rejection()
                    .unwrap_or_else(|| (String::new(), CouponRejectionReason::UnknownCode));
                CheckoutError::CouponRejected { code, reason }
            }
            Some(ErrorCode::CodNotEligible) => {
                self.controller.cart_changed().await;
                CheckoutError::CodUnavailable {
                    disqualifying_items: e.disqualifying_items(),
                }
            }
            Some(ErrorCode::GatewayNotConfigured) => CheckoutError::GatewayNotConfigured,
            _ => CheckoutError::Api(e),
        }
    }
}

//! Payment verification and idempotent order confirmation.
//!
//! `confirm` may be reached concurrently from the client verify call and the
//! gateway webhook; `(order_number, payment_id)` is the deduplication key and
//! the store performs the transition as one conditional update.

use std::sync::Arc;
use tracing::{info, warn};

use crate::database::repository::{FinalizeOutcome, Order, OrderStore};
use crate::error::{AppError, AppErrorKind, AppResult, DomainError, ExternalError, IntegrityError};
use crate::payments::PaymentGateway;
use crate::services::notification::{NotificationType, OrderNotifier};
use crate::types::{
    ConfirmationResult, CustomerId, GatewayPayload, OrderStatus, VerifiedPayment,
    VerifyPaymentRequest,
};

pub struct PaymentVerificationService {
    orders: Arc<dyn OrderStore>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    notifier: Arc<dyn OrderNotifier>,
}

impl PaymentVerificationService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        gateway: Option<Arc<dyn PaymentGateway>>,
        notifier: Arc<dyn OrderNotifier>,
    ) -> Self {
        Self {
            orders,
            gateway,
            notifier,
        }
    }

    /// Verify the client payload, then confirm the order
    pub async fn verify_and_confirm(
        &self,
        customer_id: CustomerId,
        request: VerifyPaymentRequest,
    ) -> AppResult<ConfirmationResult> {
        let verified = self
            .verify(Some(customer_id), &request.order_number, &request.payload)
            .await?;
        self.confirm(&verified.order_number, &verified.payment_id)
            .await
    }

    /// Check that the payload belongs to the order and carries a valid signature.
    /// A rejected attempt is recorded on the order, which stays `pending`.
    pub async fn verify(
        &self,
        customer_id: Option<CustomerId>,
        order_number: &str,
        payload: &GatewayPayload,
    ) -> AppResult<VerifiedPayment> {
        let gateway = self
            .gateway
            .as_ref()
            .ok_or_else(|| AppError::new(AppErrorKind::External(ExternalError::GatewayNotConfigured)))?;

        let order = self.load(order_number, customer_id).await?;

        if order.payment_reference.as_deref() != Some(payload.gateway_order_id.as_str()) {
            warn!(
                security_event = true,
                order_number = %order_number,
                expected = ?order.payment_reference,
                received = %payload.gateway_order_id,
                "payment payload refers to a different gateway order"
            );
            self.orders
                .record_rejection(order_number, "gateway order id mismatch")
                .await?;
            return Err(AppError::new(AppErrorKind::Integrity(
                IntegrityError::GatewayOrderMismatch {
                    order_number: order_number.to_string(),
                },
            )));
        }

        if !gateway.verify_payment_signature(
            &payload.gateway_order_id,
            &payload.payment_id,
            &payload.signature,
        ) {
            warn!(
                security_event = true,
                order_number = %order_number,
                gateway_order_id = %payload.gateway_order_id,
                payment_id = %payload.payment_id,
                "payment signature mismatch"
            );
            self.orders
                .record_rejection(
                    order_number,
                    &format!("signature mismatch for payment {}", payload.payment_id),
                )
                .await?;
            return Err(AppError::new(AppErrorKind::Integrity(
                IntegrityError::SignatureMismatch {
                    order_number: order_number.to_string(),
                },
            )));
        }

        Ok(VerifiedPayment {
            order_number: order.order_number,
            gateway_order_id: payload.gateway_order_id.clone(),
            payment_id: payload.payment_id.clone(),
        })
    }

    /// Idempotent `pending | failed -> confirmed`. Repeating the call with the same
    /// payment id returns the confirmed order without repeating side effects.
    pub async fn confirm(
        &self,
        order_number: &str,
        payment_id: &str,
    ) -> AppResult<ConfirmationResult> {
        match self.orders.finalize(order_number, Some(payment_id)).await? {
            FinalizeOutcome::Confirmed(order) => {
                info!(
                    order_number = %order.order_number,
                    payment_id = %payment_id,
                    total = %order.total,
                    "✅ order confirmed"
                );
                self.notifier
                    .notify(&order, NotificationType::OrderConfirmed)
                    .await;
                Ok(ConfirmationResult {
                    order: order.to_summary(),
                    already_confirmed: false,
                })
            }
            FinalizeOutcome::AlreadyConfirmed(order) => {
                info!(
                    order_number = %order.order_number,
                    payment_id = %payment_id,
                    "order already confirmed with this payment"
                );
                Ok(ConfirmationResult {
                    order: order.to_summary(),
                    already_confirmed: true,
                })
            }
            FinalizeOutcome::PaymentIdConflict(order) => {
                warn!(
                    security_event = true,
                    order_number = %order.order_number,
                    stored_payment_id = ?order.payment_id,
                    payment_id = %payment_id,
                    "second payment received for confirmed order"
                );
                Err(AppError::domain(DomainError::PaymentConflict {
                    order_number: order.order_number,
                }))
            }
            FinalizeOutcome::NotPending(order) => {
                warn!(
                    order_number = %order.order_number,
                    payment_id = %payment_id,
                    status = %order.status,
                    "payment received for order that is no longer pending"
                );
                Err(AppError::domain(DomainError::OrderNotPending {
                    order_number: order.order_number.clone(),
                    status: order.status(),
                }))
            }
            FinalizeOutcome::NotFound => Err(AppError::domain(DomainError::OrderNotFound {
                order_number: order_number.to_string(),
            })),
        }
    }

    /// Confirm from a gateway notification keyed by gateway order id
    pub async fn confirm_by_gateway_order(
        &self,
        gateway_order_id: &str,
        payment_id: &str,
    ) -> AppResult<ConfirmationResult> {
        let order = self.by_gateway_order(gateway_order_id).await?;
        self.confirm(&order.order_number, payment_id).await
    }

    /// Explicit gateway failure: `pending -> failed`. Returns the order status
    /// afterwards. A later verified capture on the same gateway order still
    /// confirms it through [`confirm`](Self::confirm).
    pub async fn handle_gateway_failure(
        &self,
        gateway_order_id: &str,
        reason: &str,
    ) -> AppResult<OrderStatus> {
        let order = self.by_gateway_order(gateway_order_id).await?;
        match self.orders.mark_failed(&order.order_number, reason).await? {
            Some(failed) => {
                info!(
                    order_number = %failed.order_number,
                    reason = %reason,
                    "❌ order marked failed by gateway"
                );
                Ok(failed.status())
            }
            None => {
                info!(
                    order_number = %order.order_number,
                    status = %order.status,
                    "gateway failure ignored for non-pending order"
                );
                Ok(order.status())
            }
        }
    }

    async fn load(&self, order_number: &str, customer_id: Option<CustomerId>) -> AppResult<Order> {
        match self.orders.find_by_number(order_number).await? {
            Some(order) if customer_id.map_or(true, |c| c == order.customer_id) => Ok(order),
            _ => Err(AppError::domain(DomainError::OrderNotFound {
                order_number: order_number.to_string(),
            })),
        }
    }

    async fn by_gateway_order(&self, gateway_order_id: &str) -> AppResult<Order> {
        self.orders
            .find_by_gateway_order_id(gateway_order_id)
            .await?
            .ok_or_else(|| {
                AppError::domain(DomainError::OrderNotFound {
                    order_number: gateway_order_id.to_string(),
                })
            })
    }
}

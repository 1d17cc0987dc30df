use thiserror::Error;

use crate::checkout::client::ApiError;
use crate::types::CouponRejectionReason;

/// Whether money may have left the customer's account when the flow failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeStatus {
    NoChargeSafeToRetry,
    PaymentMayHaveBeenTaken,
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Local validation; never reaches the network
    #[error("{message}")]
    Validation { message: String },

    #[error("Coupon {code} rejected: {}", reason.message())]
    CouponRejected {
        code: String,
        reason: CouponRejectionReason,
    },

    #[error("Cash on Delivery unavailable for: {}", disqualifying_items.join(", "))]
    CodUnavailable { disqualifying_items: Vec<String> },

    #[error("Online payment is not available")]
    GatewayNotConfigured,

    /// The server no longer knows the selected address; the controller is back on `address`
    #[error("Selected address is no longer available")]
    AddressUnavailable,

    #[error("An order is already being placed")]
    SubmitInFlight,

    #[error("Payment window could not be loaded: {reason}")]
    SdkLoadFailed { reason: String },

    /// Gateway reported success but the server did not confirm the order
    #[error("Payment for order {order_number} is not yet confirmed")]
    PaymentUnconfirmed {
        order_number: String,
        source: ApiError,
    },

    #[error("Checkout session is closed")]
    SessionClosed,

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl CheckoutError {
    pub fn validation(message: impl Into<String>) -> Self {
        CheckoutError::Validation {
            message: message.into(),
        }
    }

    pub fn charge_status(&self) -> ChargeStatus {
        match self {
            CheckoutError::PaymentUnconfirmed { .. } => ChargeStatus::PaymentMayHaveBeenTaken,
            _ => ChargeStatus::NoChargeSafeToRetry,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            CheckoutError::SdkLoadFailed { .. } => true,
            CheckoutError::Api(e) => e.retryable,
            _ => false,
        }
    }

    /// Text shown to the customer
    pub fn user_message(&self) -> String {
        match self {
            CheckoutError::Validation { message } => message.clone(),
            CheckoutError::CouponRejected { reason, .. } => reason.message(),
            CheckoutError::CodUnavailable {
                disqualifying_items,
            } => format!(
                "Cash on Delivery is not available for: {}. Please choose online payment.",
                disqualifying_items.join(", ")
            ),
            CheckoutError::GatewayNotConfigured => {
                "Online payment is currently unavailable. Please choose Cash on Delivery."
                    .to_string()
            }
            CheckoutError::AddressUnavailable => {
                "Your selected address is no longer available. Please choose another.".to_string()
            }
            CheckoutError::SubmitInFlight => "Your order is already being placed.".to_string(),
            CheckoutError::SdkLoadFailed { .. } => {
                "We could not open the payment window. Please try again.".to_string()
            }
            CheckoutError::PaymentUnconfirmed { order_number, .. } => format!(
                "Payment received but not yet confirmed for order {}. Please do not pay again; contact support if this persists.",
                order_number
            ),
            CheckoutError::SessionClosed => {
                "This checkout has ended. Please start again from your cart.".to_string()
            }
            CheckoutError::Api(e) => e.message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unconfirmed_payment_may_have_charged() {
        let unconfirmed = CheckoutError::PaymentUnconfirmed {
            order_number: "ORD-20260101-ABC123".to_string(),
            source: ApiError::transport("connection reset"),
        };
        assert_eq!(
            unconfirmed.charge_status(),
            ChargeStatus::PaymentMayHaveBeenTaken
        );
        assert!(unconfirmed.user_message().contains("do not pay again"));

        let dismissed = CheckoutError::SdkLoadFailed {
            reason: "timeout".to_string(),
        };
        assert_eq!(dismissed.charge_status(), ChargeStatus::NoChargeSafeToRetry);
        assert!(dismissed.is_retryable());
    }

    #[test]
    fn configuration_error_suggests_cod() {
        let err = CheckoutError::GatewayNotConfigured;
        assert!(err.user_message().contains("Cash on Delivery"));
        assert!(!err.is_retryable());
    }
}

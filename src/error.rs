//! Unified error handling for the checkout backend
//!
//! This module provides a unified error system with proper HTTP status mapping,
//! user-friendly messages, and structured error codes for client handling.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{CouponRejectionReason, OrderStatus};

/// Error codes for programmatic handling by the checkout client
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "ADDRESS_NOT_FOUND")]
    AddressNotFound,
    #[serde(rename = "EMPTY_CART")]
    EmptyCart,
    #[serde(rename = "COUPON_REJECTED")]
    CouponRejected,
    #[serde(rename = "COD_NOT_ELIGIBLE")]
    CodNotEligible,
    #[serde(rename = "ORDER_NOT_FOUND")]
    OrderNotFound,
    #[serde(rename = "ORDER_NOT_PENDING")]
    OrderNotPending,
    #[serde(rename = "PAYMENT_CONFLICT")]
    PaymentConflict,

    // Integrity errors
    #[serde(rename = "SIGNATURE_MISMATCH")]
    SignatureMismatch,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CACHE_ERROR")]
    CacheError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors (502, 503, 504)
    #[serde(rename = "GATEWAY_NOT_CONFIGURED")]
    GatewayNotConfigured,
    #[serde(rename = "PAYMENT_GATEWAY_ERROR")]
    PaymentGatewayError,
    #[serde(rename = "RATE_LIMIT_ERROR")]
    RateLimitError,
    #[serde(rename = "EXTERNAL_SERVICE_TIMEOUT")]
    ExternalServiceTimeout,

    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Business rejections of a checkout request
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Selected address no longer exists for this customer
    AddressNotFound { address_id: String },
    EmptyCart,
    /// Coupon failed validation against the live cart
    CouponRejected {
        code: String,
        reason: CouponRejectionReason,
    },
    /// Cart contains items that cannot be paid for on delivery
    CodNotEligible { disqualifying_items: Vec<String> },
    OrderNotFound { order_number: String },
    /// Order already left `pending` without being confirmed by this payment
    OrderNotPending {
        order_number: String,
        status: OrderStatus,
    },
    /// Order is confirmed with a different gateway payment id
    PaymentConflict { order_number: String },
}

/// Gateway callback failed integrity checks
#[derive(Debug, Clone)]
pub enum IntegrityError {
    SignatureMismatch { order_number: String },
    /// Payload refers to a gateway order other than the one attached to the order
    GatewayOrderMismatch { order_number: String },
}

/// Infrastructure-level errors (database, cache, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    Cache { message: String },
    Configuration { message: String },
}

/// External service errors (payment gateway)
#[derive(Debug, Clone)]
pub enum ExternalError {
    /// Online payments are not set up on this deployment
    GatewayNotConfigured,
    PaymentGateway { message: String, is_retryable: bool },
    RateLimit {
        service: String,
        retry_after: Option<u64>,
    },
    Timeout { service: String, timeout_secs: u64 },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    MissingField { field: String },
    InvalidField { field: String, reason: String },
    InvalidAmount { amount: String, reason: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Integrity(IntegrityError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn domain(err: DomainError) -> Self {
        Self::new(AppErrorKind::Domain(err))
    }

    pub fn validation(err: ValidationError) -> Self {
        Self::new(AppErrorKind::Validation(err))
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::AddressNotFound { .. } => 409, // Conflict: re-route to address step
                DomainError::EmptyCart => 422,
                DomainError::CouponRejected { .. } => 422,
                DomainError::CodNotEligible { .. } => 422,
                DomainError::OrderNotFound { .. } => 404,
                DomainError::OrderNotPending { .. } => 409,
                DomainError::PaymentConflict { .. } => 409,
            },
            AppErrorKind::Integrity(_) => 400,
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(err) => match err {
                ExternalError::GatewayNotConfigured => 503,
                ExternalError::PaymentGateway { .. } => 502,
                ExternalError::RateLimit { .. } => 429,
                ExternalError::Timeout { .. } => 504,
            },
            AppErrorKind::Validation(_) => 400,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::AddressNotFound { .. } => ErrorCode::AddressNotFound,
                DomainError::EmptyCart => ErrorCode::EmptyCart,
                DomainError::CouponRejected { .. } => ErrorCode::CouponRejected,
                DomainError::CodNotEligible { .. } => ErrorCode::CodNotEligible,
                DomainError::OrderNotFound { .. } => ErrorCode::OrderNotFound,
                DomainError::OrderNotPending { .. } => ErrorCode::OrderNotPending,
                DomainError::PaymentConflict { .. } => ErrorCode::PaymentConflict,
            },
            AppErrorKind::Integrity(_) => ErrorCode::SignatureMismatch,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Cache { .. } => ErrorCode::CacheError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::GatewayNotConfigured => ErrorCode::GatewayNotConfigured,
                ExternalError::PaymentGateway { .. } => ErrorCode::PaymentGatewayError,
                ExternalError::RateLimit { .. } => ErrorCode::RateLimitError,
                ExternalError::Timeout { .. } => ErrorCode::ExternalServiceTimeout,
            },
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::AddressNotFound { .. } => {
                    "The selected delivery address no longer exists. Please choose another address"
                        .to_string()
                }
                DomainError::EmptyCart => "Your cart is empty".to_string(),
                DomainError::CouponRejected { reason, .. } => reason.message(),
                DomainError::CodNotEligible {
                    disqualifying_items,
                } => format!(
                    "Cash on delivery is not available for: {}",
                    disqualifying_items.join(", ")
                ),
                DomainError::OrderNotFound { order_number } => {
                    format!("Order '{}' not found", order_number)
                }
                DomainError::OrderNotPending {
                    order_number,
                    status,
                } => format!(
                    "Order '{}' is {} and can no longer be paid. Please contact support",
                    order_number, status
                ),
                DomainError::PaymentConflict { order_number } => format!(
                    "Order '{}' is already paid with a different payment. Please contact support",
                    order_number
                ),
            },
            AppErrorKind::Integrity(_) => {
                "We could not verify this payment. If money was deducted, do not pay again; contact support"
                    .to_string()
            }
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::GatewayNotConfigured => {
                    "Online payment is currently unavailable. Please choose Cash on Delivery"
                        .to_string()
                }
                ExternalError::PaymentGateway { is_retryable, .. } => {
                    if *is_retryable {
                        "Payment gateway is temporarily unavailable. Please try again".to_string()
                    } else {
                        "Payment processing failed. Please contact support".to_string()
                    }
                }
                ExternalError::RateLimit {
                    service,
                    retry_after,
                } => {
                    if let Some(secs) = retry_after {
                        format!(
                            "Rate limit exceeded for {}. Please try again in {} seconds",
                            service, secs
                        )
                    } else {
                        format!(
                            "Rate limit exceeded for {}. Please try again later",
                            service
                        )
                    }
                }
                ExternalError::Timeout {
                    service,
                    timeout_secs,
                } => {
                    format!(
                        "{} request timed out after {} seconds. Please try again",
                        service, timeout_secs
                    )
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid value for '{}': {}", field, reason)
                }
                ValidationError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Integrity(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Cache { .. } => true,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::GatewayNotConfigured => false,
                ExternalError::PaymentGateway { is_retryable, .. } => *is_retryable,
                ExternalError::RateLimit { .. } => true,
                ExternalError::Timeout { .. } => true,
            },
            AppErrorKind::Validation(_) => false,
        }
    }

    /// Structured details that let the client react without parsing messages
    pub fn details(&self) -> Option<serde_json::Value> {
        match &self.kind {
            AppErrorKind::Domain(DomainError::CouponRejected { code, reason }) => {
                Some(serde_json::json!({ "code": code, "rejection": reason }))
            }
            AppErrorKind::Domain(DomainError::CodNotEligible {
                disqualifying_items,
            }) => Some(serde_json::json!({ "disqualifying_items": disqualifying_items })),
            AppErrorKind::Domain(DomainError::AddressNotFound { address_id }) => {
                Some(serde_json::json!({ "address_id": address_id, "return_to_step": "address" }))
            }
            AppErrorKind::External(ExternalError::GatewayNotConfigured) => {
                Some(serde_json::json!({ "fallback_payment_method": "cod" }))
            }
            _ => None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

// Note: From<DatabaseError> lives in database/error.rs and From<PaymentError>
// in payments/error.rs to keep this module free of backend types

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;

use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Payment gateway is not configured")]
    NotConfigured,

    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimitError {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    #[error("Signature verification failed: {message}")]
    SignatureMismatch { message: String },

    #[error("Gateway error: gateway={gateway}, message={message}")]
    ProviderError {
        gateway: String,
        message: String,
        provider_code: Option<String>,
        retryable: bool,
    },
}

impl PaymentError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::NotConfigured => false,
            PaymentError::ValidationError { .. } => false,
            PaymentError::NetworkError { .. } => true,
            PaymentError::RateLimitError { .. } => true,
            PaymentError::SignatureMismatch { .. } => false,
            PaymentError::ProviderError { retryable, .. } => *retryable,
        }
    }
}

impl From<PaymentError> for crate::error::AppError {
    fn from(err: PaymentError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError, ValidationError};

        match err {
            PaymentError::NotConfigured => {
                AppError::new(AppErrorKind::External(ExternalError::GatewayNotConfigured))
            }
            PaymentError::ValidationError { message, field } => {
                AppError::validation(ValidationError::InvalidField {
                    field: field.unwrap_or_else(|| "payment".to_string()),
                    reason: message,
                })
            }
            PaymentError::RateLimitError {
                retry_after_seconds,
                ..
            } => AppError::new(AppErrorKind::External(ExternalError::RateLimit {
                service: "Payment gateway".to_string(),
                retry_after: retry_after_seconds,
            })),
            other => {
                let is_retryable = other.is_retryable();
                AppError::new(AppErrorKind::External(ExternalError::PaymentGateway {
                    message: other.to_string(),
                    is_retryable,
                }))
            }
        }
    }
}

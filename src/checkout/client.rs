//! Client side of the checkout HTTP API

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::error::ErrorCode;
use crate::middleware::error::ErrorResponse;
use crate::types::{
    Address, ApplyCouponRequest, CodEligibility, ConfirmationResult, CouponEvaluation,
    CouponRejectionReason, CreateOrderRequest, CustomerId, OrderCreationResult,
    VerifyPaymentRequest,
};

/// Failure reported by the checkout API, or a transport failure reaching it
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiError {
    /// `None` when no response was received
    pub status: Option<u16>,
    pub code: Option<ErrorCode>,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub retryable: bool,
}

impl ApiError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
            details: None,
            retryable: true,
        }
    }

    pub fn from_response(status: u16, response: ErrorResponse) -> Self {
        Self {
            status: Some(status),
            code: Some(response.error),
            message: response.message,
            details: response.details,
            retryable: response.retryable.unwrap_or(false),
        }
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == Some(code)
    }

    pub fn coupon_rejection(&self) -> Option<(String, CouponRejectionReason)> {
        let details = self.details.as_ref()?;
        let code = details.get("code")?.as_str()?.to_string();
        let reason = serde_json::from_value(details.get("rejection")?.clone()).ok()?;
        Some((code, reason))
    }

    pub fn disqualifying_items(&self) -> Vec<String> {
        self.details
            .as_ref()
            .and_then(|d| d.get("disqualifying_items"))
            .and_then(|items| serde_json::from_value(items.clone()).ok())
            .unwrap_or_default()
    }
}

/// Operations the checkout client needs from the server
#[async_trait]
pub trait CheckoutApi: Send + Sync {
    async fn addresses(&self) -> Result<Vec<Address>, ApiError>;

    async fn apply_coupon(&self, code: &str) -> Result<CouponEvaluation, ApiError>;

    async fn cod_eligibility(&self) -> Result<CodEligibility, ApiError>;

    async fn create_order(
        &self,
        request: &CreateOrderRequest,
    ) -> Result<OrderCreationResult, ApiError>;

    async fn verify_payment(
        &self,
        request: &VerifyPaymentRequest,
    ) -> Result<ConfirmationResult, ApiError>;
}

#[derive(Deserialize)]
struct SuccessEnvelope<T> {
    data: T,
}

pub struct HttpCheckoutApi {
    client: Client,
    base_url: String,
    customer_id: CustomerId,
}

impl HttpCheckoutApi {
    pub fn new(
        base_url: impl Into<String>,
        customer_id: CustomerId,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::transport(format!("failed to initialize HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            customer_id,
        })
    }

    async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, url = %url, "checkout api request");

        let mut request = self
            .client
            .request(method, &url)
            .header("x-customer-id", self.customer_id.to_string());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::transport(format!("request to {} failed: {}", path, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::transport(format!("failed to read response: {}", e)))?;

        if status.is_success() {
            return serde_json::from_str::<SuccessEnvelope<T>>(&text)
                .map(|envelope| envelope.data)
                .map_err(|e| ApiError {
                    status: Some(status.as_u16()),
                    code: None,
                    message: format!("invalid response body: {}", e),
                    details: None,
                    retryable: false,
                });
        }

        match serde_json::from_str::<ErrorResponse>(&text) {
            Ok(error) => Err(ApiError::from_response(status.as_u16(), error)),
            Err(_) => Err(ApiError {
                status: Some(status.as_u16()),
                code: None,
                message: format!("HTTP {}", status),
                details: None,
                retryable: status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
            }),
        }
    }
}

#[async_trait]
impl CheckoutApi for HttpCheckoutApi {
    async fn addresses(&self) -> Result<Vec<Address>, ApiError> {
        self.send::<(), _>(Method::GET, "/api/checkout/addresses", None)
            .await
    }

    async fn apply_coupon(&self, code: &str) -> Result<CouponEvaluation, ApiError> {
        let body = ApplyCouponRequest {
            code: code.to_string(),
        };
        self.send(Method::POST, "/api/checkout/coupons/apply", Some(&body))
            .await
    }

    async fn cod_eligibility(&self) -> Result<CodEligibility, ApiError> {
        self.send::<(), _>(Method::POST, "/api/checkout/cod-eligibility", None)
            .await
    }

    async fn create_order(
        &self,
        request: &CreateOrderRequest,
    ) -> Result<OrderCreationResult, ApiError> {
        self.send(Method::POST, "/api/orders", Some(request)).await
    }

    async fn verify_payment(
        &self,
        request: &VerifyPaymentRequest,
    ) -> Result<ConfirmationResult, ApiError> {
        self.send(Method::POST, "/api/payments/verify", Some(request))
            .await
    }
}

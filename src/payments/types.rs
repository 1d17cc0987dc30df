use crate::payments::error::PaymentError;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Amount in the currency's minor unit (paise for INR)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Money {
    pub amount_minor: i64,
    pub currency: String,
}

impl Money {
    pub fn from_major(amount: Decimal, currency: impl Into<String>) -> Result<Self, PaymentError> {
        let minor = (amount * Decimal::from(100)).round();
        let amount_minor = minor.to_i64().ok_or_else(|| PaymentError::ValidationError {
            message: format!("amount out of range: {}", amount),
            field: Some("amount".to_string()),
        })?;
        let money = Self {
            amount_minor,
            currency: currency.into(),
        };
        money.validate_positive("amount")?;
        Ok(money)
    }

    pub fn validate_positive(&self, field: &str) -> Result<(), PaymentError> {
        if self.amount_minor <= 0 {
            return Err(PaymentError::ValidationError {
                message: "amount must be greater than zero".to_string(),
                field: Some(field.to_string()),
            });
        }
        if self.currency.trim().is_empty() {
            return Err(PaymentError::ValidationError {
                message: "currency is required".to_string(),
                field: Some("currency".to_string()),
            });
        }
        Ok(())
    }
}

/// Request to open a gateway order for a pending checkout order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentRequest {
    pub amount: Money,
    /// Our order number, echoed back by the gateway
    pub receipt: String,
    pub notes: Option<JsonValue>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntentState {
    Created,
    Attempted,
    Paid,
    Unknown,
}

impl IntentState {
    pub fn from_gateway(status: &str) -> Self {
        match status {
            "created" => IntentState::Created,
            "attempted" => IntentState::Attempted,
            "paid" => IntentState::Paid,
            _ => IntentState::Unknown,
        }
    }
}

/// Gateway-side order created for one checkout order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayIntent {
    pub gateway_order_id: String,
    pub amount: Money,
    pub receipt: Option<String>,
    pub state: IntentState,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookVerificationResult {
    pub valid: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventKind {
    /// `payment.captured` or `order.paid`
    PaymentCaptured,
    PaymentFailed,
    Other,
}

impl WebhookEventKind {
    pub fn from_event_type(event_type: &str) -> Self {
        match event_type {
            "payment.captured" | "order.paid" => WebhookEventKind::PaymentCaptured,
            "payment.failed" => WebhookEventKind::PaymentFailed,
            _ => WebhookEventKind::Other,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event_id: Option<String>,
    pub event_type: String,
    pub kind: WebhookEventKind,
    pub gateway_order_id: Option<String>,
    pub payment_id: Option<String>,
    pub failure_reason: Option<String>,
    pub payload: JsonValue,
    pub received_at: DateTime<Utc>,
}

use crate::config::GatewayConfig;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentGateway;
use crate::payments::types::{
    GatewayIntent, IntentRequest, IntentState, Money, WebhookEvent, WebhookEventKind,
    WebhookVerificationResult,
};
use crate::payments::utils::{basic_auth_header, verify_hmac_sha256_hex, PaymentHttpClient};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::info;

/// Gateway receipts are limited to 40 characters
const MAX_RECEIPT_LEN: usize = 40;

#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl RazorpayConfig {
    /// Build from the gateway section; both key id and secret are required
    pub fn from_gateway_config(config: &GatewayConfig) -> PaymentResult<Self> {
        let (Some(key_id), Some(key_secret)) = (config.key_id.clone(), config.key_secret.clone())
        else {
            return Err(PaymentError::NotConfigured);
        };

        Ok(Self {
            key_id,
            key_secret,
            webhook_secret: config.webhook_secret.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }
}

pub struct RazorpayGateway {
    config: RazorpayConfig,
    http: PaymentHttpClient,
    authorization: String,
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig) -> PaymentResult<Self> {
        let http =
            PaymentHttpClient::new("razorpay", Duration::from_secs(config.timeout_secs), config.max_retries)?;
        let authorization = basic_auth_header(&config.key_id, &config.key_secret);
        Ok(Self {
            config,
            http,
            authorization,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn to_intent(order: RazorpayOrder) -> GatewayIntent {
        GatewayIntent {
            gateway_order_id: order.id,
            amount: Money {
                amount_minor: order.amount,
                currency: order.currency,
            },
            receipt: order.receipt,
            state: IntentState::from_gateway(&order.status),
            created_at: Utc
                .timestamp_opt(order.created_at, 0)
                .single()
                .unwrap_or_else(Utc::now),
        }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_intent(&self, request: IntentRequest) -> PaymentResult<GatewayIntent> {
        request.amount.validate_positive("amount")?;
        if request.receipt.is_empty() || request.receipt.len() > MAX_RECEIPT_LEN {
            return Err(PaymentError::ValidationError {
                message: format!("receipt must be 1-{} characters", MAX_RECEIPT_LEN),
                field: Some("receipt".to_string()),
            });
        }

        let payload = serde_json::json!({
            "amount": request.amount.amount_minor,
            "currency": request.amount.currency,
            "receipt": request.receipt,
            "notes": request.notes.unwrap_or_else(|| serde_json::json!({})),
        });

        let order: RazorpayOrder = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/v1/orders"),
                &self.authorization,
                Some(&payload),
            )
            .await?;

        info!(
            gateway_order_id = %order.id,
            amount_minor = order.amount,
            "razorpay order created"
        );
        Ok(Self::to_intent(order))
    }

    async fn fetch_intent(&self, gateway_order_id: &str) -> PaymentResult<GatewayIntent> {
        if gateway_order_id.trim().is_empty() {
            return Err(PaymentError::ValidationError {
                message: "gateway_order_id is required".to_string(),
                field: Some("gateway_order_id".to_string()),
            });
        }

        let order: RazorpayOrder = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!("/v1/orders/{}", gateway_order_id)),
                &self.authorization,
                None,
            )
            .await?;
        Ok(Self::to_intent(order))
    }

    fn verify_payment_signature(
        &self,
        gateway_order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> bool {
        let message = format!("{}|{}", gateway_order_id, payment_id);
        verify_hmac_sha256_hex(message.as_bytes(), &self.config.key_secret, signature)
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> PaymentResult<WebhookVerificationResult> {
        let Some(secret) = self.config.webhook_secret.as_deref() else {
            return Ok(WebhookVerificationResult {
                valid: false,
                reason: Some("webhook secret not configured".to_string()),
            });
        };

        let valid = verify_hmac_sha256_hex(payload, secret, signature);
        Ok(WebhookVerificationResult {
            valid,
            reason: if valid {
                None
            } else {
                Some("invalid razorpay signature".to_string())
            },
        })
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<WebhookEvent> {
        let parsed: JsonValue =
            serde_json::from_slice(payload).map_err(|e| PaymentError::ValidationError {
                message: format!("invalid webhook JSON payload: {}", e),
                field: Some("body".to_string()),
            })?;

        let event_type = parsed
            .get("event")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();

        let payment = parsed.pointer("/payload/payment/entity");
        let order = parsed.pointer("/payload/order/entity");

        let gateway_order_id = payment
            .and_then(|p| p.get("order_id"))
            .or_else(|| order.and_then(|o| o.get("id")))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let payment_id = payment
            .and_then(|p| p.get("id"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let failure_reason = payment
            .and_then(|p| p.get("error_description"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok(WebhookEvent {
            event_id: None,
            kind: WebhookEventKind::from_event_type(&event_type),
            event_type,
            gateway_order_id,
            payment_id,
            failure_reason,
            payload: parsed,
            received_at: Utc::now(),
        })
    }

    fn key_id(&self) -> &str {
        &self.config.key_id
    }

    fn name(&self) -> &'static str {
        "razorpay"
    }
}

#[derive(Debug, Deserialize)]
struct RazorpayOrder {
    id: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    receipt: Option<String>,
    status: String,
    created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::utils::hmac_sha256_hex;

    fn gateway() -> RazorpayGateway {
        RazorpayGateway::new(RazorpayConfig {
            key_id: "rzp_test_key".to_string(),
            key_secret: "key_secret".to_string(),
            webhook_secret: Some("whsec_test".to_string()),
            base_url: "https://api.razorpay.com".to_string(),
            timeout_secs: 5,
            max_retries: 1,
        })
        .expect("gateway init should succeed")
    }

    #[test]
    fn payment_signature_is_order_pipe_payment() {
        let gateway = gateway();
        let signature = hmac_sha256_hex("key_secret", b"order_abc|pay_xyz").unwrap();

        assert!(gateway.verify_payment_signature("order_abc", "pay_xyz", &signature));
        assert!(!gateway.verify_payment_signature("order_abc", "pay_other", &signature));
        assert!(!gateway.verify_payment_signature("order_abc", "pay_xyz", "deadbeef"));
    }

    #[test]
    fn webhook_signature_validation() {
        let gateway = gateway();
        let payload = br#"{"event":"payment.captured"}"#;
        let signature = hmac_sha256_hex("whsec_test", payload).unwrap();

        assert!(gateway.verify_webhook(payload, &signature).unwrap().valid);
        assert!(!gateway.verify_webhook(payload, "invalid").unwrap().valid);
    }

    #[test]
    fn parses_captured_payment_event() {
        let payload = serde_json::json!({
            "entity": "event",
            "event": "payment.captured",
            "payload": {
                "payment": {
                    "entity": {
                        "id": "pay_29QQoUBi66xm2f",
                        "order_id": "order_9A33XWu170gUtm",
                        "status": "captured",
                        "amount": 50000
                    }
                }
            }
        });
        let event = gateway()
            .parse_webhook_event(payload.to_string().as_bytes())
            .unwrap();

        assert_eq!(event.kind, WebhookEventKind::PaymentCaptured);
        assert_eq!(event.gateway_order_id.as_deref(), Some("order_9A33XWu170gUtm"));
        assert_eq!(event.payment_id.as_deref(), Some("pay_29QQoUBi66xm2f"));
    }

    #[test]
    fn missing_keys_mean_not_configured() {
        let config = GatewayConfig {
            key_id: None,
            key_secret: None,
            ..GatewayConfig::default()
        };
        assert!(matches!(
            RazorpayConfig::from_gateway_config(&config),
            Err(PaymentError::NotConfigured)
        ));
    }
}

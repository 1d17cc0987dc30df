use crate::payments::error::PaymentResult;
use crate::payments::types::{
    GatewayIntent, IntentRequest, WebhookEvent, WebhookVerificationResult,
};
use async_trait::async_trait;

/// Server side of a hosted-checkout payment gateway
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create the gateway order the client SDK is opened against
    async fn create_intent(&self, request: IntentRequest) -> PaymentResult<GatewayIntent>;

    async fn fetch_intent(&self, gateway_order_id: &str) -> PaymentResult<GatewayIntent>;

    /// Check the signature the client received together with a successful payment
    fn verify_payment_signature(
        &self,
        gateway_order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> bool;

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> PaymentResult<WebhookVerificationResult>;

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<WebhookEvent>;

    /// Public key id handed to the client SDK
    fn key_id(&self) -> &str;

    fn name(&self) -> &'static str;
}

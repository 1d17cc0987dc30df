use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::services::webhook_processor::{WebhookOutcome, WebhookProcessor, WebhookProcessorError};

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";
pub const EVENT_ID_HEADER: &str = "x-razorpay-event-id";

pub struct WebhookState {
    pub processor: Arc<WebhookProcessor>,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// POST /webhooks/gateway
///
/// The body is taken as raw bytes; the signature covers them exactly.
pub async fn handle_gateway_webhook(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    info!(bytes = body.len(), "Received gateway webhook");

    let signature = header(&headers, SIGNATURE_HEADER);
    if signature.is_none() {
        warn!("Missing webhook signature");
        return (StatusCode::UNAUTHORIZED, "Missing signature").into_response();
    }

    match state
        .processor
        .process_webhook(&body, signature, header(&headers, EVENT_ID_HEADER))
        .await
    {
        Ok(outcome) => {
            let status = match &outcome {
                WebhookOutcome::Confirmed { .. } => "confirmed",
                WebhookOutcome::Failed { .. } => "failed",
                WebhookOutcome::Ignored { .. } => "ignored",
                WebhookOutcome::Duplicate => "duplicate",
            };
            info!(outcome = ?outcome, "Webhook processed successfully");
            (
                StatusCode::OK,
                Json(serde_json::json!({ "status": "ok", "result": status })),
            )
                .into_response()
        }
        Err(WebhookProcessorError::InvalidSignature) => {
            (StatusCode::UNAUTHORIZED, "Invalid signature").into_response()
        }
        Err(WebhookProcessorError::NotConfigured) => {
            warn!("Webhook received but payment gateway is not configured");
            (StatusCode::SERVICE_UNAVAILABLE, "Gateway not configured").into_response()
        }
        Err(WebhookProcessorError::InvalidPayload(reason)) => {
            error!(reason = %reason, "Invalid webhook payload");
            (StatusCode::BAD_REQUEST, "Invalid payload").into_response()
        }
        Err(e) => {
            // Non-2xx makes the gateway redeliver
            error!(error = %e, "Webhook processing failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Processing failed").into_response()
        }
    }
}

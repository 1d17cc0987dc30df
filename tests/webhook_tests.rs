mod common;

use axum::body::Body;
use http::{Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::util::ServiceExt;

use checkout_backend::api::webhooks::{EVENT_ID_HEADER, SIGNATURE_HEADER};
use checkout_backend::database::repository::OrderStore;
use checkout_backend::types::OrderStatus;
use common::{sign_payment, sign_webhook, Harness};

async fn deliver(harness: &Harness, body: &str, signature: Option<String>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/webhooks/gateway")
        .header(EVENT_ID_HEADER, "evt_1");
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }

    let response = harness
        .router
        .clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn pending_online_order(harness: &Harness) -> (String, String) {
    let item = harness.add_product("Smart Watch", 2500, true).await;
    harness.put_in_cart(item, 1).await;
    let (status, body) = harness
        .request(
            Method::POST,
            "/api/orders",
            Some(json!({ "address_id": harness.address_id, "payment_method": "online" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    (
        body["data"]["order"]["order_number"]
            .as_str()
            .unwrap()
            .to_string(),
        body["data"]["checkout"]["gateway_order_id"]
            .as_str()
            .unwrap()
            .to_string(),
    )
}

fn captured(gateway_order_id: &str, payment_id: &str) -> String {
    json!({
        "event": "payment.captured",
        "payload": {
            "payment": { "entity": { "id": payment_id, "order_id": gateway_order_id, "status": "captured" } }
        }
    })
    .to_string()
}

#[tokio::test]
async fn signed_capture_confirms_order() {
    let harness = Harness::new().await;
    let (order_number, gateway_order_id) = pending_online_order(&harness).await;

    let body = captured(&gateway_order_id, "pay_hook_1");
    let (status, response) = deliver(&harness, &body, Some(sign_webhook(body.as_bytes()))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["result"], "confirmed");
    let order = harness
        .store
        .find_by_number(&order_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status(), OrderStatus::Confirmed);
    assert_eq!(order.payment_id.as_deref(), Some("pay_hook_1"));
    assert_eq!(harness.notifier.confirmations(), 1);
}

#[tokio::test]
async fn bad_or_missing_signature_is_unauthorized() {
    let harness = Harness::new().await;
    let (order_number, gateway_order_id) = pending_online_order(&harness).await;
    let body = captured(&gateway_order_id, "pay_hook_1");

    let (status, _) = deliver(&harness, &body, Some("deadbeef".to_string())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = deliver(&harness, &body, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Signature over a different body
    let other = captured(&gateway_order_id, "pay_hook_2");
    let (status, _) = deliver(&harness, &body, Some(sign_webhook(other.as_bytes()))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let order = harness
        .store
        .find_by_number(&order_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status(), OrderStatus::Pending);
}

#[tokio::test]
async fn redelivered_capture_is_idempotent() {
    let harness = Harness::new().await;
    let (_order_number, gateway_order_id) = pending_online_order(&harness).await;
    let body = captured(&gateway_order_id, "pay_hook_1");
    let signature = sign_webhook(body.as_bytes());

    let (first, _) = deliver(&harness, &body, Some(signature.clone())).await;
    let (second, response) = deliver(&harness, &body, Some(signature)).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    // No cache in tests, so the redelivery goes through confirmation again
    assert_eq!(response["result"], "confirmed");
    assert_eq!(harness.notifier.confirmations(), 1);
}

#[tokio::test]
async fn payment_failed_moves_order_to_failed() {
    let harness = Harness::new().await;
    let (order_number, gateway_order_id) = pending_online_order(&harness).await;

    let body = json!({
        "event": "payment.failed",
        "payload": {
            "payment": {
                "entity": {
                    "id": "pay_declined",
                    "order_id": gateway_order_id,
                    "error_description": "Card declined by issuer"
                }
            }
        }
    })
    .to_string();
    let (status, response) = deliver(&harness, &body, Some(sign_webhook(body.as_bytes()))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["result"], "failed");
    let order = harness
        .store
        .find_by_number(&order_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status(), OrderStatus::Failed);
    assert_eq!(order.last_error.as_deref(), Some("Card declined by issuer"));
}

#[tokio::test]
async fn verified_payment_after_failed_attempt_confirms_order() {
    let harness = Harness::new().await;
    let (order_number, gateway_order_id) = pending_online_order(&harness).await;

    let failed = json!({
        "event": "payment.failed",
        "payload": {
            "payment": { "entity": { "id": "pay_declined", "order_id": gateway_order_id } }
        }
    })
    .to_string();
    let (status, _) = deliver(&harness, &failed, Some(sign_webhook(failed.as_bytes()))).await;
    assert_eq!(status, StatusCode::OK);

    // Second card inside the same gateway checkout succeeds
    let (status, body) = harness
        .request(
            Method::POST,
            "/api/payments/verify",
            Some(json!({
                "order_number": order_number,
                "payload": {
                    "razorpay_order_id": gateway_order_id,
                    "razorpay_payment_id": "pay_second_card",
                    "razorpay_signature": sign_payment(&gateway_order_id, "pay_second_card"),
                }
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["order"]["status"], "confirmed");

    // The capture webhook for the same payment is a no-op
    let capture = captured(&gateway_order_id, "pay_second_card");
    let (status, response) =
        deliver(&harness, &capture, Some(sign_webhook(capture.as_bytes()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["result"], "confirmed");

    let order = harness
        .store
        .find_by_number(&order_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status(), OrderStatus::Confirmed);
    assert_eq!(order.payment_id.as_deref(), Some("pay_second_card"));
    assert_eq!(harness.notifier.confirmations(), 1);
}

#[tokio::test]
async fn unknown_order_and_unhandled_events_are_acknowledged() {
    let harness = Harness::new().await;

    let body = captured("order_unknown", "pay_x");
    let (status, response) = deliver(&harness, &body, Some(sign_webhook(body.as_bytes()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["result"], "ignored");

    let body = json!({ "event": "refund.created", "payload": {} }).to_string();
    let (status, response) = deliver(&harness, &body, Some(sign_webhook(body.as_bytes()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["result"], "ignored");
}

#[tokio::test]
async fn webhook_without_gateway_is_unavailable() {
    let harness = Harness::without_gateway().await;
    let body = captured("order_1", "pay_1");
    let (status, _) = deliver(&harness, &body, Some(sign_webhook(body.as_bytes()))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn malformed_signed_body_is_bad_request() {
    let harness = Harness::new().await;
    let body = "not json";
    let (status, _) = deliver(&harness, body, Some(sign_webhook(body.as_bytes()))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

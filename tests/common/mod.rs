//! Shared fixtures: in-memory stores, a gateway that never leaves the
//! process, and a `CheckoutApi` that drives the router directly.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, Router};
use chrono::Utc;
use http::{Method, Request, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::util::ServiceExt;
use uuid::Uuid;

use checkout_backend::api::{self, ApiDependencies, CUSTOMER_HEADER};
use checkout_backend::checkout::{
    ApiError, CheckoutApi, CheckoutFlow, MemorySessionStore, ScriptedBridge, StepController,
    UrlNavigator,
};
use checkout_backend::config::{CheckoutConfig, GatewayConfig};
use checkout_backend::database::memory::{MemoryProduct, MemoryStore};
use checkout_backend::database::repository::{Coupon, Order};
use checkout_backend::database::Stores;
use checkout_backend::middleware::error::ErrorResponse;
use checkout_backend::payments::providers::{RazorpayConfig, RazorpayGateway};
use checkout_backend::payments::types::{
    GatewayIntent, IntentRequest, IntentState, Money, WebhookEvent, WebhookVerificationResult,
};
use checkout_backend::payments::utils::hmac_sha256_hex;
use checkout_backend::payments::{PaymentGateway, PaymentResult};
use checkout_backend::services::{NotificationType, OrderNotifier};
use checkout_backend::types::{
    Address, CodEligibility, ConfirmationResult, CouponEvaluation, CreateOrderRequest,
    CustomerId, OrderCreationResult, ProductId, VerifyPaymentRequest,
};

pub const KEY_ID: &str = "rzp_test_key";
pub const KEY_SECRET: &str = "key_secret_test";
pub const WEBHOOK_SECRET: &str = "whsec_test";

/// Real signature and webhook handling; intents are minted locally
pub struct FakeGateway {
    inner: RazorpayGateway,
    intents: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        let inner = RazorpayGateway::new(RazorpayConfig {
            key_id: KEY_ID.to_string(),
            key_secret: KEY_SECRET.to_string(),
            webhook_secret: Some(WEBHOOK_SECRET.to_string()),
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
            max_retries: 0,
        })
        .expect("gateway should build");
        Self {
            inner,
            intents: AtomicUsize::new(0),
        }
    }

    pub fn intents_created(&self) -> usize {
        self.intents.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(&self, request: IntentRequest) -> PaymentResult<GatewayIntent> {
        let n = self.intents.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayIntent {
            gateway_order_id: format!("order_test_{}", n),
            amount: request.amount,
            receipt: Some(request.receipt),
            state: IntentState::Created,
            created_at: Utc::now(),
        })
    }

    async fn fetch_intent(&self, gateway_order_id: &str) -> PaymentResult<GatewayIntent> {
        Ok(GatewayIntent {
            gateway_order_id: gateway_order_id.to_string(),
            amount: Money {
                amount_minor: 0,
                currency: "INR".to_string(),
            },
            receipt: None,
            state: IntentState::Created,
            created_at: Utc::now(),
        })
    }

    fn verify_payment_signature(
        &self,
        gateway_order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> bool {
        self.inner
            .verify_payment_signature(gateway_order_id, payment_id, signature)
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> PaymentResult<WebhookVerificationResult> {
        self.inner.verify_webhook(payload, signature)
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<WebhookEvent> {
        self.inner.parse_webhook_event(payload)
    }

    fn key_id(&self) -> &str {
        KEY_ID
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

#[derive(Default)]
pub struct CountingNotifier {
    confirmed: AtomicUsize,
}

impl CountingNotifier {
    pub fn confirmations(&self) -> usize {
        self.confirmed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderNotifier for CountingNotifier {
    async fn notify(&self, _order: &Order, notification_type: NotificationType) {
        if notification_type == NotificationType::OrderConfirmed {
            self.confirmed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub struct Harness {
    pub store: MemoryStore,
    pub router: Router,
    pub gateway: Option<Arc<FakeGateway>>,
    pub notifier: Arc<CountingNotifier>,
    pub customer_id: CustomerId,
    pub address_id: Uuid,
    pub category_id: Uuid,
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(true).await
    }

    pub async fn without_gateway() -> Self {
        Self::build(false).await
    }

    async fn build(with_gateway: bool) -> Self {
        let store = MemoryStore::new();
        let customer_id = Uuid::new_v4();
        let address_id = Uuid::new_v4();
        store
            .add_address(Address {
                id: address_id,
                customer_id,
                label: "Home".to_string(),
                line1: "12 MG Road".to_string(),
                city: "Bengaluru".to_string(),
                postal_code: "560001".to_string(),
                is_default: true,
            })
            .await;

        let gateway = with_gateway.then(|| Arc::new(FakeGateway::new()));
        let gateway_config = if with_gateway {
            GatewayConfig {
                key_id: Some(KEY_ID.to_string()),
                key_secret: Some(KEY_SECRET.to_string()),
                webhook_secret: Some(WEBHOOK_SECRET.to_string()),
                ..GatewayConfig::default()
            }
        } else {
            GatewayConfig::default()
        };
        let notifier = Arc::new(CountingNotifier::default());

        let router = api::router(ApiDependencies {
            stores: Stores::memory(store.clone()),
            gateway: gateway
                .clone()
                .map(|g| g as Arc<dyn PaymentGateway>),
            gateway_config,
            checkout_config: CheckoutConfig::default(),
            cache: None,
            notifier: notifier.clone(),
        });

        Self {
            store,
            router,
            gateway,
            notifier,
            customer_id,
            address_id,
            category_id: Uuid::new_v4(),
        }
    }

    pub async fn add_product(&self, name: &str, price: i64, cod_allowed: bool) -> ProductId {
        self.store
            .add_product(MemoryProduct {
                id: Uuid::new_v4(),
                name: name.to_string(),
                category_id: self.category_id,
                price: Decimal::from(price),
                stock: 10,
                cod_allowed,
            })
            .await
    }

    pub async fn put_in_cart(&self, product_id: ProductId, quantity: i32) {
        self.store
            .set_cart_quantity(self.customer_id, product_id, quantity)
            .await;
    }

    pub fn api(&self) -> Arc<RouterApi> {
        Arc::new(RouterApi {
            router: self.router.clone(),
            customer_id: self.customer_id,
        })
    }

    pub fn controller(&self) -> (Arc<StepController>, Arc<MemorySessionStore>, Arc<UrlNavigator>) {
        let store = Arc::new(MemorySessionStore::new());
        let navigator = Arc::new(UrlNavigator::new("/checkout"));
        let controller = Arc::new(StepController::new(
            self.api(),
            store.clone(),
            navigator.clone(),
        ));
        (controller, store, navigator)
    }

    pub fn flow(&self, controller: Arc<StepController>, bridge: Arc<ScriptedBridge>) -> CheckoutFlow {
        CheckoutFlow::new(controller, self.api(), bridge)
            .with_verify_retries(2, std::time::Duration::from_millis(1))
    }

    /// Raw request with the customer header set
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        send(&self.router, self.customer_id, method, uri, body).await
    }
}

pub fn flat_coupon(code: &str, amount: i64, min_order_value: i64) -> Coupon {
    Coupon {
        id: Uuid::new_v4(),
        code: code.to_string(),
        discount_type: "flat".to_string(),
        discount_value: Decimal::from(amount),
        max_discount: None,
        min_order_value: Decimal::from(min_order_value),
        valid_from: None,
        valid_until: None,
        is_active: true,
        usage_limit: None,
        per_customer_limit: 1,
        first_order_only: false,
        eligible_category_ids: vec![],
    }
}

pub fn sign_webhook(body: &[u8]) -> String {
    hmac_sha256_hex(WEBHOOK_SECRET, body).expect("hmac accepts any key")
}

pub fn sign_payment(gateway_order_id: &str, payment_id: &str) -> String {
    hmac_sha256_hex(KEY_SECRET, format!("{}|{}", gateway_order_id, payment_id).as_bytes())
        .expect("hmac accepts any key")
}

pub async fn send(
    router: &Router,
    customer_id: CustomerId,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(CUSTOMER_HEADER, customer_id.to_string());
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

/// `CheckoutApi` over the in-process router
pub struct RouterApi {
    router: Router,
    customer_id: CustomerId,
}

impl RouterApi {
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let (status, json) = send(&self.router, self.customer_id, method, uri, body).await;
        if status.is_success() {
            return serde_json::from_value(json["data"].clone())
                .map_err(|e| ApiError::transport(e.to_string()));
        }
        let error: ErrorResponse =
            serde_json::from_value(json).map_err(|e| ApiError::transport(e.to_string()))?;
        Err(ApiError::from_response(status.as_u16(), error))
    }
}

#[async_trait]
impl CheckoutApi for RouterApi {
    async fn addresses(&self) -> Result<Vec<Address>, ApiError> {
        self.call(Method::GET, "/api/checkout/addresses", None).await
    }

    async fn apply_coupon(&self, code: &str) -> Result<CouponEvaluation, ApiError> {
        self.call(
            Method::POST,
            "/api/checkout/coupons/apply",
            Some(serde_json::json!({ "code": code })),
        )
        .await
    }

    async fn cod_eligibility(&self) -> Result<CodEligibility, ApiError> {
        self.call(Method::POST, "/api/checkout/cod-eligibility", None)
            .await
    }

    async fn create_order(
        &self,
        request: &CreateOrderRequest,
    ) -> Result<OrderCreationResult, ApiError> {
        self.call(
            Method::POST,
            "/api/orders",
            Some(serde_json::to_value(request).unwrap()),
        )
        .await
    }

    async fn verify_payment(
        &self,
        request: &VerifyPaymentRequest,
    ) -> Result<ConfirmationResult, ApiError> {
        self.call(
            Method::POST,
            "/api/payments/verify",
            Some(serde_json::to_value(request).unwrap()),
        )
        .await
    }
}

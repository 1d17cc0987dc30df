//! HTTP surface of the checkout service

pub mod checkout;
pub mod orders;
pub mod payments;
pub mod webhooks;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::RedisCache;
use crate::config::{CheckoutConfig, GatewayConfig};
use crate::database::repository::AddressStore;
use crate::database::Stores;
use crate::error::{AppError, ValidationError};
use crate::middleware::error::get_request_id_from_headers;
use crate::payments::PaymentGateway;
use crate::services::{
    CodEligibilityService, CouponService, OrderIntakeService, OrderNotifier,
    PaymentVerificationService, PricingService, WebhookProcessor,
};
use crate::types::CustomerId;

/// Set by the upstream auth layer
pub const CUSTOMER_HEADER: &str = "x-customer-id";

#[derive(Clone)]
pub struct CheckoutState {
    pub addresses: Arc<dyn AddressStore>,
    pub coupons: Arc<CouponService>,
    pub cod: Arc<CodEligibilityService>,
    pub intake: Arc<OrderIntakeService>,
    pub verification: Arc<PaymentVerificationService>,
}

/// Everything the router needs
pub struct ApiDependencies {
    pub stores: Stores,
    pub gateway: Option<Arc<dyn PaymentGateway>>,
    pub gateway_config: GatewayConfig,
    pub checkout_config: CheckoutConfig,
    pub cache: Option<RedisCache>,
    pub notifier: Arc<dyn OrderNotifier>,
}

/// Authenticated customer taken from [`CUSTOMER_HEADER`]
#[derive(Debug, Clone, Copy)]
pub struct Customer(pub CustomerId);

impl<S: Send + Sync> FromRequestParts<S> for Customer {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = get_request_id_from_headers(&parts.headers);
        let raw = parts
            .headers
            .get(CUSTOMER_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                tag(
                    AppError::validation(ValidationError::MissingField {
                        field: CUSTOMER_HEADER.to_string(),
                    }),
                    request_id.clone(),
                )
            })?;

        Uuid::parse_str(raw.trim()).map(Customer).map_err(|_| {
            tag(
                AppError::validation(ValidationError::InvalidField {
                    field: CUSTOMER_HEADER.to_string(),
                    reason: "must be a UUID".to_string(),
                }),
                request_id,
            )
        })
    }
}

fn tag(error: AppError, request_id: Option<String>) -> AppError {
    match request_id {
        Some(id) => error.with_request_id(id),
        None => error,
    }
}

/// Attach the caller's request id to an error
pub(crate) fn with_request_id(headers: &HeaderMap) -> impl Fn(AppError) -> AppError + '_ {
    move |error| tag(error, get_request_id_from_headers(headers))
}

pub fn router(deps: ApiDependencies) -> Router {
    let ApiDependencies {
        stores,
        gateway,
        gateway_config,
        checkout_config,
        cache,
        notifier,
    } = deps;

    let coupons = Arc::new(CouponService::new(
        stores.coupons.clone(),
        stores.carts.clone(),
        stores.orders.clone(),
    ));
    let cod = Arc::new(CodEligibilityService::new(stores.carts.clone(), cache.clone()));
    let intake = Arc::new(OrderIntakeService::new(
        stores.addresses.clone(),
        stores.carts.clone(),
        stores.orders.clone(),
        coupons.clone(),
        PricingService::new(&checkout_config),
        gateway.clone(),
        gateway_config,
        notifier.clone(),
    ));
    let verification = Arc::new(PaymentVerificationService::new(
        stores.orders.clone(),
        gateway.clone(),
        notifier,
    ));
    let webhook_state = Arc::new(webhooks::WebhookState {
        processor: Arc::new(WebhookProcessor::new(gateway, verification.clone(), cache)),
    });

    let state = CheckoutState {
        addresses: stores.addresses,
        coupons,
        cod,
        intake,
        verification,
    };

    let checkout_routes = Router::new()
        .route("/api/checkout/addresses", get(checkout::list_addresses))
        .route("/api/checkout/coupons/apply", post(checkout::apply_coupon))
        .route("/api/checkout/cod-eligibility", post(checkout::cod_eligibility))
        .route("/api/orders", post(orders::create_order))
        .route("/api/orders/{order_number}", get(orders::get_order))
        .route("/api/payments/verify", post(payments::verify_payment))
        .with_state(state);

    let webhook_routes = Router::new()
        .route("/webhooks/gateway", post(webhooks::handle_gateway_webhook))
        .with_state(webhook_state);

    checkout_routes.merge(webhook_routes)
}

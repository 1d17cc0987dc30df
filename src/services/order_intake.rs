//! Order Intake: turns a checkout submission into a persisted order.
//!
//! Totals, coupon eligibility and COD eligibility are recomputed here from live
//! data; nothing the client computed is trusted.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::{
    AddressStore, CartStore, FinalizeOutcome, NewOrder, Order, OrderStore,
};
use crate::error::{
    AppError, AppErrorKind, AppResult, DomainError, ExternalError, InfrastructureError,
};
use crate::payments::types::{IntentRequest, Money};
use crate::payments::PaymentGateway;
use crate::services::cod_eligibility::CodEligibilityService;
use crate::services::coupon::CouponService;
use crate::services::notification::{NotificationType, OrderNotifier};
use crate::services::pricing::PricingService;
use crate::types::{
    cart_fingerprint, CartLine, CreateOrderRequest, CustomerId, GatewayCheckoutOptions,
    OrderCreationResult, OrderSummary, PaymentMethod, PriceBreakdown,
};

const ORDER_NUMBER_ATTEMPTS: usize = 3;

/// `ORD-YYYYMMDD-XXXXXX`
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(6)
        .collect::<String>()
        .to_uppercase();
    format!("ORD-{}-{}", now.format("%Y%m%d"), suffix)
}

pub struct OrderIntakeService {
    addresses: Arc<dyn AddressStore>,
    carts: Arc<dyn CartStore>,
    orders: Arc<dyn OrderStore>,
    coupons: Arc<CouponService>,
    pricing: PricingService,
    gateway: Option<Arc<dyn PaymentGateway>>,
    gateway_config: GatewayConfig,
    notifier: Arc<dyn OrderNotifier>,
}

/// Live state the order is built from
struct PricedCart {
    lines: Vec<CartLine>,
    pricing: PriceBreakdown,
    coupon_code: Option<String>,
}

impl OrderIntakeService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        addresses: Arc<dyn AddressStore>,
        carts: Arc<dyn CartStore>,
        orders: Arc<dyn OrderStore>,
        coupons: Arc<CouponService>,
        pricing: PricingService,
        gateway: Option<Arc<dyn PaymentGateway>>,
        gateway_config: GatewayConfig,
        notifier: Arc<dyn OrderNotifier>,
    ) -> Self {
        Self {
            addresses,
            carts,
            orders,
            coupons,
            pricing,
            gateway,
            gateway_config,
            notifier,
        }
    }

    pub async fn create(
        &self,
        customer_id: CustomerId,
        request: CreateOrderRequest,
    ) -> AppResult<OrderCreationResult> {
        if self
            .addresses
            .find_for_customer(customer_id, request.address_id)
            .await?
            .is_none()
        {
            warn!(
                customer_id = %customer_id,
                address_id = %request.address_id,
                "order submitted with unknown address"
            );
            return Err(AppError::domain(DomainError::AddressNotFound {
                address_id: request.address_id.to_string(),
            }));
        }

        let priced = self
            .price_cart(customer_id, request.coupon_code.as_deref())
            .await?;

        match request.payment_method {
            PaymentMethod::Cod => self.create_cod(customer_id, &request, priced).await,
            PaymentMethod::Online => self.create_online(customer_id, &request, priced).await,
        }
    }

    /// Order visible to its owner only
    pub async fn find_for_customer(
        &self,
        customer_id: CustomerId,
        order_number: &str,
    ) -> AppResult<OrderSummary> {
        match self.orders.find_by_number(order_number).await? {
            Some(order) if order.customer_id == customer_id => Ok(order.to_summary()),
            _ => Err(AppError::domain(DomainError::OrderNotFound {
                order_number: order_number.to_string(),
            })),
        }
    }

    async fn price_cart(
        &self,
        customer_id: CustomerId,
        coupon_code: Option<&str>,
    ) -> AppResult<PricedCart> {
        let lines = self.carts.lines(customer_id).await?;
        if lines.is_empty() {
            return Err(AppError::domain(DomainError::EmptyCart));
        }

        let coupon_code = coupon_code.map(str::trim).filter(|c| !c.is_empty());
        let (discount, coupon_code) = match coupon_code {
            Some(code) => {
                let evaluation = self.coupons.evaluate(customer_id, code, &lines).await?;
                if !evaluation.eligible {
                    info!(
                        customer_id = %customer_id,
                        code = %evaluation.code,
                        "coupon rejected at submit"
                    );
                    return Err(AppError::domain(DomainError::CouponRejected {
                        code: evaluation.code,
                        reason: evaluation
                            .reason
                            .unwrap_or(crate::types::CouponRejectionReason::UnknownCode),
                    }));
                }
                (evaluation.discount_amount, Some(evaluation.code))
            }
            None => (rust_decimal::Decimal::ZERO, None),
        };

        let pricing = self.pricing.breakdown(&lines, discount);
        Ok(PricedCart {
            lines,
            pricing,
            coupon_code,
        })
    }

    async fn create_cod(
        &self,
        customer_id: CustomerId,
        request: &CreateOrderRequest,
        priced: PricedCart,
    ) -> AppResult<OrderCreationResult> {
        CodEligibilityService::ensure_eligible(&priced.lines)?;

        let order = self
            .insert_order(customer_id, request, PaymentMethod::Cod, priced)
            .await?;

        match self.orders.finalize(&order.order_number, None).await? {
            FinalizeOutcome::Confirmed(order) => {
                info!(
                    order_number = %order.order_number,
                    customer_id = %customer_id,
                    total = %order.total,
                    "✅ COD order confirmed"
                );
                self.notifier
                    .notify(&order, NotificationType::OrderConfirmed)
                    .await;
                Ok(OrderCreationResult::Confirmed {
                    order: order.to_summary(),
                })
            }
            other => {
                error!(
                    order_number = %order.order_number,
                    outcome = ?other,
                    "freshly inserted COD order could not be finalized"
                );
                Err(AppError::new(AppErrorKind::Infrastructure(
                    InfrastructureError::Database {
                        message: "COD order finalization failed".to_string(),
                        is_retryable: false,
                    },
                )))
            }
        }
    }

    async fn create_online(
        &self,
        customer_id: CustomerId,
        request: &CreateOrderRequest,
        priced: PricedCart,
    ) -> AppResult<OrderCreationResult> {
        let gateway = self.gateway.as_ref().ok_or_else(|| {
            warn!(customer_id = %customer_id, "online payment requested but gateway not configured");
            AppError::new(AppErrorKind::External(ExternalError::GatewayNotConfigured))
        })?;

        if let Some(reused) = self
            .reusable_pending(customer_id, request, &priced)
            .await?
        {
            info!(
                order_number = %reused.order_number,
                customer_id = %customer_id,
                "reusing pending order for checkout retry"
            );
            let checkout = self.checkout_options(gateway.as_ref(), &reused)?;
            return Ok(OrderCreationResult::AwaitingPayment {
                order: reused.to_summary(),
                checkout,
                reused: true,
            });
        }

        let total = priced.pricing.total;
        let order = self
            .insert_order(customer_id, request, PaymentMethod::Online, priced)
            .await?;

        let amount = Money::from_major(total, self.gateway_config.currency.clone())?;
        let intent_request = IntentRequest {
            amount,
            receipt: order.order_number.clone(),
            notes: Some(serde_json::json!({
                "order_number": order.order_number,
                "customer_id": customer_id.to_string(),
            })),
        };

        let intent = match gateway.create_intent(intent_request).await {
            Ok(intent) => intent,
            Err(e) => {
                error!(
                    order_number = %order.order_number,
                    error = %e,
                    "gateway intent creation failed"
                );
                // No charge is possible without an intent
                self.orders
                    .mark_failed(&order.order_number, &format!("intent creation failed: {}", e))
                    .await?;
                return Err(e.into());
            }
        };

        let expires_at = Utc::now() + Duration::seconds(self.gateway_config.intent_ttl_secs);
        let order = self
            .orders
            .attach_intent(&order.order_number, &intent.gateway_order_id, expires_at)
            .await?;

        info!(
            order_number = %order.order_number,
            gateway_order_id = %intent.gateway_order_id,
            amount_minor = intent.amount.amount_minor,
            "⏳ online order awaiting payment"
        );

        let checkout = self.checkout_options(gateway.as_ref(), &order)?;
        Ok(OrderCreationResult::AwaitingPayment {
            order: order.to_summary(),
            checkout,
            reused: false,
        })
    }

    /// Pending order from the same session whose intent is still live and
    /// whose address, coupon, cart lines and recomputed total are unchanged
    async fn reusable_pending(
        &self,
        customer_id: CustomerId,
        request: &CreateOrderRequest,
        priced: &PricedCart,
    ) -> AppResult<Option<Order>> {
        let Some(session_key) = request.session_key.as_deref() else {
            return Ok(None);
        };
        let Some(existing) = self
            .orders
            .find_pending_for_session(customer_id, session_key)
            .await?
        else {
            return Ok(None);
        };

        let matches = existing.intent_is_live(Utc::now())
            && existing.address_id == request.address_id
            && existing.cart_fingerprint == cart_fingerprint(&priced.lines)
            && existing.total == priced.pricing.total
            && existing.coupon_code == priced.coupon_code;

        if !matches {
            info!(
                order_number = %existing.order_number,
                "pending order superseded by changed checkout"
            );
            return Ok(None);
        }
        Ok(Some(existing))
    }

    async fn insert_order(
        &self,
        customer_id: CustomerId,
        request: &CreateOrderRequest,
        payment_method: PaymentMethod,
        priced: PricedCart,
    ) -> AppResult<Order> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let new_order = NewOrder {
                order_number: generate_order_number(Utc::now()),
                customer_id,
                address_id: request.address_id,
                payment_method,
                session_key: request.session_key.clone(),
                pricing: priced.pricing.clone(),
                coupon_code: priced.coupon_code.clone(),
                items: priced.lines.clone(),
            };

            match self.orders.insert(new_order).await {
                Ok(order) => return Ok(order),
                Err(DatabaseError {
                    kind: DatabaseErrorKind::UniqueViolation { .. },
                }) if attempt < ORDER_NUMBER_ATTEMPTS => {
                    warn!(attempt, "order number collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn checkout_options(
        &self,
        gateway: &dyn PaymentGateway,
        order: &Order,
    ) -> AppResult<GatewayCheckoutOptions> {
        let (Some(gateway_order_id), Some(expires_at)) =
            (order.payment_reference.clone(), order.intent_expires_at)
        else {
            return Err(AppError::new(AppErrorKind::Infrastructure(
                InfrastructureError::Database {
                    message: format!("order {} has no gateway intent", order.order_number),
                    is_retryable: false,
                },
            )));
        };

        let amount = Money::from_major(order.total, self.gateway_config.currency.clone())?;
        Ok(GatewayCheckoutOptions {
            key_id: gateway.key_id().to_string(),
            amount_minor: amount.amount_minor,
            currency: amount.currency,
            gateway_order_id,
            order_number: order.order_number.clone(),
            expires_at,
        })
    }
}

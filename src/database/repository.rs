//! Store traits the checkout services depend on, plus the row types they exchange.
//!
//! Postgres implementations live in the sibling `*_repository` modules and an
//! in-memory implementation in [`super::memory`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::types::{
    Address, AddressId, CartLine, CategoryId, CustomerId, OrderStatus, OrderSummary,
    PaymentMethod, PriceBreakdown,
};

/// Order row
#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub address_id: AddressId,
    pub status: String,
    pub payment_method: String,
    /// Gateway order id attached when an online intent is created
    pub payment_reference: Option<String>,
    /// Gateway payment id stored on confirmation
    pub payment_id: Option<String>,
    pub session_key: Option<String>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub delivery_fee: Decimal,
    pub total: Decimal,
    pub coupon_code: Option<String>,
    /// Digest of the ordered lines, see [`crate::types::cart_fingerprint`]
    pub cart_fingerprint: String,
    pub intent_expires_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Unknown statuses are treated as failed so they can never be paid
    pub fn status(&self) -> OrderStatus {
        OrderStatus::from_db_status(&self.status).unwrap_or(OrderStatus::Failed)
    }

    pub fn payment_method(&self) -> PaymentMethod {
        PaymentMethod::from_str(&self.payment_method).unwrap_or(PaymentMethod::Online)
    }

    pub fn intent_is_live(&self, now: DateTime<Utc>) -> bool {
        self.payment_reference.is_some()
            && self.intent_expires_at.map(|at| at > now).unwrap_or(false)
    }

    pub fn to_summary(&self) -> OrderSummary {
        OrderSummary {
            order_number: self.order_number.clone(),
            status: self.status(),
            payment_method: self.payment_method(),
            payment_reference: self.payment_reference.clone(),
            subtotal: self.subtotal,
            discount: self.discount,
            delivery_fee: self.delivery_fee,
            total: self.total,
            coupon_code: self.coupon_code.clone(),
            created_at: self.created_at,
        }
    }
}

/// Everything needed to insert a pending order and its line items
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: String,
    pub customer_id: CustomerId,
    pub address_id: AddressId,
    pub payment_method: PaymentMethod,
    pub session_key: Option<String>,
    pub pricing: PriceBreakdown,
    pub coupon_code: Option<String>,
    pub items: Vec<CartLine>,
}

/// Result of the conditional `pending -> confirmed` update
#[derive(Debug, Clone)]
pub enum FinalizeOutcome {
    /// This call performed the transition and its side effects
    Confirmed(Order),
    /// Already confirmed with the same payment id; nothing was repeated
    AlreadyConfirmed(Order),
    /// Already confirmed with a different payment id
    PaymentIdConflict(Order),
    /// Order is `failed` and there is no verified payment to recover it with
    NotPending(Order),
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscountKind {
    Flat,
    Percent,
}

/// Coupon row
#[derive(Debug, Clone, FromRow)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub discount_type: String,
    pub discount_value: Decimal,
    /// Cap for percentage coupons
    pub max_discount: Option<Decimal>,
    pub min_order_value: Decimal,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub usage_limit: Option<i32>,
    pub per_customer_limit: i32,
    pub first_order_only: bool,
    /// Empty means every category is eligible
    pub eligible_category_ids: Vec<CategoryId>,
}

impl Coupon {
    pub fn discount_kind(&self) -> DiscountKind {
        match self.discount_type.to_lowercase().as_str() {
            "percent" | "percentage" => DiscountKind::Percent,
            _ => DiscountKind::Flat,
        }
    }
}

#[async_trait]
pub trait AddressStore: Send + Sync {
    async fn list_for_customer(&self, customer_id: CustomerId)
        -> Result<Vec<Address>, DatabaseError>;

    async fn find_for_customer(
        &self,
        customer_id: CustomerId,
        address_id: AddressId,
    ) -> Result<Option<Address>, DatabaseError> {
        Ok(self
            .list_for_customer(customer_id)
            .await?
            .into_iter()
            .find(|a| a.id == address_id))
    }
}

#[async_trait]
pub trait CartStore: Send + Sync {
    /// Cart lines priced from the live catalogue
    async fn lines(&self, customer_id: CustomerId) -> Result<Vec<CartLine>, DatabaseError>;
}

#[async_trait]
pub trait CouponStore: Send + Sync {
    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>, DatabaseError>;

    async fn total_redemptions(&self, coupon_id: Uuid) -> Result<i64, DatabaseError>;

    async fn customer_redemptions(
        &self,
        coupon_id: Uuid,
        customer_id: CustomerId,
    ) -> Result<i64, DatabaseError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a `pending` order with its line items
    async fn insert(&self, order: NewOrder) -> Result<Order, DatabaseError>;

    async fn find_by_number(&self, order_number: &str) -> Result<Option<Order>, DatabaseError>;

    async fn find_by_gateway_order_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Order>, DatabaseError>;

    /// Most recent pending online order for this customer and client session
    async fn find_pending_for_session(
        &self,
        customer_id: CustomerId,
        session_key: &str,
    ) -> Result<Option<Order>, DatabaseError>;

    async fn attach_intent(
        &self,
        order_number: &str,
        gateway_order_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Order, DatabaseError>;

    /// Atomically confirm a pending order: store the payment id, decrement
    /// inventory, record coupon usage and remove the ordered lines from the
    /// cart. A `failed` online order is confirmed too when a verified payment
    /// id arrives for its gateway order. Repeating the call with the same
    /// payment id has no further effect.
    async fn finalize(
        &self,
        order_number: &str,
        payment_id: Option<&str>,
    ) -> Result<FinalizeOutcome, DatabaseError>;

    /// Move a pending order to `failed`; returns `None` when the order was not pending
    async fn mark_failed(
        &self,
        order_number: &str,
        reason: &str,
    ) -> Result<Option<Order>, DatabaseError>;

    /// Record a rejected payment attempt without changing the status
    async fn record_rejection(&self, order_number: &str, reason: &str)
        -> Result<(), DatabaseError>;

    async fn confirmed_order_count(&self, customer_id: CustomerId) -> Result<i64, DatabaseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(status: &str, reference: Option<&str>, expires_in: Option<i64>) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            order_number: "ORD-20260101-ABC123".to_string(),
            customer_id: Uuid::new_v4(),
            address_id: Uuid::new_v4(),
            status: status.to_string(),
            payment_method: "online".to_string(),
            payment_reference: reference.map(str::to_string),
            payment_id: None,
            session_key: None,
            subtotal: Decimal::from(600),
            discount: Decimal::from(100),
            delivery_fee: Decimal::ZERO,
            total: Decimal::from(500),
            coupon_code: Some("FIRST100".to_string()),
            cart_fingerprint: String::new(),
            intent_expires_at: expires_in.map(|s| now + chrono::Duration::seconds(s)),
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn unknown_status_is_never_payable() {
        assert_eq!(order("weird", None, None).status(), OrderStatus::Failed);
        assert_eq!(order("pending", None, None).status(), OrderStatus::Pending);
    }

    #[test]
    fn intent_liveness_requires_reference_and_future_expiry() {
        let now = Utc::now();
        assert!(order("pending", Some("order_1"), Some(600)).intent_is_live(now));
        assert!(!order("pending", Some("order_1"), Some(-5)).intent_is_live(now));
        assert!(!order("pending", None, Some(600)).intent_is_live(now));
    }

    #[test]
    fn summary_carries_totals() {
        let summary = order("pending", Some("order_1"), Some(600)).to_summary();
        assert_eq!(summary.total, Decimal::from(500));
        assert_eq!(summary.payment_method, PaymentMethod::Online);
        assert_eq!(summary.coupon_code.as_deref(), Some("FIRST100"));
    }
}

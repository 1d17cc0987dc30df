//! Domain and wire types shared by the checkout server and the checkout client

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type CustomerId = Uuid;
pub type AddressId = Uuid;
pub type ProductId = Uuid;
pub type CategoryId = Uuid;

/// How the customer pays for an order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cod,
    Online,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "cod",
            PaymentMethod::Online => "online",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "cod" | "cash_on_delivery" => Ok(PaymentMethod::Cod),
            "online" => Ok(PaymentMethod::Online),
            other => Err(format!("unsupported payment method: {}", other)),
        }
    }
}

/// Server-side order lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created by Order Intake, payment not yet confirmed
    Pending,
    Confirmed,
    Failed,
}

impl OrderStatus {
    pub fn valid_transitions(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Confirmed, OrderStatus::Failed],
            OrderStatus::Confirmed => &[],
            OrderStatus::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        self.valid_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Confirmed | OrderStatus::Failed)
    }

    pub fn from_db_status(status: &str) -> Option<Self> {
        match status.to_lowercase().as_str() {
            "pending" => Some(OrderStatus::Pending),
            "confirmed" => Some(OrderStatus::Confirmed),
            "failed" => Some(OrderStatus::Failed),
            _ => None,
        }
    }

    pub fn to_db_status(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_status())
    }
}

/// Delivery address as exposed by the external address store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Address {
    pub id: AddressId,
    pub customer_id: CustomerId,
    pub label: String,
    pub line1: String,
    pub city: String,
    pub postal_code: String,
    pub is_default: bool,
}

/// One cart line priced from the live catalogue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    pub category_id: CategoryId,
    pub quantity: i32,
    pub unit_price: Decimal,
    /// False when either the product or its category forbids cash on delivery
    pub cod_allowed: bool,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

pub fn cart_subtotal(lines: &[CartLine]) -> Decimal {
    lines.iter().map(CartLine::line_total).sum()
}

pub fn cart_categories(lines: &[CartLine]) -> Vec<CategoryId> {
    let mut categories: Vec<CategoryId> = lines.iter().map(|l| l.category_id).collect();
    categories.sort();
    categories.dedup();
    categories
}

/// Stable digest of cart contents; changes whenever an item is added,
/// removed or its quantity changes.
pub fn cart_fingerprint(lines: &[CartLine]) -> String {
    let mut parts: Vec<String> = lines
        .iter()
        .map(|l| format!("{}:{}", l.product_id, l.quantity))
        .collect();
    parts.sort();

    let mut hasher = Sha256::new();
    hasher.update(parts.join(",").as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

/// Coupon approved at apply time. The discount is a cache and is
/// re-validated before any price computation that matters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppliedCoupon {
    pub code: String,
    pub discount_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CouponRejectionReason {
    UnknownCode,
    Expired,
    NotYetActive,
    MinimumOrderNotMet { minimum_order_value: Decimal },
    CategoryNotEligible,
    AlreadyUsed,
    FirstOrderOnly,
    UsageLimitReached,
}

impl CouponRejectionReason {
    pub fn message(&self) -> String {
        match self {
            CouponRejectionReason::UnknownCode => "This coupon code does not exist".to_string(),
            CouponRejectionReason::Expired => "This coupon has expired".to_string(),
            CouponRejectionReason::NotYetActive => "This coupon is not active yet".to_string(),
            CouponRejectionReason::MinimumOrderNotMet {
                minimum_order_value,
            } => format!(
                "Add items worth at least ₹{} to use this coupon",
                minimum_order_value
            ),
            CouponRejectionReason::CategoryNotEligible => {
                "This coupon does not apply to the items in your cart".to_string()
            }
            CouponRejectionReason::AlreadyUsed => {
                "You have already used this coupon".to_string()
            }
            CouponRejectionReason::FirstOrderOnly => {
                "This coupon is only valid on your first order".to_string()
            }
            CouponRejectionReason::UsageLimitReached => {
                "This coupon has reached its usage limit".to_string()
            }
        }
    }
}

/// Transient result of evaluating a coupon; never persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CouponEvaluation {
    pub code: String,
    pub discount_amount: Decimal,
    pub eligible: bool,
    pub reason: Option<CouponRejectionReason>,
}

impl CouponEvaluation {
    pub fn approved(code: impl Into<String>, discount_amount: Decimal) -> Self {
        Self {
            code: code.into(),
            discount_amount,
            eligible: true,
            reason: None,
        }
    }

    pub fn rejected(code: impl Into<String>, reason: CouponRejectionReason) -> Self {
        Self {
            code: code.into(),
            discount_amount: Decimal::ZERO,
            eligible: false,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodEligibility {
    pub eligible: bool,
    pub disqualifying_items: Vec<String>,
    /// Fingerprint of the cart the decision was made for
    pub cart_fingerprint: String,
}

/// Price breakdown recomputed from live prices
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceBreakdown {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub delivery_fee: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderSummary {
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_reference: Option<String>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub delivery_fee: Decimal,
    pub total: Decimal,
    pub coupon_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Everything the client needs to open the hosted gateway checkout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayCheckoutOptions {
    pub key_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub gateway_order_id: String,
    pub order_number: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateOrderRequest {
    pub address_id: AddressId,
    pub payment_method: PaymentMethod,
    pub coupon_code: Option<String>,
    /// Client checkout session; lets a retry after dismissal reuse the
    /// pending order instead of creating a new one
    pub session_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OrderCreationResult {
    /// Cash on delivery: finalized at creation
    Confirmed { order: OrderSummary },
    /// Online: pending until the gateway payment is verified
    AwaitingPayment {
        order: OrderSummary,
        checkout: GatewayCheckoutOptions,
        reused: bool,
    },
}

impl OrderCreationResult {
    pub fn order(&self) -> &OrderSummary {
        match self {
            OrderCreationResult::Confirmed { order } => order,
            OrderCreationResult::AwaitingPayment { order, .. } => order,
        }
    }
}

/// Signed success payload returned by the gateway UI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayPayload {
    #[serde(alias = "razorpay_order_id")]
    pub gateway_order_id: String,
    #[serde(alias = "razorpay_payment_id")]
    pub payment_id: String,
    #[serde(alias = "razorpay_signature")]
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerifyPaymentRequest {
    pub order_number: String,
    pub payload: GatewayPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifiedPayment {
    pub order_number: String,
    pub gateway_order_id: String,
    pub payment_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfirmationResult {
    pub order: OrderSummary,
    /// True when this call found the order already confirmed with the same payment
    pub already_confirmed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplyCouponRequest {
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(product_id: Uuid, qty: i32, price: i64) -> CartLine {
        CartLine {
            product_id,
            name: "Item".to_string(),
            category_id: Uuid::nil(),
            quantity: qty,
            unit_price: Decimal::from(price),
            cod_allowed: true,
        }
    }

    #[test]
    fn order_status_transitions() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Confirmed));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Failed));
        assert!(!OrderStatus::Confirmed.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Failed.can_transition_to(OrderStatus::Confirmed));
        assert!(OrderStatus::Confirmed.is_terminal());
    }

    #[test]
    fn fingerprint_ignores_line_order_but_tracks_quantity() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let first = cart_fingerprint(&[line(a, 1, 100), line(b, 2, 50)]);
        let reordered = cart_fingerprint(&[line(b, 2, 50), line(a, 1, 100)]);
        let changed = cart_fingerprint(&[line(a, 1, 100), line(b, 3, 50)]);

        assert_eq!(first, reordered);
        assert_ne!(first, changed);
    }

    #[test]
    fn subtotal_sums_line_totals() {
        let lines = vec![line(Uuid::new_v4(), 2, 150), line(Uuid::new_v4(), 1, 300)];
        assert_eq!(cart_subtotal(&lines), Decimal::from(600));
    }

    #[test]
    fn gateway_payload_accepts_razorpay_field_names() {
        let payload: GatewayPayload = serde_json::from_value(serde_json::json!({
            "razorpay_order_id": "order_123",
            "razorpay_payment_id": "pay_456",
            "razorpay_signature": "abc"
        }))
        .expect("payload should deserialize");
        assert_eq!(payload.gateway_order_id, "order_123");
        assert_eq!(payload.payment_id, "pay_456");
    }

    #[test]
    fn payment_method_parsing() {
        assert_eq!(PaymentMethod::from_str("COD"), Ok(PaymentMethod::Cod));
        assert_eq!(PaymentMethod::from_str("online"), Ok(PaymentMethod::Online));
        assert!(PaymentMethod::from_str("cheque").is_err());
    }
}

//! Coupon validation against a live cart
//!
//! The same evaluation runs when a customer applies a code and again inside
//! Order Intake, so a discount approved earlier in the session is never
//! trusted at submit time.

use chrono::Utc;
use regex::Regex;
use rust_decimal::Decimal;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

use crate::database::repository::{CartStore, Coupon, CouponStore, DiscountKind, OrderStore};
use crate::error::{AppError, AppResult, DomainError, ValidationError};
use crate::types::{
    cart_subtotal, CartLine, CouponEvaluation, CouponRejectionReason, CustomerId,
};

fn code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Z0-9][A-Z0-9_-]{2,31}$").expect("coupon code pattern is valid")
    })
}

/// Trim and uppercase a customer-entered code
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

pub struct CouponService {
    coupons: Arc<dyn CouponStore>,
    carts: Arc<dyn CartStore>,
    orders: Arc<dyn OrderStore>,
}

impl CouponService {
    pub fn new(
        coupons: Arc<dyn CouponStore>,
        carts: Arc<dyn CartStore>,
        orders: Arc<dyn OrderStore>,
    ) -> Self {
        Self {
            coupons,
            carts,
            orders,
        }
    }

    /// Validate `code` against the customer's current cart
    pub async fn apply(&self, customer_id: CustomerId, code: &str) -> AppResult<CouponEvaluation> {
        let lines = self.carts.lines(customer_id).await?;
        if lines.is_empty() {
            return Err(AppError::domain(DomainError::EmptyCart));
        }

        let evaluation = self.evaluate(customer_id, code, &lines).await?;
        info!(
            customer_id = %customer_id,
            code = %evaluation.code,
            eligible = evaluation.eligible,
            discount = %evaluation.discount_amount,
            "coupon evaluated"
        );
        Ok(evaluation)
    }

    /// Evaluate a code against an already loaded cart snapshot
    pub async fn evaluate(
        &self,
        customer_id: CustomerId,
        code: &str,
        lines: &[CartLine],
    ) -> AppResult<CouponEvaluation> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(AppError::validation(ValidationError::MissingField {
                field: "code".to_string(),
            }));
        }
        if !code_pattern().is_match(&code) {
            debug!(code = %code, "coupon code has invalid format");
            return Ok(CouponEvaluation::rejected(code, CouponRejectionReason::UnknownCode));
        }

        let coupon = match self.coupons.find_by_code(&code).await? {
            Some(coupon) if coupon.is_active => coupon,
            _ => return Ok(CouponEvaluation::rejected(code, CouponRejectionReason::UnknownCode)),
        };

        if let Some(reason) = self.rejection_reason(&coupon, customer_id, lines).await? {
            return Ok(CouponEvaluation::rejected(code, reason));
        }

        Ok(CouponEvaluation::approved(code, discount_for(&coupon, lines)))
    }

    async fn rejection_reason(
        &self,
        coupon: &Coupon,
        customer_id: CustomerId,
        lines: &[CartLine],
    ) -> AppResult<Option<CouponRejectionReason>> {
        let now = Utc::now();
        if coupon.valid_from.map(|from| now < from).unwrap_or(false) {
            return Ok(Some(CouponRejectionReason::NotYetActive));
        }
        if coupon.valid_until.map(|until| now > until).unwrap_or(false) {
            return Ok(Some(CouponRejectionReason::Expired));
        }

        if let Some(limit) = coupon.usage_limit {
            if self.coupons.total_redemptions(coupon.id).await? >= i64::from(limit) {
                return Ok(Some(CouponRejectionReason::UsageLimitReached));
            }
        }

        if coupon.first_order_only && self.orders.confirmed_order_count(customer_id).await? > 0 {
            return Ok(Some(CouponRejectionReason::FirstOrderOnly));
        }

        let used = self
            .coupons
            .customer_redemptions(coupon.id, customer_id)
            .await?;
        if used >= i64::from(coupon.per_customer_limit.max(1)) {
            return Ok(Some(CouponRejectionReason::AlreadyUsed));
        }

        if cart_subtotal(lines) < coupon.min_order_value {
            return Ok(Some(CouponRejectionReason::MinimumOrderNotMet {
                minimum_order_value: coupon.min_order_value,
            }));
        }

        if eligible_subtotal(coupon, lines) <= Decimal::ZERO {
            return Ok(Some(CouponRejectionReason::CategoryNotEligible));
        }

        Ok(None)
    }
}

/// Subtotal of lines the coupon applies to
fn eligible_subtotal(coupon: &Coupon, lines: &[CartLine]) -> Decimal {
    if coupon.eligible_category_ids.is_empty() {
        return cart_subtotal(lines);
    }
    lines
        .iter()
        .filter(|l| coupon.eligible_category_ids.contains(&l.category_id))
        .map(CartLine::line_total)
        .sum()
}

/// Discount amount; never exceeds the eligible subtotal
pub fn discount_for(coupon: &Coupon, lines: &[CartLine]) -> Decimal {
    let base = eligible_subtotal(coupon, lines);
    let raw = match coupon.discount_kind() {
        DiscountKind::Flat => coupon.discount_value,
        DiscountKind::Percent => {
            let amount = base * coupon.discount_value / Decimal::from(100);
            match coupon.max_discount {
                Some(cap) => amount.min(cap),
                None => amount,
            }
        }
    };
    raw.max(Decimal::ZERO).min(base).round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::{MemoryProduct, MemoryStore};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn coupon(code: &str) -> Coupon {
        Coupon {
            id: Uuid::new_v4(),
            code: code.to_string(),
            discount_type: "flat".to_string(),
            discount_value: dec!(100),
            max_discount: None,
            min_order_value: Decimal::ZERO,
            valid_from: None,
            valid_until: None,
            is_active: true,
            usage_limit: None,
            per_customer_limit: 1,
            first_order_only: false,
            eligible_category_ids: vec![],
        }
    }

    async fn setup(price: Decimal) -> (CouponService, MemoryStore, CustomerId, Uuid) {
        let store = MemoryStore::new();
        let customer = Uuid::new_v4();
        let category = Uuid::new_v4();
        let product = store
            .add_product(MemoryProduct {
                id: Uuid::new_v4(),
                name: "Ghee 1L".to_string(),
                category_id: category,
                price,
                stock: 5,
                cod_allowed: true,
            })
            .await;
        store.set_cart_quantity(customer, product, 1).await;

        let shared = Arc::new(store.clone());
        let service = CouponService::new(shared.clone(), shared.clone(), shared);
        (service, store, customer, category)
    }

    #[tokio::test]
    async fn flat_coupon_is_approved() {
        let (service, store, customer, _) = setup(dec!(600)).await;
        store.add_coupon(coupon("FIRST100")).await;

        let evaluation = service.apply(customer, " first100 ").await.unwrap();
        assert!(evaluation.eligible);
        assert_eq!(evaluation.code, "FIRST100");
        assert_eq!(evaluation.discount_amount, dec!(100));
    }

    #[tokio::test]
    async fn unknown_and_malformed_codes_are_rejected() {
        let (service, _, customer, _) = setup(dec!(600)).await;

        let unknown = service.apply(customer, "NOPE1").await.unwrap();
        assert_eq!(unknown.reason, Some(CouponRejectionReason::UnknownCode));

        let malformed = service.apply(customer, "x!").await.unwrap();
        assert!(!malformed.eligible);
    }

    #[tokio::test]
    async fn minimum_order_is_enforced() {
        let (service, store, customer, _) = setup(dec!(400)).await;
        let mut save50 = coupon("SAVE50");
        save50.discount_value = dec!(50);
        save50.min_order_value = dec!(500);
        store.add_coupon(save50).await;

        let evaluation = service.apply(customer, "SAVE50").await.unwrap();
        assert_eq!(
            evaluation.reason,
            Some(CouponRejectionReason::MinimumOrderNotMet {
                minimum_order_value: dec!(500)
            })
        );
    }

    #[tokio::test]
    async fn expired_and_future_coupons_are_rejected() {
        let (service, store, customer, _) = setup(dec!(600)).await;
        let mut expired = coupon("OLD10");
        expired.valid_until = Some(Utc::now() - chrono::Duration::days(1));
        store.add_coupon(expired).await;
        let mut future = coupon("SOON10");
        future.valid_from = Some(Utc::now() + chrono::Duration::days(1));
        store.add_coupon(future).await;

        assert_eq!(
            service.apply(customer, "OLD10").await.unwrap().reason,
            Some(CouponRejectionReason::Expired)
        );
        assert_eq!(
            service.apply(customer, "SOON10").await.unwrap().reason,
            Some(CouponRejectionReason::NotYetActive)
        );
    }

    #[tokio::test]
    async fn category_restriction_limits_discount_base() {
        let (service, store, customer, category) = setup(dec!(200)).await;
        let mut percent = coupon("DAIRY50");
        percent.discount_type = "percent".to_string();
        percent.discount_value = dec!(50);
        percent.max_discount = Some(dec!(80));
        percent.eligible_category_ids = vec![category];
        store.add_coupon(percent).await;

        let mut other = coupon("BAKERY10");
        other.eligible_category_ids = vec![Uuid::new_v4()];
        store.add_coupon(other).await;

        assert_eq!(
            service.apply(customer, "DAIRY50").await.unwrap().discount_amount,
            dec!(80)
        );
        assert_eq!(
            service.apply(customer, "BAKERY10").await.unwrap().reason,
            Some(CouponRejectionReason::CategoryNotEligible)
        );
    }

    #[tokio::test]
    async fn empty_cart_is_a_business_error() {
        let store = MemoryStore::new();
        let shared = Arc::new(store);
        let service = CouponService::new(shared.clone(), shared.clone(), shared);

        let err = service.apply(Uuid::new_v4(), "FIRST100").await.unwrap_err();
        assert_eq!(err.error_code(), crate::error::ErrorCode::EmptyCart);
    }

    #[test]
    fn flat_discount_never_exceeds_order_value() {
        let lines = vec![CartLine {
            product_id: Uuid::new_v4(),
            name: "Salt".to_string(),
            category_id: Uuid::new_v4(),
            quantity: 1,
            unit_price: dec!(30),
            cod_allowed: true,
        }];
        assert_eq!(discount_for(&coupon("FIRST100"), &lines), dec!(30));
    }
}

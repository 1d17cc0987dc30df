use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::repository::{Coupon, CouponStore};
use crate::types::CustomerId;

pub struct CouponRepository {
    pool: PgPool,
}

impl CouponRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CouponStore for CouponRepository {
    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>, DatabaseError> {
        sqlx::query_as::<_, Coupon>(
            "SELECT id, code, discount_type, discount_value, max_discount, min_order_value,
                    valid_from, valid_until, is_active, usage_limit, per_customer_limit,
                    first_order_only, eligible_category_ids
             FROM coupons
             WHERE UPPER(code) = UPPER($1)",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn total_redemptions(&self, coupon_id: Uuid) -> Result<i64, DatabaseError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM coupon_redemptions WHERE coupon_id = $1",
        )
        .bind(coupon_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn customer_redemptions(
        &self,
        coupon_id: Uuid,
        customer_id: CustomerId,
    ) -> Result<i64, DatabaseError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM coupon_redemptions WHERE coupon_id = $1 AND customer_id = $2",
        )
        .bind(coupon_id)
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

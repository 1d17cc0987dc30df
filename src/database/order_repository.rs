use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::database::error::DatabaseError;
use crate::database::repository::{FinalizeOutcome, NewOrder, Order, OrderStore};
use crate::types::{cart_fingerprint, CustomerId, OrderStatus};

const ORDER_COLUMNS: &str = "id, order_number, customer_id, address_id, status, payment_method,
    payment_reference, payment_id, session_key, subtotal, discount, delivery_fee, total,
    coupon_code, cart_fingerprint, intent_expires_at, last_error, created_at, updated_at";

/// Repository for checkout orders
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn insert(&self, new_order: NewOrder) -> Result<Order, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let order = sqlx::query_as::<_, Order>(&format!(
            "INSERT INTO orders
             (order_number, customer_id, address_id, status, payment_method, session_key,
              subtotal, discount, delivery_fee, total, coupon_code, cart_fingerprint)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(&new_order.order_number)
        .bind(new_order.customer_id)
        .bind(new_order.address_id)
        .bind(OrderStatus::Pending.to_db_status())
        .bind(new_order.payment_method.as_str())
        .bind(&new_order.session_key)
        .bind(new_order.pricing.subtotal)
        .bind(new_order.pricing.discount)
        .bind(new_order.pricing.delivery_fee)
        .bind(new_order.pricing.total)
        .bind(&new_order.coupon_code)
        .bind(cart_fingerprint(&new_order.items))
        .fetch_one(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        for item in &new_order.items {
            sqlx::query(
                "INSERT INTO order_items
                 (order_id, product_id, name, category_id, quantity, unit_price)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(order.id)
            .bind(item.product_id)
            .bind(&item.name)
            .bind(item.category_id)
            .bind(item.quantity)
            .bind(item.unit_price)
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        }

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(order)
    }

    async fn find_by_number(&self, order_number: &str) -> Result<Option<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE order_number = $1",
            ORDER_COLUMNS
        ))
        .bind(order_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_gateway_order_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE payment_reference = $1",
            ORDER_COLUMNS
        ))
        .bind(gateway_order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_pending_for_session(
        &self,
        customer_id: CustomerId,
        session_key: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders
             WHERE customer_id = $1 AND session_key = $2
               AND status = 'pending' AND payment_method = 'online'
             ORDER BY created_at DESC
             LIMIT 1",
            ORDER_COLUMNS
        ))
        .bind(customer_id)
        .bind(session_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn attach_intent(
        &self,
        order_number: &str,
        gateway_order_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Order, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders
             SET payment_reference = $2, intent_expires_at = $3, updated_at = NOW()
             WHERE order_number = $1
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(order_number)
        .bind(gateway_order_id)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn finalize(
        &self,
        order_number: &str,
        payment_id: Option<&str>,
    ) -> Result<FinalizeOutcome, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        // Row lock serializes concurrent confirmations of the same order
        let current = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE order_number = $1 FOR UPDATE",
            ORDER_COLUMNS
        ))
        .bind(order_number)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let Some(current) = current else {
            return Ok(FinalizeOutcome::NotFound);
        };

        match current.status() {
            OrderStatus::Confirmed => {
                return Ok(if current.payment_id.as_deref() == payment_id {
                    FinalizeOutcome::AlreadyConfirmed(current)
                } else {
                    FinalizeOutcome::PaymentIdConflict(current)
                });
            }
            // A capture can still arrive after a failed attempt on the same gateway order
            OrderStatus::Failed
                if payment_id.is_none() || current.payment_reference.is_none() =>
            {
                return Ok(FinalizeOutcome::NotPending(current));
            }
            OrderStatus::Failed | OrderStatus::Pending => {}
        }

        sqlx::query(
            "UPDATE products p
             SET stock = p.stock - oi.quantity
             FROM order_items oi
             WHERE oi.order_id = $1 AND p.id = oi.product_id",
        )
        .bind(current.id)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if let Some(code) = current.coupon_code.as_deref() {
            sqlx::query(
                "INSERT INTO coupon_redemptions (coupon_id, customer_id, order_number)
                 SELECT id, $2, $3 FROM coupons WHERE UPPER(code) = UPPER($1)
                 ON CONFLICT (order_number) DO NOTHING",
            )
            .bind(code)
            .bind(current.customer_id)
            .bind(&current.order_number)
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        }

        // Only the ordered lines; anything added since stays in the cart
        sqlx::query(
            "DELETE FROM cart_items c
             USING order_items oi
             WHERE oi.order_id = $1 AND c.customer_id = $2 AND c.product_id = oi.product_id",
        )
        .bind(current.id)
        .bind(current.customer_id)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let confirmed = sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders
             SET status = 'confirmed', payment_id = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(current.id)
        .bind(payment_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(FinalizeOutcome::Confirmed(confirmed))
    }

    async fn mark_failed(
        &self,
        order_number: &str,
        reason: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders
             SET status = 'failed', last_error = $2, updated_at = NOW()
             WHERE order_number = $1 AND status = 'pending'
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(order_number)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn record_rejection(
        &self,
        order_number: &str,
        reason: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE orders SET last_error = $2, updated_at = NOW() WHERE order_number = $1",
        )
        .bind(order_number)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    async fn confirmed_order_count(&self, customer_id: CustomerId) -> Result<i64, DatabaseError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM orders WHERE customer_id = $1 AND status = 'confirmed'",
        )
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

use async_trait::async_trait;
use sqlx::PgPool;

use crate::database::error::DatabaseError;
use crate::database::repository::CartStore;
use crate::types::{CartLine, CustomerId};

pub struct CartRepository {
    pool: PgPool,
}

impl CartRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CartStore for CartRepository {
    async fn lines(&self, customer_id: CustomerId) -> Result<Vec<CartLine>, DatabaseError> {
        // COD is allowed only when both the product and its category allow it
        sqlx::query_as::<_, CartLine>(
            "SELECT p.id AS product_id, p.name, p.category_id, ci.quantity,
                    p.price AS unit_price,
                    (p.cod_allowed AND c.cod_allowed) AS cod_allowed
             FROM cart_items ci
             JOIN products p ON p.id = ci.product_id
             JOIN categories c ON c.id = p.category_id
             WHERE ci.customer_id = $1
             ORDER BY p.name ASC",
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

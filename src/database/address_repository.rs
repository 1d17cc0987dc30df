use async_trait::async_trait;
use sqlx::PgPool;

use crate::database::error::DatabaseError;
use crate::database::repository::AddressStore;
use crate::types::{Address, AddressId, CustomerId};

/// Read-only view over the customer address book
pub struct AddressRepository {
    pool: PgPool,
}

impl AddressRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AddressStore for AddressRepository {
    async fn list_for_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<Address>, DatabaseError> {
        sqlx::query_as::<_, Address>(
            "SELECT id, customer_id, label, line1, city, postal_code, is_default
             FROM addresses
             WHERE customer_id = $1 AND deleted_at IS NULL
             ORDER BY is_default DESC, label ASC",
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_for_customer(
        &self,
        customer_id: CustomerId,
        address_id: AddressId,
    ) -> Result<Option<Address>, DatabaseError> {
        sqlx::query_as::<_, Address>(
            "SELECT id, customer_id, label, line1, city, postal_code, is_default
             FROM addresses
             WHERE id = $1 AND customer_id = $2 AND deleted_at IS NULL",
        )
        .bind(address_id)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

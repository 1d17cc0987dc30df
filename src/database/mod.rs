//! Persistence layer: Postgres repositories behind the store traits in
//! [`repository`], plus an in-memory implementation for local runs.

pub mod address_repository;
pub mod cart_repository;
pub mod coupon_repository;
pub mod error;
pub mod memory;
pub mod order_repository;
pub mod repository;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error as log_error, info, warn};

use self::address_repository::AddressRepository;
use self::cart_repository::CartRepository;
use self::coupon_repository::CouponRepository;
use self::error::{DatabaseError, DatabaseErrorKind};
use self::memory::MemoryStore;
use self::order_repository::OrderRepository;
use self::repository::{AddressStore, CartStore, CouponStore, OrderStore};
use crate::config::DatabaseConfig;

/// The stores the checkout services run against
#[derive(Clone)]
pub struct Stores {
    pub addresses: Arc<dyn AddressStore>,
    pub carts: Arc<dyn CartStore>,
    pub coupons: Arc<dyn CouponStore>,
    pub orders: Arc<dyn OrderStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            addresses: Arc::new(AddressRepository::new(pool.clone())),
            carts: Arc::new(CartRepository::new(pool.clone())),
            coupons: Arc::new(CouponRepository::new(pool.clone())),
            orders: Arc::new(OrderRepository::new(pool)),
        }
    }

    pub fn memory(store: MemoryStore) -> Self {
        let shared = Arc::new(store);
        Self {
            addresses: shared.clone(),
            carts: shared.clone(),
            coupons: shared.clone(),
            orders: shared,
        }
    }
}

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);
const MAX_LIFETIME: Duration = Duration::from_secs(1800);

/// Connect and prove the pool can hand out a connection
pub async fn init_pool(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        connection_timeout_secs = config.connection_timeout,
        "Initializing database pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout))
        .idle_timeout(
            config
                .idle_timeout
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_IDLE_TIMEOUT),
        )
        .max_lifetime(MAX_LIFETIME)
        .connect(&config.url)
        .await
        .map_err(|e| {
            log_error!(error = %e, "Failed to initialize database pool");
            DatabaseError::from_sqlx(e)
        })?;

    pool.acquire().await.map_err(|e| {
        log_error!(error = %e, "Failed to acquire test connection");
        DatabaseError::from_sqlx(e)
    })?;

    Ok(pool)
}

/// Connection pool health check
pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
    sqlx::query("SELECT 1").fetch_one(pool).await.map_err(|e| {
        warn!(error = %e, "Database health check failed");
        DatabaseError::from_sqlx(e)
    })?;

    Ok(())
}

/// Apply the bundled schema migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), DatabaseError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| {
            log_error!(error = %e, "Failed to run migrations");
            DatabaseError::new(DatabaseErrorKind::Unknown {
                message: e.to_string(),
            })
        })?;
    info!("Database migrations applied");
    Ok(())
}

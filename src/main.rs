use axum::{http::HeaderValue, routing::get, Router};
use checkout_backend::api::{self, ApiDependencies};
use checkout_backend::cache::{self, init_cache_pool, RedisCache};
use checkout_backend::config::AppConfig;
use checkout_backend::database::memory::MemoryStore;
use checkout_backend::database::{init_pool, run_migrations, Stores};
use checkout_backend::health::{self, HealthChecker};
use checkout_backend::logging::init_tracing;
use checkout_backend::middleware::logging::{request_logging_middleware, UuidRequestId};
use checkout_backend::payments::GatewayFactory;
use checkout_backend::services::LoggingNotifier;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn root() -> &'static str {
    info!("📍 Root endpoint accessed");
    "Checkout backend"
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        "🚀 Starting checkout backend service"
    );

    // Initialize database connection pool
    let (db_pool, stores) = match &config.database {
        Some(database_config) => {
            info!("📊 Initializing database connection pool...");
            let pool = init_pool(database_config).await.map_err(|e| {
                error!("Failed to initialize database pool: {}", e);
                e
            })?;
            run_migrations(&pool).await?;
            info!(
                max_connections = pool.options().get_max_connections(),
                "✅ Database connection pool initialized"
            );
            (Some(pool.clone()), Stores::postgres(pool))
        }
        None => {
            info!("⏭️  Skipping database initialization (SKIP_EXTERNALS=true), using in-memory stores");
            (None, Stores::memory(MemoryStore::new()))
        }
    };

    // Initialize cache connection pool
    let redis_cache = match &config.cache {
        Some(cache_config) => {
            info!("🔄 Initializing Redis cache connection pool...");
            let pool = init_cache_pool(cache_config).await.map_err(|e| {
                error!("Failed to initialize cache pool: {}", e);
                e
            })?;
            info!(redis_url = %cache_config.redis_url, "✅ Cache connection pool initialized");
            Some(RedisCache::new(
                pool,
                Duration::from_secs(cache_config.default_ttl),
            ))
        }
        None => {
            info!("⏭️  Skipping Redis initialization (SKIP_EXTERNALS=true)");
            None
        }
    };

    // Payment gateway is optional; without it only COD is offered
    let gateway = GatewayFactory::optional(&config.gateway)?;
    match &gateway {
        Some(gateway) => info!(gateway = gateway.name(), "💳 Payment gateway configured"),
        None => warn!("⚠️  Payment gateway not configured, online payment disabled"),
    }

    let health_checker = HealthChecker::new(db_pool.clone(), redis_cache.clone(), gateway.is_some());

    info!("🛣️  Setting up application routes...");
    let api_routes = api::router(ApiDependencies {
        stores,
        gateway,
        gateway_config: config.gateway.clone(),
        checkout_config: config.checkout.clone(),
        cache: redis_cache.clone(),
        notifier: Arc::new(LoggingNotifier::new()),
    });

    let origins: Vec<HeaderValue> = config
        .server
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let app = Router::new()
        .route("/", get(root))
        .merge(health::routes(health_checker))
        .merge(api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(CorsLayer::new().allow_origin(origins)),
        );

    info!("✅ Routes configured");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(cache) = &redis_cache {
        cache::shutdown_cache_pool(cache.pool());
    }

    info!("👋 Server shutdown complete");
    Ok(())
}

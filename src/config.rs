//! Environment-driven configuration. `.env` is read first when present;
//! every section validates itself after loading.

use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// `None` when running with `SKIP_EXTERNALS=true` (in-memory stores)
    pub database: Option<DatabaseConfig>,
    pub cache: Option<CacheConfig>,
    pub logging: LoggingConfig,
    pub gateway: GatewayConfig,
    pub checkout: CheckoutConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub redis_url: String,
    pub default_ttl: u64, // seconds
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Payment gateway configuration.
///
/// Key id and secret are optional so the service can boot without online
/// payments; Order Intake reports `GATEWAY_NOT_CONFIGURED` in that case.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub key_id: Option<String>,
    pub key_secret: Option<String>,
    pub webhook_secret: Option<String>,
    pub base_url: String,
    pub checkout_script_url: String,
    pub currency: String,
    pub intent_ttl_secs: i64,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// Pricing rules applied when Order Intake recomputes totals
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Delivery is free when the cart subtotal exceeds this amount
    pub free_delivery_threshold: Decimal,
    pub delivery_fee: Decimal,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        let skip_externals = var_or("SKIP_EXTERNALS", false)?;

        let (database, cache) = if skip_externals {
            (None, None)
        } else {
            (
                Some(DatabaseConfig::from_env()?),
                Some(CacheConfig::from_env()?),
            )
        };

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database,
            cache,
            logging: LoggingConfig::from_env()?,
            gateway: GatewayConfig::from_env()?,
            checkout: CheckoutConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if let Some(database) = &self.database {
            database.validate()?;
        }
        if let Some(cache) = &self.cache {
            cache.validate()?;
        }
        self.logging.validate()?;
        self.gateway.validate()?;
        self.checkout.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: var_or("SERVER_HOST", "127.0.0.1".to_string())?,
            port: var_or("SERVER_PORT", 8000)?,
            cors_allowed_origins: var_or(
                "CORS_ALLOWED_ORIGINS",
                "http://localhost,http://127.0.0.1".to_string(),
            )?
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: var_or("DB_MAX_CONNECTIONS", 20)?,
            min_connections: var_or("DB_MIN_CONNECTIONS", 5)?,
            connection_timeout: var_or("DB_CONNECTION_TIMEOUT", 30)?,
            idle_timeout: non_empty_var("DB_IDLE_TIMEOUT")
                .map(|raw| {
                    raw.parse()
                        .map_err(|_| ConfigError::InvalidValue("DB_IDLE_TIMEOUT".to_string()))
                })
                .transpose()?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl CacheConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(CacheConfig {
            redis_url: var_or("REDIS_URL", "redis://127.0.0.1:6379".to_string())?,
            default_ttl: var_or("CACHE_DEFAULT_TTL", 1800)?,
            max_connections: var_or("CACHE_MAX_CONNECTIONS", 10)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redis_url.is_empty() {
            return Err(ConfigError::InvalidValue("REDIS_URL".to_string()));
        }

        if !self.redis_url.starts_with("redis://") && !self.redis_url.starts_with("rediss://") {
            return Err(ConfigError::InvalidValue(
                "REDIS_URL must start with redis:// or rediss://".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: var_or("LOG_LEVEL", "INFO".to_string())?,
            format: match var_or("LOG_FORMAT", "plain".to_string())?
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            key_id: None,
            key_secret: None,
            webhook_secret: None,
            base_url: "https://api.razorpay.com".to_string(),
            checkout_script_url: "https://checkout.razorpay.com/v1/checkout.js".to_string(),
            currency: "INR".to_string(),
            intent_ttl_secs: 900,
            timeout_secs: 30,
            max_retries: 2,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = GatewayConfig::default();
        Ok(GatewayConfig {
            key_id: non_empty_var("GATEWAY_KEY_ID"),
            key_secret: non_empty_var("GATEWAY_KEY_SECRET"),
            webhook_secret: non_empty_var("GATEWAY_WEBHOOK_SECRET"),
            base_url: var_or("GATEWAY_BASE_URL", defaults.base_url)?,
            checkout_script_url: var_or("GATEWAY_CHECKOUT_SCRIPT_URL", defaults.checkout_script_url)?,
            currency: var_or("GATEWAY_CURRENCY", defaults.currency)?,
            intent_ttl_secs: var_or("GATEWAY_INTENT_TTL_SECS", defaults.intent_ttl_secs)?,
            timeout_secs: var_or("GATEWAY_TIMEOUT_SECS", defaults.timeout_secs)?,
            max_retries: var_or("GATEWAY_MAX_RETRIES", defaults.max_retries)?,
        })
    }

    /// Both halves of the API key pair are present
    pub fn is_configured(&self) -> bool {
        self.key_id.is_some() && self.key_secret.is_some()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "GATEWAY_BASE_URL must be a valid URL".to_string(),
            ));
        }

        if self.key_id.is_some() != self.key_secret.is_some() {
            return Err(ConfigError::ValidationFailed(
                "GATEWAY_KEY_ID and GATEWAY_KEY_SECRET must be set together".to_string(),
            ));
        }

        if self.intent_ttl_secs <= 0 {
            return Err(ConfigError::InvalidValue(
                "GATEWAY_INTENT_TTL_SECS".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            free_delivery_threshold: Decimal::from(499),
            delivery_fee: Decimal::from(40),
        }
    }
}

impl CheckoutConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = CheckoutConfig::default();
        Ok(CheckoutConfig {
            free_delivery_threshold: var_or(
                "FREE_DELIVERY_THRESHOLD",
                defaults.free_delivery_threshold,
            )?,
            delivery_fee: var_or("DELIVERY_FEE", defaults.delivery_fee)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.free_delivery_threshold.is_sign_negative() {
            return Err(ConfigError::InvalidValue(
                "FREE_DELIVERY_THRESHOLD".to_string(),
            ));
        }
        if self.delivery_fee.is_sign_negative() {
            return Err(ConfigError::InvalidValue("DELIVERY_FEE".to_string()));
        }
        Ok(())
    }
}

/// Parse `name` when set and non-empty, otherwise fall back to `default`
fn var_or<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match non_empty_var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        None => Ok(default),
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_allowed_origins: vec!["http://localhost".to_string()],
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_allowed_origins: vec![],
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_gateway_half_configured_is_rejected() {
        let config = GatewayConfig {
            key_id: Some("rzp_test_key".to_string()),
            ..GatewayConfig::default()
        };

        assert!(!config.is_configured());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unconfigured_gateway_is_valid() {
        let config = GatewayConfig::default();
        assert!(!config.is_configured());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_var_or_parses_and_defaults() {
        std::env::set_var("CHECKOUT_TEST_PORT", " 9100 ");
        assert_eq!(var_or("CHECKOUT_TEST_PORT", 8000u16).unwrap(), 9100);
        std::env::set_var("CHECKOUT_TEST_PORT", "not-a-port");
        assert!(var_or("CHECKOUT_TEST_PORT", 8000u16).is_err());
        std::env::remove_var("CHECKOUT_TEST_PORT");
        assert_eq!(var_or("CHECKOUT_TEST_PORT", 8000u16).unwrap(), 8000);
        assert_eq!(
            var_or("CHECKOUT_TEST_FEE_UNSET", Decimal::from(40)).unwrap(),
            Decimal::from(40)
        );
    }

    #[test]
    fn test_default_checkout_pricing() {
        let config = CheckoutConfig::default();
        assert_eq!(config.free_delivery_threshold, Decimal::from(499));
        assert_eq!(config.delivery_fee, Decimal::from(40));
        assert!(config.validate().is_ok());
    }
}

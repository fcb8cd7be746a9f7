use rust_decimal::Decimal;
use secrecy::{ExposeSecret, Secret};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct BookingConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub store: StoreBackend,
    pub database: DatabaseConfig,
    pub razorpay: RazorpayConfig,
    pub rules: BookingRules,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

/// Where bookings and ledger entries live.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
    pub timeout_secs: u64,
}

impl RazorpayConfig {
    pub fn has_credentials(&self) -> bool {
        !self.key_id.trim().is_empty() && !self.key_secret.expose_secret().trim().is_empty()
    }

    pub fn has_webhook_secret(&self) -> bool {
        !self.webhook_secret.expose_secret().trim().is_empty()
    }
}

/// Business knobs for pricing and conflict detection.
#[derive(Debug, Clone)]
pub struct BookingRules {
    pub platform_fee_percent: Decimal,
    pub grace_period_minutes: i64,
    pub default_max_consecutive_days: i32,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            platform_fee_percent: Decimal::TEN,
            grace_period_minutes: 120,
            default_max_consecutive_days: 7,
        }
    }
}

impl BookingConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let store: StoreBackend = get_env("BOOKING_STORE", Some("postgres"), false)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let database_url = match store {
            StoreBackend::Postgres => get_env("DATABASE_URL", None, is_prod)?,
            StoreBackend::Memory => env::var("DATABASE_URL").unwrap_or_default(),
        };

        let config = BookingConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("booking-service"), false)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), false)?,
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            store,
            database: DatabaseConfig {
                url: Secret::new(database_url),
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10")?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1")?,
            },
            razorpay: RazorpayConfig {
                key_id: get_env("RAZORPAY_KEY_ID", Some(""), is_prod)?,
                key_secret: Secret::new(get_env("RAZORPAY_KEY_SECRET", Some(""), is_prod)?),
                webhook_secret: Secret::new(get_env("RAZORPAY_WEBHOOK_SECRET", Some(""), false)?),
                api_base_url: get_env(
                    "RAZORPAY_API_BASE_URL",
                    Some("https://api.razorpay.com/v1"),
                    false,
                )?,
                timeout_secs: parse_env("RAZORPAY_TIMEOUT_SECS", "10")?,
            },
            rules: BookingRules {
                platform_fee_percent: parse_env("PLATFORM_FEE_PERCENT", "10")?,
                grace_period_minutes: parse_env("BOOKING_GRACE_MINUTES", "120")?,
                default_max_consecutive_days: parse_env("DEFAULT_MAX_CONSECUTIVE_DAYS", "7")?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.rules.platform_fee_percent < Decimal::ZERO
            || self.rules.platform_fee_percent > Decimal::ONE_HUNDRED
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PLATFORM_FEE_PERCENT must be between 0 and 100"
            )));
        }

        if self.rules.grace_period_minutes < 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "BOOKING_GRACE_MINUTES must not be negative"
            )));
        }

        if self.rules.default_max_consecutive_days < 1 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DEFAULT_MAX_CONSECUTIVE_DAYS must be at least 1"
            )));
        }

        if self.razorpay.timeout_secs == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "RAZORPAY_TIMEOUT_SECS must be positive"
            )));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_MIN_CONNECTIONS exceeds DATABASE_MAX_CONNECTIONS"
            )));
        }

        if self.environment == Environment::Prod {
            if self.store == StoreBackend::Memory {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "In-memory booking store is not allowed in production"
                )));
            }

            if !self.razorpay.has_webhook_secret() {
                tracing::warn!("RAZORPAY_WEBHOOK_SECRET is empty - webhooks will be ignored");
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), false)?
        .trim()
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("Invalid {}: {}", key, e)))
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(format!("Invalid booking store: {}", s)),
        }
    }
}

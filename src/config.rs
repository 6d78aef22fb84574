use std::env;
use std::str::FromStr;

use thiserror::Error;

use crate::signing::Signer;
use crate::util::{SECONDS_PER_DAY, days};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Per-IP rate limits in requests per minute. Zero disables a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Endpoints that call the payment processor.
    pub strict_rpm: u32,
    /// Licensing endpoints.
    pub standard_rpm: u32,
    /// Health check.
    pub relaxed_rpm: u32,
}

impl RateLimitConfig {
    pub fn disabled() -> Self {
        Self {
            strict_rpm: 0,
            standard_rpm: 0,
            relaxed_rpm: 0,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            strict_rpm: 10,
            standard_rpm: 30,
            relaxed_rpm: 60,
        }
    }
}

/// Licensing limits and product facts handed to the licensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub product_id: String,
    pub product_name: String,
    /// Stamped into every new trial and license.
    pub license_version: u32,
    pub trial_duration_secs: i64,
    pub trial_issue_count_max: u32,
    pub machine_count_max: usize,
    pub license_count_min: u32,
    pub license_count_max: u32,
    pub license_price_cents: i64,
    pub currency: String,
    pub reminder_interval_secs: i64,
    pub email_from: String,
}

impl Policy {
    /// Defaults for everything but the product identity.
    pub fn new(product_id: impl Into<String>) -> Self {
        let product_id = product_id.into();
        Self {
            product_name: product_id.clone(),
            product_id,
            license_version: 1,
            trial_duration_secs: 7 * SECONDS_PER_DAY,
            trial_issue_count_max: 25,
            machine_count_max: 3,
            license_count_min: 1,
            license_count_max: 10,
            license_price_cents: 0,
            currency: "usd".to_string(),
            reminder_interval_secs: 600,
            email_from: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub store_max_attempts: u32,
    pub policy: Policy,
    pub signer: Signer,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub resend_api_key: String,
    pub rate_limit: RateLimitConfig,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn parsed_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn trial_duration_secs() -> Result<i64, ConfigError> {
    let count: i64 = parsed_or("TRIAL_DURATION_DAYS", 7)?;
    if count < 1 {
        return Err(ConfigError::Invalid {
            name: "TRIAL_DURATION_DAYS",
            reason: "must be at least 1".to_string(),
        });
    }
    days(count).ok_or_else(|| ConfigError::Invalid {
        name: "TRIAL_DURATION_DAYS",
        reason: format!("{} days overflows", count),
    })
}

impl Config {
    /// Load configuration from the environment (and `.env` if present).
    ///
    /// Secrets have no defaults: a missing signing key, Stripe key, webhook
    /// secret, Resend key or sender address is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = parsed_or("PORT", 3000)?;

        let signer = Signer::from_base64(&required("SIGNING_KEY")?).map_err(|e| {
            ConfigError::Invalid {
                name: "SIGNING_KEY",
                reason: e.to_string(),
            }
        })?;

        let product_id = required("PRODUCT_ID")?;
        let defaults = Policy::new(product_id.clone());

        let policy = Policy {
            product_name: env::var("PRODUCT_NAME").unwrap_or_else(|_| product_id.clone()),
            license_version: parsed_or("LICENSE_VERSION", defaults.license_version)?,
            trial_duration_secs: trial_duration_secs()?,
            trial_issue_count_max: parsed_or("TRIAL_ISSUE_COUNT_MAX", defaults.trial_issue_count_max)?,
            machine_count_max: parsed_or("MACHINE_COUNT_MAX", defaults.machine_count_max)?,
            license_count_min: parsed_or("LICENSE_COUNT_MIN", defaults.license_count_min)?,
            license_count_max: parsed_or("LICENSE_COUNT_MAX", defaults.license_count_max)?,
            license_price_cents: required("LICENSE_PRICE_CENTS")?.trim().parse().map_err(
                |e: std::num::ParseIntError| ConfigError::Invalid {
                    name: "LICENSE_PRICE_CENTS",
                    reason: e.to_string(),
                },
            )?,
            currency: env::var("CURRENCY").unwrap_or_else(|_| defaults.currency.clone()),
            reminder_interval_secs: parsed_or("REMINDER_INTERVAL_SECS", defaults.reminder_interval_secs)?,
            email_from: required("EMAIL_FROM")?,
            product_id,
        };

        if policy.license_count_min == 0 || policy.license_count_min > policy.license_count_max {
            return Err(ConfigError::Invalid {
                name: "LICENSE_COUNT_MIN",
                reason: format!(
                    "must be between 1 and LICENSE_COUNT_MAX ({})",
                    policy.license_count_max
                ),
            });
        }

        let defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            strict_rpm: parsed_or("RATE_LIMIT_STRICT_RPM", defaults.strict_rpm)?,
            standard_rpm: parsed_or("RATE_LIMIT_STANDARD_RPM", defaults.standard_rpm)?,
            relaxed_rpm: parsed_or("RATE_LIMIT_RELAXED_RPM", defaults.relaxed_rpm)?,
        };

        Ok(Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "licenses.db".to_string()),
            store_max_attempts: parsed_or("STORE_MAX_ATTEMPTS", 10)?,
            policy,
            signer,
            stripe_secret_key: required("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            resend_api_key: required("RESEND_API_KEY")?,
            rate_limit,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

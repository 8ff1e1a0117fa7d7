//! Server Configuration
//!
//! Read once at startup from the environment (after `.env` is loaded).

use std::time::Duration;

use deposit_payments::{signature::DEFAULT_TOLERANCE_SECS, DEFAULT_UPSTREAM_TIMEOUT};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("{name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Process-wide, read-only configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Authenticates outbound Stripe calls
    pub processor_secret_key: String,

    /// Verifies inbound webhook signatures
    pub webhook_signing_secret: String,

    /// Base for success/cancel redirect targets
    pub base_url: String,

    pub host: String,
    pub port: u16,

    /// Bound on the checkout session call
    pub upstream_timeout: Duration,

    /// Maximum age of a signed webhook delivery, in seconds
    pub webhook_tolerance_secs: i64,
}

impl ServerConfig {
    /// Load from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let parsed = |name: &'static str, default: u64| -> Result<u64, ConfigError> {
            lookup(name).map_or(Ok(default), |value| {
                value
                    .parse()
                    .map_err(|_| ConfigError::Invalid { name, value })
            })
        };

        let port = parsed("PORT", 3000)?;
        let port = u16::try_from(port).map_err(|_| ConfigError::Invalid {
            name: "PORT",
            value: port.to_string(),
        })?;
        let tolerance = parsed("STRIPE_WEBHOOK_TOLERANCE_SECS", DEFAULT_TOLERANCE_SECS.unsigned_abs())?;

        Ok(Self {
            processor_secret_key: required("STRIPE_SECRET_KEY")?,
            webhook_signing_secret: required("STRIPE_WEBHOOK_SECRET")?,
            base_url: required("BASE_URL")?,
            host: lookup("BIND_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            upstream_timeout: Duration::from_secs(parsed(
                "STRIPE_TIMEOUT_SECS",
                DEFAULT_UPSTREAM_TIMEOUT.as_secs(),
            )?),
            webhook_tolerance_secs: i64::try_from(tolerance).map_err(|_| ConfigError::Invalid {
                name: "STRIPE_WEBHOOK_TOLERANCE_SECS",
                value: tolerance.to_string(),
            })?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

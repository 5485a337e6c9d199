//! Application configuration

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use orgsync_billing::clerk::DEFAULT_CLERK_API_URL;
use orgsync_billing::{ClerkConfig, DispatcherConfig, StripeConfig};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// Read `LOG_FORMAT` directly; logging starts before the rest of the config loads
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub stripe: StripeConfig,
    pub clerk: ClerkConfig,
    /// Read endpoints are disabled when unset
    pub admin_api_token: Option<String>,
    pub dedup_window: Duration,
    pub dedup_sweep_interval: Duration,
    pub dispatcher: DispatcherConfig,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let config = Self {
            host: env.or("HOST", "0.0.0.0"),
            port: env.parse_or("PORT", 8080)?,
            database_url: env.required("DATABASE_URL")?,
            database_max_connections: env.parse_or("DATABASE_MAX_CONNECTIONS", 5)?,
            stripe: StripeConfig {
                secret_key: env.required("STRIPE_SECRET_KEY")?,
                webhook_secret: env.required("STRIPE_WEBHOOK_SECRET")?,
            },
            clerk: ClerkConfig {
                secret_key: env.required("CLERK_SECRET_KEY")?,
                webhook_secret: env.required("CLERK_WEBHOOK_SECRET")?,
                api_url: env.or("CLERK_API_URL", DEFAULT_CLERK_API_URL),
            },
            admin_api_token: env.optional("ADMIN_API_TOKEN"),
            dedup_window: Duration::from_secs(env.parse_or("DEDUP_WINDOW_SECS", 30)?),
            dedup_sweep_interval: Duration::from_secs(
                env.parse_or("DEDUP_SWEEP_INTERVAL_SECS", 30)?,
            ),
            dispatcher: DispatcherConfig {
                workers: env.parse_or("WEBHOOK_WORKERS", 8)?,
                queue_depth: env.parse_or("WEBHOOK_QUEUE_DEPTH", 256)?,
            },
            log_format: match env.optional("LOG_FORMAT").as_deref() {
                None | Some("pretty") => LogFormat::Pretty,
                Some("json") => LogFormat::Json,
                Some(other) => {
                    return Err(ConfigError::Invalid {
                        name: "LOG_FORMAT",
                        value: other.to_string(),
                        reason: "expected `pretty` or `json`".to_string(),
                    })
                }
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("DATABASE_MAX_CONNECTIONS", self.database_max_connections as u64),
            ("DEDUP_WINDOW_SECS", self.dedup_window.as_secs()),
            ("DEDUP_SWEEP_INTERVAL_SECS", self.dedup_sweep_interval.as_secs()),
            ("WEBHOOK_WORKERS", self.dispatcher.workers as u64),
            ("WEBHOOK_QUEUE_DEPTH", self.dispatcher.queue_depth as u64),
        ];

        for (name, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    name,
                    value: "0".to_string(),
                    reason: "must be greater than 0".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                name: "HOST",
                value: self.host.clone(),
                reason: e.to_string(),
            })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn or(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: e.to_string(),
                value,
            }),
        }
    }
}

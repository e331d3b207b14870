//! Settings read from the process environment.
//!
//! A `.env` file in the working directory is loaded first if there is one.
//! Variables that are already set take precedence over the file.

use crate::queue::DEFAULT_QUEUE_CAPACITY;
use crate::worker_pool::PoolConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_POOL_SIZE: usize = 5;
pub const DEFAULT_BACKOFF_UNIT_MS: u64 = 1000;
pub const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    #[error("environment variable {0} must be set")]
    Missing(String),
    #[error("environment variable {key} has an invalid value {value:?}")]
    Invalid { key: String, value: String },
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PoolSettings {
    pub pool_size: usize,
    pub queue_capacity: usize,
    pub backoff_unit: Duration,
}

impl PoolSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the settings from any key lookup, which keeps the parsing
    /// independent of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            pool_size: parse_or(&lookup, "WORKER_POOL_SIZE", DEFAULT_POOL_SIZE)?,
            queue_capacity: parse_or(&lookup, "WORKER_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?,
            backoff_unit: Duration::from_millis(parse_or(
                &lookup,
                "WORKER_BACKOFF_UNIT_MS",
                DEFAULT_BACKOFF_UNIT_MS,
            )?),
        })
    }

    /// A pool configuration with these settings and the default log sink.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::builder()
            .number_of_workers(self.pool_size)
            .queue_capacity(self.queue_capacity)
            .backoff_unit(self.backoff_unit)
            .build()
    }
}

/// Connection settings for the SMTP transport.
#[derive(Clone, Eq, PartialEq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub from: String,
}

impl SmtpConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            host: required(&lookup, "SMTP_HOST")?,
            port: parse_or(&lookup, "SMTP_PORT", DEFAULT_SMTP_PORT)?,
            user: optional(&lookup, "SMTP_USER"),
            pass: optional(&lookup, "SMTP_PASS"),
            from: required(&lookup, "SMTP_FROM")?,
        })
    }
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("pass", &self.pass.as_ref().map(|_| "****"))
            .field("from", &self.from)
            .finish()
    }
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|value| !value.is_empty())
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, ConfigError> {
    optional(lookup, key).ok_or_else(|| ConfigError::Missing(key.to_string()))
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match optional(lookup, key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod config_tests {
    use super::ConfigError;
    use super::PoolSettings;
    use super::SmtpConfig;
    use std::collections::HashMap;
    use std::time::Duration;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn pool_settings_fall_back_to_defaults() {
        let settings = PoolSettings::from_lookup(lookup(&[])).unwrap();

        assert_eq!(
            PoolSettings {
                pool_size: 5,
                queue_capacity: 100,
                backoff_unit: Duration::from_secs(1),
            },
            settings
        );
    }

    #[test]
    fn pool_settings_read_overrides() {
        let settings = PoolSettings::from_lookup(lookup(&[
            ("WORKER_POOL_SIZE", "2"),
            ("WORKER_QUEUE_CAPACITY", " 10 "),
            ("WORKER_BACKOFF_UNIT_MS", "250"),
        ]))
        .unwrap();

        let config = settings.pool_config();

        assert_eq!(2, config.number_of_workers);
        assert_eq!(10, config.queue_capacity);
        assert_eq!(Duration::from_millis(250), config.backoff_unit);
    }

    #[test]
    fn invalid_number_is_reported_with_its_key() {
        let result = PoolSettings::from_lookup(lookup(&[("WORKER_POOL_SIZE", "many")]));

        assert_eq!(
            Err(ConfigError::Invalid {
                key: "WORKER_POOL_SIZE".to_string(),
                value: "many".to_string(),
            }),
            result
        );
    }

    #[test]
    fn smtp_config_requires_host_and_sender() {
        let result = SmtpConfig::from_lookup(lookup(&[("SMTP_FROM", "noreply@example.com")]));

        assert_eq!(Err(ConfigError::Missing("SMTP_HOST".to_string())), result);
    }

    #[test]
    fn smtp_config_hides_password_in_debug_output() {
        let config = SmtpConfig::from_lookup(lookup(&[
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USER", "mailer"),
            ("SMTP_PASS", "hunter2"),
            ("SMTP_FROM", "noreply@example.com"),
        ]))
        .unwrap();

        assert_eq!(587, config.port);
        assert_eq!(Some("mailer".to_string()), config.user);
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}

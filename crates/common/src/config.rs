use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_TTL_DAYS: u32 = 7;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    lookup(name)
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Configuration of the order intake function
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IntakeConfig {
    pub table_name: String,
    pub ttl_days: u32,
}

impl IntakeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let ttl_days = parsed(&lookup, "TTL_DAYS", DEFAULT_TTL_DAYS)?;
        if ttl_days == 0 {
            return Err(ConfigError::Invalid {
                name: "TTL_DAYS",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            table_name: required(&lookup, "TABLE_NAME")?,
            ttl_days,
        })
    }
}

/// Configuration of the change notifier function
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NotifierConfig {
    pub table_name: String,
    pub topic_arn: String,
}

impl NotifierConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            table_name: required(&lookup, "TABLE_NAME")?,
            topic_arn: required(&lookup, "TOPIC_ARN")?,
        })
    }
}

/// SDK client settings; `endpoint_url` points the clients at a local emulator
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AwsConfig {
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            region: non_empty("AWS_REGION"),
            endpoint_url: non_empty("AWS_ENDPOINT_URL"),
        }
    }
}

/// Delivery settings of the change-stream event source mapping
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSourceConfig {
    pub batch_size: usize,
    pub retry_attempts: u32,
    pub max_record_age: Duration,
    pub bisect_batch_on_error: bool,
}

impl Default for StreamSourceConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            retry_attempts: 3,
            max_record_age: Duration::from_secs(3600),
            bisect_batch_on_error: true,
        }
    }
}

impl StreamSourceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let batch_size = parsed(&lookup, "STREAM_BATCH_SIZE", defaults.batch_size)?;
        if batch_size == 0 {
            return Err(ConfigError::Invalid {
                name: "STREAM_BATCH_SIZE",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            batch_size,
            retry_attempts: parsed(&lookup, "STREAM_RETRY_ATTEMPTS", defaults.retry_attempts)?,
            max_record_age: Duration::from_secs(parsed(
                &lookup,
                "STREAM_MAX_RECORD_AGE_SECONDS",
                defaults.max_record_age.as_secs(),
            )?),
            bisect_batch_on_error: parsed(
                &lookup,
                "STREAM_BISECT_ON_ERROR",
                defaults.bisect_batch_on_error,
            )?,
        })
    }
}

/// Declared runtime limits of a deployed function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionConfig {
    pub name: &'static str,
    pub timeout: Duration,
    pub memory_mb: u32,
}

impl FunctionConfig {
    pub fn create_order() -> Self {
        Self {
            name: "create-order",
            timeout: Duration::from_secs(30),
            memory_mb: 256,
        }
    }

    pub fn process_order() -> Self {
        Self {
            name: "process-order",
            timeout: Duration::from_secs(60),
            memory_mb: 256,
        }
    }
}

/// Dead-letter destination for exhausted stream batches
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetterConfig {
    pub retention: Duration,
    pub visibility_timeout: Duration,
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(14 * 24 * 60 * 60),
            visibility_timeout: Duration::from_secs(300),
        }
    }
}

/// Local sandbox service configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxConfig {
    pub port: u16,
    pub ttl_days: u32,
    pub poll_interval: Duration,
    pub log_level: String,
    pub stream: StreamSourceConfig,
}

impl SandboxConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let ttl_days = parsed(&lookup, "TTL_DAYS", DEFAULT_TTL_DAYS)?;
        if ttl_days == 0 {
            return Err(ConfigError::Invalid {
                name: "TTL_DAYS",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            port: parsed(&lookup, "PORT", 8080)?,
            ttl_days,
            poll_interval: Duration::from_millis(parsed(&lookup, "POLL_INTERVAL_MS", 500)?),
            log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            stream: StreamSourceConfig::from_lookup(&lookup)?,
        })
    }
}

//! Configuration Module
//!
//! Typed, validated construction options for the table cache.

use std::env;
use std::time::Duration;

use serde_json::Value;

use crate::error::{CacheError, Result};

// == Defaults ==
/// Connection used when none is supplied: the local development store.
pub const DEFAULT_CONNECTION: &str = "memory://devstore";
pub const DEFAULT_PARTITION: &str = "cache";
pub const DEFAULT_TTL_INTERVAL_MS: i64 = 60_000;
pub const DEFAULT_SERVER_PORT: u16 = 3000;

// == TTL Interval ==
/// Sweep cadence: a positive interval, or sweeping disabled altogether.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlInterval {
    /// Sweep every given interval
    Every(Duration),
    /// No sweeper is constructed
    Disabled,
}

impl TtlInterval {
    /// Builds an interval from milliseconds; zero and negative values are rejected.
    pub fn from_millis(ms: i64) -> Result<Self> {
        if ms < 1 {
            return Err(CacheError::Configuration(
                "ttl_interval must be a positive integer".to_string(),
            ));
        }
        Ok(TtlInterval::Every(Duration::from_millis(ms as u64)))
    }

    /// Accepts a positive integer or the literal `false`.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(false) => Ok(TtlInterval::Disabled),
            Value::Number(n) => match (n.as_u64(), n.as_i64()) {
                (Some(ms), _) if ms > 0 => Ok(TtlInterval::Every(Duration::from_millis(ms))),
                (_, Some(ms)) => Self::from_millis(ms),
                _ => Err(CacheError::Configuration(format!(
                    "ttl_interval must be a positive integer, got {n}"
                ))),
            },
            other => Err(CacheError::Configuration(format!(
                "Must provide a ttl_interval or explicitly disable it, got {other}"
            ))),
        }
    }

    /// Parses the textual form used in environment variables: `false` or milliseconds.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw == "false" {
            return Ok(TtlInterval::Disabled);
        }
        match raw.parse::<u64>() {
            Ok(ms) if ms > 0 => Ok(TtlInterval::Every(Duration::from_millis(ms))),
            _ => raw
                .parse::<i64>()
                .map_err(|_| {
                    CacheError::Configuration(format!(
                        "ttl_interval must be a positive integer or false, got {raw:?}"
                    ))
                })
                .and_then(Self::from_millis),
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            TtlInterval::Every(interval) => Some(*interval),
            TtlInterval::Disabled => None,
        }
    }
}

// == Table Name Validation ==
/// Table names are 3 to 63 ASCII alphanumerics and start with a letter.
pub fn validate_table_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CacheError::Configuration(
            "Must specify a partition (table name) to use".to_string(),
        ));
    }
    let valid = (3..=63).contains(&name.len())
        && name.starts_with(|c: char| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric());
    if !valid {
        return Err(CacheError::Configuration(format!(
            "Invalid table name {name:?}: expected 3-63 alphanumeric characters starting with a letter"
        )));
    }
    Ok(())
}

/// Table cache configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Connection string of the backing store
    pub connection: String,
    /// Table holding the cache rows
    pub partition: String,
    /// Sweep cadence
    pub ttl_interval: TtlInterval,
    /// HTTP port of the bundled host
    pub server_port: u16,
}

impl Config {
    /// Creates a validated configuration.
    pub fn new(
        connection: impl Into<String>,
        partition: impl Into<String>,
        ttl_interval: TtlInterval,
    ) -> Result<Self> {
        let partition = partition.into();
        validate_table_name(&partition)?;

        let connection = connection.into();
        Ok(Self {
            connection: if connection.is_empty() {
                DEFAULT_CONNECTION.to_string()
            } else {
                connection
            },
            partition,
            ttl_interval,
            server_port: DEFAULT_SERVER_PORT,
        })
    }

    pub fn with_server_port(mut self, port: u16) -> Self {
        self.server_port = port;
        self
    }

    /// Builds a configuration from a JSON options object:
    /// `{ "connection"?: string, "partition": string, "ttl_interval": int | false }`.
    pub fn from_value(options: &Value) -> Result<Self> {
        let Value::Object(options) = options else {
            return Err(CacheError::Configuration(
                "Must provide configuration to the table cache".to_string(),
            ));
        };

        let connection = match options.get("connection") {
            None | Some(Value::Null) => DEFAULT_CONNECTION,
            Some(Value::String(connection)) => connection.as_str(),
            Some(_) => {
                return Err(CacheError::Configuration(
                    "connection must be a string".to_string(),
                ))
            }
        };
        let partition = match options.get("partition") {
            Some(Value::String(partition)) => partition.as_str(),
            _ => {
                return Err(CacheError::Configuration(
                    "Must specify a partition (table name) to use".to_string(),
                ))
            }
        };
        let ttl_interval =
            TtlInterval::from_value(options.get("ttl_interval").unwrap_or(&Value::Null))?;

        Self::new(connection, partition, ttl_interval)
    }

    /// Loads the configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `TABLE_CONNECTION` - Store connection string (default: local development store)
    /// - `TABLE_PARTITION` - Table name (default: cache)
    /// - `TTL_INTERVAL` - Sweep interval in milliseconds, or `false` (default: 60000)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Result<Self> {
        let connection =
            env::var("TABLE_CONNECTION").unwrap_or_else(|_| DEFAULT_CONNECTION.to_string());
        let partition =
            env::var("TABLE_PARTITION").unwrap_or_else(|_| DEFAULT_PARTITION.to_string());
        let ttl_interval = match env::var("TTL_INTERVAL") {
            Ok(raw) => TtlInterval::parse(&raw)?,
            Err(_) => TtlInterval::from_millis(DEFAULT_TTL_INTERVAL_MS)?,
        };
        let server_port = env::var("SERVER_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_SERVER_PORT);

        Ok(Self::new(connection, partition, ttl_interval)?.with_server_port(server_port))
    }
}

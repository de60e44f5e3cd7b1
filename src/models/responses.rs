//! Response DTOs for the HTTP host
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use serde_json::Value;

use crate::cache::{CacheEnvelope, CacheKey, CacheStats};

/// Response body for `GET /cache/:segment/:id`
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub segment: String,
    pub id: String,
    /// The cached value
    pub item: Value,
    /// Write time, epoch milliseconds
    pub stored: i64,
    /// Lifetime supplied at write time, milliseconds
    pub ttl: u64,
}

impl GetResponse {
    pub fn new(key: CacheKey, envelope: CacheEnvelope<Value>) -> Self {
        Self {
            segment: key.segment,
            id: key.id,
            item: envelope.item,
            stored: envelope.stored,
            ttl: envelope.ttl,
        }
    }
}

/// Response body for `PUT /cache/:segment/:id`
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    /// Success message
    pub message: String,
    pub segment: String,
    pub id: String,
}

impl SetResponse {
    pub fn new(key: CacheKey) -> Self {
        Self {
            message: format!("Entry '{}/{}' set successfully", key.segment, key.id),
            segment: key.segment,
            id: key.id,
        }
    }
}

/// Response body for `DELETE /cache/:segment/:id`
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    pub segment: String,
    pub id: String,
}

impl DeleteResponse {
    pub fn new(key: CacheKey) -> Self {
        Self {
            message: format!("Entry '{}/{}' dropped", key.segment, key.id),
            segment: key.segment,
            id: key.id,
        }
    }
}

/// Response body for `POST /sweep`
#[derive(Debug, Clone, Serialize)]
pub struct SweepResponse {
    /// Entries deleted by this sweep
    pub deleted: usize,
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub counters: CacheStats,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(counters: CacheStats) -> Self {
        Self {
            hit_rate: counters.hit_rate(),
            counters,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy" or "unavailable"
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self::with_status("healthy")
    }

    pub fn unavailable() -> Self {
        Self::with_status("unavailable")
    }

    fn with_status(status: &str) -> Self {
        Self {
            status: status.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error body for conditions that have no `CacheError` counterpart
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

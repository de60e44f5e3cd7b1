//! Request DTOs for the HTTP host
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;
use serde_json::Value;

/// Request body for `PUT /cache/:segment/:id`
///
/// # Fields
/// - `value`: Any JSON value to cache
/// - `ttl`: Lifetime in milliseconds
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The value to store
    pub value: Value,
    /// Lifetime in milliseconds
    pub ttl: u64,
}

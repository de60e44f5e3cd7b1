//! Cache Module
//!
//! Cache keys, the entity codec and the request-path cache client.

mod client;
pub mod codec;
mod key;
mod stats;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use client::CacheClient;
pub use codec::CacheEnvelope;
pub use key::{validate_segment_name, CacheKey};
pub use stats::{CacheStats, SharedStats};

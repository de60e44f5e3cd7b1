//! Cache Key Module
//!
//! Two-part cache addressing: segment (partition key) and id (row key).

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

// == Cache Key ==
/// Identifies a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Namespace of the entry; maps to the store's partition key
    pub segment: String,
    /// Entry identifier within the segment; may be empty
    pub id: String,
}

impl CacheKey {
    pub fn new(segment: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
            id: id.into(),
        }
    }
}

// == Segment Validation ==
/// Checks a segment name before it reaches the store.
///
/// Only empty names and names containing a NUL byte are rejected here. Keys
/// carrying `/`, `\`, `#`, `?` or control characters are refused by the store
/// and surface as a 400 `InvalidInput` backend error.
pub fn validate_segment_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CacheError::InvalidSegment("Empty string".to_string()));
    }

    if name.contains('\0') {
        return Err(CacheError::InvalidSegment(
            "Includes null character".to_string(),
        ));
    }

    Ok(())
}

//! Entity Codec
//!
//! Converts cache values into store rows and back.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{CacheError, Result};
use crate::store::{RowFields, TableRow};

// == Cache Envelope ==
/// A decoded cache entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEnvelope<T> {
    /// The decoded value
    pub item: T,
    /// Store-assigned write time, epoch milliseconds
    pub stored: i64,
    /// Lifetime supplied at write time, milliseconds
    pub ttl: u64,
}

// == Encode ==
/// Builds the columns written for a cache entry.
///
/// The expiry is stamped here, once, from `now_ms`; it only changes when the
/// same key is written again.
pub fn encode<T>(value: &T, ttl_ms: u64, sweep_eligible: bool, now_ms: i64) -> Result<RowFields>
where
    T: Serialize + ?Sized,
{
    let item = serde_json::to_string(value).map_err(CacheError::Serialization)?;
    let expire_at_ms = now_ms.saturating_add(i64::try_from(ttl_ms).unwrap_or(i64::MAX));

    Ok(RowFields {
        item: Some(item),
        ttl_ms: Some(ttl_ms),
        expire_at_ms: Some(expire_at_ms),
        sweep_eligible: Some(sweep_eligible),
    })
}

// == Decode ==
/// Decodes a stored row into an envelope.
///
/// A row whose `item` is missing or not valid for `T` is a data-integrity
/// fault and fails with `CorruptRecord`.
pub fn decode<T>(row: &TableRow) -> Result<CacheEnvelope<T>>
where
    T: DeserializeOwned,
{
    let corrupt = |reason: String| CacheError::CorruptRecord {
        segment: row.segment.clone(),
        id: row.id.clone(),
        reason,
    };

    let raw = row
        .fields
        .item
        .as_deref()
        .ok_or_else(|| corrupt("missing item column".to_string()))?;
    let item = serde_json::from_str(raw).map_err(|err| corrupt(err.to_string()))?;

    Ok(CacheEnvelope {
        item,
        stored: row.stored_at.timestamp_millis(),
        ttl: row.fields.ttl_ms.unwrap_or(0),
    })
}

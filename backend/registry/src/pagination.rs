//! Cursor-based pagination for list endpoints.
//!
//! The cursor is an opaque URL-safe base64 string wrapping the offset of the
//! next item; clients only ever echo back what they were given.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::errors::{RegistryError, Result};

/// Page-size bounds taken from configuration.
#[derive(Debug, Clone, Copy)]
pub struct PageLimits {
    pub default_size: u32,
    pub max_size: u32,
}

/// Query parameters accepted by list endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageRequest {
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

impl PageRequest {
    /// Resolve to `(offset, limit)`, with the limit clamped to `[1, max_size]`.
    /// Offsets are non-negative and fit a SQLite integer.
    pub fn resolve(&self, limits: PageLimits) -> Result<(i64, u32)> {
        let limit = self
            .limit
            .unwrap_or(limits.default_size)
            .clamp(1, limits.max_size);
        let offset = match self.cursor.as_deref() {
            None | Some("") => 0,
            Some(c) => decode_cursor(c)
                .ok_or_else(|| RegistryError::incomplete("cursor", "is not a valid page cursor"))?,
        };
        Ok((offset, limit))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub count: usize,
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// A short page is the last one.
    pub fn new(items: Vec<T>, offset: i64, limit: u32) -> Self {
        let count = items.len();
        let next_cursor = if count < limit as usize {
            None
        } else {
            i64::try_from(count)
                .ok()
                .and_then(|n| offset.checked_add(n))
                .map(encode_cursor)
        };
        Page {
            count,
            items,
            next_cursor,
        }
    }
}

pub fn encode_cursor(offset: i64) -> String {
    URL_SAFE_NO_PAD.encode(offset.to_string())
}

/// `None` for anything that is not a non-negative `i64` offset.
pub fn decode_cursor(cursor: &str) -> Option<i64> {
    let bytes = URL_SAFE_NO_PAD.decode(cursor).ok()?;
    let offset: i64 = std::str::from_utf8(&bytes).ok()?.parse().ok()?;
    (offset >= 0).then_some(offset)
}

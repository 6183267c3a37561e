//! Shared row-decoding helpers
//!
//! Timestamps are stored as RFC 3339 TEXT; identifiers and names round-trip
//! through their domain constructors so invalid stored values surface as
//! [`MetaError::Decode`] instead of panics.

use chrono::{DateTime, Utc};

use crate::MetaError;

/// Parse a `DateTime<Utc>` from an RFC 3339 string
pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, MetaError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MetaError::Decode(format!("failed to parse datetime '{}': {}", s, e)))
}

/// Parse an optional `DateTime<Utc>` from an optional string
pub(crate) fn parse_optional_datetime(
    s: Option<String>,
) -> Result<Option<DateTime<Utc>>, MetaError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

/// Escape `%`, `_` and `\` for use inside a LIKE pattern with `ESCAPE '\'`
pub(crate) fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

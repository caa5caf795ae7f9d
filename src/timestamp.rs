//! Timestamp utilities for toolsync
//!
//! Index timestamps are Unix epoch seconds stored as floats.

use chrono::{DateTime, NaiveDate, Utc};

/// Current time as fractional seconds since the Unix epoch
pub fn now_ts() -> f64 {
    to_ts(Utc::now())
}

/// Convert a UTC datetime to fractional epoch seconds
pub fn to_ts(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

/// Parse a `--since` value.
///
/// Accepts epoch seconds (`1700000000` or `1700000000.5`), RFC 3339
/// (`2024-01-01T00:00:00Z`) or a plain date (`2024-01-01`, midnight UTC).
pub fn parse_since(value: &str) -> Option<f64> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<f64>() {
        return secs.is_finite().then_some(secs);
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Some(to_ts(at.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| to_ts(dt.and_utc()))
}

/// Human-readable rendering of an index timestamp
pub fn format_ts(ts: f64) -> String {
    DateTime::from_timestamp_micros((ts * 1_000_000.0) as i64)
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("{ts}"))
}

//! Time utility functions

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Epoch values above this are taken as milliseconds rather than seconds
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Parse a trace timestamp string.
///
/// Tries RFC 3339 first, then `YYYY-MM-DD HH:MM:SS[.fff]`, then a bare date.
/// Naive values are taken as UTC. Returns `None` when nothing matches.
pub fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(ts, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(ts, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Interpret a numeric epoch as seconds or milliseconds by magnitude
pub fn epoch_to_datetime(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let millis = if (value as i64) >= EPOCH_MILLIS_THRESHOLD {
        value as i64
    } else {
        (value * 1000.0) as i64
    };
    DateTime::from_timestamp_millis(millis)
}

/// Whether a string looks like a temporal value (used by type inference)
pub fn is_temporal(value: &str) -> bool {
    let v = value.trim();
    // Cheap shape check before the parse attempts
    v.len() >= 10
        && v.as_bytes()[4] == b'-'
        && v.as_bytes()[7] == b'-'
        && parse_timestamp(v).is_some()
}

//! Time utilities: UTC millisecond timestamps and RFC 3339 rendering.

use chrono::{TimeZone, Utc};

/// Get the current Unix timestamp in UTC (milliseconds)
pub fn get_timestamp() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a Unix timestamp (milliseconds) to an RFC 3339 string in UTC
pub fn timestamp_to_rfc3339(timestamp_millis: i64) -> String {
    let seconds = timestamp_millis / 1000;
    let nanos = ((timestamp_millis % 1000) * 1_000_000) as u32;
    match Utc.timestamp_opt(seconds, nanos) {
        chrono::LocalResult::Single(dt) => dt.to_rfc3339(),
        // Out-of-range timestamps only come from corrupted state; render
        // something inspectable instead of panicking.
        _ => format!("invalid timestamp ({timestamp_millis} ms)"),
    }
}

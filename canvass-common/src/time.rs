//! Timestamp utilities

use chrono::{DateTime, FixedOffset, SecondsFormat, TimeZone, Utc};

/// Display format used when a timestamp is written for humans (spreadsheet cells)
pub const LOCAL_DISPLAY_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Build a fixed UTC offset from whole hours.
///
/// Returns `None` for offsets outside the valid -23..=23 hour range.
pub fn offset_from_hours(hours: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(hours.checked_mul(3600)?)
}

/// Render a UTC timestamp in the given local offset using [`LOCAL_DISPLAY_FORMAT`]
pub fn format_local(timestamp: DateTime<Utc>, offset: FixedOffset) -> String {
    offset
        .from_utc_datetime(&timestamp.naive_utc())
        .format(LOCAL_DISPLAY_FORMAT)
        .to_string()
}

/// Milliseconds since the Unix epoch, used for lease columns
pub fn to_millis(timestamp: DateTime<Utc>) -> i64 {
    timestamp.timestamp_millis()
}

/// Render a timestamp for a TEXT column.
///
/// Fixed microsecond precision keeps stored values lexically ordered.
pub fn to_db_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 timestamp column back into UTC
pub fn parse_rfc3339(value: &str) -> crate::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| crate::Error::Internal(format!("Failed to parse timestamp '{}': {}", value, e)))
}

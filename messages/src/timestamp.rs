//! Conversion between the message store's raw timestamps and calendar time.
//!
//! Raw timestamps count nanoseconds since 2001-01-01 00:00:00 UTC. Pagination
//! cursors are handed out as calendar times and converted back, so the
//! conversion has to round-trip exactly.

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};

/// Seconds between the Unix epoch and 2001-01-01 00:00:00 UTC.
pub const APPLE_EPOCH_OFFSET_SECS: i64 = 978_307_200;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Calendar time for a raw timestamp. Zero means "no date" in the store.
pub fn apple_to_datetime(raw: i64) -> Option<DateTime<Utc>> {
    if raw == 0 {
        return None;
    }
    let secs = raw
        .div_euclid(NANOS_PER_SEC)
        .checked_add(APPLE_EPOCH_OFFSET_SECS)?;
    let nanos = u32::try_from(raw.rem_euclid(NANOS_PER_SEC)).ok()?;
    DateTime::from_timestamp(secs, nanos)
}

/// Raw timestamp for a calendar time, saturating outside the representable
/// range (roughly 1709 to 2293).
pub fn datetime_to_apple(at: DateTime<Utc>) -> i64 {
    at.timestamp()
        .saturating_sub(APPLE_EPOCH_OFFSET_SECS)
        .saturating_mul(NANOS_PER_SEC)
        .saturating_add(i64::from(at.timestamp_subsec_nanos()))
}

/// Raw cutoff for "the last `days` days" as seen from `now`.
pub fn days_before(now: DateTime<Utc>, days: u32) -> i64 {
    let cutoff = TimeDelta::try_days(i64::from(days))
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    datetime_to_apple(cutoff)
}

/// RFC 3339 rendering with millisecond precision, `Z` suffix.
pub fn format_iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// RFC 3339 rendering that keeps every sub-second digit present, so
/// [`parse_cursor`] gives back the same instant.
pub fn format_cursor(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse a pagination cursor. Accepts RFC 3339 or a bare `YYYY-MM-DD`
/// (midnight UTC).
pub fn parse_cursor(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Some(at.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

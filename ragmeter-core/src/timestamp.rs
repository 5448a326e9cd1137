//! Run timestamp parsing and normalization.
//!
//! Historical summaries carry timestamps from several sources: explicit
//! RFC 3339 strings (aware, with `Z` or an offset), naive local strings,
//! or a file-modification-time fallback. Comparing aware and naive values
//! directly is meaningless, so every timestamp is normalized to a single
//! timezone-naive representation (aware values are converted to UTC first,
//! then the offset is dropped) before any ordering or identity check.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::time::SystemTime;

/// Parse a timestamp string into the normalized naive-UTC representation.
///
/// Accepts RFC 3339 (`2024-01-01T00:00:00+05:00`, trailing `Z`) and naive
/// ISO forms with or without fractional seconds. Returns `None` for empty,
/// `"N/A"`, or unparseable input.
pub fn parse_normalized(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "N/A" {
        return None;
    }

    if let Ok(aware) = DateTime::parse_from_rfc3339(raw) {
        return Some(aware.naive_utc());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive);
        }
    }

    // Date-only values sort at midnight.
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default()).ok()
}

/// Normalize a filesystem modification time.
pub fn from_system_time(mtime: SystemTime) -> NaiveDateTime {
    DateTime::<Utc>::from(mtime).naive_utc()
}

/// Current instant in the normalized representation.
pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Canonical string form written into run summaries and the historical store.
pub fn to_string(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Short display form used in report tables.
pub fn display_short(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}

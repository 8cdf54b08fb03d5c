// Timestamp normalization
// Turns the locale-formatted strings produced by the read endpoint into absolute instants

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Offset, SecondsFormat, TimeZone, Utc,
};
use log::warn;

/// Offset of the HK-locale timestamp field (UTC+08:00, no daylight saving)
pub const SOURCE_OFFSET_SECS: i32 = 8 * 3600;

// Naive layouts, tried in order after the offset-carrying ISO forms
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y, %I:%M:%S %p",
    "%m/%d/%Y, %I:%M %p",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y, %H:%M:%S",
    "%b %d, %Y, %I:%M:%S %p",
    "%b %d, %Y, %I:%M %p",
    "%b %d, %Y %I:%M %p",
];

// Month-name layouts without a year; parsed with the current year prepended
const YEARLESS_FORMATS: &[&str] = &[
    "%Y %b %d, %I:%M:%S %p",
    "%Y %b %d, %I:%M %p",
    "%Y %b %d %I:%M %p",
];

pub fn source_offset() -> FixedOffset {
    FixedOffset::east_opt(SOURCE_OFFSET_SECS).unwrap_or(Utc.fix())
}

/// Parse a timestamp string, interpreting naive values in `offset`.
///
/// Returns `None` when no known layout matches.
pub fn parse_instant_in(raw: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    // Locale formatters emit U+202F before AM/PM; fold every kind of space to one ASCII space
    let cleaned = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&cleaned) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(&cleaned, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }

    let localize = |naive: NaiveDateTime| {
        offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    };

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&cleaned, format) {
            return localize(naive);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(&cleaned, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).and_then(localize);
    }

    let year = Utc::now().with_timezone(&offset).year();
    let with_year = format!("{} {}", year, cleaned);
    for format in YEARLESS_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&with_year, format) {
            return localize(naive);
        }
    }

    None
}

/// Parse a timestamp in the source offset, falling back to the current time.
///
/// The fallback keeps a batch flowing when one element carries an unreadable
/// timestamp. It is imprecise: such messages sort as if they arrived now.
pub fn to_instant(raw: &str) -> DateTime<Utc> {
    match parse_instant_in(raw, source_offset()) {
        Some(instant) => instant,
        None => {
            warn!("Unparseable timestamp '{}', using current time", raw);
            Utc::now()
        }
    }
}

/// Canonical, lexicographically sortable form of an instant
pub fn canonical(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Normalize an arbitrary timestamp string to its canonical form
pub fn normalize(raw: &str) -> String {
    canonical(&to_instant(raw))
}

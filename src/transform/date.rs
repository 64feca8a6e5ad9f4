//! Date parsing and canonical formatting
//!
//! Accepted inputs:
//! - numbers: milliseconds since the Unix epoch
//! - dates: used as-is
//! - strings: RFC 3339 / ISO-8601 with an offset or `Z`, RFC 2822, or a
//!   zone-less `YYYY[-MM[-DD]][ HH:mm[:ss[.fff]]]` wall-clock time, which is
//!   read in the target zone. Separators are optional (`20230708`) and
//!   out-of-range parts roll over into the next unit (`2023-02-30` is
//!   March 2nd).
//!
//! Output is always `YYYY-MM-DD HH:mm:ss` in the target zone.

use chrono::{
    DateTime, Duration, FixedOffset, LocalResult, Months, NaiveDate, SecondsFormat, TimeZone, Utc,
};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::document::Value;

/// Canonical output pattern
pub const CANONICAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Largest distance from the epoch a millisecond timestamp may have
const MAX_EPOCH_MILLIS: f64 = 8.64e15;

static WALL_CLOCK_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{4})[-/]?(\d{1,2})?[-/]?(\d{0,2})[Tt\s]*(\d{1,2})?:?(\d{1,2})?:?(\d{1,2})?[.:]?(\d+)?$",
    )
    .unwrap()
});

// Tried after RFC 3339, with a trailing `Z` already rewritten to `+00:00`
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

/// Parse a date-like value into an instant. `zone` anchors wall-clock
/// strings that carry no offset of their own.
pub fn parse_instant(value: &Value, zone: &Tz) -> Option<DateTime<Utc>> {
    match value {
        Value::Date(dt) => Some(*dt),
        Value::Number(n) => {
            if let Some(millis) = n.as_i64() {
                from_epoch_millis(millis as f64)
            } else {
                n.as_f64().and_then(from_epoch_millis)
            }
        }
        Value::Text(s) => parse_text(s.trim(), zone),
        _ => None,
    }
}

/// Format an instant as the canonical string in `zone`
pub fn format_in_zone(instant: &DateTime<Utc>, zone: &Tz) -> String {
    instant.with_timezone(zone).format(CANONICAL_FORMAT).to_string()
}

/// ISO-8601 UTC form with millisecond precision, used when a date is stored
/// under a key that is not a date field
pub fn to_iso_string(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse and format in one step; `None` means the value is left alone
pub fn canonicalize(value: &Value, zone: &Tz) -> Option<String> {
    parse_instant(value, zone).map(|instant| format_in_zone(&instant, zone))
}

fn from_epoch_millis(millis: f64) -> Option<DateTime<Utc>> {
    if !millis.is_finite() || millis.abs() > MAX_EPOCH_MILLIS {
        return None;
    }
    DateTime::from_timestamp_millis(millis.trunc() as i64)
}

fn parse_text(s: &str, zone: &Tz) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Some(dt) = parse_with_offset(s) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }

    parse_wall_clock(s, zone)
}

fn parse_with_offset(s: &str) -> Option<DateTime<FixedOffset>> {
    let normalized = match s.strip_suffix(['Z', 'z']) {
        Some(rest) => format!("{}+00:00", rest),
        None => s.to_string(),
    };

    OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(&normalized, fmt).ok())
}

fn parse_wall_clock(s: &str, zone: &Tz) -> Option<DateTime<Utc>> {
    let caps = WALL_CLOCK_REGEX.captures(s)?;
    let part = |i: usize| {
        caps.get(i)
            .map(|m| m.as_str())
            .filter(|digits| !digits.is_empty())
            .and_then(|digits| digits.parse::<i64>().ok())
    };

    let year = caps.get(1)?.as_str().parse::<i32>().ok()?;
    // Month 0 is December of the year before; an absent month is January
    let month = part(2).map_or(0, |m| m - 1);
    let day = part(3).unwrap_or(1);
    let millis = caps
        .get(7)
        .and_then(|m| m.as_str().get(..m.as_str().len().min(3)))
        .and_then(|digits| digits.parse::<i64>().ok())
        .unwrap_or(0);

    let january = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let month_start = if month >= 0 {
        january.checked_add_months(Months::new(month as u32))?
    } else {
        january.checked_sub_months(Months::new(month.unsigned_abs() as u32))?
    };
    let offset = Duration::days(day - 1)
        + Duration::hours(part(4).unwrap_or(0))
        + Duration::minutes(part(5).unwrap_or(0))
        + Duration::seconds(part(6).unwrap_or(0))
        + Duration::milliseconds(millis);
    let local = month_start.and_hms_opt(0, 0, 0)?.checked_add_signed(offset)?;

    // Times skipped by a DST jump do not exist; repeated ones take the first
    match zone.from_local_datetime(&local) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Some(dt.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::{America::New_York, Asia::Shanghai, UTC};

    fn text(s: &str) -> Value {
        Value::from(s)
    }

    #[test]
    fn test_iso_with_zulu_in_utc() {
        assert_eq!(
            canonicalize(&text("2023-07-08T12:34:56Z"), &UTC).as_deref(),
            Some("2023-07-08 12:34:56")
        );
    }

    #[test]
    fn test_iso_is_shifted_into_zone() {
        assert_eq!(
            canonicalize(&text("2023-07-08T12:34:56Z"), &Shanghai).as_deref(),
            Some("2023-07-08 20:34:56")
        );
        assert_eq!(
            canonicalize(&text("2023-07-08T12:34:56.789+02:00"), &UTC).as_deref(),
            Some("2023-07-08 10:34:56")
        );
    }

    #[test]
    fn test_offset_without_seconds() {
        assert_eq!(
            canonicalize(&text("2023-07-08T12:34Z"), &UTC).as_deref(),
            Some("2023-07-08 12:34:00")
        );
    }

    #[test]
    fn test_rfc2822() {
        assert_eq!(
            canonicalize(&text("Sat, 08 Jul 2023 12:34:56 +0000"), &UTC).as_deref(),
            Some("2023-07-08 12:34:56")
        );
    }

    #[test]
    fn test_wall_clock_is_read_in_target_zone() {
        assert_eq!(
            canonicalize(&text("2023-07-08 12:34:56"), &Shanghai).as_deref(),
            Some("2023-07-08 12:34:56")
        );
        assert_eq!(
            canonicalize(&text("2023/7/8"), &New_York).as_deref(),
            Some("2023-07-08 00:00:00")
        );
        assert_eq!(
            canonicalize(&text("2023"), &UTC).as_deref(),
            Some("2023-01-01 00:00:00")
        );
        assert_eq!(
            canonicalize(&text("2023-07-08T12:34:56.5"), &UTC).as_deref(),
            Some("2023-07-08 12:34:56")
        );
    }

    #[test]
    fn test_compact_wall_clock_forms() {
        for (input, expected) in [
            ("20230708", "2023-07-08 00:00:00"),
            ("20230708T123456", "2023-07-08 12:34:56"),
            ("2023-7-8 9:5:7", "2023-07-08 09:05:07"),
            ("2023-07", "2023-07-01 00:00:00"),
        ] {
            assert_eq!(canonicalize(&text(input), &UTC).as_deref(), Some(expected), "{input}");
        }
    }

    #[test]
    fn test_out_of_range_parts_roll_over() {
        for (input, expected) in [
            ("2023-02-30", "2023-03-02 00:00:00"),
            ("2023-13-01", "2024-01-01 00:00:00"),
            ("2023-07-08 24:00:00", "2023-07-09 00:00:00"),
            ("2023-07-08 25:00:00", "2023-07-09 01:00:00"),
            ("2023-12-31 23:59:60", "2024-01-01 00:00:00"),
            ("2023-03-00", "2023-02-28 00:00:00"),
            ("2023-00-15", "2022-12-15 00:00:00"),
        ] {
            assert_eq!(canonicalize(&text(input), &UTC).as_deref(), Some(expected), "{input}");
        }
    }

    #[test]
    fn test_unparseable_strings_are_rejected() {
        for input in ["not-a-date", "   ", "12:34", "2023-07-08x", "2023-07-08 12:34:56 extra"] {
            assert_eq!(canonicalize(&text(input), &UTC), None, "{input}");
        }
    }

    #[test]
    fn test_dst_gap_is_rejected() {
        assert_eq!(canonicalize(&text("2023-03-12 02:30:00"), &New_York), None);
        assert_eq!(
            canonicalize(&text("2023-11-05 01:30:00"), &New_York).as_deref(),
            Some("2023-11-05 01:30:00")
        );
    }

    #[test]
    fn test_epoch_millis() {
        assert_eq!(
            canonicalize(&Value::from(1_688_819_696_000i64), &UTC).as_deref(),
            Some("2023-07-08 12:34:56")
        );
        assert_eq!(
            canonicalize(&Value::from(1_688_819_696_999.9), &UTC).as_deref(),
            Some("2023-07-08 12:34:56")
        );
        assert_eq!(canonicalize(&Value::from(9.0e15), &UTC), None);
        assert_eq!(canonicalize(&Value::from(u64::MAX), &UTC), None);
    }

    #[test]
    fn test_date_values_and_iso_form() {
        let dt = DateTime::from_timestamp(1_672_531_200, 0).unwrap();
        assert_eq!(
            canonicalize(&Value::Date(dt), &Shanghai).as_deref(),
            Some("2023-01-01 08:00:00")
        );
        assert_eq!(to_iso_string(&dt), "2023-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_non_date_kinds_are_ignored() {
        assert_eq!(parse_instant(&Value::Bool(true), &UTC), None);
        assert_eq!(parse_instant(&Value::Null, &UTC), None);
    }
}

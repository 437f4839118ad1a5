// ============================================================================
// TIMESTAMP HANDLING
// ============================================================================
// Conversation exports carry wall-clock timestamps in a handful of textual
// shapes. Everything is normalized to milliseconds since the Unix epoch;
// zone-less values are taken as UTC.
// ============================================================================

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Zone-less layouts accepted by `Timestamp::parse`, tried in order.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
];

/// Date-only layouts. Values in these shapes cover a whole day.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Millisecond timestamp since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Create a new timestamp from milliseconds since Unix epoch
    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Get milliseconds value
    #[inline]
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Parse a textual timestamp. Returns `None` for anything unrecognized,
    /// including empty input; callers treat that as an unparsable field.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(Self(dt.timestamp_millis()));
        }

        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                return Some(Self::from_naive(naive));
            }
        }

        parse_date(raw).map(|date| Self::from_naive(date.and_time(NaiveTime::MIN)))
    }

    /// Parse an inclusive upper bound. A date without a time covers the whole
    /// day, so it resolves to the last millisecond of that day.
    pub fn parse_upper_bound(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if let Some(date) = parse_date(trimmed) {
            let next = date.succ_opt()?;
            return Some(Self(Self::from_naive(next.and_time(NaiveTime::MIN)).0 - 1));
        }
        Self::parse(trimmed)
    }

    #[inline]
    pub fn from_naive(naive: NaiveDateTime) -> Self {
        Self(naive.and_utc().timestamp_millis())
    }

    /// Convert to chrono DateTime<Utc>
    #[inline]
    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0).unwrap_or_default()
    }

    /// Calendar day (UTC) this instant falls on
    #[inline]
    pub fn date(&self) -> NaiveDate {
        self.to_datetime().date_naive()
    }

    /// Calculate duration between two timestamps
    #[inline]
    pub fn duration_since(&self, earlier: Timestamp) -> Duration {
        let millis = self.0.saturating_sub(earlier.0);
        Duration::from_millis(millis.max(0) as u64)
    }

    /// Check if timestamp is within an inclusive range
    #[inline]
    pub fn is_within(&self, start: Option<Timestamp>, end: Option<Timestamp>) -> bool {
        start.map_or(true, |s| self.0 >= s.0) && end.map_or(true, |e| self.0 <= e.0)
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().format("%Y-%m-%dT%H:%M:%S%.3fZ"))
    }
}

impl From<i64> for Timestamp {
    #[inline]
    fn from(millis: i64) -> Self {
        Self(millis)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    #[inline]
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("2024-01-01T00:10:00Z")]
    #[case("2024-01-01T00:10:00")]
    #[case("2024-01-01 00:10:00")]
    #[case("2024-01-01T00:10")]
    #[case("2024-01-01 00:10:00.000")]
    #[case("01/01/2024 00:10")]
    #[case("01/01/2024 12:10:00 AM")]
    fn test_parse_layouts_agree(#[case] raw: &str) {
        let expected = Timestamp::parse("2024-01-01T00:10:00Z").unwrap();
        assert_eq!(Timestamp::parse(raw), Some(expected), "layout {raw}");
    }

    #[test]
    fn test_parse_offset() {
        let a = Timestamp::parse("2024-01-01T02:00:00+02:00").unwrap();
        let b = Timestamp::parse("2024-01-01T00:00:00Z").unwrap();
        assert_eq!(a, b);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("yesterday")]
    #[case("2024-13-40")]
    fn test_parse_rejects(#[case] raw: &str) {
        assert_eq!(Timestamp::parse(raw), None);
    }

    #[test]
    fn test_upper_bound_covers_whole_day() {
        let upper = Timestamp::parse_upper_bound("2024-01-01").unwrap();
        let late = Timestamp::parse("2024-01-01T23:59:59.999").unwrap();
        let next = Timestamp::parse("2024-01-02T00:00:00").unwrap();
        assert!(late <= upper);
        assert!(next > upper);
    }

    #[test]
    fn test_month_first_bare_date() {
        assert_eq!(Timestamp::parse("01/02/2024"), Timestamp::parse("2024-01-02T00:00:00"));
        assert_eq!(
            Timestamp::parse_upper_bound("01/02/2024"),
            Timestamp::parse_upper_bound("2024-01-02")
        );
    }

    #[test]
    fn test_date_and_duration() {
        let start = Timestamp::parse("2024-03-05T23:50:00").unwrap();
        let end = Timestamp::parse("2024-03-06T00:05:00").unwrap();
        assert_eq!(start.date(), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(end.duration_since(start), Duration::from_secs(15 * 60));
        assert_eq!(start.duration_since(end), Duration::ZERO);
    }
}

//! # Temporal Module
//!
//! Closed date ranges with optional open ends. A missing begin extends to the
//! earliest representable date and a missing end to the latest, so every range
//! can be compared through its normalized day ordinals.

use crate::error::{ReconcileError, Result};
use crate::model::format_date;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use time::macros::format_description;
use time::Date;

/// Day ordinal of a normalized bound.
pub type Ordinal = i64;

/// Parse an ISO `YYYY-MM-DD` date.
pub fn parse_date(text: &str) -> Result<Date> {
    Ok(Date::parse(text, format_description!("[year]-[month]-[day]"))?)
}

/// A closed date range `[begin, end]`; `None` bounds are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawInterval", into = "RawInterval")]
pub struct Interval {
    begin: Option<Date>,
    end: Option<Date>,
}

impl Interval {
    /// Create a new interval with validation
    ///
    /// # Errors
    /// Returns an error if the normalized begin is after the normalized end
    pub fn new(begin: Option<Date>, end: Option<Date>) -> Result<Self> {
        let interval = Self { begin, end };
        if interval.lower() > interval.upper() {
            return Err(ReconcileError::InvertedRange {
                begin: bound_text(begin, "-∞"),
                end: bound_text(end, "+∞"),
            });
        }
        Ok(interval)
    }

    /// Create an interval from ISO date strings.
    ///
    /// # Errors
    /// Malformed dates surface as [`ReconcileError::DateParse`].
    pub fn parse(begin: Option<&str>, end: Option<&str>) -> Result<Self> {
        let begin = begin.map(parse_date).transpose()?;
        let end = end.map(parse_date).transpose()?;
        Self::new(begin, end)
    }

    /// Interval open towards the future
    pub fn from_start(begin: Date) -> Self {
        Self {
            begin: Some(begin),
            end: None,
        }
    }

    /// Interval that covers all time
    pub fn all_time() -> Self {
        Self {
            begin: None,
            end: None,
        }
    }

    pub fn begin(&self) -> Option<Date> {
        self.begin
    }

    pub fn end(&self) -> Option<Date> {
        self.end
    }

    /// Normalized begin ordinal.
    #[inline]
    pub fn lower(&self) -> Ordinal {
        self.begin.unwrap_or(Date::MIN).to_julian_day() as Ordinal
    }

    /// Normalized end ordinal.
    #[inline]
    pub fn upper(&self) -> Ordinal {
        self.end.unwrap_or(Date::MAX).to_julian_day() as Ordinal
    }

    /// Span between the normalized bounds, in days.
    #[inline]
    pub fn width(&self) -> Ordinal {
        self.upper() - self.lower()
    }

    /// Check if this interval contains a specific date
    pub fn contains(&self, date: Date) -> bool {
        let day = date.to_julian_day() as Ordinal;
        self.lower() <= day && day <= self.upper()
    }

    pub fn is_finite(&self) -> bool {
        self.begin.is_some() && self.end.is_some()
    }
}

fn bound_text(bound: Option<Date>, open: &str) -> String {
    bound.map(format_date).unwrap_or_else(|| open.to_string())
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start_str = match self.begin {
            Some(date) => format!("[{}", format_date(date)),
            None => "(-∞".to_string(),
        };
        let end_str = match self.end {
            Some(date) => format!("{}]", format_date(date)),
            None => "+∞)".to_string(),
        };
        write!(f, "{}, {}", start_str, end_str)
    }
}

impl PartialOrd for Interval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Natural order: by normalized begin, then normalized end.
impl Ord for Interval {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.lower().cmp(&other.lower()) {
            Ordering::Equal => self.upper().cmp(&other.upper()),
            ordering => ordering,
        }
    }
}

/// Wire form of an interval: optional ISO date strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawInterval {
    #[serde(default)]
    begin: Option<String>,
    #[serde(default)]
    end: Option<String>,
}

impl TryFrom<RawInterval> for Interval {
    type Error = ReconcileError;

    fn try_from(raw: RawInterval) -> Result<Self> {
        Interval::parse(raw.begin.as_deref(), raw.end.as_deref())
    }
}

impl From<Interval> for RawInterval {
    fn from(interval: Interval) -> Self {
        Self {
            begin: interval.begin.map(format_date),
            end: interval.end.map(format_date),
        }
    }
}

/// Anything that occupies an [`Interval`].
pub trait Ranged {
    fn interval(&self) -> &Interval;
}

impl Ranged for Interval {
    fn interval(&self) -> &Interval {
        self
    }
}

impl<T> Ranged for (Interval, T) {
    fn interval(&self) -> &Interval {
        &self.0
    }
}

/// Check if two closed intervals share at least one day.
#[inline]
pub fn is_crossed(a: &Interval, b: &Interval) -> bool {
    a.lower() <= b.upper() && a.upper() >= b.lower()
}

/// `min(upper) - max(lower)`; negative when the intervals do not overlap.
#[inline]
pub fn overlap_days(a: &Interval, b: &Interval) -> Ordinal {
    a.upper().min(b.upper()) - a.lower().max(b.lower())
}

/// Check if `outer` covers `inner` on both ends.
#[inline]
pub fn encloses(outer: &Interval, inner: &Interval) -> bool {
    outer.lower() <= inner.lower() && outer.upper() >= inner.upper()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn iv(begin: Option<&str>, end: Option<&str>) -> Interval {
        Interval::parse(begin, end).unwrap()
    }

    #[test]
    fn test_interval_creation() {
        let interval = iv(Some("2023-05-05"), Some("2023-05-10"));
        assert_eq!(interval.begin(), Some(date!(2023 - 05 - 05)));
        assert_eq!(interval.end(), Some(date!(2023 - 05 - 10)));
        assert_eq!(interval.width(), 5);
    }

    #[test]
    fn test_interval_validation() {
        let err = Interval::parse(Some("2023-05-10"), Some("2023-05-05")).unwrap_err();
        assert!(matches!(err, ReconcileError::InvertedRange { .. }));
        // Single-day ranges are valid.
        assert!(Interval::parse(Some("2023-05-10"), Some("2023-05-10")).is_ok());
    }

    #[test]
    fn test_malformed_dates_propagate_parse_errors() {
        let err = Interval::parse(Some("2023-13-01"), None).unwrap_err();
        assert!(matches!(err, ReconcileError::DateParse(_)));
    }

    #[test]
    fn test_open_bounds_normalize() {
        let open = iv(None, None);
        assert_eq!(open, Interval::all_time());
        assert_eq!(open.lower(), Date::MIN.to_julian_day() as Ordinal);
        assert_eq!(open.upper(), Date::MAX.to_julian_day() as Ordinal);
        assert!(open.contains(date!(2023 - 01 - 01)));
        assert!(!open.is_finite());
    }

    #[test]
    fn test_natural_order_puts_open_end_last() {
        let mut intervals = vec![
            Interval::from_start(date!(2023 - 05 - 01)),
            iv(Some("2023-05-01"), Some("2023-05-03")),
            iv(None, Some("2023-06-01")),
        ];
        intervals.sort();
        assert_eq!(intervals[0], iv(None, Some("2023-06-01")));
        assert_eq!(intervals[1], iv(Some("2023-05-01"), Some("2023-05-03")));
        assert_eq!(intervals[2], Interval::from_start(date!(2023 - 05 - 01)));
    }

    #[test]
    fn test_crossing_is_symmetric_and_closed() {
        let a = iv(Some("2023-05-01"), Some("2023-05-10"));
        let b = iv(Some("2023-05-10"), Some("2023-05-20"));
        let c = iv(Some("2023-05-11"), None);
        assert!(is_crossed(&a, &b) && is_crossed(&b, &a));
        assert!(!is_crossed(&a, &c) && !is_crossed(&c, &a));
        assert_eq!(overlap_days(&a, &b), 0);
        assert!(overlap_days(&a, &c) < 0);
    }

    #[test]
    fn test_encloses() {
        let outer = iv(Some("2023-05-15"), None);
        let inner = iv(Some("2023-05-16"), Some("2023-05-20"));
        assert!(encloses(&outer, &inner));
        assert!(!encloses(&inner, &outer));
        assert!(encloses(&outer, &outer));
    }

    #[test]
    fn test_display_and_serde() {
        let interval = iv(Some("2023-05-15"), None);
        assert_eq!(interval.to_string(), "[2023-05-15, +∞)");
        let json = serde_json::to_string(&interval).unwrap();
        assert_eq!(json, r#"{"begin":"2023-05-15","end":null}"#);
        let back: Interval = serde_json::from_str(&json).unwrap();
        assert_eq!(back, interval);
        assert!(serde_json::from_str::<Interval>(r#"{"begin":"2023-05-15","end":"2023-05-01"}"#).is_err());
    }
}

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A single backend row: a JSON object keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Closed time interval used by analytics and summaries.
///
/// Constructed via [`DateRange::new`], which orders the bounds so that
/// `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Inclusive lower bound.
    pub start: DateTime<Utc>,
    /// Inclusive upper bound.
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Creates a range, swapping the bounds if they are reversed.
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    /// The `days`-long window ending at `now`.
    #[must_use]
    pub fn last_days(now: DateTime<Utc>, days: i64) -> Self {
        Self::new(now - Duration::days(days), now)
    }

    /// Whether `ts` falls inside the range (bounds inclusive).
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }
}

/// One row of the `system_settings` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSetting {
    /// Unique setting key.
    pub key: String,
    /// Arbitrary JSON value.
    pub value: serde_json::Value,
    /// Optional human-readable description shown in the admin UI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn reversed_bounds_are_swapped() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let range = DateRange::new(b, a);
        assert_eq!(range.start, a);
        assert_eq!(range.end, b);
    }

    #[test]
    fn contains_is_inclusive() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let range = DateRange::new(a, b);
        assert!(range.contains(a));
        assert!(range.contains(b));
        assert!(!range.contains(b + Duration::seconds(1)));
    }

    #[test]
    fn last_days_ends_at_now() {
        let now = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        let range = DateRange::last_days(now, 30);
        assert_eq!(range.end, now);
        assert_eq!(range.start, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }
}

//! Common types used across the platform

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive time window used by statistics and movement reports
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Builds a window from optional bounds, defaulting to the month before `now`.
    pub fn or_last_month(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let end = end.unwrap_or(now);
        let start = start.unwrap_or_else(|| {
            end.checked_sub_months(Months::new(1))
                .unwrap_or(end - Duration::days(30))
        });
        Self { start, end }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_period_defaults_to_previous_month() {
        let now = Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).unwrap();
        let period = Period::or_last_month(None, None, now);

        assert_eq!(period.end, now);
        assert_eq!(period.start, Utc.with_ymd_and_hms(2025, 2, 15, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_period_bounds_are_inclusive() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 31, 23, 59, 59).unwrap();
        let period = Period::new(start, end);

        assert!(period.contains(start));
        assert!(period.contains(end));
        assert!(!period.contains(end + Duration::seconds(1)));
    }
}

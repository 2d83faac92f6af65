//! Static calendar rules. Every check here is pure and cheap, so callers run
//! them before touching a practitioner timeline.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::engine::Violation;
use crate::model::{BlockCategory, HOUR_MS, MINUTE_MS, Ms, Span};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessPolicy {
    /// First bookable hour of the day (inclusive).
    pub open_hour: u32,
    /// Hour at which bookings stop (exclusive).
    pub close_hour: u32,
    pub closed_day: Weekday,
    pub min_block_minutes: u32,
    pub max_block_minutes: u32,
    /// Notice a customer must give before changing or cancelling.
    pub customer_notice_hours: u32,
    /// Tolerance for blocks whose start is slightly in the past.
    pub past_grace_minutes: u32,
}

impl Default for BusinessPolicy {
    fn default() -> Self {
        Self {
            open_hour: 8,
            close_hour: 18,
            closed_day: Weekday::Sun,
            min_block_minutes: 30,
            max_block_minutes: 12 * 60,
            customer_notice_hours: 24,
            past_grace_minutes: 5,
        }
    }
}

pub(crate) fn to_datetime(t: Ms) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(t)
}

impl BusinessPolicy {
    pub fn within_business_hours(&self, start: Ms) -> bool {
        to_datetime(start).is_some_and(|dt| {
            let hour = dt.hour();
            hour >= self.open_hour && hour < self.close_hour
        })
    }

    pub fn is_permitted_day(&self, start: Ms) -> bool {
        to_datetime(start).is_some_and(|dt| dt.weekday() != self.closed_day)
    }

    pub fn duration_within_limits(&self, start: Ms, end: Ms) -> bool {
        end.checked_sub(start).is_some_and(|len| {
            len >= Ms::from(self.min_block_minutes) * MINUTE_MS
                && len <= Ms::from(self.max_block_minutes) * MINUTE_MS
        })
    }

    pub fn meets_advance_notice(start: Ms, now: Ms, hours: u32) -> bool {
        start > now + Ms::from(hours) * HOUR_MS
    }

    /// Hours, day, and "in the future" for a visit starting at `start`.
    pub fn check_visit_start(&self, start: Ms, now: Ms) -> Result<(), Violation> {
        if !Self::meets_advance_notice(start, now, 0) {
            return Err(Violation::StartInPast);
        }
        if !self.within_business_hours(start) {
            return Err(Violation::OutsideBusinessHours {
                open_hour: self.open_hour,
                close_hour: self.close_hour,
            });
        }
        if !self.is_permitted_day(start) {
            return Err(Violation::ClosedDay(self.closed_day));
        }
        Ok(())
    }

    pub fn check_customer_notice(&self, start: Ms, now: Ms) -> Result<(), Violation> {
        if Self::meets_advance_notice(start, now, self.customer_notice_hours) {
            Ok(())
        } else {
            Err(Violation::InsufficientNotice {
                hours: self.customer_notice_hours,
            })
        }
    }

    pub fn check_block_window(&self, start: Ms, end: Ms, now: Ms) -> Result<(), Violation> {
        if end <= start {
            return Err(Violation::EndNotAfterStart);
        }
        if !self.duration_within_limits(start, end) {
            return Err(Violation::BlockDuration {
                min_minutes: self.min_block_minutes,
                max_minutes: self.max_block_minutes,
            });
        }
        if start < now - Ms::from(self.past_grace_minutes) * MINUTE_MS {
            return Err(Violation::StartInPast);
        }
        Ok(())
    }

    /// Business-hours span of `date`, or `None` on the closed day.
    pub fn opening_span(&self, date: NaiveDate) -> Option<Span> {
        if date.weekday() == self.closed_day {
            return None;
        }
        let start = at_hour(date, self.open_hour)?;
        let end = at_hour(date, self.close_hour)?;
        (start < end).then(|| Span::new(start, end))
    }

    /// Preset window for a category on `date`. `Custom` has no preset.
    pub fn category_span(&self, date: NaiveDate, category: BlockCategory) -> Option<Span> {
        let midday = self.open_hour.max(12).min(self.close_hour);
        let (from, to) = match category {
            BlockCategory::FullDay => (self.open_hour, self.close_hour),
            BlockCategory::Morning => (self.open_hour, midday),
            BlockCategory::Afternoon => (midday, self.close_hour),
            BlockCategory::Custom => return None,
        };
        let start = at_hour(date, from)?;
        let end = at_hour(date, to)?;
        (start < end).then(|| Span::new(start, end))
    }
}

fn at_hour(date: NaiveDate, hour: u32) -> Option<Ms> {
    date.and_hms_opt(hour, 0, 0)
        .map(|naive| naive.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> Ms {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
            .timestamp_millis()
    }

    #[test]
    fn business_hours_are_half_open() {
        let p = BusinessPolicy::default();
        assert!(!p.within_business_hours(at(2025, 1, 10, 7, 59)));
        assert!(p.within_business_hours(at(2025, 1, 10, 8, 0)));
        assert!(p.within_business_hours(at(2025, 1, 10, 17, 59)));
        assert!(!p.within_business_hours(at(2025, 1, 10, 18, 0)));
    }

    #[test]
    fn sunday_is_closed() {
        let p = BusinessPolicy::default();
        // 2025-01-12 is a Sunday
        assert!(!p.is_permitted_day(at(2025, 1, 12, 10, 0)));
        assert!(p.is_permitted_day(at(2025, 1, 11, 10, 0)));
        assert!(p.is_permitted_day(at(2025, 1, 13, 10, 0)));
    }

    #[test]
    fn block_duration_limits_are_inclusive() {
        let p = BusinessPolicy::default();
        let s = at(2025, 1, 10, 8, 0);
        assert!(!p.duration_within_limits(s, s + 29 * MINUTE_MS));
        assert!(p.duration_within_limits(s, s + 30 * MINUTE_MS));
        assert!(p.duration_within_limits(s, s + 12 * HOUR_MS));
        assert!(!p.duration_within_limits(s, s + 12 * HOUR_MS + 1));
    }

    #[test]
    fn extreme_block_bounds_fail_duration_check() {
        let p = BusinessPolicy::default();
        assert!(!p.duration_within_limits(Ms::MIN, Ms::MAX));
        assert_eq!(
            p.check_block_window(Ms::MIN, Ms::MAX, at(2025, 1, 10, 8, 0)),
            Err(Violation::BlockDuration {
                min_minutes: 30,
                max_minutes: 12 * 60,
            })
        );
    }

    #[test]
    fn advance_notice_is_strict() {
        let now = at(2025, 1, 10, 8, 0);
        assert!(!BusinessPolicy::meets_advance_notice(now, now, 0));
        assert!(BusinessPolicy::meets_advance_notice(now + 1, now, 0));
        assert!(!BusinessPolicy::meets_advance_notice(now + 24 * HOUR_MS, now, 24));
        assert!(BusinessPolicy::meets_advance_notice(now + 24 * HOUR_MS + 1, now, 24));
    }

    #[test]
    fn visit_start_reports_first_violation() {
        let p = BusinessPolicy::default();
        let now = at(2025, 1, 1, 0, 0);
        // Sunday evening: hours are checked before the day
        let err = p.check_visit_start(at(2025, 1, 12, 20, 0), now).unwrap_err();
        assert!(matches!(err, Violation::OutsideBusinessHours { .. }));
        let err = p.check_visit_start(at(2025, 1, 12, 10, 0), now).unwrap_err();
        assert_eq!(err, Violation::ClosedDay(Weekday::Sun));
        let err = p.check_visit_start(at(2024, 12, 31, 10, 0), now).unwrap_err();
        assert_eq!(err, Violation::StartInPast);
        assert!(p.check_visit_start(at(2025, 1, 10, 10, 0), now).is_ok());
    }

    #[test]
    fn block_window_tolerates_small_lag() {
        let p = BusinessPolicy::default();
        let now = at(2025, 1, 10, 9, 0);
        assert!(p.check_block_window(now - 2 * MINUTE_MS, now + HOUR_MS, now).is_ok());
        assert_eq!(
            p.check_block_window(now - HOUR_MS, now + HOUR_MS, now),
            Err(Violation::StartInPast)
        );
        assert_eq!(
            p.check_block_window(now + HOUR_MS, now, now),
            Err(Violation::EndNotAfterStart)
        );
    }

    #[test]
    fn category_presets() {
        let p = BusinessPolicy::default();
        let day = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        assert_eq!(
            p.category_span(day, BlockCategory::FullDay),
            Some(Span::new(at(2025, 1, 10, 8, 0), at(2025, 1, 10, 18, 0)))
        );
        assert_eq!(
            p.category_span(day, BlockCategory::Morning),
            Some(Span::new(at(2025, 1, 10, 8, 0), at(2025, 1, 10, 12, 0)))
        );
        assert_eq!(
            p.category_span(day, BlockCategory::Afternoon),
            Some(Span::new(at(2025, 1, 10, 12, 0), at(2025, 1, 10, 18, 0)))
        );
        assert_eq!(p.category_span(day, BlockCategory::Custom), None);
    }

    #[test]
    fn opening_span_closed_on_sunday() {
        let p = BusinessPolicy::default();
        let sunday = NaiveDate::from_ymd_opt(2025, 1, 12).unwrap();
        assert_eq!(p.opening_span(sunday), None);
        let friday = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        assert_eq!(
            p.opening_span(friday),
            Some(Span::new(at(2025, 1, 10, 8, 0), at(2025, 1, 10, 18, 0)))
        );
    }
}

//! School-day arithmetic.
//!
//! Everything here is a pure function of its inputs. Only [`reference_day`]
//! looks at a wall-clock instant, and that instant is always passed in by the
//! caller so the scheduling layers stay testable without mocking time.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;

/// Saturday and Sunday are never school days.
#[must_use]
pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Smallest date strictly after `date` that is not a weekend.
#[must_use]
pub fn next_school_day(date: NaiveDate) -> NaiveDate {
    let mut next = advance_day(date);
    while is_weekend(next) {
        next = advance_day(next);
    }
    next
}

/// The date treated as "today" for scheduling.
///
/// `now` is converted to the civil date and hour of `tz`. From `cutover_hour`
/// onwards the following calendar day is used, and a weekend candidate rolls
/// forward to the next school day.
#[must_use]
pub fn reference_day<Z: TimeZone>(now: DateTime<Utc>, tz: &Z, cutover_hour: u32) -> NaiveDate {
    let local = now.with_timezone(tz);
    let mut candidate = local.date_naive();
    if local.hour() >= cutover_hour {
        candidate = advance_day(candidate);
    }
    if is_weekend(candidate) {
        candidate = next_school_day(candidate);
    }
    candidate
}

/// `count` consecutive school days starting at `start`.
///
/// A weekend `start` is first moved to the next school day; the (possibly
/// moved) start is the first element.
#[must_use]
pub fn next_school_days(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(count);
    if count == 0 {
        return days;
    }

    let mut current = if is_weekend(start) {
        next_school_day(start)
    } else {
        start
    };
    days.push(current);
    while days.len() < count {
        current = next_school_day(current);
        days.push(current);
    }
    days
}

fn advance_day(date: NaiveDate) -> NaiveDate {
    date.succ_opt()
        .expect("date should remain representable when advancing")
}

/// Calendar policy bound to the school's configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchoolCalendar {
    tz: Tz,
    cutover_hour: u32,
    window_size: usize,
}

impl SchoolCalendar {
    #[must_use]
    pub fn new(tz: Tz, cutover_hour: u32, window_size: usize) -> Self {
        Self {
            tz,
            cutover_hour,
            window_size,
        }
    }

    #[must_use]
    pub fn timezone(&self) -> Tz {
        self.tz
    }

    #[must_use]
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    #[must_use]
    pub fn reference_day(&self, now: DateTime<Utc>) -> NaiveDate {
        reference_day(now, &self.tz, self.cutover_hour)
    }

    /// The retention window: `window_size` school days from the reference day.
    #[must_use]
    pub fn window(&self, now: DateTime<Utc>) -> Vec<NaiveDate> {
        next_school_days(self.reference_day(now), self.window_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use rstest::rstest;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid date")
    }

    fn utc(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    #[rstest]
    #[case("2025-12-15", false)] // Monday
    #[case("2025-12-19", false)] // Friday
    #[case("2025-12-20", true)] // Saturday
    #[case("2025-12-21", true)] // Sunday
    fn weekend_classification(#[case] day: &str, #[case] expected: bool) {
        assert_eq!(is_weekend(date(day)), expected);
    }

    #[rstest]
    #[case("2025-12-16", "2025-12-17")]
    #[case("2025-12-19", "2025-12-22")]
    #[case("2025-12-20", "2025-12-22")]
    #[case("2025-12-21", "2025-12-22")]
    fn next_school_day_skips_weekends(#[case] from: &str, #[case] expected: &str) {
        assert_eq!(next_school_day(date(from)), date(expected));
    }

    #[rstest]
    // Tuesday 16:59 Berlin (UTC+1 in December)
    #[case("2025-12-16T15:59:00Z", "2025-12-16")]
    // Tuesday 17:00 Berlin
    #[case("2025-12-16T16:00:00Z", "2025-12-17")]
    // Friday 17:00 Berlin rolls over the weekend
    #[case("2025-12-19T16:00:00Z", "2025-12-22")]
    // Saturday morning
    #[case("2025-12-20T08:00:00Z", "2025-12-22")]
    // Sunday evening after the cutover
    #[case("2025-12-21T18:00:00Z", "2025-12-22")]
    fn reference_day_in_berlin(#[case] now: &str, #[case] expected: &str) {
        let day = reference_day(utc(now), &chrono_tz::Europe::Berlin, 17);
        assert_eq!(day, date(expected));
    }

    #[test]
    fn reference_day_uses_local_civil_date_not_utc() {
        // 23:30 UTC on Monday is already Tuesday 08:30 in UTC+9.
        let tz = FixedOffset::east_opt(9 * 3600).expect("offset");
        let day = reference_day(utc("2025-12-15T23:30:00Z"), &tz, 17);
        assert_eq!(day, date("2025-12-16"));
    }

    #[test]
    fn reference_day_respects_summer_time() {
        // 15:30 UTC is 17:30 CEST, past the cutover.
        let day = reference_day(utc("2025-06-17T15:30:00Z"), &chrono_tz::Europe::Berlin, 17);
        assert_eq!(day, date("2025-06-18"));
    }

    #[test]
    fn next_school_days_from_weekend_start() {
        let days = next_school_days(date("2025-12-20"), 4);
        assert_eq!(
            days,
            vec![
                date("2025-12-22"),
                date("2025-12-23"),
                date("2025-12-24"),
                date("2025-12-25"),
            ]
        );
    }

    #[test]
    fn next_school_days_crosses_weekend() {
        let days = next_school_days(date("2025-12-18"), 4);
        assert_eq!(
            days,
            vec![
                date("2025-12-18"),
                date("2025-12-19"),
                date("2025-12-22"),
                date("2025-12-23"),
            ]
        );
    }

    #[test]
    fn next_school_days_zero_count_is_empty() {
        assert!(next_school_days(date("2025-12-18"), 0).is_empty());
    }

    #[test]
    fn school_calendar_window_uses_reference_day() {
        let calendar = SchoolCalendar::new(chrono_tz::Europe::Berlin, 17, 4);
        let window = calendar.window(utc("2025-12-19T16:30:00Z"));
        assert_eq!(window.first(), Some(&date("2025-12-22")));
        assert_eq!(window.len(), 4);
    }
}

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// A once-a-day trigger at a local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyCadence {
    tz: Tz,
    target: NaiveTime,
}

impl DailyCadence {
    /// Returns `None` for an hour or minute outside the clock.
    #[must_use]
    pub fn new(tz: Tz, hour: u32, minute: u32) -> Option<Self> {
        let target = NaiveTime::from_hms_opt(hour, minute, 0)?;
        Some(Self { tz, target })
    }

    #[must_use]
    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// The next trigger at or after `now`.
    #[must_use]
    pub fn next_run_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let localized_now = now.with_timezone(&self.tz);
        let mut date = localized_now.date_naive();
        if localized_now.time() > self.target {
            date = advance_day(date);
        }

        loop {
            if let Some(next) = self.resolve(date.and_time(self.target)) {
                if next >= now {
                    return next;
                }
            }
            date = advance_day(date);
        }
    }

    fn resolve(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self.tz.from_local_datetime(&local) {
            LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(first, _) => Some(first.with_timezone(&Utc)),
            // Skipped by a DST jump: fire at the first valid instant after it.
            LocalResult::None => self
                .tz
                .from_local_datetime(&(local + Duration::hours(1)))
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

fn advance_day(date: NaiveDate) -> NaiveDate {
    date.succ_opt()
        .expect("date should remain representable when advancing")
}

#[cfg(test)]
mod tests {
    use super::DailyCadence;
    use chrono::{DateTime, Utc};
    use chrono_tz::Europe::Berlin;

    fn parse_utc(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    #[test]
    fn next_run_same_day_when_before_trigger() {
        let cadence = DailyCadence::new(Berlin, 3, 0).expect("valid time");
        let now = parse_utc("2025-12-16T01:30:00Z"); // 02:30 CET
        let next = cadence.next_run_from(now);
        assert_eq!(next, parse_utc("2025-12-16T02:00:00Z"));
    }

    #[test]
    fn next_run_next_day_when_past_trigger() {
        let cadence = DailyCadence::new(Berlin, 3, 0).expect("valid time");
        let now = parse_utc("2025-12-16T10:00:00Z");
        let next = cadence.next_run_from(now);
        assert_eq!(next, parse_utc("2025-12-17T02:00:00Z"));
    }

    #[test]
    fn next_run_immediate_when_exact_trigger() {
        let cadence = DailyCadence::new(Berlin, 3, 0).expect("valid time");
        let now = parse_utc("2025-12-16T02:00:00Z");
        assert_eq!(cadence.next_run_from(now), now);
    }

    #[test]
    fn next_run_follows_summer_time() {
        let cadence = DailyCadence::new(Berlin, 3, 0).expect("valid time");
        let now = parse_utc("2025-06-17T12:00:00Z");
        // 03:00 CEST is 01:00 UTC.
        assert_eq!(cadence.next_run_from(now), parse_utc("2025-06-18T01:00:00Z"));
    }

    #[test]
    fn skipped_local_time_fires_after_the_gap() {
        // 2025-03-30 02:30 does not exist in Berlin.
        let cadence = DailyCadence::new(Berlin, 2, 30).expect("valid time");
        let now = parse_utc("2025-03-29T23:00:00Z");
        // 03:30 CEST is 01:30 UTC.
        assert_eq!(cadence.next_run_from(now), parse_utc("2025-03-30T01:30:00Z"));
    }

    #[test]
    fn rejects_invalid_hour() {
        assert!(DailyCadence::new(Berlin, 24, 0).is_none());
    }
}

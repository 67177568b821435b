use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("unrecognized time of day `{0}`")]
    TimeOfDay(String),
    #[error("unrecognized weekday `{0}`")]
    WeekdayName(String),
    #[error("unknown timezone `{0}`")]
    Timezone(String),
}

/// A weekly recurring deadline: a weekday plus a local time of day in a
/// named timezone. Stateless; each call to [`instants`] starts a fresh
/// enumeration.
///
/// [`instants`]: DeadlineSchedule::instants
#[derive(Debug, Clone, Copy)]
pub struct DeadlineSchedule {
    weekday: Weekday,
    time: NaiveTime,
    tz: Tz,
}

impl DeadlineSchedule {
    pub fn new(weekday: Weekday, time: NaiveTime, tz: Tz) -> Self {
        Self { weekday, time, tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Infinite, strictly increasing sequence of occurrence instants.
    ///
    /// Without a start date the sequence begins today in the target zone and
    /// instants already in the past are skipped, so the first element is the
    /// first future-or-present occurrence. With a start date (backfill mode)
    /// every computed instant is yielded, past ones included.
    pub fn instants(&self, start: Option<NaiveDate>) -> DeadlineInstants {
        DeadlineInstants {
            weekday: self.weekday,
            time: self.time,
            tz: self.tz,
            cursor: start.unwrap_or_else(|| Utc::now().with_timezone(&self.tz).date_naive()),
            backfill: start.is_some(),
        }
    }
}

pub struct DeadlineInstants {
    weekday: Weekday,
    time: NaiveTime,
    tz: Tz,
    cursor: NaiveDate,
    backfill: bool,
}

impl Iterator for DeadlineInstants {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<DateTime<Utc>> {
        loop {
            let day = next_or_same(self.cursor, self.weekday);
            self.cursor = day.succ_opt()?;

            let instant = resolve_local_lenient(self.tz, day, self.time);
            if self.backfill || instant >= Utc::now() {
                return Some(instant);
            }
        }
    }
}

fn next_or_same(from: NaiveDate, weekday: Weekday) -> NaiveDate {
    let ahead = (weekday.num_days_from_monday() + 7 - from.weekday().num_days_from_monday()) % 7;
    from + Duration::days(i64::from(ahead))
}

/// Resolves a local wall-clock moment to UTC without failing on DST edges:
/// an ambiguous moment maps to its earlier offset, a skipped moment is
/// nudged forward in 15-minute steps until it exists.
fn resolve_local_lenient(tz: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let mut local = date.and_time(time);
    loop {
        match tz.from_local_datetime(&local) {
            LocalResult::Single(resolved) => return resolved.with_timezone(&Utc),
            LocalResult::Ambiguous(earlier, _) => return earlier.with_timezone(&Utc),
            LocalResult::None => local += Duration::minutes(15),
        }
    }
}

/// Accepts the time formats operators actually type: `20:00`, `8:00pm`,
/// `8 PM`, `7AM` and the like.
pub fn parse_time_of_day(input: &str) -> Result<NaiveTime, ScheduleError> {
    let cleaned = normalize_time_input(input);
    for format in ["%H:%M", "%H:%M:%S", "%I:%M%p"] {
        if let Ok(time) = NaiveTime::parse_from_str(&cleaned, format) {
            return Ok(time);
        }
    }
    Err(ScheduleError::TimeOfDay(input.to_string()))
}

/// Hour-only meridiem input carries no minutes, which a time parse cannot
/// fill in on its own; rewrite `7AM` to `7:00AM` first.
fn normalize_time_input(input: &str) -> String {
    let cleaned = input.trim().to_uppercase().replace(' ', "");
    for meridiem in ["AM", "PM"] {
        if let Some(hour) = cleaned.strip_suffix(meridiem) {
            if !hour.is_empty() && hour.len() <= 2 && hour.chars().all(|c| c.is_ascii_digit()) {
                return format!("{hour}:00{meridiem}");
            }
        }
    }
    cleaned
}

pub fn parse_weekday(input: &str) -> Result<Weekday, ScheduleError> {
    input
        .trim()
        .parse()
        .map_err(|_| ScheduleError::WeekdayName(input.to_string()))
}

#[cfg(test)]
mod tests {
    use chrono::Timelike;
    use test_case::test_case;

    use super::*;

    fn schedule(weekday: Weekday, time: &str, tz: &str) -> DeadlineSchedule {
        DeadlineSchedule::new(
            weekday,
            parse_time_of_day(time).expect("time"),
            tz.parse().expect("timezone"),
        )
    }

    #[test_case("20:00", 20, 0 ; "twenty four hour clock")]
    #[test_case("8:00pm", 20, 0 ; "lowercase meridian")]
    #[test_case("8:15 PM", 20, 15 ; "meridian with space")]
    #[test_case("7AM", 7, 0 ; "hour only")]
    #[test_case("12am", 0, 0 ; "midnight shorthand")]
    #[test_case("12 PM", 12, 0 ; "noon shorthand")]
    fn parses_common_time_formats(input: &str, hour: u32, minute: u32) {
        let time = parse_time_of_day(input).expect("should parse");
        assert_eq!((time.hour(), time.minute()), (hour, minute));
    }

    #[test]
    fn rejects_unparseable_time() {
        assert!(parse_time_of_day("around eightish").is_err());
    }

    #[test]
    fn parses_weekday_names() {
        assert_eq!(parse_weekday("Friday").expect("full name"), Weekday::Fri);
        assert_eq!(parse_weekday("fri").expect("short name"), Weekday::Fri);
        assert!(parse_weekday("Someday").is_err());
    }

    #[test_case("UTC")]
    #[test_case("America/New_York")]
    #[test_case("Australia/Lord_Howe")]
    fn backfill_sequence_is_strictly_increasing_and_weekly(tz: &str) {
        let schedule = schedule(Weekday::Fri, "20:00", tz);
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let instants: Vec<_> = schedule.instants(Some(start)).take(60).collect();

        for pair in instants.windows(2) {
            assert!(pair[0] < pair[1], "sequence must strictly increase");
            let gap = pair[1] - pair[0];
            // DST shifts stretch or shrink the UTC gap by at most an hour
            assert!(gap >= Duration::hours(7 * 24 - 1) && gap <= Duration::hours(7 * 24 + 1));
        }
    }

    #[test_case("UTC")]
    #[test_case("America/New_York")]
    #[test_case("Europe/Berlin")]
    fn every_instant_lands_on_the_requested_local_slot(tz_name: &str) {
        let schedule = schedule(Weekday::Fri, "20:00", tz_name);
        let tz: Tz = tz_name.parse().unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        for instant in schedule.instants(Some(start)).take(60) {
            let local = instant.with_timezone(&tz);
            assert_eq!(local.weekday(), Weekday::Fri);
            assert_eq!((local.hour(), local.minute()), (20, 0));
        }
    }

    #[test]
    fn backfill_starts_on_or_after_the_given_date() {
        let schedule = schedule(Weekday::Fri, "20:00", "UTC");
        // 2024-01-01 is a Monday; the next Friday is 2024-01-05
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let first = schedule.instants(Some(start)).next().unwrap();
        assert_eq!(first.date_naive(), NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
    }

    #[test]
    fn backfill_starting_on_the_weekday_itself_keeps_that_day() {
        let schedule = schedule(Weekday::Fri, "20:00", "UTC");
        let start = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let first = schedule.instants(Some(start)).next().unwrap();
        assert_eq!(first.date_naive(), start);
    }

    #[test]
    fn live_mode_never_yields_the_past() {
        let schedule = schedule(Weekday::Fri, "20:00", "UTC");
        let now = Utc::now();
        for instant in schedule.instants(None).take(5) {
            assert!(instant >= now);
        }
    }

    #[test]
    fn skipped_wall_clock_moment_resolves_forward() {
        // US DST spring-forward: 2024-03-10 02:30 does not exist in New York
        let tz: Tz = "America/New_York".parse().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let time = NaiveTime::from_hms_opt(2, 30, 0).unwrap();

        let resolved = resolve_local_lenient(tz, date, time);
        let local = resolved.with_timezone(&tz);
        assert_eq!(local.date_naive(), date);
        assert_eq!(local.hour(), 3);
    }

    #[test]
    fn ambiguous_wall_clock_moment_takes_the_earlier_offset() {
        // US DST fall-back: 2024-11-03 01:30 occurs twice in New York
        let tz: Tz = "America/New_York".parse().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 11, 3).unwrap();
        let time = NaiveTime::from_hms_opt(1, 30, 0).unwrap();

        let resolved = resolve_local_lenient(tz, date, time);
        match tz.from_local_datetime(&date.and_time(time)) {
            LocalResult::Ambiguous(earlier, _) => {
                assert_eq!(resolved, earlier.with_timezone(&Utc));
            }
            other => panic!("expected an ambiguous mapping, got {other:?}"),
        }
    }

    #[test]
    fn generation_is_restartable_from_a_different_start() {
        let schedule = schedule(Weekday::Fri, "20:00", "UTC");
        let january = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let june = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        let from_january = schedule.instants(Some(january)).next().unwrap();
        let from_june = schedule.instants(Some(june)).next().unwrap();
        assert!(from_january < from_june);

        // restarting from january again reproduces the original sequence
        assert_eq!(schedule.instants(Some(january)).next().unwrap(), from_january);
    }
}

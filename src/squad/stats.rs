use crate::schedule::DeadlineSchedule;

use super::models::{Deadline, Participation, Report};

/// Derives one member's standing from the recorded deadlines and their
/// approved reports.
///
/// Deadlines from the one owning the member's earliest report onward are
/// each joined to at most one of the member's reports by deadline key. If
/// the last period in that window has no report yet it is still open, so it
/// is dropped rather than counted as a miss. The walk then tracks current
/// and best streaks and the truncated whole-percent consistency.
pub fn participation(
    schedule: &DeadlineSchedule,
    deadlines: &[Deadline],
    reports: &[Report],
    member_id: u64,
) -> Participation {
    let mut mine: Vec<&Report> = reports.iter().filter(|r| r.member_id == member_id).collect();
    if mine.is_empty() {
        return Participation::default();
    }
    mine.sort_by_key(|r| r.instant);

    let mut ordered: Vec<&Deadline> = deadlines.iter().collect();
    ordered.sort_by_key(|d| d.instant);

    let Some(start) = ordered.iter().position(|d| d.id == mine[0].deadline_id) else {
        return Participation::default();
    };

    let mut joined: Vec<bool> = ordered[start..]
        .iter()
        .map(|d| mine.iter().any(|r| r.deadline_id == d.id))
        .collect();
    if joined.last() == Some(&false) {
        joined.pop();
    }
    if joined.is_empty() {
        return Participation::default();
    }

    let mut current = 0u32;
    let mut best = 0u32;
    let mut present = 0u32;
    for &met in &joined {
        if met {
            present += 1;
            current += 1;
            best = best.max(current);
        } else {
            current = 0;
        }
    }
    let total = joined.len() as u32;

    let role_expires = joined.iter().rposition(|&met| met).and_then(|idx| {
        let latest_met = ordered[start + idx].instant;
        let local_date = latest_met.with_timezone(&schedule.timezone()).date_naive();
        schedule.instants(Some(local_date)).nth(1)
    });

    Participation {
        first_report: mine.first().map(|r| r.instant),
        latest_report: mine.last().map(|r| r.instant),
        total_reports: mine.len() as u32,
        best_streak: best,
        current_streak: current,
        consistency: present * 100 / total,
        role_expires,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, Weekday};

    use super::*;
    use crate::schedule::parse_time_of_day;

    const MEMBER: u64 = 42;

    fn weekly_schedule() -> DeadlineSchedule {
        DeadlineSchedule::new(
            Weekday::Fri,
            parse_time_of_day("20:00").unwrap(),
            "UTC".parse().unwrap(),
        )
    }

    fn deadlines(n: usize) -> Vec<Deadline> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        weekly_schedule()
            .instants(Some(start))
            .take(n)
            .map(Deadline::at)
            .collect()
    }

    fn report_for(deadline: &Deadline) -> Report {
        Report {
            member_id: MEMBER,
            instant: deadline.instant - Duration::hours(1),
            deadline_id: deadline.id,
            ..Report::default()
        }
    }

    #[test]
    fn four_straight_weeks_score_full_marks() {
        let schedule = weekly_schedule();
        let deadlines = deadlines(4);
        let reports: Vec<Report> = deadlines.iter().map(report_for).collect();

        let stats = participation(&schedule, &deadlines, &reports, MEMBER);
        assert_eq!(stats.current_streak, 4);
        assert_eq!(stats.best_streak, 4);
        assert_eq!(stats.consistency, 100);
        assert_eq!(stats.total_reports, 4);
        assert_eq!(stats.first_report, Some(reports[0].instant));
        assert_eq!(stats.latest_report, Some(reports[3].instant));
        assert_eq!(
            stats.role_expires,
            Some(deadlines[3].instant + Duration::days(7))
        );
    }

    #[test]
    fn a_missed_week_restarts_the_streak_and_lowers_consistency() {
        let schedule = weekly_schedule();
        let deadlines = deadlines(4);
        let reports = vec![
            report_for(&deadlines[0]),
            report_for(&deadlines[2]),
            report_for(&deadlines[3]),
        ];

        let stats = participation(&schedule, &deadlines, &reports, MEMBER);
        assert_eq!(stats.current_streak, 2);
        assert_eq!(stats.best_streak, 2);
        assert_eq!(stats.consistency, 75);
    }

    #[test]
    fn best_streak_survives_a_late_collapse() {
        let schedule = weekly_schedule();
        let deadlines = deadlines(5);
        // three straight weeks, then a miss, then one more
        let reports = vec![
            report_for(&deadlines[0]),
            report_for(&deadlines[1]),
            report_for(&deadlines[2]),
            report_for(&deadlines[4]),
        ];

        let stats = participation(&schedule, &deadlines, &reports, MEMBER);
        assert_eq!(stats.best_streak, 3);
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.consistency, 80);
    }

    #[test]
    fn weeks_before_the_first_report_never_count() {
        let schedule = weekly_schedule();
        let deadlines = deadlines(4);
        let reports = vec![report_for(&deadlines[2]), report_for(&deadlines[3])];

        let stats = participation(&schedule, &deadlines, &reports, MEMBER);
        assert_eq!(stats.current_streak, 2);
        assert_eq!(stats.consistency, 100);
    }

    #[test]
    fn the_still_open_period_is_not_counted_as_a_miss() {
        let schedule = weekly_schedule();
        // the last deadline row is the pending one, with no report yet
        let deadlines = deadlines(4);
        let reports = vec![
            report_for(&deadlines[0]),
            report_for(&deadlines[1]),
            report_for(&deadlines[2]),
        ];

        let stats = participation(&schedule, &deadlines, &reports, MEMBER);
        assert_eq!(stats.current_streak, 3);
        assert_eq!(stats.consistency, 100);
    }

    #[test]
    fn a_decided_trailing_miss_does_count() {
        let schedule = weekly_schedule();
        let deadlines = deadlines(5);
        // missed week four; week five is pending and undecided
        let reports = vec![
            report_for(&deadlines[0]),
            report_for(&deadlines[1]),
            report_for(&deadlines[2]),
        ];

        let stats = participation(&schedule, &deadlines, &reports, MEMBER);
        assert_eq!(stats.current_streak, 0);
        assert_eq!(stats.best_streak, 3);
        assert_eq!(stats.consistency, 75);
    }

    #[test]
    fn consistency_truncates_toward_zero() {
        let schedule = weekly_schedule();
        let deadlines = deadlines(3);
        let reports = vec![report_for(&deadlines[0]), report_for(&deadlines[2])];

        let stats = participation(&schedule, &deadlines, &reports, MEMBER);
        // 2 of 3 is 66.67 percent, reported as 66
        assert_eq!(stats.consistency, 66);
    }

    #[test]
    fn other_members_reports_are_ignored() {
        let schedule = weekly_schedule();
        let deadlines = deadlines(4);
        let mut foreign = report_for(&deadlines[0]);
        foreign.member_id = MEMBER + 1;

        let stats = participation(&schedule, &deadlines, &[foreign], MEMBER);
        assert_eq!(stats, Participation::default());
    }

    #[test]
    fn zero_reports_yield_the_all_zero_snapshot() {
        let schedule = weekly_schedule();
        let deadlines = deadlines(4);

        let stats = participation(&schedule, &deadlines, &[], MEMBER);
        assert_eq!(stats, Participation::default());
        assert!(stats.role_expires.is_none());
    }

    #[test]
    fn storage_order_of_deadlines_does_not_matter() {
        let schedule = weekly_schedule();
        let mut deadlines = deadlines(4);
        let reports: Vec<Report> = deadlines.iter().map(report_for).collect();
        deadlines.reverse();

        let stats = participation(&schedule, &deadlines, &reports, MEMBER);
        assert_eq!(stats.current_streak, 4);
        assert_eq!(stats.best_streak, 4);
    }
}

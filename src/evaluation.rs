//! Adherence evaluation.
//!
//! Joins the expected dose times produced by `schedule` with logged intake
//! events, classifies every expected dose, and derives the aggregate
//! statistics the reporting endpoints serve. Pure and stateless; `now` is
//! always an explicit argument so evaluation is reproducible.

use chrono::{Datelike, Days, Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use thiserror::Error;

use crate::models::{AdherenceStatus, IntakeEvent, TrendPeriod};

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Intakes within this window of the scheduled time count as on-time.
pub const DEFAULT_TOLERANCE_MINUTES: i64 = 15;

/// Intakes later than this are `delayed` rather than merely flagged.
pub const DEFAULT_LATE_THRESHOLD_MINUTES: i64 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("invalid range: end {end} is before start {start}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
}

/// Classification thresholds, both configurable per call.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationWindows {
    pub tolerance_minutes: i64,
    pub late_threshold_minutes: i64,
}

impl Default for EvaluationWindows {
    fn default() -> Self {
        Self {
            tolerance_minutes: DEFAULT_TOLERANCE_MINUTES,
            late_threshold_minutes: DEFAULT_LATE_THRESHOLD_MINUTES,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Output types
// ═══════════════════════════════════════════════════════════

/// One expected dose after classification against the logged events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedDose {
    pub scheduled_time: NaiveDateTime,
    pub taken_time: Option<NaiveDateTime>,
    pub status: AdherenceStatus,
    /// Minutes late, ceiling-rounded, only set for late-but-taken doses.
    pub delay_minutes: Option<i64>,
}

/// Aggregate counts over a set of classified doses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdherenceSummary {
    pub total_scheduled: u32,
    pub taken: u32,
    pub missed: u32,
    pub delayed: u32,
    pub skipped: u32,
    /// `round(100 * taken / total_scheduled)`; 0 when nothing was due.
    pub adherence_rate: u32,
}

/// Adherence rate over one calendar period, for charting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendBucket {
    pub period_label: String,
    pub total_scheduled: u32,
    pub taken: u32,
    pub rate: u32,
}

// ═══════════════════════════════════════════════════════════
// Classification
// ═══════════════════════════════════════════════════════════

/// Classify every expected dose against the logged events.
///
/// Matching is greedy nearest-neighbor: events are walked in
/// chronological order and each claims the unclaimed expected dose whose
/// scheduled time is closest to it. A claimed dose leaves the candidate
/// pool, so no dose is explained by more than one event. Unmatched doses
/// in the past are `missed`; unmatched doses in the future stay
/// `scheduled`; events left over once every dose is claimed are ignored.
pub fn evaluate(
    expected: &[NaiveDateTime],
    events: &[IntakeEvent],
    now: NaiveDateTime,
    windows: EvaluationWindows,
) -> Vec<ClassifiedDose> {
    let mut doses: Vec<NaiveDateTime> = expected.to_vec();
    doses.sort();

    let mut ordered: Vec<(NaiveDateTime, &IntakeEvent)> = events
        .iter()
        .filter_map(|event| event.match_time().map(|t| (t, event)))
        .collect();
    ordered.sort_by_key(|(t, _)| *t);

    let mut claims: Vec<Option<&IntakeEvent>> = vec![None; doses.len()];
    for (time, event) in ordered {
        let nearest = doses
            .iter()
            .enumerate()
            .filter(|(i, _)| claims[*i].is_none())
            .min_by_key(|(_, scheduled)| abs_duration(time - **scheduled));
        if let Some((i, _)) = nearest {
            claims[i] = Some(event);
        }
    }

    doses
        .iter()
        .zip(&claims)
        .map(|(scheduled, claim)| match claim {
            Some(event) => classify(*scheduled, event, now, windows),
            None => unmatched(*scheduled, now),
        })
        .collect()
}

fn classify(
    scheduled: NaiveDateTime,
    event: &IntakeEvent,
    now: NaiveDateTime,
    windows: EvaluationWindows,
) -> ClassifiedDose {
    if event.skipped {
        return ClassifiedDose {
            scheduled_time: scheduled,
            taken_time: None,
            status: AdherenceStatus::Skipped,
            delay_minutes: None,
        };
    }

    let Some(taken) = event.taken_time else {
        // An event with a slot but no intake and no skip flag explains
        // nothing; the dose is judged as if unmatched.
        return unmatched(scheduled, now);
    };

    let late_by = taken - scheduled;
    let tolerance = Duration::minutes(windows.tolerance_minutes);
    let late_threshold = Duration::minutes(windows.late_threshold_minutes);

    let (status, delay_minutes) = if abs_duration(late_by) <= tolerance {
        (AdherenceStatus::Taken, None)
    } else if late_by > late_threshold {
        (AdherenceStatus::Delayed, Some(ceil_minutes(late_by)))
    } else if late_by > Duration::zero() {
        (AdherenceStatus::Taken, Some(ceil_minutes(late_by)))
    } else {
        // Early beyond tolerance: still taken, nothing to flag.
        (AdherenceStatus::Taken, None)
    };

    ClassifiedDose {
        scheduled_time: scheduled,
        taken_time: Some(taken),
        status,
        delay_minutes,
    }
}

fn unmatched(scheduled: NaiveDateTime, now: NaiveDateTime) -> ClassifiedDose {
    let status = if scheduled <= now {
        AdherenceStatus::Missed
    } else {
        AdherenceStatus::Scheduled
    };
    ClassifiedDose {
        scheduled_time: scheduled,
        taken_time: None,
        status,
        delay_minutes: None,
    }
}

// ═══════════════════════════════════════════════════════════
// Aggregation
// ═══════════════════════════════════════════════════════════

/// Count statuses and compute the adherence rate.
///
/// Doses still `scheduled` (not yet due) are excluded from every count,
/// so the rate only reflects doses that had a chance to be taken.
pub fn summarize(classified: &[ClassifiedDose]) -> AdherenceSummary {
    let mut summary = AdherenceSummary {
        total_scheduled: 0,
        taken: 0,
        missed: 0,
        delayed: 0,
        skipped: 0,
        adherence_rate: 0,
    };

    for dose in classified {
        match dose.status {
            AdherenceStatus::Scheduled => continue,
            AdherenceStatus::Taken => summary.taken += 1,
            AdherenceStatus::Missed => summary.missed += 1,
            AdherenceStatus::Delayed => summary.delayed += 1,
            AdherenceStatus::Skipped => summary.skipped += 1,
        }
        summary.total_scheduled += 1;
    }

    summary.adherence_rate = rate(summary.taken, summary.total_scheduled);
    summary
}

/// Consecutive calendar days ending today on which every due dose was
/// taken. Today itself is exempt while none of its doses are due yet.
pub fn current_streak_days(classified: &[ClassifiedDose], today: NaiveDate) -> u32 {
    let day_summary = |day: NaiveDate| -> (u32, u32) {
        let mut due = 0;
        let mut taken = 0;
        for dose in classified {
            if dose.scheduled_time.date() == day && dose.status != AdherenceStatus::Scheduled {
                due += 1;
                if dose.status == AdherenceStatus::Taken {
                    taken += 1;
                }
            }
        }
        (due, taken)
    };

    let mut streak = 0;
    let mut day = today;
    let (due_today, taken_today) = day_summary(day);
    if due_today > 0 {
        if taken_today < due_today {
            return 0;
        }
        streak += 1;
    }
    loop {
        day = match day.checked_sub_days(Days::new(1)) {
            Some(prev) => prev,
            None => break,
        };
        let (due, taken) = day_summary(day);
        if due == 0 || taken < due {
            break;
        }
        streak += 1;
    }
    streak
}

/// Bucket adherence rates per calendar week or month over
/// `[range_start, range_end]`.
///
/// Every period in the range appears, in order, even when it contains no
/// due doses (reported with rate 0), so chart x-axes stay contiguous.
pub fn trend_buckets(
    classified: &[ClassifiedDose],
    range_start: NaiveDate,
    range_end: NaiveDate,
    period: TrendPeriod,
) -> Result<Vec<TrendBucket>, EvaluationError> {
    if range_end < range_start {
        return Err(EvaluationError::InvalidRange {
            start: range_start,
            end: range_end,
        });
    }

    let mut buckets = Vec::new();
    let mut cursor = period_start(range_start, period);
    while cursor <= range_end {
        let label = period_label(cursor, period);
        let next = period_after(cursor, period);

        let mut total = 0;
        let mut taken = 0;
        for dose in classified {
            let day = dose.scheduled_time.date();
            if day >= cursor && day < next && dose.status != AdherenceStatus::Scheduled {
                total += 1;
                if dose.status == AdherenceStatus::Taken {
                    taken += 1;
                }
            }
        }

        buckets.push(TrendBucket {
            period_label: label,
            total_scheduled: total,
            taken,
            rate: rate(taken, total),
        });
        cursor = next;
    }

    Ok(buckets)
}

// ═══════════════════════════════════════════════════════════
// Internals
// ═══════════════════════════════════════════════════════════

fn rate(taken: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    ((f64::from(taken) / f64::from(total)) * 100.0).round() as u32
}

fn abs_duration(d: Duration) -> Duration {
    if d < Duration::zero() {
        -d
    } else {
        d
    }
}

/// Whole minutes late, rounded up: 61 seconds is 2 minutes.
fn ceil_minutes(d: Duration) -> i64 {
    let secs = d.num_seconds().max(0);
    (secs + 59) / 60
}

fn period_start(day: NaiveDate, period: TrendPeriod) -> NaiveDate {
    match period {
        TrendPeriod::Week => {
            let back = day.weekday().num_days_from_monday();
            day.checked_sub_days(Days::new(u64::from(back))).unwrap_or(day)
        }
        TrendPeriod::Month => day.with_day(1).unwrap_or(day),
    }
}

fn period_after(start: NaiveDate, period: TrendPeriod) -> NaiveDate {
    match period {
        TrendPeriod::Week => start
            .checked_add_days(Days::new(7))
            .unwrap_or(NaiveDate::MAX),
        TrendPeriod::Month => {
            let (year, month) = if start.month() == 12 {
                (start.year() + 1, 1)
            } else {
                (start.year(), start.month() + 1)
            };
            NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MAX)
        }
    }
}

fn period_label(start: NaiveDate, period: TrendPeriod) -> String {
    match period {
        TrendPeriod::Week => start.format("%G-W%V").to_string(),
        TrendPeriod::Month => start.format("%Y-%m").to_string(),
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn dt(d: u32, h: u32, m: u32) -> NaiveDateTime {
        date(d).and_hms_opt(h, m, 0).unwrap()
    }

    fn taken_at(t: NaiveDateTime) -> IntakeEvent {
        IntakeEvent {
            medication_id: Uuid::new_v4(),
            scheduled_time: None,
            taken_time: Some(t),
            skipped: false,
        }
    }

    fn skip_at(slot: NaiveDateTime) -> IntakeEvent {
        IntakeEvent {
            medication_id: Uuid::new_v4(),
            scheduled_time: Some(slot),
            taken_time: None,
            skipped: true,
        }
    }

    #[test]
    fn exact_intake_is_taken_with_no_delay() {
        let classified = evaluate(
            &[dt(2, 8, 0)],
            &[taken_at(dt(2, 8, 0))],
            dt(2, 12, 0),
            EvaluationWindows::default(),
        );
        assert_eq!(classified[0].status, AdherenceStatus::Taken);
        assert_eq!(classified[0].delay_minutes, None);
        assert_eq!(classified[0].taken_time, Some(dt(2, 8, 0)));
    }

    #[test]
    fn classification_ladder_within_tolerance_flagged_delayed() {
        // 08:12 → on time; 08:20 → taken with delay 20; 08:45 → delayed.
        let windows = EvaluationWindows::default();

        let on_time = evaluate(&[dt(2, 8, 0)], &[taken_at(dt(2, 8, 12))], dt(2, 12, 0), windows);
        assert_eq!(on_time[0].status, AdherenceStatus::Taken);
        assert_eq!(on_time[0].delay_minutes, None);

        let flagged = evaluate(&[dt(2, 8, 0)], &[taken_at(dt(2, 8, 20))], dt(2, 12, 0), windows);
        assert_eq!(flagged[0].status, AdherenceStatus::Taken);
        assert_eq!(flagged[0].delay_minutes, Some(20));

        let delayed = evaluate(&[dt(2, 8, 0)], &[taken_at(dt(2, 8, 45))], dt(2, 12, 0), windows);
        assert_eq!(delayed[0].status, AdherenceStatus::Delayed);
        assert_eq!(delayed[0].delay_minutes, Some(45));
    }

    #[test]
    fn delay_minutes_rounds_up() {
        let classified = evaluate(
            &[dt(2, 8, 0)],
            &[taken_at(date(2).and_hms_opt(8, 20, 30).unwrap())],
            dt(2, 12, 0),
            EvaluationWindows::default(),
        );
        assert_eq!(classified[0].delay_minutes, Some(21));
    }

    #[test]
    fn unmatched_past_dose_is_missed_future_is_scheduled() {
        // Same dose, two evaluation times.
        let dose = dt(2, 8, 0);

        let past = evaluate(&[dose], &[], dt(3, 7, 0), EvaluationWindows::default());
        assert_eq!(past[0].status, AdherenceStatus::Missed);

        let future = evaluate(&[dose], &[], dt(2, 7, 0), EvaluationWindows::default());
        assert_eq!(future[0].status, AdherenceStatus::Scheduled);
    }

    #[test]
    fn skip_event_is_skipped_not_missed() {
        let classified = evaluate(
            &[dt(2, 8, 0)],
            &[skip_at(dt(2, 8, 0))],
            dt(2, 12, 0),
            EvaluationWindows::default(),
        );
        assert_eq!(classified[0].status, AdherenceStatus::Skipped);
        assert_eq!(classified[0].taken_time, None);
    }

    #[test]
    fn each_event_claims_one_dose() {
        // One intake, two expected doses: the nearer dose gets it,
        // the other is missed.
        let classified = evaluate(
            &[dt(2, 8, 0), dt(2, 20, 0)],
            &[taken_at(dt(2, 8, 5))],
            dt(3, 0, 0),
            EvaluationWindows::default(),
        );
        assert_eq!(classified[0].status, AdherenceStatus::Taken);
        assert_eq!(classified[1].status, AdherenceStatus::Missed);
    }

    #[test]
    fn nearest_event_wins_for_each_dose() {
        let classified = evaluate(
            &[dt(2, 8, 0), dt(2, 20, 0)],
            &[taken_at(dt(2, 20, 10)), taken_at(dt(2, 7, 55))],
            dt(3, 0, 0),
            EvaluationWindows::default(),
        );
        assert_eq!(classified[0].taken_time, Some(dt(2, 7, 55)));
        assert_eq!(classified[1].taken_time, Some(dt(2, 20, 10)));
    }

    #[test]
    fn evaluate_is_idempotent() {
        let expected = [dt(2, 8, 0), dt(2, 20, 0), dt(3, 8, 0)];
        let events = [taken_at(dt(2, 8, 10)), skip_at(dt(2, 20, 0))];
        let now = dt(3, 9, 0);

        let a = evaluate(&expected, &events, now, EvaluationWindows::default());
        let b = evaluate(&expected, &events, now, EvaluationWindows::default());
        assert_eq!(a, b);
    }

    #[test]
    fn summary_counts_and_rate() {
        let expected = [dt(1, 8, 0), dt(1, 20, 0), dt(2, 8, 0), dt(2, 20, 0), dt(3, 8, 0)];
        let events = [
            taken_at(dt(1, 8, 3)),
            taken_at(dt(1, 20, 2)),
            skip_at(dt(2, 8, 0)),
        ];
        // Now: 02 Jan 22:00 — first four doses due, last one still future.
        let classified = evaluate(&expected, &events, dt(2, 22, 0), EvaluationWindows::default());
        let summary = summarize(&classified);

        assert_eq!(summary.total_scheduled, 4);
        assert_eq!(summary.taken, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.missed, 1);
        assert_eq!(summary.adherence_rate, 50);
    }

    #[test]
    fn rate_is_zero_when_nothing_due() {
        let summary = summarize(&[]);
        assert_eq!(summary.adherence_rate, 0);

        // All-future doses also never divide by zero.
        let classified = evaluate(
            &[dt(5, 8, 0)],
            &[],
            dt(1, 0, 0),
            EvaluationWindows::default(),
        );
        let summary = summarize(&classified);
        assert_eq!(summary.total_scheduled, 0);
        assert_eq!(summary.adherence_rate, 0);
    }

    #[test]
    fn rate_stays_in_bounds() {
        let expected = [dt(1, 8, 0)];
        let classified = evaluate(
            &expected,
            &[taken_at(dt(1, 8, 0))],
            dt(2, 0, 0),
            EvaluationWindows::default(),
        );
        let summary = summarize(&classified);
        assert_eq!(summary.adherence_rate, 100);
    }

    #[test]
    fn streak_counts_full_days_backwards() {
        // Jan 1 and Jan 2 fully taken, Jan 3 (today) nothing due yet.
        let expected = [dt(1, 8, 0), dt(2, 8, 0), dt(3, 20, 0)];
        let events = [taken_at(dt(1, 8, 1)), taken_at(dt(2, 8, 2))];
        let classified = evaluate(&expected, &events, dt(3, 7, 0), EvaluationWindows::default());

        assert_eq!(current_streak_days(&classified, date(3)), 2);
    }

    #[test]
    fn streak_broken_by_missed_dose() {
        let expected = [dt(1, 8, 0), dt(2, 8, 0), dt(3, 8, 0)];
        let events = [taken_at(dt(1, 8, 1)), taken_at(dt(3, 8, 2))];
        let classified = evaluate(&expected, &events, dt(3, 12, 0), EvaluationWindows::default());

        // Today taken, yesterday missed: streak is just today.
        assert_eq!(current_streak_days(&classified, date(3)), 1);
    }

    #[test]
    fn monthly_trend_buckets_are_contiguous() {
        let expected = [
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap().and_hms_opt(8, 0, 0).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap().and_hms_opt(8, 0, 0).unwrap(),
        ];
        let events = [taken_at(
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap().and_hms_opt(8, 5, 0).unwrap(),
        )];
        let classified = evaluate(
            &expected,
            &events,
            NaiveDate::from_ymd_opt(2024, 4, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            EvaluationWindows::default(),
        );

        let buckets = trend_buckets(
            &classified,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            TrendPeriod::Month,
        )
        .unwrap();

        let labels: Vec<&str> = buckets.iter().map(|b| b.period_label.as_str()).collect();
        assert_eq!(labels, ["2024-01", "2024-02", "2024-03"]);
        assert_eq!(buckets[0].rate, 100);
        // February had no doses but still appears with rate 0.
        assert_eq!(buckets[1].total_scheduled, 0);
        assert_eq!(buckets[1].rate, 0);
        assert_eq!(buckets[2].rate, 0); // missed
    }

    #[test]
    fn weekly_trend_buckets_use_iso_weeks() {
        let buckets = trend_buckets(
            &[],
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            TrendPeriod::Week,
        )
        .unwrap();
        let labels: Vec<&str> = buckets.iter().map(|b| b.period_label.as_str()).collect();
        assert_eq!(labels, ["2024-W01", "2024-W02", "2024-W03"]);
    }

    #[test]
    fn reversed_range_is_an_error() {
        let err = trend_buckets(
            &[],
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            TrendPeriod::Month,
        )
        .unwrap_err();
        assert!(matches!(err, EvaluationError::InvalidRange { .. }));
    }
}

//! Dose schedule generation.
//!
//! Pure date math: expands a medication's frequency spec over a date range
//! into the ordered list of expected dose timestamps. No persistence, no
//! clock access — callers pass `now` explicitly.

use chrono::{Days, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;

use crate::models::{FrequencySpec, Medication, ScheduledDose};

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Anchor used when a frequency spec carries no times at all, so every
/// active day still yields one expected dose.
pub const DEFAULT_ANCHOR_TIME: &str = "08:00";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid time of day {value:?}: expected HH:MM")]
    InvalidTimeOfDay { value: String },
}

// ═══════════════════════════════════════════════════════════
// Generation
// ═══════════════════════════════════════════════════════════

/// Expand a frequency spec into expected dose timestamps over
/// `[range_start, range_end]`, clipped to the medication's lifetime
/// `[med_start, med_end]` (open-ended when `med_end` is `None`).
///
/// Both ranges are inclusive of their end day. An empty clipped window
/// returns an empty vec, not an error. Duplicate time-of-day entries
/// produce duplicate timestamps on purpose: two pills at the same nominal
/// time are two doses.
pub fn generate(
    frequency: &FrequencySpec,
    range_start: NaiveDate,
    range_end: NaiveDate,
    med_start: NaiveDate,
    med_end: Option<NaiveDate>,
) -> Result<Vec<NaiveDateTime>, ScheduleError> {
    let start = range_start.max(med_start);
    let end = match med_end {
        Some(med_end) => range_end.min(med_end),
        None => range_end,
    };
    if end < start {
        return Ok(Vec::new());
    }

    let anchors = parse_anchors(frequency)?;

    let mut doses = Vec::with_capacity(day_count(start, end) * anchors.len());
    let mut day = start;
    loop {
        for anchor in &anchors {
            doses.push(day.and_time(*anchor));
        }
        if day >= end {
            break;
        }
        day = match day.succ_opt() {
            Some(next) => next,
            None => break, // calendar overflow
        };
    }

    // Stable sort keeps duplicate timestamps as separate entries in
    // their original array order.
    doses.sort();
    Ok(doses)
}

/// Expand doses for a medication record, tagging each with its id.
pub fn doses_for_medication(
    med: &Medication,
    range_start: NaiveDate,
    range_end: NaiveDate,
) -> Result<Vec<ScheduledDose>, ScheduleError> {
    let times = generate(
        &med.frequency,
        range_start,
        range_end,
        med.start_date,
        med.end_date,
    )?;
    Ok(times
        .into_iter()
        .map(|scheduled_time| ScheduledDose {
            medication_id: med.id,
            scheduled_time,
        })
        .collect())
}

/// Next expected dose strictly after `now`.
///
/// Looks at today and tomorrow, which covers the day-rollover case: when
/// today's doses are all in the past, the answer is tomorrow's first dose.
/// Returns `None` when the medication's lifetime contains no further dose
/// in that window (e.g. `med_end` passed).
pub fn next_dose(
    frequency: &FrequencySpec,
    med_start: NaiveDate,
    med_end: Option<NaiveDate>,
    now: NaiveDateTime,
) -> Result<Option<NaiveDateTime>, ScheduleError> {
    let today = now.date();
    let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
    let doses = generate(frequency, today, tomorrow, med_start, med_end)?;
    Ok(doses.into_iter().find(|dose| *dose > now))
}

// ═══════════════════════════════════════════════════════════
// Supply derivation
// ═══════════════════════════════════════════════════════════

/// Whole days of supply left given the remaining pill count.
/// One dose consumes one unit.
pub fn days_of_supply(remaining_quantity: i64, doses_per_day: u32) -> i64 {
    if remaining_quantity <= 0 {
        return 0;
    }
    remaining_quantity / i64::from(doses_per_day.max(1))
}

/// Date the current supply runs out, i.e. when a refill is due.
///
/// `None` when the supply already outlasts the medication's end date or
/// no quantity is tracked.
pub fn refill_due_date(med: &Medication, today: NaiveDate) -> Option<NaiveDate> {
    let remaining = med.remaining_quantity?;
    let supply_days = days_of_supply(remaining, med.frequency.doses_per_day());
    let due = today.checked_add_days(Days::new(supply_days as u64))?;
    match med.end_date {
        Some(end) if due > end => None,
        _ => Some(due),
    }
}

// ═══════════════════════════════════════════════════════════
// Internals
// ═══════════════════════════════════════════════════════════

fn parse_anchors(frequency: &FrequencySpec) -> Result<Vec<NaiveTime>, ScheduleError> {
    if frequency.times.is_empty() {
        return Ok(vec![parse_time(DEFAULT_ANCHOR_TIME)?]);
    }
    frequency.times.iter().map(|t| parse_time(t)).collect()
}

fn parse_time(value: &str) -> Result<NaiveTime, ScheduleError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| {
        ScheduleError::InvalidTimeOfDay {
            value: value.to_string(),
        }
    })
}

fn day_count(start: NaiveDate, end: NaiveDate) -> usize {
    ((end - start) + Duration::days(1)).num_days().max(0) as usize
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

//! Adherence endpoints.
//!
//! Recording goes through the same classification engine the reports use,
//! so a dose logged at 08:20 lands in the database already marked
//! `taken` with its delay, and stats recomputed later agree with it.
//!
//! - `GET /api/adherence` — record history with filters
//! - `POST /api/adherence` — log one intake or skip
//! - `PUT /api/adherence/:id` — settle a pending record
//! - `POST /api/adherence/bulk` — replay a device sync batch
//! - `GET /api/adherence/stats` — summary counts, rate, streak
//! - `GET /api/adherence/trends` — weekly or monthly rate buckets
//! - `GET /api/calendar` — day-by-day dose view

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{Days, NaiveDate, NaiveDateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{page_bounds, range_bounds, ApiContext, ApiEnvelope, Pagination};
use crate::db::repository;
use crate::db::repository::AdherenceFilter;
use crate::evaluation::{
    self, AdherenceSummary, ClassifiedDose, EvaluationWindows, TrendBucket,
};
use crate::models::{
    AdherenceRecord, AdherenceStatus, ConfirmationMethod, IntakeEvent, Medication, TrendPeriod,
};
use crate::schedule;

#[derive(Deserialize)]
pub struct AdherenceListQuery {
    pub user_id: Uuid,
    pub medication_id: Option<Uuid>,
    pub status: Option<AdherenceStatus>,
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// `GET /api/adherence`
pub async fn list(
    State(ctx): State<ApiContext>,
    Query(query): Query<AdherenceListQuery>,
) -> Result<Json<ApiEnvelope<Vec<AdherenceRecord>>>, ApiError> {
    let (page, per_page) = page_bounds(query.page, query.per_page)?;
    let filter = AdherenceFilter {
        medication_id: query.medication_id,
        status: query.status,
        from: query.from,
        to: query.to,
    };

    let conn = ctx.db()?;
    let total = repository::count_adherence(&conn, &query.user_id, &filter)?;
    let records = repository::list_adherence(
        &conn,
        &query.user_id,
        &filter,
        per_page,
        (page - 1) * per_page,
    )?;

    Ok(Json(ApiEnvelope::paginated(
        records,
        Pagination::new(page, per_page, total),
    )))
}

#[derive(Deserialize)]
pub struct RecordAdherenceRequest {
    pub user_id: Uuid,
    pub medication_id: Uuid,
    pub scheduled_time: NaiveDateTime,
    pub taken_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub skipped: bool,
    pub confirmation_method: Option<ConfirmationMethod>,
    pub notes: Option<String>,
}

/// `POST /api/adherence` — log one event. The status is classified
/// server-side from the scheduled/taken gap, never supplied by the client.
pub async fn record(
    State(ctx): State<ApiContext>,
    Json(req): Json<RecordAdherenceRequest>,
) -> Result<(StatusCode, Json<ApiEnvelope<AdherenceRecord>>), ApiError> {
    let now = Utc::now().naive_utc();
    let conn = ctx.db()?;
    // 404 before insert when the medication does not exist.
    repository::get_medication(&conn, &req.user_id, &req.medication_id)?;

    let record = build_record(&req, ConfirmationMethod::Manual, now);
    repository::insert_adherence(&conn, &record)?;
    if record.taken_time.is_some() {
        repository::decrement_remaining(&conn, &record.medication_id)?;
    }
    tracing::info!(
        medication_id = %record.medication_id,
        status = record.status.as_str(),
        "adherence recorded"
    );

    Ok((StatusCode::CREATED, Json(ApiEnvelope::ok(record))))
}

#[derive(Deserialize)]
pub struct SettleRequest {
    pub status: AdherenceStatus,
    pub taken_time: Option<NaiveDateTime>,
    pub delay_minutes: Option<i64>,
}

/// `PUT /api/adherence/:id` — settle a pending record into a terminal
/// status. Settled records are immutable; retrying returns 409.
pub async fn settle(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<SettleRequest>,
) -> Result<Json<ApiEnvelope<AdherenceRecord>>, ApiError> {
    if req.delay_minutes.is_some_and(|d| d < 0) {
        return Err(ApiError::BadRequest(
            "delay_minutes must not be negative".into(),
        ));
    }
    let conn = ctx.db()?;
    let record = repository::update_adherence_status(
        &conn,
        &id,
        req.status,
        req.taken_time,
        req.delay_minutes,
    )?;
    if record.taken_time.is_some() {
        repository::decrement_remaining(&conn, &record.medication_id)?;
    }
    Ok(Json(ApiEnvelope::ok(record)))
}

#[derive(Deserialize)]
pub struct BulkEntry {
    pub medication_id: Uuid,
    pub scheduled_time: NaiveDateTime,
    pub taken_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub skipped: bool,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct BulkRequest {
    pub user_id: Uuid,
    pub records: Vec<BulkEntry>,
}

#[derive(Serialize)]
pub struct BulkResponse {
    pub inserted: usize,
}

/// `POST /api/adherence/bulk` — batch insert for device sync replay.
/// All-or-nothing: one bad entry rejects the whole batch.
pub async fn bulk(
    State(ctx): State<ApiContext>,
    Json(req): Json<BulkRequest>,
) -> Result<(StatusCode, Json<ApiEnvelope<BulkResponse>>), ApiError> {
    if req.records.is_empty() {
        return Err(ApiError::BadRequest("records must not be empty".into()));
    }

    let now = Utc::now().naive_utc();
    let conn = ctx.db()?;

    let records: Vec<AdherenceRecord> = req
        .records
        .into_iter()
        .map(|entry| {
            build_record(
                &RecordAdherenceRequest {
                    user_id: req.user_id,
                    medication_id: entry.medication_id,
                    scheduled_time: entry.scheduled_time,
                    taken_time: entry.taken_time,
                    skipped: entry.skipped,
                    confirmation_method: None,
                    notes: entry.notes,
                },
                ConfirmationMethod::Device,
                now,
            )
        })
        .collect();

    for record in &records {
        repository::get_medication(&conn, &record.user_id, &record.medication_id)?;
    }
    let inserted = repository::insert_adherence_bulk(&conn, &records)?;
    for record in &records {
        if record.taken_time.is_some() {
            repository::decrement_remaining(&conn, &record.medication_id)?;
        }
    }
    tracing::info!(inserted, "bulk adherence sync");

    Ok((
        StatusCode::CREATED,
        Json(ApiEnvelope::ok(BulkResponse { inserted })),
    ))
}

#[derive(Deserialize)]
pub struct StatsQuery {
    pub user_id: Uuid,
    /// Window length ending now, in days. Defaults to 30.
    pub days: Option<i64>,
    pub now: Option<NaiveDateTime>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub summary: AdherenceSummary,
    pub streak_days: u32,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

/// `GET /api/adherence/stats`
pub async fn stats(
    State(ctx): State<ApiContext>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<ApiEnvelope<StatsResponse>>, ApiError> {
    let now = query.now.unwrap_or_else(|| Utc::now().naive_utc());
    let (start, end) = window_from_days(query.days, now)?;

    let conn = ctx.db()?;
    let classified = classified_window(&conn, &query.user_id, start, end, now)?;
    let summary = evaluation::summarize(&classified);
    let streak_days = evaluation::current_streak_days(&classified, now.date());

    Ok(Json(ApiEnvelope::ok(StatsResponse {
        summary,
        streak_days,
        period_start: start,
        period_end: end,
    })))
}

#[derive(Deserialize)]
pub struct TrendsQuery {
    pub user_id: Uuid,
    pub days: Option<i64>,
    /// Explicit range overrides `days` when both ends are given.
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub period: Option<TrendPeriod>,
    pub now: Option<NaiveDateTime>,
}

/// `GET /api/adherence/trends`
pub async fn trends(
    State(ctx): State<ApiContext>,
    Query(query): Query<TrendsQuery>,
) -> Result<Json<ApiEnvelope<Vec<TrendBucket>>>, ApiError> {
    let now = query.now.unwrap_or_else(|| Utc::now().naive_utc());
    let (start, end) = match (query.start, query.end) {
        (Some(start), Some(end)) => (start, end),
        _ => window_from_days(query.days, now)?,
    };
    let period = query.period.unwrap_or(TrendPeriod::Week);
    range_bounds(start, end)?;

    let conn = ctx.db()?;
    let classified = classified_window(&conn, &query.user_id, start, end, now)?;
    let buckets = evaluation::trend_buckets(&classified, start, end, period)?;

    Ok(Json(ApiEnvelope::ok(buckets)))
}

#[derive(Deserialize)]
pub struct CalendarQuery {
    pub user_id: Uuid,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub now: Option<NaiveDateTime>,
}

#[derive(Serialize)]
pub struct CalendarEntry {
    pub medication_id: Uuid,
    pub name: String,
    pub scheduled_time: NaiveDateTime,
    pub taken_time: Option<NaiveDateTime>,
    pub status: AdherenceStatus,
    pub delay_minutes: Option<i64>,
}

#[derive(Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub doses: Vec<CalendarEntry>,
}

/// `GET /api/calendar` — every day in the range with its classified
/// doses, empty days included so clients can render a full grid. The
/// range is capped at a year.
pub async fn calendar(
    State(ctx): State<ApiContext>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<ApiEnvelope<Vec<CalendarDay>>>, ApiError> {
    range_bounds(query.start, query.end)?;
    let now = query.now.unwrap_or_else(|| Utc::now().naive_utc());

    let conn = ctx.db()?;
    let meds = repository::get_active_medications(&conn, &query.user_id)?;
    let records = repository::records_in_range(
        &conn,
        &query.user_id,
        day_floor(query.start),
        day_ceil(query.end),
    )?;

    let mut by_day: BTreeMap<NaiveDate, Vec<CalendarEntry>> = BTreeMap::new();
    let mut day = query.start;
    while day <= query.end {
        by_day.insert(day, Vec::new());
        day = match day.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }

    for med in &meds {
        for dose in classify_medication(med, &records, query.start, query.end, now)? {
            by_day
                .entry(dose.scheduled_time.date())
                .or_default()
                .push(CalendarEntry {
                    medication_id: med.id,
                    name: med.name.clone(),
                    scheduled_time: dose.scheduled_time,
                    taken_time: dose.taken_time,
                    status: dose.status,
                    delay_minutes: dose.delay_minutes,
                });
        }
    }

    let days = by_day
        .into_iter()
        .map(|(date, mut doses)| {
            doses.sort_by_key(|d| d.scheduled_time);
            CalendarDay { date, doses }
        })
        .collect();

    Ok(Json(ApiEnvelope::ok(days)))
}

// ═══════════════════════════════════════════════════════════
// Internals
// ═══════════════════════════════════════════════════════════

fn build_record(
    req: &RecordAdherenceRequest,
    default_method: ConfirmationMethod,
    now: NaiveDateTime,
) -> AdherenceRecord {
    let event = IntakeEvent {
        medication_id: req.medication_id,
        scheduled_time: Some(req.scheduled_time),
        taken_time: req.taken_time,
        skipped: req.skipped,
    };
    let classified = evaluation::evaluate(
        &[req.scheduled_time],
        std::slice::from_ref(&event),
        now,
        EvaluationWindows::default(),
    );
    // One expected dose in, one classified dose out.
    let dose = classified.into_iter().next().unwrap_or(ClassifiedDose {
        scheduled_time: req.scheduled_time,
        taken_time: None,
        status: AdherenceStatus::Scheduled,
        delay_minutes: None,
    });

    AdherenceRecord {
        id: Uuid::new_v4(),
        medication_id: req.medication_id,
        user_id: req.user_id,
        scheduled_time: dose.scheduled_time,
        taken_time: dose.taken_time,
        status: dose.status,
        confirmation_method: req.confirmation_method.unwrap_or(default_method),
        delay_minutes: dose.delay_minutes,
        notes: req.notes.clone(),
        created_at: now,
    }
}

/// Expected doses of every active medication over `[start, end]`,
/// classified against the stored records.
fn classified_window(
    conn: &Connection,
    user_id: &Uuid,
    start: NaiveDate,
    end: NaiveDate,
    now: NaiveDateTime,
) -> Result<Vec<ClassifiedDose>, ApiError> {
    let meds = repository::get_active_medications(conn, user_id)?;
    let records = repository::records_in_range(conn, user_id, day_floor(start), day_ceil(end))?;

    let mut all = Vec::new();
    for med in &meds {
        all.extend(classify_medication(med, &records, start, end, now)?);
    }
    all.sort_by_key(|d| d.scheduled_time);
    Ok(all)
}

fn classify_medication(
    med: &Medication,
    records: &[AdherenceRecord],
    start: NaiveDate,
    end: NaiveDate,
    now: NaiveDateTime,
) -> Result<Vec<ClassifiedDose>, ApiError> {
    let expected: Vec<NaiveDateTime> = schedule::doses_for_medication(med, start, end)?
        .into_iter()
        .map(|dose| dose.scheduled_time)
        .collect();
    let events: Vec<IntakeEvent> = records
        .iter()
        .filter(|r| r.medication_id == med.id)
        .map(|r| IntakeEvent {
            medication_id: r.medication_id,
            scheduled_time: Some(r.scheduled_time),
            taken_time: r.taken_time,
            skipped: r.status == AdherenceStatus::Skipped,
        })
        .collect();
    Ok(evaluation::evaluate(
        &expected,
        &events,
        now,
        EvaluationWindows::default(),
    ))
}

fn window_from_days(days: Option<i64>, now: NaiveDateTime) -> Result<(NaiveDate, NaiveDate), ApiError> {
    let days = days.unwrap_or(30);
    if !(1..=366).contains(&days) {
        return Err(ApiError::BadRequest("days must be in 1..=366".into()));
    }
    let end = now.date();
    let start = end
        .checked_sub_days(Days::new((days - 1) as u64))
        .unwrap_or(end);
    Ok((start, end))
}

fn day_floor(day: NaiveDate) -> NaiveDateTime {
    day.and_hms_opt(0, 0, 0).unwrap_or_else(|| day.and_time(chrono::NaiveTime::MIN))
}

fn day_ceil(day: NaiveDate) -> NaiveDateTime {
    day.and_hms_opt(23, 59, 59).unwrap_or_else(|| day.and_time(chrono::NaiveTime::MIN))
}

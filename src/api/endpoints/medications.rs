//! Medication endpoints.
//!
//! CRUD plus the schedule-derived views:
//! - `GET /api/medications` — list with filters and pagination
//! - `POST /api/medications` — create
//! - `GET /api/medications/:id` — detail
//! - `PUT /api/medications/:id` — update
//! - `DELETE /api/medications/:id` — soft delete
//! - `GET /api/medications/upcoming` — next expected dose per medication
//! - `GET /api/medications/:id/schedule` — expected doses over a range
//! - `POST /api/medications/:id/refill` — consume one refill

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{page_bounds, range_bounds, ApiContext, ApiEnvelope, Pagination};
use crate::db::repository;
use crate::db::repository::MedicationFilter;
use crate::models::{FrequencySpec, Medication, NewMedication, ScheduledDose};
use crate::schedule;

#[derive(Deserialize)]
pub struct MedListQuery {
    pub user_id: Uuid,
    pub active: Option<bool>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// `GET /api/medications`
pub async fn list(
    State(ctx): State<ApiContext>,
    Query(query): Query<MedListQuery>,
) -> Result<Json<ApiEnvelope<Vec<Medication>>>, ApiError> {
    let (page, per_page) = page_bounds(query.page, query.per_page)?;
    let filter = MedicationFilter {
        active_only: query.active.unwrap_or(true),
        search: query.search,
    };

    let conn = ctx.db()?;
    let total = repository::count_medications(&conn, &query.user_id, &filter)?;
    let meds = repository::list_medications(
        &conn,
        &query.user_id,
        &filter,
        per_page,
        (page - 1) * per_page,
    )?;

    Ok(Json(ApiEnvelope::paginated(
        meds,
        Pagination::new(page, per_page, total),
    )))
}

/// `POST /api/medications`
pub async fn create(
    State(ctx): State<ApiContext>,
    Json(new_med): Json<NewMedication>,
) -> Result<(StatusCode, Json<ApiEnvelope<Medication>>), ApiError> {
    if new_med.name.trim().is_empty() {
        return Err(ApiError::BadRequest("medication name is required".into()));
    }
    if let Some(end) = new_med.end_date {
        if end < new_med.start_date {
            return Err(ApiError::BadRequest(
                "end_date must not precede start_date".into(),
            ));
        }
    }
    // Reject malformed dose times up front rather than at first schedule use.
    schedule::generate(
        &new_med.frequency,
        new_med.start_date,
        new_med.start_date,
        new_med.start_date,
        None,
    )?;

    let med = new_med.into_medication(Utc::now().naive_utc());
    let conn = ctx.db()?;
    repository::ensure_user(&conn, &med.user_id)?;
    repository::insert_medication(&conn, &med)?;
    tracing::info!(medication_id = %med.id, name = %med.name, "medication created");

    Ok((StatusCode::CREATED, Json(ApiEnvelope::ok(med))))
}

/// Caller identity for the per-medication routes. Lookups are always
/// scoped to the owner, so another user's id draws a 404.
#[derive(Deserialize)]
pub struct OwnerQuery {
    pub user_id: Uuid,
}

/// `GET /api/medications/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
    Query(owner): Query<OwnerQuery>,
) -> Result<Json<ApiEnvelope<Medication>>, ApiError> {
    let conn = ctx.db()?;
    let med = repository::get_medication(&conn, &owner.user_id, &id)?;
    Ok(Json(ApiEnvelope::ok(med)))
}

/// Partial update; absent fields keep their stored value.
#[derive(Deserialize)]
pub struct UpdateMedication {
    pub name: Option<String>,
    pub dosage: Option<f64>,
    pub dosage_unit: Option<String>,
    pub frequency: Option<FrequencySpec>,
    pub route: Option<String>,
    pub instructions: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub total_quantity: Option<i64>,
    pub remaining_quantity: Option<i64>,
    pub refills_remaining: Option<i64>,
    pub refill_reminder: Option<bool>,
    pub is_active: Option<bool>,
}

/// `PUT /api/medications/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
    Query(owner): Query<OwnerQuery>,
    Json(patch): Json<UpdateMedication>,
) -> Result<Json<ApiEnvelope<Medication>>, ApiError> {
    let conn = ctx.db()?;
    let mut med = repository::get_medication(&conn, &owner.user_id, &id)?;

    if let Some(name) = patch.name {
        if name.trim().is_empty() {
            return Err(ApiError::BadRequest("medication name is required".into()));
        }
        med.name = name;
    }
    if let Some(dosage) = patch.dosage {
        med.dosage = dosage;
    }
    if let Some(unit) = patch.dosage_unit {
        med.dosage_unit = unit;
    }
    if let Some(frequency) = patch.frequency {
        schedule::generate(&frequency, med.start_date, med.start_date, med.start_date, None)?;
        med.frequency = frequency;
    }
    if let Some(route) = patch.route {
        med.route = Some(route);
    }
    if let Some(instructions) = patch.instructions {
        med.instructions = Some(instructions);
    }
    if let Some(start) = patch.start_date {
        med.start_date = start;
    }
    if let Some(end) = patch.end_date {
        med.end_date = Some(end);
    }
    if let Some(total) = patch.total_quantity {
        med.total_quantity = Some(total);
    }
    if let Some(remaining) = patch.remaining_quantity {
        med.remaining_quantity = Some(remaining);
    }
    if let Some(refills) = patch.refills_remaining {
        med.refills_remaining = refills;
    }
    if let Some(reminder) = patch.refill_reminder {
        med.refill_reminder = reminder;
    }
    if let Some(active) = patch.is_active {
        med.is_active = active;
    }
    if let Some(end) = med.end_date {
        if end < med.start_date {
            return Err(ApiError::BadRequest(
                "end_date must not precede start_date".into(),
            ));
        }
    }

    repository::update_medication(&conn, &med)?;
    Ok(Json(ApiEnvelope::ok(med)))
}

/// `DELETE /api/medications/:id` — soft delete, history stays queryable.
pub async fn remove(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
    Query(owner): Query<OwnerQuery>,
) -> Result<Json<ApiEnvelope<()>>, ApiError> {
    let conn = ctx.db()?;
    repository::deactivate_medication(&conn, &owner.user_id, &id)?;
    tracing::info!(medication_id = %id, "medication deactivated");
    Ok(Json(ApiEnvelope::with_message((), "medication deactivated")))
}

#[derive(Deserialize)]
pub struct UpcomingQuery {
    pub user_id: Uuid,
    /// Evaluation instant, defaults to the server clock. Lets clients in
    /// other timezones ask for "upcoming" in their own local time.
    pub now: Option<NaiveDateTime>,
}

#[derive(Serialize)]
pub struct UpcomingDose {
    pub medication_id: Uuid,
    pub name: String,
    pub dosage: f64,
    pub dosage_unit: String,
    pub scheduled_time: NaiveDateTime,
}

/// `GET /api/medications/upcoming` — the next dose of every active
/// medication, soonest first.
pub async fn upcoming(
    State(ctx): State<ApiContext>,
    Query(query): Query<UpcomingQuery>,
) -> Result<Json<ApiEnvelope<Vec<UpcomingDose>>>, ApiError> {
    let now = query.now.unwrap_or_else(|| Utc::now().naive_utc());
    let conn = ctx.db()?;
    let meds = repository::get_active_medications(&conn, &query.user_id)?;

    let mut doses = Vec::new();
    for med in meds {
        if let Some(scheduled_time) =
            schedule::next_dose(&med.frequency, med.start_date, med.end_date, now)?
        {
            doses.push(UpcomingDose {
                medication_id: med.id,
                name: med.name,
                dosage: med.dosage,
                dosage_unit: med.dosage_unit,
                scheduled_time,
            });
        }
    }
    doses.sort_by_key(|d| d.scheduled_time);

    Ok(Json(ApiEnvelope::ok(doses)))
}

#[derive(Deserialize)]
pub struct ScheduleQuery {
    pub user_id: Uuid,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// `GET /api/medications/:id/schedule` — expected doses over a date range,
/// capped at a year. A range outside the medication's lifetime is empty,
/// not an error.
pub async fn schedule_view(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<ApiEnvelope<Vec<ScheduledDose>>>, ApiError> {
    range_bounds(query.start, query.end)?;
    let conn = ctx.db()?;
    let med = repository::get_medication(&conn, &query.user_id, &id)?;
    let doses = schedule::doses_for_medication(&med, query.start, query.end)?;
    Ok(Json(ApiEnvelope::ok(doses)))
}

#[derive(Serialize)]
pub struct RefillResponse {
    pub medication: Medication,
    pub refill_due: Option<NaiveDate>,
}

/// `POST /api/medications/:id/refill`
pub async fn refill(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
    Query(owner): Query<OwnerQuery>,
) -> Result<Json<ApiEnvelope<RefillResponse>>, ApiError> {
    let conn = ctx.db()?;
    let medication = repository::record_refill(&conn, &owner.user_id, &id)?;
    let refill_due = schedule::refill_due_date(&medication, Utc::now().date_naive());
    tracing::info!(medication_id = %id, "refill recorded");
    Ok(Json(ApiEnvelope::ok(RefillResponse {
        medication,
        refill_due,
    })))
}

//! Shared API state and response envelope.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;

use crate::api::error::ApiError;

/// Longest date range a single request may ask for.
pub const MAX_RANGE_DAYS: i64 = 366;

/// Shared state for all endpoint handlers.
///
/// SQLite connections are not `Sync`, so the single connection sits behind
/// a mutex. Handlers hold the guard only for the duration of their queries
/// and never across an await point.
#[derive(Clone)]
pub struct ApiContext {
    db: Arc<Mutex<Connection>>,
}

impl ApiContext {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn db(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::Internal("database lock poisoned".into()))
    }
}

/// Uniform response wrapper. Every success body is
/// `{"success": true, "data": ..., "pagination": ...?}`.
#[derive(Debug, Serialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
            pagination: None,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            message: Some(message.into()),
            pagination: None,
        }
    }

    pub fn paginated(data: T, pagination: Pagination) -> Self {
        Self {
            success: true,
            data,
            message: None,
            pagination: Some(pagination),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub current_page: i64,
    pub total_pages: i64,
    pub total_items: i64,
    pub items_per_page: i64,
}

impl Pagination {
    pub fn new(page: i64, per_page: i64, total_items: i64) -> Self {
        let total_pages = if total_items == 0 {
            0
        } else {
            (total_items + per_page - 1) / per_page
        };
        Self {
            current_page: page,
            total_pages,
            total_items,
            items_per_page: per_page,
        }
    }
}

/// Page/per-page defaults shared by every listing endpoint.
pub fn page_bounds(page: Option<i64>, per_page: Option<i64>) -> Result<(i64, i64), ApiError> {
    let page = page.unwrap_or(1);
    let per_page = per_page.unwrap_or(20);
    if page < 1 || per_page < 1 || per_page > 200 {
        return Err(ApiError::BadRequest(
            "page must be >= 1 and per_page in 1..=200".into(),
        ));
    }
    Ok((page, per_page))
}

/// Validates an inclusive date range shared by the schedule and calendar
/// views. Rejects reversed ranges and anything longer than a year, so one
/// request cannot ask for millions of doses.
pub fn range_bounds(start: NaiveDate, end: NaiveDate) -> Result<(), ApiError> {
    if end < start {
        return Err(ApiError::BadRequest(format!(
            "invalid range: end {end} is before start {start}"
        )));
    }
    if (end - start).num_days() >= MAX_RANGE_DAYS {
        return Err(ApiError::BadRequest(format!(
            "range must span at most {MAX_RANGE_DAYS} days"
        )));
    }
    Ok(())
}

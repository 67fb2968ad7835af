use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::repository::medication::{parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::{AdherenceRecord, AdherenceStatus, ConfirmationMethod};

/// Filters for listing adherence records.
#[derive(Debug, Clone, Default)]
pub struct AdherenceFilter {
    pub medication_id: Option<Uuid>,
    pub status: Option<AdherenceStatus>,
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
}

pub fn insert_adherence(conn: &Connection, record: &AdherenceRecord) -> Result<(), DatabaseError> {
    if !record.is_consistent() {
        return Err(DatabaseError::ConstraintViolation(format!(
            "status {} does not agree with taken_time",
            record.status.as_str()
        )));
    }

    conn.execute(
        "INSERT INTO adherence_records (id, medication_id, user_id, scheduled_time, taken_time,
         status, confirmation_method, delay_minutes, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            record.id.to_string(),
            record.medication_id.to_string(),
            record.user_id.to_string(),
            format_time(record.scheduled_time),
            record.taken_time.map(format_time),
            record.status.as_str(),
            record.confirmation_method.as_str(),
            record.delay_minutes,
            record.notes,
            format_time(record.created_at),
        ],
    )?;
    Ok(())
}

/// Insert a batch atomically. Device syncs replay queued events; one bad
/// record rolls the whole batch back so a retry starts clean.
pub fn insert_adherence_bulk(
    conn: &Connection,
    records: &[AdherenceRecord],
) -> Result<usize, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    for record in records {
        insert_adherence(&tx, record)?;
    }
    tx.commit()?;
    Ok(records.len())
}

pub fn get_adherence_record(conn: &Connection, id: &Uuid) -> Result<AdherenceRecord, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "{ADHERENCE_COLUMNS} FROM adherence_records WHERE id = ?1"
    ))?;
    let mut rows = stmt.query_map(params![id.to_string()], |row| Ok(adherence_row(row)))?;
    match rows.next() {
        Some(row) => adherence_from_row(row??),
        None => Err(DatabaseError::NotFound {
            entity_type: "adherence_record".into(),
            id: id.to_string(),
        }),
    }
}

pub fn list_adherence(
    conn: &Connection,
    user_id: &Uuid,
    filter: &AdherenceFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<AdherenceRecord>, DatabaseError> {
    let mut sql = format!("{ADHERENCE_COLUMNS} FROM adherence_records WHERE user_id = ?1");
    push_filter_clauses(&mut sql, filter);
    sql.push_str(" ORDER BY scheduled_time LIMIT ?5 OFFSET ?6");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![
            user_id.to_string(),
            filter.medication_id.map(|id| id.to_string()),
            filter.from.map(format_time),
            filter.to.map(format_time),
            limit,
            offset,
        ],
        |row| Ok(adherence_row(row)),
    )?;

    let mut records = Vec::new();
    for row in rows {
        records.push(adherence_from_row(row??)?);
    }
    Ok(records)
}

pub fn count_adherence(
    conn: &Connection,
    user_id: &Uuid,
    filter: &AdherenceFilter,
) -> Result<i64, DatabaseError> {
    let mut sql = "SELECT COUNT(*) FROM adherence_records WHERE user_id = ?1".to_string();
    push_filter_clauses(&mut sql, filter);
    // LIMIT/OFFSET keep the parameter layout shared with list_adherence.
    sql.push_str(" LIMIT ?5 OFFSET ?6");

    let count = conn.query_row(
        &sql,
        params![
            user_id.to_string(),
            filter.medication_id.map(|id| id.to_string()),
            filter.from.map(format_time),
            filter.to.map(format_time),
            i64::MAX,
            0,
        ],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}

/// All records in `[from, to]` for a user, oldest first. Evaluation and
/// trend reports work from this window.
pub fn records_in_range(
    conn: &Connection,
    user_id: &Uuid,
    from: NaiveDateTime,
    to: NaiveDateTime,
) -> Result<Vec<AdherenceRecord>, DatabaseError> {
    let filter = AdherenceFilter {
        from: Some(from),
        to: Some(to),
        ..Default::default()
    };
    list_adherence(conn, user_id, &filter, i64::MAX, 0)
}

/// Settle a pending record into a terminal status. Terminal records are
/// immutable; correcting one means logging a new record.
pub fn update_adherence_status(
    conn: &Connection,
    id: &Uuid,
    status: AdherenceStatus,
    taken_time: Option<NaiveDateTime>,
    delay_minutes: Option<i64>,
) -> Result<AdherenceRecord, DatabaseError> {
    let current = get_adherence_record(conn, id)?;
    if !current.status.can_transition_to(status) {
        return Err(DatabaseError::ConstraintViolation(format!(
            "cannot transition adherence record from {} to {}",
            current.status.as_str(),
            status.as_str()
        )));
    }

    let updated = AdherenceRecord {
        status,
        taken_time,
        delay_minutes,
        ..current
    };
    if !updated.is_consistent() {
        return Err(DatabaseError::ConstraintViolation(format!(
            "status {} does not agree with taken_time",
            status.as_str()
        )));
    }

    conn.execute(
        "UPDATE adherence_records SET status = ?2, taken_time = ?3, delay_minutes = ?4
         WHERE id = ?1",
        params![
            id.to_string(),
            status.as_str(),
            updated.taken_time.map(format_time),
            updated.delay_minutes,
        ],
    )?;
    Ok(updated)
}

const ADHERENCE_COLUMNS: &str = "SELECT id, medication_id, user_id, scheduled_time, taken_time,
     status, confirmation_method, delay_minutes, notes, created_at";

fn push_filter_clauses(sql: &mut String, filter: &AdherenceFilter) {
    sql.push_str(" AND (?2 IS NULL OR medication_id = ?2)");
    sql.push_str(" AND (?3 IS NULL OR scheduled_time >= ?3)");
    sql.push_str(" AND (?4 IS NULL OR scheduled_time <= ?4)");
    if let Some(status) = filter.status {
        sql.push_str(" AND status = '");
        sql.push_str(status.as_str());
        sql.push('\'');
    }
}

fn format_time(t: NaiveDateTime) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

struct AdherenceRow {
    id: String,
    medication_id: String,
    user_id: String,
    scheduled_time: String,
    taken_time: Option<String>,
    status: String,
    confirmation_method: String,
    delay_minutes: Option<i64>,
    notes: Option<String>,
    created_at: String,
}

fn adherence_row(row: &rusqlite::Row<'_>) -> Result<AdherenceRow, rusqlite::Error> {
    Ok(AdherenceRow {
        id: row.get(0)?,
        medication_id: row.get(1)?,
        user_id: row.get(2)?,
        scheduled_time: row.get(3)?,
        taken_time: row.get(4)?,
        status: row.get(5)?,
        confirmation_method: row.get(6)?,
        delay_minutes: row.get(7)?,
        notes: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn adherence_from_row(row: AdherenceRow) -> Result<AdherenceRecord, DatabaseError> {
    Ok(AdherenceRecord {
        id: parse_uuid(&row.id)?,
        medication_id: parse_uuid(&row.medication_id)?,
        user_id: parse_uuid(&row.user_id)?,
        scheduled_time: parse_datetime(&row.scheduled_time)?,
        taken_time: row.taken_time.as_deref().map(parse_datetime).transpose()?,
        status: AdherenceStatus::from_str(&row.status)?,
        confirmation_method: ConfirmationMethod::from_str(&row.confirmation_method)?,
        delay_minutes: row.delay_minutes,
        notes: row.notes,
        created_at: parse_datetime(&row.created_at)?,
    })
}

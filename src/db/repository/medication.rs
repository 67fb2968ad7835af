use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{FrequencySpec, Medication};

/// Filters for listing medications. `search` matches the name,
/// case-insensitively, as a substring.
#[derive(Debug, Clone, Default)]
pub struct MedicationFilter {
    pub active_only: bool,
    pub search: Option<String>,
}

/// Make sure a user row exists so medication inserts satisfy the
/// foreign key. Identity comes from the caller; there is no account
/// management here.
pub fn ensure_user(conn: &Connection, user_id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO users (id, name) VALUES (?1, 'local')",
        params![user_id.to_string()],
    )?;
    Ok(())
}

pub fn insert_medication(conn: &Connection, med: &Medication) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO medications (id, user_id, name, dosage, dosage_unit, frequency, route,
         instructions, start_date, end_date, total_quantity, remaining_quantity,
         refills_remaining, refill_reminder, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            med.id.to_string(),
            med.user_id.to_string(),
            med.name,
            med.dosage,
            med.dosage_unit,
            frequency_to_json(&med.frequency)?,
            med.route,
            med.instructions,
            med.start_date.to_string(),
            med.end_date.map(|d| d.to_string()),
            med.total_quantity,
            med.remaining_quantity,
            med.refills_remaining,
            med.refill_reminder as i32,
            med.is_active as i32,
            med.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ],
    )?;
    Ok(())
}

/// Fetch by id, scoped to the owning user. A medication belonging to
/// someone else is indistinguishable from a missing one.
pub fn get_medication(
    conn: &Connection,
    user_id: &Uuid,
    id: &Uuid,
) -> Result<Medication, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "{MEDICATION_COLUMNS} FROM medications WHERE id = ?1 AND user_id = ?2"
    ))?;

    let mut rows = stmt.query_map(params![id.to_string(), user_id.to_string()], |row| {
        Ok(medication_row(row))
    })?;
    match rows.next() {
        Some(row) => medication_from_row(row??),
        None => Err(DatabaseError::NotFound {
            entity_type: "medication".into(),
            id: id.to_string(),
        }),
    }
}

pub fn list_medications(
    conn: &Connection,
    user_id: &Uuid,
    filter: &MedicationFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<Medication>, DatabaseError> {
    let mut sql = format!(
        "{MEDICATION_COLUMNS} FROM medications
         WHERE user_id = ?1 AND LOWER(name) LIKE LOWER(?2)"
    );
    if filter.active_only {
        sql.push_str(" AND is_active = 1");
    }
    sql.push_str(" ORDER BY created_at DESC, name LIMIT ?3 OFFSET ?4");

    let pattern = filter
        .search
        .as_deref()
        .map(|s| format!("%{s}%"))
        .unwrap_or_else(|| "%".into());
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![user_id.to_string(), pattern, limit, offset],
        |row| Ok(medication_row(row)),
    )?;

    let mut meds = Vec::new();
    for row in rows {
        meds.push(medication_from_row(row??)?);
    }
    Ok(meds)
}

pub fn count_medications(
    conn: &Connection,
    user_id: &Uuid,
    filter: &MedicationFilter,
) -> Result<i64, DatabaseError> {
    let mut sql = "SELECT COUNT(*) FROM medications
         WHERE user_id = ?1 AND LOWER(name) LIKE LOWER(?2)"
        .to_string();
    if filter.active_only {
        sql.push_str(" AND is_active = 1");
    }
    let pattern = filter
        .search
        .as_deref()
        .map(|s| format!("%{s}%"))
        .unwrap_or_else(|| "%".into());

    let count = conn.query_row(&sql, params![user_id.to_string(), pattern], |row| {
        row.get::<_, i64>(0)
    })?;
    Ok(count)
}

/// Active medications only, no pagination. Schedule generation and the
/// upcoming-dose view work from this set.
pub fn get_active_medications(
    conn: &Connection,
    user_id: &Uuid,
) -> Result<Vec<Medication>, DatabaseError> {
    let filter = MedicationFilter {
        active_only: true,
        search: None,
    };
    list_medications(conn, user_id, &filter, i64::MAX, 0)
}

pub fn update_medication(conn: &Connection, med: &Medication) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE medications SET name = ?2, dosage = ?3, dosage_unit = ?4, frequency = ?5,
         route = ?6, instructions = ?7, start_date = ?8, end_date = ?9, total_quantity = ?10,
         remaining_quantity = ?11, refills_remaining = ?12, refill_reminder = ?13, is_active = ?14
         WHERE id = ?1 AND user_id = ?15",
        params![
            med.id.to_string(),
            med.name,
            med.dosage,
            med.dosage_unit,
            frequency_to_json(&med.frequency)?,
            med.route,
            med.instructions,
            med.start_date.to_string(),
            med.end_date.map(|d| d.to_string()),
            med.total_quantity,
            med.remaining_quantity,
            med.refills_remaining,
            med.refill_reminder as i32,
            med.is_active as i32,
            med.user_id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "medication".into(),
            id: med.id.to_string(),
        });
    }
    Ok(())
}

/// Soft delete: the row stays for adherence history, it just stops
/// appearing in active listings and schedules.
pub fn deactivate_medication(
    conn: &Connection,
    user_id: &Uuid,
    id: &Uuid,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE medications SET is_active = 0 WHERE id = ?1 AND user_id = ?2",
        params![id.to_string(), user_id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "medication".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Consume one refill: remaining quantity resets to the total and the
/// refill counter drops by one.
pub fn record_refill(
    conn: &Connection,
    user_id: &Uuid,
    id: &Uuid,
) -> Result<Medication, DatabaseError> {
    let med = get_medication(conn, user_id, id)?;
    if med.refills_remaining <= 0 {
        return Err(DatabaseError::ConstraintViolation(format!(
            "no refills remaining for medication {id}"
        )));
    }
    conn.execute(
        "UPDATE medications SET remaining_quantity = total_quantity,
         refills_remaining = refills_remaining - 1 WHERE id = ?1",
        params![id.to_string()],
    )?;
    get_medication(conn, user_id, id)
}

/// Drop the remaining pill count by one when an intake is recorded.
/// No-op for medications without quantity tracking; never goes negative.
pub fn decrement_remaining(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE medications SET remaining_quantity = MAX(remaining_quantity - 1, 0)
         WHERE id = ?1 AND remaining_quantity IS NOT NULL",
        params![id.to_string()],
    )?;
    Ok(())
}

const MEDICATION_COLUMNS: &str = "SELECT id, user_id, name, dosage, dosage_unit, frequency, route,
     instructions, start_date, end_date, total_quantity, remaining_quantity,
     refills_remaining, refill_reminder, is_active, created_at";

fn frequency_to_json(frequency: &FrequencySpec) -> Result<String, DatabaseError> {
    serde_json::to_string(frequency).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

// Internal row type for Medication mapping
struct MedicationRow {
    id: String,
    user_id: String,
    name: String,
    dosage: f64,
    dosage_unit: String,
    frequency: String,
    route: Option<String>,
    instructions: Option<String>,
    start_date: String,
    end_date: Option<String>,
    total_quantity: Option<i64>,
    remaining_quantity: Option<i64>,
    refills_remaining: i64,
    refill_reminder: i32,
    is_active: i32,
    created_at: String,
}

fn medication_row(row: &rusqlite::Row<'_>) -> Result<MedicationRow, rusqlite::Error> {
    Ok(MedicationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        dosage: row.get(3)?,
        dosage_unit: row.get(4)?,
        frequency: row.get(5)?,
        route: row.get(6)?,
        instructions: row.get(7)?,
        start_date: row.get(8)?,
        end_date: row.get(9)?,
        total_quantity: row.get(10)?,
        remaining_quantity: row.get(11)?,
        refills_remaining: row.get(12)?,
        refill_reminder: row.get(13)?,
        is_active: row.get(14)?,
        created_at: row.get(15)?,
    })
}

fn medication_from_row(row: MedicationRow) -> Result<Medication, DatabaseError> {
    Ok(Medication {
        id: parse_uuid(&row.id)?,
        user_id: parse_uuid(&row.user_id)?,
        name: row.name,
        dosage: row.dosage,
        dosage_unit: row.dosage_unit,
        frequency: serde_json::from_str(&row.frequency)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        route: row.route,
        instructions: row.instructions,
        start_date: parse_date(&row.start_date)?,
        end_date: row.end_date.as_deref().map(parse_date).transpose()?,
        total_quantity: row.total_quantity,
        remaining_quantity: row.remaining_quantity,
        refills_remaining: row.refills_remaining,
        refill_reminder: row.refill_reminder != 0,
        is_active: row.is_active != 0,
        created_at: parse_datetime(&row.created_at)?,
    })
}

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

pub(crate) fn parse_date(value: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

pub(crate) fn parse_datetime(value: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

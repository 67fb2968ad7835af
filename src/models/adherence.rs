use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AdherenceStatus, ConfirmationMethod};

/// Persisted intake record for one expected dose.
///
/// Invariants (enforced at the repository boundary):
/// - `status == Taken || status == Delayed` implies `taken_time` is set
/// - `status == Missed || status == Skipped` implies `taken_time` is null
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdherenceRecord {
    pub id: Uuid,
    pub medication_id: Uuid,
    pub user_id: Uuid,
    pub scheduled_time: NaiveDateTime,
    pub taken_time: Option<NaiveDateTime>,
    pub status: AdherenceStatus,
    pub confirmation_method: ConfirmationMethod,
    pub delay_minutes: Option<i64>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

impl AdherenceRecord {
    /// Check the taken-time/status invariants.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            AdherenceStatus::Taken | AdherenceStatus::Delayed => self.taken_time.is_some(),
            AdherenceStatus::Missed | AdherenceStatus::Skipped => self.taken_time.is_none(),
            AdherenceStatus::Scheduled => true,
        }
    }
}

/// A logged intake event before it has been matched to an expected dose.
///
/// `scheduled_time` is optional: manual logs usually carry only the taken
/// time, while device syncs report the slot they dispensed for. A skip is
/// an explicit event with no taken time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeEvent {
    pub medication_id: Uuid,
    pub scheduled_time: Option<NaiveDateTime>,
    pub taken_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub skipped: bool,
}

impl IntakeEvent {
    /// Timestamp used when matching this event to an expected dose.
    /// Taken time wins; skips fall back to their reported slot.
    pub fn match_time(&self) -> Option<NaiveDateTime> {
        self.taken_time.or(self.scheduled_time)
    }
}

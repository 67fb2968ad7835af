use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::MealRelation;

/// Daily dosing pattern for a medication.
///
/// `times` holds "HH:MM" anchor points; the array is the source of truth
/// for how many doses a day carries. `times_per_day` is descriptive
/// metadata kept for display and may disagree with `times.len()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencySpec {
    pub times_per_day: u32,
    #[serde(default)]
    pub times: Vec<String>,
    #[serde(default)]
    pub with_meals: bool,
    pub meal_relation: Option<MealRelation>,
}

impl FrequencySpec {
    /// A single daily dose at the default morning anchor.
    pub fn once_daily(time: &str) -> Self {
        Self {
            times_per_day: 1,
            times: vec![time.to_string()],
            with_meals: false,
            meal_relation: None,
        }
    }

    /// Effective number of doses per day. The `times` array wins over
    /// `times_per_day`; an empty array still yields one synthetic dose.
    pub fn doses_per_day(&self) -> u32 {
        self.times.len().max(1) as u32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medication {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub dosage: f64,
    pub dosage_unit: String,
    pub frequency: FrequencySpec,
    pub route: Option<String>,
    pub instructions: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub total_quantity: Option<i64>,
    pub remaining_quantity: Option<i64>,
    pub refills_remaining: i64,
    pub refill_reminder: bool,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

/// Fields accepted when creating a medication. Everything the row needs
/// that is not server-assigned (id, created_at, is_active).
#[derive(Debug, Clone, Deserialize)]
pub struct NewMedication {
    pub user_id: Uuid,
    pub name: String,
    pub dosage: f64,
    pub dosage_unit: String,
    pub frequency: FrequencySpec,
    pub route: Option<String>,
    pub instructions: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub total_quantity: Option<i64>,
    pub remaining_quantity: Option<i64>,
    #[serde(default)]
    pub refills_remaining: i64,
    #[serde(default = "default_refill_reminder")]
    pub refill_reminder: bool,
}

fn default_refill_reminder() -> bool {
    true
}

impl NewMedication {
    /// Materialise a full record. Remaining quantity defaults to the total
    /// when the caller omits it, mirroring a freshly filled prescription.
    pub fn into_medication(self, now: NaiveDateTime) -> Medication {
        let remaining = self.remaining_quantity.or(self.total_quantity);
        Medication {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            name: self.name,
            dosage: self.dosage,
            dosage_unit: self.dosage_unit,
            frequency: self.frequency,
            route: self.route,
            instructions: self.instructions,
            start_date: self.start_date,
            end_date: self.end_date,
            total_quantity: self.total_quantity,
            remaining_quantity: remaining,
            refills_remaining: self.refills_remaining,
            refill_reminder: self.refill_reminder,
            is_active: true,
            created_at: now,
        }
    }
}

/// A single expected administration, derived from the frequency spec.
/// Never persisted; adherence records reference `scheduled_time` directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledDose {
    pub medication_id: Uuid,
    pub scheduled_time: NaiveDateTime,
}

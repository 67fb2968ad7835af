pub mod adherence;
pub mod enums;
pub mod medication;

pub use adherence::{AdherenceRecord, IntakeEvent};
pub use enums::{AdherenceStatus, ConfirmationMethod, MealRelation, TrendPeriod};
pub use medication::{FrequencySpec, Medication, NewMedication, ScheduledDose};

use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(AdherenceStatus {
    Scheduled => "scheduled",
    Taken => "taken",
    Missed => "missed",
    Delayed => "delayed",
    Skipped => "skipped",
});

impl AdherenceStatus {
    /// Forward-only lifecycle: a record starts `scheduled` and settles into
    /// exactly one terminal status. Terminal statuses never change again.
    pub fn can_transition_to(&self, next: AdherenceStatus) -> bool {
        matches!(self, AdherenceStatus::Scheduled) && next != AdherenceStatus::Scheduled
    }
}

str_enum!(ConfirmationMethod {
    Manual => "manual",
    Device => "device",
    Caregiver => "caregiver",
});

str_enum!(MealRelation {
    Before => "before",
    With => "with",
    After => "after",
});

str_enum!(TrendPeriod {
    Week => "week",
    Month => "month",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn adherence_status_round_trip() {
        for (variant, s) in [
            (AdherenceStatus::Scheduled, "scheduled"),
            (AdherenceStatus::Taken, "taken"),
            (AdherenceStatus::Missed, "missed"),
            (AdherenceStatus::Delayed, "delayed"),
            (AdherenceStatus::Skipped, "skipped"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(AdherenceStatus::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn confirmation_method_round_trip() {
        for (variant, s) in [
            (ConfirmationMethod::Manual, "manual"),
            (ConfirmationMethod::Device, "device"),
            (ConfirmationMethod::Caregiver, "caregiver"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(ConfirmationMethod::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(AdherenceStatus::from_str("late").is_err());
        assert!(MealRelation::from_str("during").is_err());
        assert!(TrendPeriod::from_str("").is_err());
    }

    #[test]
    fn scheduled_transitions_forward_only() {
        let s = AdherenceStatus::Scheduled;
        assert!(s.can_transition_to(AdherenceStatus::Taken));
        assert!(s.can_transition_to(AdherenceStatus::Missed));
        assert!(s.can_transition_to(AdherenceStatus::Delayed));
        assert!(s.can_transition_to(AdherenceStatus::Skipped));
        assert!(!s.can_transition_to(AdherenceStatus::Scheduled));
    }

    #[test]
    fn terminal_statuses_never_transition() {
        for terminal in [
            AdherenceStatus::Taken,
            AdherenceStatus::Missed,
            AdherenceStatus::Delayed,
            AdherenceStatus::Skipped,
        ] {
            assert!(!terminal.can_transition_to(AdherenceStatus::Scheduled));
            assert!(!terminal.can_transition_to(AdherenceStatus::Taken));
        }
    }
}

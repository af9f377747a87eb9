use serde::{Deserialize, Serialize};

use crate::domain::recurrence::RecurrenceType;

/// How many future occurrences each series keeps materialized ahead of
/// today. Evaluation is a pure table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookAhead {
    pub daily: usize,
    pub weekdays: usize,
    pub weekly: usize,
    pub monthly: usize,
    pub yearly: usize,
}

impl Default for LookAhead {
    fn default() -> Self {
        Self {
            daily: 7,
            weekdays: 5,
            weekly: 4,
            monthly: 3,
            yearly: 2,
        }
    }
}

impl LookAhead {
    pub fn occurrences_for(&self, recurrence: RecurrenceType) -> usize {
        match recurrence {
            RecurrenceType::Daily => self.daily,
            RecurrenceType::Weekdays => self.weekdays,
            RecurrenceType::Weekly => self.weekly,
            RecurrenceType::Monthly => self.monthly,
            RecurrenceType::Yearly => self.yearly,
        }
    }

    /// First recurrence type whose target is zero, if any.
    pub(crate) fn first_empty(&self) -> Option<RecurrenceType> {
        RecurrenceType::ALL
            .into_iter()
            .find(|recurrence| self.occurrences_for(*recurrence) == 0)
    }
}

use std::fmt;

use time::{Date, Time};

use super::recurrence::RecurrenceType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reminder {
    pub id: i64,
    pub time: Time,
    pub date: Date,
    pub is_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: i64,
    pub created_at: Date,
    pub name: String,
    pub day: Date,
    pub is_done: bool,
    pub position: i64,
    pub is_recurring: bool,
    pub recurrence_type: Option<RecurrenceType>,
    pub recurrence_end_date: Option<Date>,
    pub parent_id: Option<i64>,
    pub reminder: Option<Reminder>,
}

impl Task {
    /// Id of the template row for this task's series.
    pub fn series_id(&self) -> i64 {
        self.parent_id.unwrap_or(self.id)
    }

    pub fn is_template(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Recurring with a known cadence; only these take part in look-ahead.
    pub fn recurrence(&self) -> Option<RecurrenceType> {
        if self.is_recurring {
            self.recurrence_type
        } else {
            None
        }
    }
}

/// Reminder settings without an owning task, used when creating or
/// editing tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderInput {
    pub time: Time,
    pub is_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub name: String,
    pub day: Date,
    pub reminder: Option<ReminderInput>,
    pub recurrence_type: Option<RecurrenceType>,
    pub recurrence_end_date: Option<Date>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub day: Option<Date>,
    pub reminder_time: Option<Time>,
    pub reminder_enabled: Option<bool>,
}

impl TaskPatch {
    pub fn has_changes(&self) -> bool {
        self.name.is_some()
            || self.day.is_some()
            || self.reminder_time.is_some()
            || self.reminder_enabled.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemovalStrategy {
    #[default]
    Single,
    ThisAndFuture,
}

impl RemovalStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            RemovalStrategy::Single => "single",
            RemovalStrategy::ThisAndFuture => "this_and_future",
        }
    }
}

impl fmt::Display for RemovalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

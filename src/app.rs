use rusqlite::Connection;
use serde::Serialize;
use time::{Date, Duration, OffsetDateTime};
use tracing::warn;

use crate::config::{Config, ConfigError};
use crate::db::{self, NewTaskRow};
use crate::domain::calendar::{format_date, format_time, CalendarParseError};
use crate::domain::recurrence::ParseRecurrenceTypeError;
use crate::domain::task::{NewTask, RemovalStrategy, Task, TaskPatch};
use crate::recurrence::{AheadOutcome, RecurrenceError, RecurrenceManager, SweepSummary};

pub struct App {
    conn: Connection,
    config: Config,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReminderView {
    pub id: i64,
    pub time: String,
    pub date: String,
    pub is_enabled: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TaskView {
    pub id: i64,
    pub name: String,
    pub day: String,
    pub created_at: String,
    pub is_done: bool,
    pub position: i64,
    pub is_recurring: bool,
    pub recurrence_type: Option<String>,
    pub recurrence_end_date: Option<String>,
    pub parent_id: Option<i64>,
    pub reminder: Option<ReminderView>,
}

impl From<&Task> for TaskView {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            name: task.name.clone(),
            day: format_date(task.day),
            created_at: format_date(task.created_at),
            is_done: task.is_done,
            position: task.position,
            is_recurring: task.is_recurring,
            recurrence_type: task.recurrence_type.map(|value| value.as_str().to_string()),
            recurrence_end_date: task.recurrence_end_date.map(format_date),
            parent_id: task.parent_id,
            reminder: task.reminder.map(|reminder| ReminderView {
                id: reminder.id,
                time: format_time(reminder.time),
                date: format_date(reminder.date),
                is_enabled: reminder.is_enabled,
            }),
        }
    }
}

impl App {
    pub fn open(db_path: &str, config: Config) -> Result<Self, AppError> {
        ensure_parent_dir(db_path)?;
        let conn = db::open_connection(db_path)?;
        Ok(Self { conn, config })
    }

    pub fn create_task(&self, new_task: NewTask, today: Date) -> Result<Task, AppError> {
        let name = new_task.name.trim();
        if name.is_empty() {
            return Err(AppError::InvalidArgument(
                "task name cannot be empty".to_string(),
            ));
        }
        if let Some(end) = new_task.recurrence_end_date {
            if new_task.recurrence_type.is_none() {
                return Err(AppError::InvalidArgument(
                    "an end date requires a recurrence".to_string(),
                ));
            }
            if end < new_task.day {
                return Err(AppError::InvalidArgument(format!(
                    "recurrence end date {} is before the task day {}",
                    format_date(end),
                    format_date(new_task.day)
                )));
            }
        }

        let tx = self.conn.unchecked_transaction()?;
        let position = db::next_position(&tx, new_task.day)?;
        let id = db::insert_task(
            &tx,
            &NewTaskRow {
                created_at: today,
                name,
                day: new_task.day,
                position,
                is_recurring: new_task.recurrence_type.is_some(),
                recurrence_type: new_task.recurrence_type,
                recurrence_end_date: new_task.recurrence_end_date,
                parent_id: None,
            },
        )?;
        if let Some(reminder) = new_task.reminder {
            db::upsert_reminder(&tx, id, reminder.time, new_task.day, reminder.is_enabled)?;
        }
        tx.commit()?;

        if new_task.recurrence_type.is_some() {
            if let Err(err) = self.recurrence_manager().ensure_ahead_for_task(id, today) {
                warn!(task_id = id, error = %err, "initial recurrence population failed");
            }
        }

        self.require_task(id)
    }

    pub fn get_task(&self, id: i64) -> Result<Option<Task>, AppError> {
        Ok(db::get_task(&self.conn, id)?)
    }

    pub fn list_tasks(&self, day: Option<Date>) -> Result<Vec<Task>, AppError> {
        Ok(db::list_tasks(&self.conn, day)?)
    }

    pub fn count_tasks(&self, day: Option<Date>) -> Result<i64, AppError> {
        Ok(db::count_tasks(&self.conn, day)?)
    }

    pub fn update_task(&self, id: i64, patch: TaskPatch) -> Result<Task, AppError> {
        if !patch.has_changes() {
            return Err(AppError::InvalidArgument(
                "update requires at least one field change".to_string(),
            ));
        }
        let current = self.require_task(id)?;

        let name = match patch.name.as_deref().map(str::trim) {
            Some("") => {
                return Err(AppError::InvalidArgument(
                    "task name cannot be empty".to_string(),
                ))
            }
            Some(name) => name.to_string(),
            None => current.name.clone(),
        };
        let day = patch.day.unwrap_or(current.day);

        let reminder = match (current.reminder, patch.reminder_time) {
            (_, Some(time)) => Some((
                time,
                patch
                    .reminder_enabled
                    .or(current.reminder.map(|reminder| reminder.is_enabled))
                    .unwrap_or(true),
            )),
            (Some(existing), None) => Some((
                existing.time,
                patch.reminder_enabled.unwrap_or(existing.is_enabled),
            )),
            (None, None) if patch.reminder_enabled.is_some() => {
                return Err(AppError::InvalidArgument(format!(
                    "task {id} has no reminder; pass a reminder time"
                )))
            }
            (None, None) => None,
        };

        let tx = self.conn.unchecked_transaction()?;
        if current.is_recurring && day != current.day {
            let taken = db::series_days(&tx, current.series_id())?;
            if taken.contains(&day) {
                return Err(AppError::InvalidArgument(format!(
                    "series {} already has a task on {}",
                    current.series_id(),
                    format_date(day)
                )));
            }
        }
        db::update_task_fields(&tx, id, &name, day)?;
        if let Some((time, is_enabled)) = reminder {
            db::upsert_reminder(&tx, id, time, day, is_enabled)?;
        }
        if day != current.day {
            let position = db::next_position(&tx, day)?;
            db::set_task_position(&tx, id, position)?;
        }
        tx.commit()?;

        self.require_task(id)
    }

    pub fn mark_task(&self, id: i64, is_done: bool) -> Result<Task, AppError> {
        if db::set_task_done(&self.conn, id, is_done)? == 0 {
            return Err(AppError::NotFound(id));
        }
        self.require_task(id)
    }

    /// Deletes a task; returns how many rows were removed.
    pub fn remove_task(&self, id: i64, strategy: RemovalStrategy) -> Result<usize, AppError> {
        let task = self.require_task(id)?;
        let tx = self.conn.unchecked_transaction()?;

        let removed = match (strategy, task.is_recurring) {
            (RemovalStrategy::ThisAndFuture, true) => {
                let series_id = task.series_id();
                let anchor = db::series_anchor(&tx, series_id)?.unwrap_or(task.day);
                let series = db::list_series(&tx, series_id)?;
                let mut removed = 0;
                for member in series.iter().filter(|member| member.day >= task.day) {
                    removed += db::delete_task(&tx, member.id)?;
                }
                // Survivors end the day before the cut.
                if let Some(first) = series.iter().find(|member| member.day < task.day) {
                    db::set_series_end_date(&tx, series_id, task.day.previous_day())?;
                    let template_removed = series
                        .iter()
                        .any(|member| member.id == series_id && member.day >= task.day);
                    if template_removed {
                        db::reparent_series(&tx, series_id, first.id, anchor)?;
                    }
                }
                removed
            }
            _ => {
                let anchor = db::series_anchor(&tx, id)?.unwrap_or(task.day);
                let removed = db::delete_task(&tx, id)?;
                if task.is_recurring && task.is_template() {
                    let orphans = db::list_series(&tx, id)?;
                    if let Some(first) = orphans.first() {
                        db::reparent_series(&tx, id, first.id, anchor)?;
                    }
                }
                removed
            }
        };

        tx.commit()?;
        Ok(removed)
    }

    /// Moves a task to a 1-based position within its day and renumbers the
    /// rest densely.
    pub fn move_task(&self, id: i64, to_position: i64) -> Result<Vec<Task>, AppError> {
        if to_position < 1 {
            return Err(AppError::InvalidArgument(
                "position must be at least 1".to_string(),
            ));
        }
        let task = self.require_task(id)?;
        let day = task.day;
        let mut ordered = db::list_tasks(&self.conn, Some(day))?;
        ordered.retain(|other| other.id != id);
        let index = usize::try_from(to_position - 1)
            .unwrap_or(usize::MAX)
            .min(ordered.len());
        ordered.insert(index, task);

        let tx = self.conn.unchecked_transaction()?;
        for (position, member) in (1i64..).zip(ordered.iter()) {
            if member.position != position {
                db::set_task_position(&tx, member.id, position)?;
            }
        }
        tx.commit()?;

        self.list_tasks(Some(day))
    }

    /// Pushes an enabled reminder one hour past `now`.
    pub fn snooze_reminder(&self, id: i64, now: OffsetDateTime) -> Result<Task, AppError> {
        let task = self.require_task(id)?;
        match task.reminder {
            Some(reminder) if reminder.is_enabled => {}
            _ => {
                return Err(AppError::InvalidArgument(format!(
                    "task {id} has no active reminder"
                )))
            }
        }

        let at = now + Duration::hours(1);
        let time = at
            .time()
            .replace_second(0)
            .and_then(|value| value.replace_nanosecond(0))
            .unwrap_or_else(|_| at.time());
        db::upsert_reminder(&self.conn, id, time, at.date(), true)?;
        self.require_task(id)
    }

    pub fn ensure_ahead_for_task(&self, id: i64, today: Date) -> Result<AheadOutcome, AppError> {
        Ok(self.recurrence_manager().ensure_ahead_for_task(id, today)?)
    }

    pub fn ensure_ahead_for_day(&self, day: Date, today: Date) -> Result<SweepSummary, AppError> {
        Ok(self.recurrence_manager().ensure_ahead_for_day(day, today)?)
    }

    fn recurrence_manager(&self) -> RecurrenceManager<'_> {
        RecurrenceManager::new(&self.conn, self.config.lookahead, &self.config.lease)
    }

    fn require_task(&self, id: i64) -> Result<Task, AppError> {
        db::get_task(&self.conn, id)?.ok_or(AppError::NotFound(id))
    }
}

fn ensure_parent_dir(path: &str) -> Result<(), AppError> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("recurrence error: {0}")]
    Recurrence(#[from] RecurrenceError),
    #[error(transparent)]
    Scheduler(#[from] crate::scheduler::SchedulerError),
    #[error(transparent)]
    Calendar(#[from] CalendarParseError),
    #[error(transparent)]
    ParseRecurrence(#[from] ParseRecurrenceTypeError),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("task {0} not found")]
    NotFound(i64),
}

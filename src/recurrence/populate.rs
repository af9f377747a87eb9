use std::collections::HashSet;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use time::Date;
use tracing::{debug, info};

use crate::db::{self, NewTaskRow};
use crate::domain::task::Task;

use super::policy::LookAhead;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopulateParams {
    pub task_id: i64,
    /// Cadence dates after the task's day that are already materialized and
    /// must be skipped, including ones the user deleted on purpose.
    pub drop: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum PopulateError {
    #[error("task {0} is not a recurring series")]
    NotRecurringTask(i64),
    #[error("unable to populate recurring tasks: {0}")]
    Unknown(#[from] rusqlite::Error),
}

/// Inserts the occurrences a series is missing ahead of `today`, all in one
/// immediate transaction. Returns the ids of the new rows.
pub fn populate_recurring_tasks(
    conn: &Connection,
    params: PopulateParams,
    policy: &LookAhead,
    today: Date,
) -> Result<Vec<i64>, PopulateError> {
    let task = db::get_task(conn, params.task_id)?
        .ok_or(PopulateError::NotRecurringTask(params.task_id))?;
    let series_id = task.series_id();
    let template = load_template(conn, &task)?;
    let recurrence = template
        .recurrence()
        .ok_or(PopulateError::NotRecurringTask(params.task_id))?;
    let end_date = template.recurrence_end_date;
    let target = policy.occurrences_for(recurrence);

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let existing = count_as_usize(db::count_future_occurrences(&tx, series_id, today)?);
    let needed = target.saturating_sub(existing);
    if needed == 0 {
        tx.commit()?;
        debug!(series_id, existing, target, "series already populated");
        return Ok(Vec::new());
    }

    let taken: HashSet<Date> = db::series_days(&tx, series_id)?.into_iter().collect();
    let anchor = db::series_anchor(&tx, template.id)?.unwrap_or(template.day);
    let candidates = recurrence
        .occurrences_after(anchor)
        .skip_while(|day| *day <= task.day)
        .skip(params.drop);

    let mut inserted = Vec::with_capacity(needed);
    for day in candidates {
        if inserted.len() == needed {
            break;
        }
        if end_date.is_some_and(|end| day > end) {
            debug!(series_id, end = %day, "recurrence end date reached");
            break;
        }
        if day <= today || taken.contains(&day) {
            continue;
        }

        let position = db::next_position(&tx, day)?;
        let id = db::insert_task(
            &tx,
            &NewTaskRow {
                created_at: today,
                name: &template.name,
                day,
                position,
                is_recurring: true,
                recurrence_type: Some(recurrence),
                recurrence_end_date: end_date,
                parent_id: Some(series_id),
            },
        )?;
        if let Some(reminder) = template.reminder {
            db::upsert_reminder(&tx, id, reminder.time, day, reminder.is_enabled)?;
        }
        inserted.push(id);
    }
    tx.commit()?;

    info!(
        series_id,
        recurrence = %recurrence,
        inserted = inserted.len(),
        target,
        "populated recurring series"
    );
    Ok(inserted)
}

/// The template is authoritative for recurrence metadata. If it has been
/// deleted out from under its occurrences, the occurrence's copy is used.
fn load_template(conn: &Connection, task: &Task) -> Result<Task, PopulateError> {
    if task.is_template() {
        return Ok(task.clone());
    }
    Ok(db::get_task(conn, task.series_id())?.unwrap_or_else(|| task.clone()))
}

pub(super) fn count_as_usize(count: i64) -> usize {
    usize::try_from(count).unwrap_or(0)
}

use std::collections::HashSet;
use std::time::Duration;

use rusqlite::Connection;
use serde::Serialize;
use time::Date;
use tracing::{debug, info};

use crate::config::LeaseConfig;
use crate::db;

use super::lease::{LeaseError, SeriesLease};
use super::policy::LookAhead;
use super::populate::{count_as_usize, populate_recurring_tasks, PopulateError, PopulateParams};

#[derive(Debug, thiserror::Error)]
pub enum RecurrenceError {
    #[error("task store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error(transparent)]
    Lease(#[from] LeaseError),
    #[error(transparent)]
    Populate(#[from] PopulateError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AheadOutcome {
    NotRecurring,
    AlreadySatisfied { existing: usize, target: usize },
    Populated { inserted: Vec<i64> },
}

impl AheadOutcome {
    pub fn inserted_count(&self) -> usize {
        match self {
            AheadOutcome::Populated { inserted } => inserted.len(),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub examined: usize,
    pub series_extended: usize,
    pub inserted: usize,
}

/// Keeps every recurring series stocked with its look-ahead of future
/// occurrences. `today` is passed in by callers.
pub struct RecurrenceManager<'c> {
    conn: &'c Connection,
    policy: LookAhead,
    lease_ttl: Duration,
    lease_wait: Duration,
}

impl<'c> RecurrenceManager<'c> {
    pub fn new(conn: &'c Connection, policy: LookAhead, lease: &LeaseConfig) -> Self {
        Self {
            conn,
            policy,
            lease_ttl: Duration::from_secs(lease.ttl_secs),
            lease_wait: Duration::from_millis(lease.wait_ms),
        }
    }

    pub fn ensure_ahead_for_day(
        &self,
        date: Date,
        today: Date,
    ) -> Result<SweepSummary, RecurrenceError> {
        let mut summary = SweepSummary::default();
        let mut seen = HashSet::new();
        for task in db::list_tasks(self.conn, Some(date))? {
            if task.recurrence().is_none() || !seen.insert(task.series_id()) {
                continue;
            }
            summary.examined += 1;
            let inserted = self.ensure_ahead_for_task(task.id, today)?.inserted_count();
            if inserted > 0 {
                summary.series_extended += 1;
                summary.inserted += inserted;
            }
        }
        info!(
            day = %date,
            examined = summary.examined,
            inserted = summary.inserted,
            "recurrence sweep finished"
        );
        Ok(summary)
    }

    pub fn ensure_ahead_for_task(
        &self,
        task_id: i64,
        today: Date,
    ) -> Result<AheadOutcome, RecurrenceError> {
        let Some(task) = db::get_task(self.conn, task_id)? else {
            debug!(task_id, "task vanished before recurrence check");
            return Ok(AheadOutcome::NotRecurring);
        };
        let Some(recurrence) = task.recurrence() else {
            return Ok(AheadOutcome::NotRecurring);
        };

        let series_id = task.series_id();
        let _lease = SeriesLease::acquire(self.conn, series_id, self.lease_ttl, self.lease_wait)?;

        let target = self.policy.occurrences_for(recurrence);
        let existing = count_as_usize(db::count_future_occurrences(self.conn, series_id, today)?);
        if existing >= target {
            debug!(task_id, series_id, existing, target, "look-ahead satisfied");
            return Ok(AheadOutcome::AlreadySatisfied { existing, target });
        }

        let drop = count_as_usize(db::count_future_occurrences(self.conn, series_id, task.day)?);
        let params = PopulateParams { task_id, drop };
        match populate_recurring_tasks(self.conn, params, &self.policy, today) {
            Ok(inserted) => Ok(AheadOutcome::Populated { inserted }),
            Err(PopulateError::NotRecurringTask(_)) => Ok(AheadOutcome::NotRecurring),
            Err(err) => Err(err.into()),
        }
    }
}

//! Background runner for recurrence jobs.
//!
//! One worker loop owns the job queue and runs jobs one at a time; a second
//! loop enqueues the periodic day sweep. Every job opens its own store
//! connection on the blocking pool, so a slow or failing job never stalls
//! the caller.

use std::fmt;
use std::time::Duration;

use time::{Date, OffsetDateTime, Time};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::app::{App, AppError};
use crate::config::{Config, ConfigError};
use crate::domain::calendar::{format_date, now_local, today_local};
use crate::recurrence::{AheadOutcome, SweepSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Sweep { day: Date },
    AheadForTask { task_id: i64 },
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Sweep { day } => write!(f, "sweep {}", format_date(*day)),
            Job::AheadForTask { task_id } => write!(f, "ahead-for-task {task_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobReport {
    Sweep(SweepSummary),
    Ahead(AheadOutcome),
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("scheduler task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub struct RecurrenceScheduler {
    stop: watch::Sender<bool>,
    worker: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl RecurrenceScheduler {
    /// Starts both loops; the first sweep fires at the next configured
    /// local sweep time. Must be called from inside a tokio runtime.
    pub fn start(db_path: impl Into<String>, config: Config) -> Result<Self, SchedulerError> {
        let first = delay_until(now_local(), config.scheduler.sweep_time()?);
        Ok(Self::start_with_delay(db_path, config, first))
    }

    pub fn start_with_delay(
        db_path: impl Into<String>,
        config: Config,
        first_sweep_in: Duration,
    ) -> Self {
        let db_path = db_path.into();
        let repeat = Duration::from_secs(config.scheduler.repeat_hours.max(1) * 3_600);
        let (jobs, queue) = mpsc::unbounded_channel();
        let (stop, stopped) = watch::channel(false);

        info!(
            db = %db_path,
            first_sweep_secs = first_sweep_in.as_secs(),
            repeat_hours = config.scheduler.repeat_hours,
            "recurrence scheduler started"
        );
        let worker = tokio::spawn(worker_loop(db_path, config, queue));
        let sweeper = tokio::spawn(sweep_loop(jobs, stopped, first_sweep_in, repeat));

        Self {
            stop,
            worker,
            sweeper,
        }
    }

    /// Stops the periodic sweep, then waits for every queued job to finish.
    pub async fn shutdown(self) -> Result<(), SchedulerError> {
        let Self {
            stop,
            worker,
            sweeper,
        } = self;
        let _ = stop.send(true);
        sweeper.await?;
        worker.await?;
        info!("recurrence scheduler stopped");
        Ok(())
    }
}

async fn worker_loop(db_path: String, config: Config, mut queue: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = queue.recv().await {
        run_job(&db_path, job, &config).await;
    }
    debug!("recurrence job queue closed");
}

async fn sweep_loop(
    jobs: mpsc::UnboundedSender<Job>,
    mut stopped: watch::Receiver<bool>,
    first_sweep_in: Duration,
    repeat: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + first_sweep_in, repeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let job = Job::Sweep { day: today_local() };
                debug!(%job, "periodic sweep due");
                if jobs.send(job).is_err() {
                    break;
                }
            }
            _ = stopped.changed() => break,
        }
    }
}

/// Runs one job with retries. Returns `None` once every attempt failed.
pub async fn run_job(db_path: &str, job: Job, config: &Config) -> Option<JobReport> {
    let attempts = config.scheduler.max_attempts.max(1);
    for attempt in 1..=attempts {
        let path = db_path.to_string();
        let job_config = config.clone();
        match tokio::task::spawn_blocking(move || execute(&path, job, job_config)).await {
            Ok(Ok(report)) => {
                log_report(job, &report);
                return Some(report);
            }
            Ok(Err(err)) => warn!(%job, attempt, attempts, error = %err, "recurrence job failed"),
            Err(err) => warn!(%job, attempt, attempts, error = %err, "recurrence job panicked"),
        }
        if attempt < attempts {
            tokio::time::sleep(backoff(config, attempt)).await;
        }
    }
    error!(%job, attempts, "recurrence job abandoned");
    None
}

/// Same policy as [`run_job`] for callers without a runtime.
pub fn run_job_blocking(db_path: &str, job: Job, config: &Config) -> Option<JobReport> {
    let attempts = config.scheduler.max_attempts.max(1);
    for attempt in 1..=attempts {
        match execute(db_path, job, config.clone()) {
            Ok(report) => {
                log_report(job, &report);
                return Some(report);
            }
            Err(err) => warn!(%job, attempt, attempts, error = %err, "recurrence job failed"),
        }
        if attempt < attempts {
            std::thread::sleep(backoff(config, attempt));
        }
    }
    error!(%job, attempts, "recurrence job abandoned");
    None
}

fn execute(db_path: &str, job: Job, config: Config) -> Result<JobReport, AppError> {
    let app = App::open(db_path, config)?;
    let today = today_local();
    match job {
        Job::Sweep { day } => Ok(JobReport::Sweep(app.ensure_ahead_for_day(day, today)?)),
        Job::AheadForTask { task_id } => {
            Ok(JobReport::Ahead(app.ensure_ahead_for_task(task_id, today)?))
        }
    }
}

fn backoff(config: &Config, attempt: u32) -> Duration {
    Duration::from_millis(
        config
            .scheduler
            .retry_backoff_ms
            .saturating_mul(u64::from(attempt)),
    )
}

fn log_report(job: Job, report: &JobReport) {
    match report {
        JobReport::Sweep(summary) => info!(
            %job,
            examined = summary.examined,
            extended = summary.series_extended,
            inserted = summary.inserted,
            "recurrence job finished"
        ),
        JobReport::Ahead(outcome) => info!(
            %job,
            inserted = outcome.inserted_count(),
            "recurrence job finished"
        ),
    }
}

/// Time from `now` until the next `target` wall-clock time; a target that
/// is now or already past rolls over to tomorrow.
pub fn delay_until(now: OffsetDateTime, target: Time) -> Duration {
    let mut next = now.replace_time(target);
    if next <= now {
        next += time::Duration::days(1);
    }
    Duration::try_from(next - now).unwrap_or(Duration::ZERO)
}

mod app;
mod cli;
mod config;
mod db;
mod domain;
mod recurrence;
mod scheduler;
mod ui;

use std::path::{Path, PathBuf};

use time::Date;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::{AppError, TaskView};
use cli::Commands;
use config::Config;
use domain::calendar::{format_date, format_time, now_local, parse_date, parse_time, today_local};
use domain::recurrence::RecurrenceType;
use domain::task::{NewTask, ReminderInput, RemovalStrategy, TaskPatch};
use recurrence::AheadOutcome;
use scheduler::{Job, JobReport, RecurrenceScheduler};

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn init_tracing(default_filter: &str) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|raw| {
            let raw = raw.trim();
            if raw.is_empty() || raw.len() > 4096 {
                return None;
            }
            EnvFilter::try_new(raw).ok()
        })
        .unwrap_or_else(|| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("error: unable to render json: {err}"),
    }
}

fn config_path(cli: &cli::Cli) -> PathBuf {
    match cli.config.as_deref() {
        Some(path) => PathBuf::from(path),
        None => Path::new(&cli.db)
            .parent()
            .map(|dir| dir.join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml")),
    }
}

fn day_or_today(raw: Option<&str>) -> Result<Date, AppError> {
    match raw {
        Some(raw) => Ok(parse_date(raw)?),
        None => Ok(today_local()),
    }
}

fn run() -> Result<(), AppError> {
    use clap::Parser;

    let cli = cli::Cli::parse();
    let is_worker = matches!(cli.command, Commands::Worker(_));
    init_tracing(if is_worker { "info" } else { "off" });

    let config = Config::load(&config_path(&cli))?;
    let app = app::App::open(&cli.db, config.clone())?;
    let today = today_local();

    match cli.command {
        Commands::Add(args) => {
            let reminder = args
                .remind
                .as_deref()
                .map(parse_time)
                .transpose()?
                .map(|time| ReminderInput {
                    time,
                    is_enabled: true,
                });
            let recurrence_type = args
                .repeat
                .as_deref()
                .map(str::parse::<RecurrenceType>)
                .transpose()?;
            let recurrence_end_date = args.until.as_deref().map(parse_date).transpose()?;
            let task = app.create_task(
                NewTask {
                    name: args.name,
                    day: day_or_today(args.day.as_deref())?,
                    reminder,
                    recurrence_type,
                    recurrence_end_date,
                },
                today,
            )?;
            println!(
                "created {} {} on {}",
                ui::task_ref(&task),
                task.name,
                format_date(task.day)
            );
        }
        Commands::Ls(args) => {
            let (title, tasks) = if args.all {
                ("All tasks".to_string(), app.list_tasks(None)?)
            } else {
                let day = day_or_today(args.day.as_deref())?;
                (format_date(day), app.list_tasks(Some(day))?)
            };
            if args.json {
                let views = tasks.iter().map(TaskView::from).collect::<Vec<_>>();
                print_json(&views);
            } else {
                ui::print_agenda(&title, &tasks);
            }
        }
        Commands::Show(args) => {
            let task = app.get_task(args.id)?.ok_or(AppError::NotFound(args.id))?;
            if args.json {
                print_json(&TaskView::from(&task));
            } else {
                ui::print_task(&task);
            }
        }
        Commands::Edit(args) => {
            let reminder_enabled = if args.remind_on {
                Some(true)
            } else if args.remind_off {
                Some(false)
            } else {
                None
            };
            let patch = TaskPatch {
                name: args.name,
                day: args.day.as_deref().map(parse_date).transpose()?,
                reminder_time: args.remind.as_deref().map(parse_time).transpose()?,
                reminder_enabled,
            };
            let task = app.update_task(args.id, patch)?;
            println!("updated {} {}", ui::task_ref(&task), task.name);
        }
        Commands::Done(args) => {
            let task = app.mark_task(args.id, true)?;
            println!("done {} {}", ui::task_ref(&task), task.name);
            if task.recurrence().is_some() {
                drop(app);
                let job = Job::AheadForTask { task_id: task.id };
                if let Some(JobReport::Ahead(outcome)) =
                    scheduler::run_job_blocking(&cli.db, job, &config)
                {
                    let inserted = outcome.inserted_count();
                    if inserted > 0 {
                        println!("scheduled {inserted} upcoming occurrence(s)");
                    }
                }
            }
        }
        Commands::Undone(args) => {
            let task = app.mark_task(args.id, false)?;
            println!("reopened {} {}", ui::task_ref(&task), task.name);
        }
        Commands::Rm(args) => {
            let strategy = if args.future {
                RemovalStrategy::ThisAndFuture
            } else {
                RemovalStrategy::Single
            };
            let removed = app.remove_task(args.id, strategy)?;
            println!("removed {removed} task(s) ({strategy})");
        }
        Commands::Mv(args) => {
            let tasks = app.move_task(args.id, args.position)?;
            let title = tasks
                .first()
                .map(|task| format_date(task.day))
                .unwrap_or_default();
            ui::print_agenda(&title, &tasks);
        }
        Commands::Snooze(args) => {
            let task = app.snooze_reminder(args.id, now_local())?;
            if let Some(reminder) = task.reminder {
                println!(
                    "snoozed {} until {} {}",
                    ui::task_ref(&task),
                    format_date(reminder.date),
                    format_time(reminder.time)
                );
            }
        }
        Commands::Count(args) => {
            let day = if args.all {
                None
            } else {
                Some(day_or_today(args.day.as_deref())?)
            };
            println!("{}", app.count_tasks(day)?);
        }
        Commands::Sweep(args) => {
            let day = day_or_today(args.day.as_deref())?;
            let summary = app.ensure_ahead_for_day(day, today)?;
            if args.json {
                print_json(&summary);
            } else {
                println!(
                    "swept {}: examined={} extended={} inserted={}",
                    format_date(day),
                    summary.examined,
                    summary.series_extended,
                    summary.inserted
                );
            }
        }
        Commands::Ahead(args) => {
            let outcome = app.ensure_ahead_for_task(args.id, today)?;
            if args.json {
                print_json(&outcome);
            } else {
                match outcome {
                    AheadOutcome::NotRecurring => {
                        println!("task {} is not recurring", args.id)
                    }
                    AheadOutcome::AlreadySatisfied { existing, target } => {
                        println!("series already has {existing}/{target} upcoming occurrence(s)")
                    }
                    AheadOutcome::Populated { inserted } => {
                        println!("scheduled {} upcoming occurrence(s)", inserted.len())
                    }
                }
            }
        }
        Commands::Worker(args) => {
            drop(app);
            run_worker(&cli.db, config, args.once)?;
        }
    }

    Ok(())
}

fn run_worker(db_path: &str, config: Config, once: bool) -> Result<(), AppError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        if once {
            let job = Job::Sweep { day: today_local() };
            match scheduler::run_job(db_path, job, &config).await {
                Some(JobReport::Sweep(summary)) => println!(
                    "swept {}: examined={} extended={} inserted={}",
                    format_date(today_local()),
                    summary.examined,
                    summary.series_extended,
                    summary.inserted
                ),
                _ => println!("sweep did not complete; run with RUST_LOG=info for details"),
            }
            return Ok(());
        }

        let scheduler = RecurrenceScheduler::start(db_path, config)?;
        println!("dayplan worker running on {db_path}; press Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
        scheduler.shutdown().await?;
        Ok::<(), AppError>(())
    })
}

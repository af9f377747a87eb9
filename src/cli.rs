use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Args, Parser, Subcommand};

fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::BrightYellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightGreen.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::BrightMagenta.on_default())
}

#[derive(Debug, Parser)]
#[command(name = "dayplan")]
#[command(bin_name = "dayplan")]
#[command(version)]
#[command(about = "A local day planner with recurring tasks")]
#[command(styles = cli_styles())]
pub struct Cli {
    #[arg(
        short = 'd',
        long,
        env = "DAYPLAN_DB_PATH",
        default_value = ".dayplan/tasks.sqlite",
        help = "Path to the SQLite task database."
    )]
    pub db: String,

    #[arg(
        short = 'c',
        long,
        env = "DAYPLAN_CONFIG",
        help = "Path to config.toml. Defaults to config.toml next to the database."
    )]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Create a task, optionally recurring.")]
    Add(AddArgs),
    #[command(about = "List the tasks of a day.")]
    Ls(ListArgs),
    #[command(about = "Show one task by id.")]
    Show(ShowArgs),
    #[command(about = "Edit a task's name, day or reminder.")]
    Edit(EditArgs),
    #[command(about = "Mark a task done and top up its recurring series.")]
    Done(IdArgs),
    #[command(about = "Mark a task not done.")]
    Undone(IdArgs),
    #[command(about = "Delete a task, or a recurring task and its future occurrences.")]
    Rm(RemoveArgs),
    #[command(about = "Move a task to a position within its day.")]
    Mv(MoveArgs),
    #[command(about = "Push a task's reminder one hour from now.")]
    Snooze(IdArgs),
    #[command(about = "Count tasks on a day, or all tasks.")]
    Count(CountArgs),
    #[command(about = "Top up every recurring series that has a task on a day.")]
    Sweep(SweepArgs),
    #[command(about = "Top up the recurring series a task belongs to.")]
    Ahead(AheadArgs),
    #[command(about = "Run the recurrence scheduler in the foreground.")]
    Worker(WorkerArgs),
}

#[derive(Debug, Clone, Args)]
pub struct AddArgs {
    pub name: String,

    #[arg(long, help = "Day as YYYY-MM-DD. Defaults to today.")]
    pub day: Option<String>,

    #[arg(long, value_name = "HH:MM", help = "Reminder time on the task's day.")]
    pub remind: Option<String>,

    #[arg(
        long,
        value_name = "TYPE",
        help = "Recurrence: daily, weekdays, weekly, monthly or yearly."
    )]
    pub repeat: Option<String>,

    #[arg(long, value_name = "YYYY-MM-DD", requires = "repeat")]
    pub until: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct ListArgs {
    #[arg(long, help = "Day as YYYY-MM-DD. Defaults to today.")]
    pub day: Option<String>,

    #[arg(long, conflicts_with = "day", help = "List every stored task.")]
    pub all: bool,

    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ShowArgs {
    pub id: i64,

    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Args)]
pub struct IdArgs {
    pub id: i64,
}

#[derive(Debug, Clone, Args)]
pub struct EditArgs {
    pub id: i64,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long, help = "New day as YYYY-MM-DD.")]
    pub day: Option<String>,

    #[arg(long, value_name = "HH:MM")]
    pub remind: Option<String>,

    #[arg(long, conflicts_with = "remind_off")]
    pub remind_on: bool,

    #[arg(long)]
    pub remind_off: bool,
}

#[derive(Debug, Clone, Args)]
pub struct RemoveArgs {
    pub id: i64,

    #[arg(long, help = "Also delete every later occurrence of the series.")]
    pub future: bool,
}

#[derive(Debug, Clone, Args)]
pub struct MoveArgs {
    pub id: i64,

    #[arg(help = "1-based position within the task's day.")]
    pub position: i64,
}

#[derive(Debug, Clone, Args)]
pub struct CountArgs {
    #[arg(long, help = "Day as YYYY-MM-DD. Defaults to today.")]
    pub day: Option<String>,

    #[arg(long, conflicts_with = "day")]
    pub all: bool,
}

#[derive(Debug, Clone, Args)]
pub struct SweepArgs {
    #[arg(long, help = "Day to sweep as YYYY-MM-DD. Defaults to today.")]
    pub day: Option<String>,

    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Args)]
pub struct AheadArgs {
    pub id: i64,

    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Args)]
pub struct WorkerArgs {
    #[arg(long, help = "Run a single sweep of today and exit.")]
    pub once: bool,
}

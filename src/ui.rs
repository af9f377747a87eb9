use std::io::{self, IsTerminal};

use crate::domain::calendar::{format_date, format_time};
use crate::domain::task::Task;

pub fn print_agenda(title: &str, tasks: &[Task]) {
    let palette = Palette::auto();
    println!("{}", palette.heading(title));

    if tasks.is_empty() {
        println!("{}", palette.dim("nothing planned"));
        return;
    }

    for task in tasks {
        println!("{}", format_task_row(task, &palette));
    }
    let done = tasks.iter().filter(|task| task.is_done).count();
    println!(
        "{}",
        palette.dim(&format!("{done}/{} task(s) done", tasks.len()))
    );
}

pub fn print_task(task: &Task) {
    let palette = Palette::auto();
    println!("{}", format_task_row(task, &palette));
    println!("  day:      {}", format_date(task.day));
    println!("  position: {}", task.position);
    println!("  created:  {}", format_date(task.created_at));
    if let Some(recurrence) = task.recurrence_type {
        let until = task
            .recurrence_end_date
            .map(|end| format!(" until {}", format_date(end)))
            .unwrap_or_default();
        println!("  repeats:  {recurrence}{until}");
    }
    if let Some(parent) = task.parent_id {
        println!("  series:   #{parent}");
    }
    if let Some(reminder) = task.reminder {
        let state = if reminder.is_enabled { "on" } else { "off" };
        println!(
            "  reminder: {} {} ({state})",
            format_date(reminder.date),
            format_time(reminder.time)
        );
    }
}

pub fn task_ref(task: &Task) -> String {
    format!("#{}", task.id)
}

fn format_task_row(task: &Task, palette: &Palette) -> String {
    let mut line = format!(
        "{} {} {}",
        palette.marker(task.is_done),
        palette.id(&task_ref(task)),
        task.name
    );

    if let Some(recurrence) = task.recurrence_type {
        line.push(' ');
        line.push_str(&palette.recurrence(recurrence.as_str()));
    }

    if let Some(reminder) = task.reminder.filter(|reminder| reminder.is_enabled) {
        line.push(' ');
        line.push_str(&palette.reminder(&format!("@{}", format_time(reminder.time))));
    }

    line
}

struct Palette {
    enabled: bool,
}

impl Palette {
    fn auto() -> Self {
        let enabled = std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal();
        Self { enabled }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn heading(&self, text: &str) -> String {
        self.paint("1;36", text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }

    fn id(&self, text: &str) -> String {
        self.paint("1;94", text)
    }

    fn marker(&self, is_done: bool) -> String {
        if is_done {
            self.paint("32", "[x]")
        } else {
            self.paint("37", "[ ]")
        }
    }

    fn recurrence(&self, kind: &str) -> String {
        self.paint("35", &format!("({kind})"))
    }

    fn reminder(&self, text: &str) -> String {
        self.paint("33", text)
    }
}

#[cfg(test)]
mod tests {
    use super::{format_task_row, Palette};
    use crate::domain::recurrence::RecurrenceType;
    use crate::domain::task::{Reminder, Task};
    use time::macros::{date, time};

    fn task() -> Task {
        Task {
            id: 4,
            created_at: date!(2026 - 10 - 19),
            name: "Gym".to_string(),
            day: date!(2026 - 10 - 19),
            is_done: false,
            position: 1,
            is_recurring: true,
            recurrence_type: Some(RecurrenceType::Weekly),
            recurrence_end_date: None,
            parent_id: None,
            reminder: Some(Reminder {
                id: 1,
                time: time!(18:30),
                date: date!(2026 - 10 - 19),
                is_enabled: true,
            }),
        }
    }

    #[test]
    fn row_shows_marker_recurrence_and_reminder() {
        let plain = Palette { enabled: false };
        assert_eq!(format_task_row(&task(), &plain), "[ ] #4 Gym (weekly) @18:30");
    }

    #[test]
    fn done_task_without_active_reminder() {
        let plain = Palette { enabled: false };
        let mut done = task();
        done.is_done = true;
        done.recurrence_type = None;
        if let Some(reminder) = done.reminder.as_mut() {
            reminder.is_enabled = false;
        }
        assert_eq!(format_task_row(&done, &plain), "[x] #4 Gym");
    }

    #[test]
    fn enabled_palette_wraps_in_ansi() {
        let colored = Palette { enabled: true };
        assert_eq!(colored.id("#4"), "\x1b[1;94m#4\x1b[0m");
    }
}

use std::fmt;
use std::str::FromStr;

use time::{Date, Weekday};

use super::calendar::{add_days, add_months};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecurrenceType {
    Daily,
    Weekdays,
    Weekly,
    Monthly,
    Yearly,
}

impl RecurrenceType {
    pub const ALL: [RecurrenceType; 5] = [
        RecurrenceType::Daily,
        RecurrenceType::Weekdays,
        RecurrenceType::Weekly,
        RecurrenceType::Monthly,
        RecurrenceType::Yearly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecurrenceType::Daily => "daily",
            RecurrenceType::Weekdays => "weekdays",
            RecurrenceType::Weekly => "weekly",
            RecurrenceType::Monthly => "monthly",
            RecurrenceType::Yearly => "yearly",
        }
    }

    /// Successive occurrence days strictly after `anchor`.
    pub fn occurrences_after(self, anchor: Date) -> Occurrences {
        Occurrences {
            recurrence: self,
            anchor,
            step: 0,
            last: anchor,
            exhausted: false,
        }
    }
}

impl fmt::Display for RecurrenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecurrenceType {
    type Err = ParseRecurrenceTypeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        let recurrence = match normalized.as_str() {
            "daily" | "day" => RecurrenceType::Daily,
            "weekdays" | "weekday" | "workdays" => RecurrenceType::Weekdays,
            "weekly" | "week" => RecurrenceType::Weekly,
            "monthly" | "month" => RecurrenceType::Monthly,
            "yearly" | "year" | "annually" => RecurrenceType::Yearly,
            _ => {
                return Err(ParseRecurrenceTypeError {
                    value: value.to_string(),
                })
            }
        };
        Ok(recurrence)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "invalid recurrence '{value}': expected one of daily, weekdays, weekly, monthly, yearly"
)]
pub struct ParseRecurrenceTypeError {
    value: String,
}

/// Iterator over the cadence of one series. Monthly and yearly steps are
/// measured from the anchor; the others walk from the previous day.
#[derive(Debug, Clone)]
pub struct Occurrences {
    recurrence: RecurrenceType,
    anchor: Date,
    step: i64,
    last: Date,
    exhausted: bool,
}

impl Iterator for Occurrences {
    type Item = Date;

    fn next(&mut self) -> Option<Date> {
        if self.exhausted {
            return None;
        }
        self.step += 1;
        let next = match self.recurrence {
            RecurrenceType::Daily => add_days(self.anchor, self.step),
            RecurrenceType::Weekly => add_days(self.anchor, self.step * 7),
            RecurrenceType::Monthly => add_months(self.anchor, self.step),
            RecurrenceType::Yearly => add_months(self.anchor, self.step * 12),
            RecurrenceType::Weekdays => next_weekday(self.last),
        };
        match next {
            Some(day) => {
                self.last = day;
                Some(day)
            }
            None => {
                self.exhausted = true;
                None
            }
        }
    }
}

fn next_weekday(from: Date) -> Option<Date> {
    let mut day = from.next_day()?;
    while matches!(day.weekday(), Weekday::Saturday | Weekday::Sunday) {
        day = day.next_day()?;
    }
    Some(day)
}

#[cfg(test)]
mod tests {
    use super::RecurrenceType;
    use std::str::FromStr;
    use time::macros::date;

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!(
            RecurrenceType::from_str("Weekly").unwrap(),
            RecurrenceType::Weekly
        );
        assert_eq!(
            RecurrenceType::from_str(" workdays ").unwrap(),
            RecurrenceType::Weekdays
        );
        assert_eq!(
            RecurrenceType::from_str("annually").unwrap(),
            RecurrenceType::Yearly
        );
        let err = RecurrenceType::from_str("hourly").expect_err("hourly is unsupported");
        assert!(err.to_string().contains("hourly"));
    }

    #[test]
    fn as_str_round_trips_every_variant() {
        for recurrence in RecurrenceType::ALL {
            assert_eq!(
                RecurrenceType::from_str(recurrence.as_str()).unwrap(),
                recurrence
            );
        }
    }

    #[test]
    fn daily_and_weekly_step_from_anchor() {
        let anchor = date!(2026 - 10 - 19);
        let daily: Vec<_> = RecurrenceType::Daily.occurrences_after(anchor).take(3).collect();
        assert_eq!(
            daily,
            vec![date!(2026 - 10 - 20), date!(2026 - 10 - 21), date!(2026 - 10 - 22)]
        );
        let weekly: Vec<_> = RecurrenceType::Weekly
            .occurrences_after(anchor)
            .take(2)
            .collect();
        assert_eq!(weekly, vec![date!(2026 - 10 - 26), date!(2026 - 11 - 02)]);
    }

    #[test]
    fn weekdays_skip_weekends() {
        // 2026-10-23 is a Friday.
        let days: Vec<_> = RecurrenceType::Weekdays
            .occurrences_after(date!(2026 - 10 - 23))
            .take(3)
            .collect();
        assert_eq!(
            days,
            vec![date!(2026 - 10 - 26), date!(2026 - 10 - 27), date!(2026 - 10 - 28)]
        );
    }

    #[test]
    fn monthly_keeps_day_of_month_after_short_months() {
        let days: Vec<_> = RecurrenceType::Monthly
            .occurrences_after(date!(2026 - 01 - 31))
            .take(3)
            .collect();
        assert_eq!(
            days,
            vec![date!(2026 - 02 - 28), date!(2026 - 03 - 31), date!(2026 - 04 - 30)]
        );
    }

    #[test]
    fn iteration_ends_at_calendar_limit() {
        let days: Vec<_> = RecurrenceType::Yearly
            .occurrences_after(date!(9998 - 06 - 01))
            .collect();
        assert_eq!(days, vec![date!(9999 - 06 - 01)]);
    }
}

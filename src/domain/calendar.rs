use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, Duration, Month, OffsetDateTime, Time};

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const TIME_FORMAT: &[FormatItem<'static>] = format_description!("[hour]:[minute]");

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalendarParseError {
    #[error("invalid date '{0}': expected YYYY-MM-DD")]
    Date(String),
    #[error("invalid time '{0}': expected HH:MM")]
    Time(String),
}

pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT)
        .unwrap_or_else(|_| date.to_string())
}

pub fn parse_date(raw: &str) -> Result<Date, CalendarParseError> {
    let trimmed = raw.trim();
    Date::parse(trimmed, DATE_FORMAT).map_err(|_| CalendarParseError::Date(trimmed.to_string()))
}

pub fn format_time(time: Time) -> String {
    time.format(TIME_FORMAT)
        .unwrap_or_else(|_| format!("{:02}:{:02}", time.hour(), time.minute()))
}

pub fn parse_time(raw: &str) -> Result<Time, CalendarParseError> {
    let trimmed = raw.trim();
    Time::parse(trimmed, TIME_FORMAT).map_err(|_| CalendarParseError::Time(trimmed.to_string()))
}

/// Local wall clock, falling back to UTC when the local offset cannot be
/// determined (multi-threaded processes on some platforms).
pub fn now_local() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

pub fn today_local() -> Date {
    now_local().date()
}

/// Adds calendar months, clamping the day to the end of shorter months.
/// Always computed from `anchor` so repeated stepping never drifts.
pub fn add_months(anchor: Date, months: i64) -> Option<Date> {
    let base = i64::from(anchor.year()) * 12 + i64::from(u8::from(anchor.month())) - 1;
    let total = base.checked_add(months)?;
    let year = i32::try_from(total.div_euclid(12)).ok()?;
    let month = Month::try_from(u8::try_from(total.rem_euclid(12) + 1).ok()?).ok()?;
    let day = anchor.day().min(time::util::days_in_year_month(year, month));
    Date::from_calendar_date(year, month, day).ok()
}

pub fn add_days(anchor: Date, days: i64) -> Option<Date> {
    anchor.checked_add(Duration::days(days))
}

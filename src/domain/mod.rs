pub mod calendar;
pub mod recurrence;
pub mod task;

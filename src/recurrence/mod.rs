mod lease;
mod manager;
mod policy;
mod populate;

pub use manager::{AheadOutcome, RecurrenceError, RecurrenceManager, SweepSummary};
pub use policy::LookAhead;

#[cfg(test)]
mod tests;

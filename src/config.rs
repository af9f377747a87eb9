use std::path::Path;

use serde::{Deserialize, Serialize};
use time::Time;

use crate::domain::calendar::parse_time;
use crate::recurrence::LookAhead;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub lookahead: LookAhead,
    pub scheduler: SchedulerConfig,
    pub lease: LeaseConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Local wall-clock time of the daily sweep, `HH:MM`.
    pub sweep_time: String,
    pub repeat_hours: u64,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_time: "00:05".to_string(),
            repeat_hours: 24,
            max_attempts: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl SchedulerConfig {
    pub fn sweep_time(&self) -> Result<Time, ConfigError> {
        parse_time(&self.sweep_time).map_err(|err| ConfigError::Invalid(err.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    pub ttl_secs: u64,
    pub wait_ms: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30,
            wait_ms: 2_000,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl Config {
    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(recurrence) = self.lookahead.first_empty() {
            return Err(ConfigError::Invalid(format!(
                "lookahead.{recurrence} must be at least 1"
            )));
        }
        self.scheduler.sweep_time()?;
        if self.scheduler.repeat_hours == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.repeat_hours must be at least 1".to_string(),
            ));
        }
        if self.scheduler.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.lease.ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "lease.ttl_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, ConfigError};
    use crate::domain::recurrence::RecurrenceType;
    use time::macros::time;
    use uuid::Uuid;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!("dayplan-config-{}.toml", Uuid::now_v7()));
        let config = Config::load(&path).expect("missing config should not fail");
        assert_eq!(config, Config::default());
        assert_eq!(
            config.scheduler.sweep_time().expect("default time parses"),
            time!(0:05)
        );
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = Config::from_toml(
            r#"
[lookahead]
weekly = 6

[scheduler]
sweep_time = "03:30"
"#,
        )
        .expect("config should parse");
        assert_eq!(config.lookahead.occurrences_for(RecurrenceType::Weekly), 6);
        assert_eq!(config.lookahead.occurrences_for(RecurrenceType::Daily), 7);
        assert_eq!(config.scheduler.repeat_hours, 24);
        assert_eq!(config.lease.ttl_secs, 30);
    }

    #[test]
    fn rejects_zero_lookahead_and_bad_times() {
        let zero = Config::from_toml("[lookahead]\nmonthly = 0\n").expect_err("zero rejected");
        assert!(matches!(zero, ConfigError::Invalid(ref message) if message.contains("monthly")));

        let bad_time =
            Config::from_toml("[scheduler]\nsweep_time = \"25:00\"\n").expect_err("bad time");
        assert!(matches!(bad_time, ConfigError::Invalid(_)));

        let malformed = Config::from_toml("[lookahead\n").expect_err("malformed toml");
        assert!(matches!(malformed, ConfigError::Toml(_)));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let path = std::env::temp_dir().join(format!("dayplan-config-{}.toml", Uuid::now_v7()));
        std::fs::write(&path, "[scheduler]\nmax_attempts = 5\n").expect("config writable");
        let config = Config::load(&path).expect("config should load");
        assert_eq!(config.scheduler.max_attempts, 5);
        let _ = std::fs::remove_file(path);
    }
}

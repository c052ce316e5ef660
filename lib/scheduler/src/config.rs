//! Dispatch configuration.
//!
//! Loaded via the `config` crate, either from `CADENCE_*` environment
//! variables or from a file:
//!
//! ```text
//! CADENCE_EPSILON_MS=100
//! CADENCE_MAX_WAIT_MS=1000
//! CADENCE_HOLIDAYS=2024-12-25,2025-01-01
//! ```

use crate::error::ConfigError;
use crate::holiday::HolidayCalendar;
use crate::trigger::CLOCK_EPSILON;
use chrono::NaiveDate;
use rootcause::prelude::Report;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "CADENCE";

/// Tunables for triggers and the event queue.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DispatchConfig {
    /// Clock tolerance for fire-time comparisons, in milliseconds.
    #[serde(default = "default_epsilon_ms")]
    pub epsilon_ms: u64,

    /// Longest single sleep of a blocked consumer, in milliseconds.
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,

    /// Dates on which holiday-skipping triggers never fire.
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
}

fn default_epsilon_ms() -> u64 {
    CLOCK_EPSILON.num_milliseconds().unsigned_abs()
}

fn default_max_wait_ms() -> u64 {
    1000
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            epsilon_ms: default_epsilon_ms(),
            max_wait_ms: default_max_wait_ms(),
            holidays: Vec::new(),
        }
    }
}

impl DispatchConfig {
    /// Loads configuration from `CADENCE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or a value is out of
    /// range.
    pub fn from_env() -> Result<Self, Report<ConfigError>> {
        let source = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("holidays");
        Self::load(config::Config::builder().add_source(source))
    }

    /// Loads configuration from a file; the format follows the extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or a value is
    /// out of range.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Report<ConfigError>> {
        let source = config::File::from(path.as_ref());
        Self::load(config::Config::builder().add_source(source))
    }

    fn load(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, Report<ConfigError>> {
        let parsed: Self = builder
            .build()
            .and_then(|built| built.try_deserialize())
            .map_err(|e| ConfigError::Load {
                details: e.to_string(),
            })?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Checks that values are in range.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_wait_ms` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_wait_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_wait_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Clock tolerance to hand to triggers.
    #[must_use]
    pub fn epsilon(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.epsilon_ms).unwrap_or(i64::MAX))
    }

    /// Upper bound on a single consumer wait.
    #[must_use]
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    /// A fresh calendar holding the configured holidays.
    #[must_use]
    pub fn calendar(&self) -> HolidayCalendar {
        self.holidays.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("create temp file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn defaults_match_constants() {
        let config = DispatchConfig::default();
        assert_eq!(config.epsilon_ms, 100);
        assert_eq!(config.epsilon(), CLOCK_EPSILON);
        assert_eq!(config.max_wait(), Duration::from_secs(1));
        assert!(config.calendar().is_empty());
    }

    #[test]
    fn loads_from_toml_file() {
        let file = write_config(
            r#"
            epsilon_ms = 250
            max_wait_ms = 50
            holidays = ["2024-12-25", "2025-01-01"]
            "#,
        );

        let config = DispatchConfig::from_file(file.path()).expect("load config");
        assert_eq!(config.epsilon(), chrono::Duration::milliseconds(250));
        assert_eq!(config.max_wait(), Duration::from_millis(50));

        let calendar = config.calendar();
        assert_eq!(calendar.len(), 2);
        assert!(calendar.is_holiday(NaiveDate::from_ymd_opt(2024, 12, 25).expect("date")));
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let file = write_config("max_wait_ms = 200\n");
        let config = DispatchConfig::from_file(file.path()).expect("load config");
        assert_eq!(config.epsilon_ms, 100);
        assert!(config.holidays.is_empty());
    }

    #[test]
    fn zero_max_wait_is_rejected() {
        let file = write_config("max_wait_ms = 0\n");
        assert!(DispatchConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn malformed_holiday_is_rejected() {
        let file = write_config("holidays = [\"Christmas\"]\n");
        assert!(DispatchConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let result = DispatchConfig::from_file(dir.path().join("absent.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn queue_and_triggers_pick_up_config() {
        let config = DispatchConfig {
            epsilon_ms: 5,
            max_wait_ms: 10,
            holidays: Vec::new(),
        };
        let queue = crate::EventQueue::from_config(&config);
        assert!(queue.is_empty());

        let trigger = crate::Trigger::every(chrono::Duration::seconds(1))
            .with_epsilon(config.epsilon())
            .build()
            .expect("valid trigger");
        assert_eq!(trigger.epsilon(), chrono::Duration::milliseconds(5));
    }
}

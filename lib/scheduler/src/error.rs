//! Error types for the scheduler crate.
//!
//! - `TriggerError`: invalid trigger construction or misuse of `advance`
//! - `QueueError`: nothing deliverable, or a bad wait request
//! - `ConfigError`: configuration could not be loaded; returned wrapped in
//!   a rootcause `Report` so callers can layer their own context

use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Errors from trigger construction and advancement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    /// The firing window closes before it opens.
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Recurrence interval is negative.
    NegativeInterval { interval: Duration },
    /// Day repeat count must be at least one.
    InvalidRepeat { every_n_days: u32 },
    /// Time of day could not be parsed.
    InvalidTimeOfDay { value: String, reason: String },
    /// `advance` was called on a trigger that already reported exhaustion.
    AlreadyExhausted,
}

impl fmt::Display for TriggerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidWindow { start, end } => {
                write!(f, "invalid trigger window: start {start} is after end {end}")
            }
            Self::NegativeInterval { interval } => {
                write!(f, "trigger interval must not be negative: {interval}")
            }
            Self::InvalidRepeat { every_n_days } => {
                write!(f, "daily trigger must repeat at least every day, got {every_n_days}")
            }
            Self::InvalidTimeOfDay { value, reason } => {
                write!(f, "invalid time of day '{value}': {reason}")
            }
            Self::AlreadyExhausted => write!(f, "trigger is already exhausted"),
        }
    }
}

impl std::error::Error for TriggerError {}

/// Errors from queue retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// No entry became ready before the caller gave up.
    Empty,
    /// A zero timeout was requested.
    InvalidTimeout,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "no event ready for delivery"),
            Self::InvalidTimeout => write!(f, "timeout must be greater than zero"),
        }
    }
}

impl std::error::Error for QueueError {}

/// Errors from loading dispatch configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration source could not be read or deserialized.
    Load { details: String },
    /// A value was read but is out of range.
    InvalidValue { field: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load { details } => write!(f, "failed to load dispatch config: {details}"),
            Self::InvalidValue { field, reason } => {
                write!(f, "invalid dispatch config value for '{field}': {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

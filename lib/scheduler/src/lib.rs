//! Scheduled event dispatch.
//!
//! This crate provides:
//!
//! - **Triggers**: one-shot, fixed-interval and daily recurrences bounded by
//!   a firing window, with optional holiday skipping
//! - **Events**: immutable units of work with priority and routing metadata
//! - **Event Queue**: a blocking, time-ordered queue that re-arms recurring
//!   events after each delivery
//!
//! ```no_run
//! use cadence_scheduler::{Event, EventQueue, Trigger};
//! use chrono::Duration;
//!
//! let queue = EventQueue::new();
//! let every_minute = Trigger::every(Duration::minutes(1)).build()?;
//! queue.put_with(every_minute, Event::new("metrics.flush"));
//!
//! let event = queue.get();
//! assert_eq!(event.kind(), "metrics.flush");
//! # Ok::<(), cadence_scheduler::TriggerError>(())
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod holiday;
pub mod id;
pub mod queue;
pub mod trigger;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::DispatchConfig;
pub use error::{ConfigError, QueueError, TriggerError};
pub use event::{DEFAULT_CHANNEL, DEFAULT_PRIORITY, Event};
pub use holiday::HolidayCalendar;
pub use id::{EventId, ParseEventIdError};
pub use queue::{DEFAULT_MAX_WAIT, EventQueue};
pub use trigger::{
    Advance, CLOCK_EPSILON, FireTimes, Trigger, TriggerBuilder, TriggerState, UNBOUNDED,
};

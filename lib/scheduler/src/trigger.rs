//! Recurrence triggers.
//!
//! A [`Trigger`] describes when an event may fire: a window bounded by
//! `window_start` and `window_end`, and an `interval` between firings (zero
//! for one-shot triggers). Each call to [`Trigger::advance`] computes the
//! next fire time until the window is used up, after which the trigger is
//! exhausted for good.
//!
//! Comparisons against the current time allow a small tolerance,
//! [`CLOCK_EPSILON`], so that a trigger created "now" and read back a few
//! microseconds later still fires at its window start.

use crate::error::TriggerError;
use crate::holiday::HolidayCalendar;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::iter::FusedIterator;

/// Tolerance applied when comparing fire times against the current time.
pub const CLOCK_EPSILON: Duration = Duration::milliseconds(100);

/// Window end used when a recurring trigger never stops on its own.
pub const UNBOUNDED: DateTime<Utc> = DateTime::<Utc>::MAX_UTC;

const SECONDS_PER_DAY: i64 = 86_400;
const NANOS_PER_SECOND: i128 = 1_000_000_000;

/// Lifecycle of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerState {
    /// Created, no fire time computed yet.
    Pending,
    /// Has a fire time.
    Running,
    /// No further fire time exists. Terminal.
    Complete,
    /// Unrecognized state read from an external source.
    #[serde(other)]
    Unknown,
}

/// Outcome of a successful [`Trigger::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// The trigger fires next at this time.
    Scheduled(DateTime<Utc>),
    /// The trigger will never fire again.
    Exhausted,
}

impl Advance {
    /// Returns the scheduled fire time, if any.
    #[must_use]
    pub fn fire_at(self) -> Option<DateTime<Utc>> {
        match self {
            Self::Scheduled(at) => Some(at),
            Self::Exhausted => None,
        }
    }
}

/// A stateful generator of fire times for one scheduled item.
#[derive(Debug, Clone)]
pub struct Trigger {
    fire_at: Option<DateTime<Utc>>,
    interval: Duration,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    holidays: Option<HolidayCalendar>,
    epsilon: Duration,
    state: TriggerState,
}

impl Trigger {
    /// Creates a trigger over an explicit window.
    ///
    /// # Errors
    ///
    /// Returns an error if `interval` is negative or `window_start` is after
    /// `window_end`.
    pub fn new(
        interval: Duration,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Self, TriggerError> {
        if interval < Duration::zero() {
            return Err(TriggerError::NegativeInterval { interval });
        }
        if window_start > window_end {
            return Err(TriggerError::InvalidWindow {
                start: window_start,
                end: window_end,
            });
        }
        Ok(Self {
            fire_at: None,
            interval,
            window_start,
            window_end,
            holidays: None,
            epsilon: CLOCK_EPSILON,
            state: TriggerState::Pending,
        })
    }

    /// A trigger that fires exactly once, at `at`.
    #[must_use]
    pub fn once(at: DateTime<Utc>) -> Self {
        Self {
            fire_at: None,
            interval: Duration::zero(),
            window_start: at,
            window_end: at,
            holidays: None,
            epsilon: CLOCK_EPSILON,
            state: TriggerState::Pending,
        }
    }

    /// A trigger that fires once, right away.
    #[must_use]
    pub fn immediate() -> Self {
        Self::once(Utc::now())
    }

    /// Starts building a trigger that fires every `interval`.
    #[must_use]
    pub fn every(interval: Duration) -> TriggerBuilder {
        TriggerBuilder::new(Recurrence::Every(interval))
    }

    /// Starts building a trigger that fires daily at `time_of_day` (UTC).
    #[must_use]
    pub fn daily(time_of_day: NaiveTime) -> TriggerBuilder {
        Self::every_n_days(1, time_of_day)
    }

    /// Starts building a trigger that fires daily at 00:00:00 UTC.
    #[must_use]
    pub fn daily_at_midnight() -> TriggerBuilder {
        Self::daily(NaiveTime::MIN)
    }

    /// Starts building a trigger that fires at `time_of_day` (UTC) every
    /// `every_n_days` days.
    #[must_use]
    pub fn every_n_days(every_n_days: u32, time_of_day: NaiveTime) -> TriggerBuilder {
        TriggerBuilder::new(Recurrence::Daily {
            time_of_day,
            every_n_days,
        })
    }

    /// Like [`Trigger::daily`], with the time given as `HH:MM:SS`.
    ///
    /// # Errors
    ///
    /// Returns an error if `time_of_day` is not a valid `HH:MM:SS` time.
    pub fn daily_at(time_of_day: &str) -> Result<TriggerBuilder, TriggerError> {
        let parsed = NaiveTime::parse_from_str(time_of_day, "%H:%M:%S").map_err(|e| {
            TriggerError::InvalidTimeOfDay {
                value: time_of_day.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self::daily(parsed))
    }

    /// Next computed fire time, if one has been computed.
    #[must_use]
    pub fn fire_at(&self) -> Option<DateTime<Utc>> {
        self.fire_at
    }

    /// Interval between firings; zero for one-shot triggers.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Earliest time the trigger may fire.
    #[must_use]
    pub fn window_start(&self) -> DateTime<Utc> {
        self.window_start
    }

    /// Latest time the trigger may fire.
    #[must_use]
    pub fn window_end(&self) -> DateTime<Utc> {
        self.window_end
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TriggerState {
        self.state
    }

    /// Whether fire times landing on holidays are pushed forward.
    #[must_use]
    pub fn skips_holidays(&self) -> bool {
        self.holidays.is_some()
    }

    /// Tolerance used when comparing against the current time.
    #[must_use]
    pub fn epsilon(&self) -> Duration {
        self.epsilon
    }

    /// Returns true once the trigger can never fire again.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.state == TriggerState::Complete
    }

    /// Binds a holiday calendar; fire times on its dates are skipped.
    #[must_use]
    pub fn skip_holidays(mut self, calendar: &HolidayCalendar) -> Self {
        self.holidays = Some(calendar.clone());
        self
    }

    /// Overrides the clock tolerance. Negative values are treated as zero.
    #[must_use]
    pub fn with_epsilon(mut self, epsilon: Duration) -> Self {
        self.epsilon = epsilon.max(Duration::zero());
        self
    }

    /// Computes the next fire time relative to the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::AlreadyExhausted`] if a previous call already
    /// reported [`Advance::Exhausted`].
    pub fn advance(&mut self) -> Result<Advance, TriggerError> {
        self.advance_at(Utc::now())
    }

    /// Computes the next fire time as if the current time were `now`.
    ///
    /// `now` only matters for the first computation; later fire times step
    /// from the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::AlreadyExhausted`] if a previous call already
    /// reported [`Advance::Exhausted`].
    pub fn advance_at(&mut self, now: DateTime<Utc>) -> Result<Advance, TriggerError> {
        let next = match self.state {
            TriggerState::Complete => return Err(TriggerError::AlreadyExhausted),
            TriggerState::Pending | TriggerState::Unknown => self.first_fire_time(now),
            TriggerState::Running => self.following_fire_time(),
        };

        match next {
            Some(at) => {
                self.fire_at = Some(at);
                self.state = TriggerState::Running;
                Ok(Advance::Scheduled(at))
            }
            None => {
                self.state = TriggerState::Complete;
                Ok(Advance::Exhausted)
            }
        }
    }

    /// Consumes the trigger into an iterator over its remaining fire times.
    ///
    /// `now` anchors the first computation. The iterator ends at exhaustion
    /// and cannot be restarted.
    #[must_use]
    pub fn fire_times(self, now: DateTime<Utc>) -> FireTimes {
        FireTimes {
            trigger: self,
            now,
            done: false,
        }
    }

    fn first_fire_time(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.interval.is_zero() {
            return Some(self.window_start);
        }
        if self.window_end < saturating_add(now, self.epsilon) {
            return None;
        }

        let candidate = if self.window_start >= saturating_sub(now, self.epsilon) {
            self.window_start
        } else {
            next_boundary(self.window_start, self.interval, now)?
        };
        let candidate = self.skip_holidays_from(candidate)?;

        (candidate <= self.window_end).then_some(candidate)
    }

    fn following_fire_time(&self) -> Option<DateTime<Utc>> {
        let fire_at = self.fire_at?;
        if self.interval.is_zero() {
            return None;
        }

        let last = saturating_sub(self.window_end, self.epsilon);
        let next = fire_at.checked_add_signed(self.interval)?;
        if next > last {
            return None;
        }
        let next = self.skip_holidays_from(next)?;
        (next <= last).then_some(next)
    }

    /// Steps `candidate` forward by whole intervals until it is off-holiday.
    ///
    /// Each holiday is crossed in one jump to the first step at or after the
    /// following midnight.
    fn skip_holidays_from(&self, mut candidate: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let Some(calendar) = &self.holidays else {
            return Some(candidate);
        };
        if self.interval.is_zero() {
            return Some(candidate);
        }
        while calendar.is_holiday(candidate.date_naive()) {
            let next_day = candidate
                .date_naive()
                .succ_opt()?
                .and_hms_opt(0, 0, 0)?
                .and_utc();
            candidate = next_boundary(candidate, self.interval, next_day)?;
        }
        Some(candidate)
    }
}

/// Iterator over a trigger's fire times. See [`Trigger::fire_times`].
#[derive(Debug)]
pub struct FireTimes {
    trigger: Trigger,
    now: DateTime<Utc>,
    done: bool,
}

impl Iterator for FireTimes {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.trigger.advance_at(self.now) {
            Ok(Advance::Scheduled(at)) => Some(at),
            Ok(Advance::Exhausted) | Err(_) => {
                self.done = true;
                None
            }
        }
    }
}

impl FusedIterator for FireTimes {}

#[derive(Debug, Clone, Copy)]
enum Recurrence {
    Every(Duration),
    Daily {
        time_of_day: NaiveTime,
        every_n_days: u32,
    },
}

/// Builder for recurring triggers. See [`Trigger::every`] and
/// [`Trigger::daily`].
#[derive(Debug, Clone)]
#[must_use]
pub struct TriggerBuilder {
    recurrence: Recurrence,
    start: Option<DateTime<Utc>>,
    end: DateTime<Utc>,
    holidays: Option<HolidayCalendar>,
    epsilon: Duration,
}

impl TriggerBuilder {
    fn new(recurrence: Recurrence) -> Self {
        Self {
            recurrence,
            start: None,
            end: UNBOUNDED,
            holidays: None,
            epsilon: CLOCK_EPSILON,
        }
    }

    /// Sets the window start. Defaults to the build time.
    ///
    /// For daily triggers only the date is used; the time of day replaces
    /// the time component.
    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    /// Sets the window end. Defaults to [`UNBOUNDED`].
    pub fn ending_at(mut self, end: DateTime<Utc>) -> Self {
        self.end = end;
        self
    }

    /// Skips fire times that fall on a date in `calendar`.
    pub fn skip_holidays(mut self, calendar: &HolidayCalendar) -> Self {
        self.holidays = Some(calendar.clone());
        self
    }

    /// Overrides the clock tolerance. Negative values are treated as zero.
    pub fn with_epsilon(mut self, epsilon: Duration) -> Self {
        self.epsilon = epsilon.max(Duration::zero());
        self
    }

    /// Builds the trigger, defaulting the window start to the system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the recurrence or window is invalid.
    pub fn build(self) -> Result<Trigger, TriggerError> {
        self.build_at(Utc::now())
    }

    /// Builds the trigger, defaulting the window start to `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the recurrence or window is invalid.
    pub fn build_at(self, now: DateTime<Utc>) -> Result<Trigger, TriggerError> {
        let start = self.start.unwrap_or(now);
        let (interval, window_start) = match self.recurrence {
            Recurrence::Every(interval) => (interval, start),
            Recurrence::Daily {
                time_of_day,
                every_n_days,
            } => {
                if every_n_days == 0 {
                    return Err(TriggerError::InvalidRepeat { every_n_days });
                }
                let interval = Duration::seconds(SECONDS_PER_DAY * i64::from(every_n_days));
                (interval, start.date_naive().and_time(time_of_day).and_utc())
            }
        };

        let mut trigger = Trigger::new(interval, window_start, self.end)?;
        trigger.holidays = self.holidays;
        trigger.epsilon = self.epsilon;
        Ok(trigger)
    }
}

fn saturating_add(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    at.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn saturating_sub(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    at.checked_sub_signed(by).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn total_nanos(d: Duration) -> i128 {
    i128::from(d.num_seconds()) * NANOS_PER_SECOND + i128::from(d.subsec_nanos())
}

/// First `start + k * interval` (k >= 0) that is at or after `now`.
fn next_boundary(
    start: DateTime<Utc>,
    interval: Duration,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let elapsed = total_nanos(now.signed_duration_since(start));
    let step = total_nanos(interval);
    if elapsed <= 0 {
        return Some(start);
    }

    let steps = (elapsed + step - 1) / step;
    let offset = step.checked_mul(steps)?;
    let secs = i64::try_from(offset / NANOS_PER_SECOND).ok()?;
    let nanos = i64::try_from(offset % NANOS_PER_SECOND).ok()?;
    let offset = Duration::try_seconds(secs)?.checked_add(&Duration::nanoseconds(nanos))?;
    start.checked_add_signed(offset)
}

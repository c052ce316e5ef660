//! Time-ordered blocking queue of triggered events.
//!
//! Producers [`put`](EventQueue::put) events paired with a [`Trigger`];
//! consumers block in [`get`](EventQueue::get) until the earliest fire time
//! has passed. A delivered entry whose trigger still has a future fire time
//! is pushed back onto the heap, so a recurring event is delivered once per
//! fire time until its trigger is exhausted.
//!
//! Entries are ordered by fire time, then by insertion order. Event priority
//! plays no part in delivery order.

use crate::clock::{Clock, SystemClock};
use crate::config::DispatchConfig;
use crate::error::QueueError;
use crate::event::Event;
use crate::trigger::{Advance, Trigger};
use chrono::{DateTime, Utc};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Upper bound on a single condition-variable wait.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(1);

const MIN_WAIT: Duration = Duration::from_millis(1);

#[derive(Debug)]
struct Entry {
    fire_at: DateTime<Utc>,
    sequence: u64,
    trigger: Trigger,
    event: Event,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.sequence == other.sequence
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.fire_at.cmp(&other.fire_at) {
            Ordering::Equal => self.sequence.cmp(&other.sequence),
            ordering => ordering,
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    heap: BinaryHeap<Reverse<Entry>>,
    next_sequence: u64,
}

impl QueueState {
    fn push(&mut self, fire_at: DateTime<Utc>, trigger: Trigger, event: Event) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Reverse(Entry {
            fire_at,
            sequence,
            trigger,
            event,
        }));
    }

    fn earliest(&self) -> Option<DateTime<Utc>> {
        self.heap.peek().map(|Reverse(entry)| entry.fire_at)
    }

    fn ready_count(&self, now: DateTime<Utc>) -> usize {
        self.heap
            .iter()
            .filter(|Reverse(entry)| entry.fire_at <= now)
            .count()
    }
}

/// A thread-safe, unbounded queue of events ordered by fire time.
///
/// Share it between producer and consumer threads with an `Arc`.
#[derive(Debug)]
pub struct EventQueue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    clock: Arc<dyn Clock>,
    max_wait: Duration,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    /// Creates an empty queue reading the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            not_empty: Condvar::new(),
            clock: Arc::new(SystemClock),
            max_wait: DEFAULT_MAX_WAIT,
        }
    }

    /// Creates an empty queue tuned by `config`.
    #[must_use]
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new().with_max_wait(config.max_wait())
    }

    /// Replaces the clock used to decide readiness.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Caps how long a blocked consumer sleeps before re-checking the heap.
    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait.max(MIN_WAIT);
        self
    }

    /// Queues `event` to fire once, now.
    pub fn put(&self, event: Event) {
        let now = self.clock.now();
        self.put_with(Trigger::once(now), event);
    }

    /// Queues `event` to fire on each of `trigger`'s fire times.
    ///
    /// The trigger is advanced once here. If it has no fire time left the
    /// event is dropped without error.
    pub fn put_with(&self, mut trigger: Trigger, event: Event) {
        let fire_at = match trigger.advance_at(self.clock.now()) {
            Ok(Advance::Scheduled(at)) => at,
            Ok(Advance::Exhausted) => {
                debug!(
                    event_id = %event.id(),
                    kind = event.kind(),
                    "trigger already closed, dropping event"
                );
                return;
            }
            Err(e) => {
                debug!(
                    event_id = %event.id(),
                    error = %e,
                    "unusable trigger, dropping event"
                );
                return;
            }
        };

        debug!(
            event_id = %event.id(),
            kind = event.kind(),
            %fire_at,
            "event queued"
        );
        self.lock().push(fire_at, trigger, event);
        self.not_empty.notify_one();
    }

    /// Number of entries whose fire time has passed.
    #[must_use]
    pub fn ready_count(&self) -> usize {
        let now = self.clock.now();
        self.lock().ready_count(now)
    }

    /// Number of entries held, ready or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    /// Returns true if the queue holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    /// Takes the earliest ready event without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Empty`] if no entry is ready.
    pub fn try_get(&self) -> Result<Event, QueueError> {
        let now = self.clock.now();
        let mut state = self.lock();
        self.take_ready(&mut state, now).ok_or(QueueError::Empty)
    }

    /// Blocks until an event is ready and takes it.
    #[must_use]
    pub fn get(&self) -> Event {
        loop {
            if let Some(event) = self.wait_until(None) {
                return event;
            }
        }
    }

    /// Blocks up to `timeout` for an event to become ready and takes it.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidTimeout`] for a zero timeout and
    /// [`QueueError::Empty`] if nothing became ready in time.
    pub fn get_timeout(&self, timeout: Duration) -> Result<Event, QueueError> {
        if timeout.is_zero() {
            return Err(QueueError::InvalidTimeout);
        }
        let deadline = Instant::now().checked_add(timeout);
        self.wait_until(deadline).ok_or(QueueError::Empty)
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits until an entry is ready or `deadline` passes.
    ///
    /// Each sleep lasts at most until the deadline, the earliest fire time,
    /// or `max_wait`, whichever comes first, so newly queued entries and
    /// clock changes are noticed without busy-waiting.
    fn wait_until(&self, deadline: Option<Instant>) -> Option<Event> {
        let mut state = self.lock();
        loop {
            let now = self.clock.now();
            if let Some(event) = self.take_ready(&mut state, now) {
                return Some(event);
            }

            let mut wait = self.max_wait;
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return None;
                }
                wait = wait.min(remaining);
            }
            if let Some(until) = state.earliest().and_then(|at| (at - now).to_std().ok()) {
                wait = wait.min(until);
            }

            trace!(
                wait = ?wait,
                pending = state.heap.len(),
                "waiting for ready event"
            );
            state = self
                .not_empty
                .wait_timeout(state, wait)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Pops the earliest entry if it is ready, re-arming its trigger.
    fn take_ready(&self, state: &mut QueueState, now: DateTime<Utc>) -> Option<Event> {
        if state.earliest().is_none_or(|at| at > now) {
            return None;
        }
        let Reverse(mut entry) = state.heap.pop()?;
        debug!(
            event_id = %entry.event.id(),
            kind = entry.event.kind(),
            fire_at = %entry.fire_at,
            "delivering event"
        );

        match entry.trigger.advance_at(now) {
            Ok(Advance::Scheduled(next)) => {
                debug!(event_id = %entry.event.id(), fire_at = %next, "re-arming recurring event");
                let event = entry.event.clone();
                state.push(next, entry.trigger, entry.event);
                self.not_empty.notify_one();
                Some(event)
            }
            Ok(Advance::Exhausted) | Err(_) => {
                debug!(event_id = %entry.event.id(), "trigger exhausted, retiring event");
                Some(entry.event)
            }
        }
    }
}

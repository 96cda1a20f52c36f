//! Cancellable one-shot timers ordered by deadline.
//!
//! The queue carries its own notion of "now" so the same code runs against
//! the wall clock in the event loop and against a virtual clock in tests.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

/// Handle for cancelling a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

pub struct TimerQueue<T> {
    now: Instant,
    next_id: u64,
    /// Ordered by (deadline, id); id breaks ties in scheduling order.
    entries: BTreeMap<(Instant, u64), T>,
    deadlines: HashMap<u64, Instant>,
}

impl<T> TimerQueue<T> {
    pub fn new(now: Instant) -> Self {
        Self {
            now,
            next_id: 0,
            entries: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    /// Move the clock forward. Earlier instants are ignored.
    pub fn set_now(&mut self, now: Instant) {
        if now > self.now {
            self.now = now;
        }
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    /// Fire `timer` once, `delay` after the current time.
    pub fn schedule(&mut self, delay: Duration, timer: T) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;

        let deadline = self.now + delay;
        self.entries.insert((deadline, id), timer);
        self.deadlines.insert(id, deadline);
        TimerId(id)
    }

    /// Returns `false` if the timer already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.deadlines.remove(&id.0) {
            Some(deadline) => self.entries.remove(&(deadline, id.0)).is_some(),
            None => false,
        }
    }

    pub fn contains(&self, id: TimerId) -> bool {
        self.deadlines.contains_key(&id.0)
    }

    /// Earliest timer whose deadline is at or before `now`.
    pub fn pop_due(&mut self) -> Option<(TimerId, T)> {
        let (&(deadline, id), _) = self.entries.iter().next()?;
        if deadline > self.now {
            return None;
        }
        self.deadlines.remove(&id);
        self.entries
            .remove(&(deadline, id))
            .map(|timer| (TimerId(id), timer))
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Time left until the next deadline, zero if one is already due.
    pub fn time_until_next(&self) -> Option<Duration> {
        self.next_deadline()
            .map(|deadline| deadline.saturating_duration_since(self.now))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

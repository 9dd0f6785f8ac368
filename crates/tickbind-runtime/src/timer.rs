#![forbid(unsafe_code)]

//! Single-shot timers for the cooperative program loop.
//!
//! Deadlines are expressed as program time (a [`Duration`] since the
//! program's clock started), so the queue itself never reads a clock and is
//! fully deterministic under test.
//!
//! Timers fire in deadline order; timers sharing a deadline fire in the
//! order they were armed.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

/// Handle to one armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Pending single-shot timers, each carrying the message it delivers.
#[derive(Debug)]
pub struct TimerQueue<M> {
    next_id: u64,
    pending: BTreeMap<(Duration, u64), M>,
    deadlines: HashMap<u64, Duration>,
}

impl<M> Default for TimerQueue<M> {
    fn default() -> Self {
        Self {
            next_id: 0,
            pending: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }
}

impl<M> TimerQueue<M> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer that delivers `msg` at `deadline`.
    pub fn schedule_at(&mut self, deadline: Duration, msg: M) -> TimerId {
        self.next_id += 1;
        let id = self.next_id;
        self.pending.insert((deadline, id), msg);
        self.deadlines.insert(id, deadline);
        TimerId(id)
    }

    /// Disarm a timer, returning its message if it had not fired yet.
    pub fn cancel(&mut self, id: TimerId) -> Option<M> {
        let deadline = self.deadlines.remove(&id.0)?;
        self.pending.remove(&(deadline, id.0))
    }

    /// Disarm everything. Returns how many timers were pending.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        self.deadlines.clear();
        count
    }

    /// Earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.pending.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Remove and return the earliest timer due at `now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<(TimerId, M)> {
        let (&(deadline, id), _) = self.pending.first_key_value()?;
        if deadline > now {
            return None;
        }
        self.deadlines.remove(&id);
        self.pending
            .remove(&(deadline, id))
            .map(|msg| (TimerId(id), msg))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Clocks
// ---------------------------------------------------------------------------

/// Source of program time for [`Program`](crate::program::Program).
pub trait Clock {
    /// Time elapsed since the clock started.
    fn now(&self) -> Duration;

    /// Wait until `deadline` (program time). Returns immediately if it has
    /// already passed.
    fn sleep_until(&mut self, deadline: Duration);
}

/// Wall clock: sleeps the calling thread.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep_until(&mut self, deadline: Duration) {
        let now = self.now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
    }
}

/// Deterministic clock: sleeping jumps straight to the deadline.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualClock {
    now: Duration,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `by`.
    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now
    }

    fn sleep_until(&mut self, deadline: Duration) {
        self.now = self.now.max(deadline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn fires_in_deadline_order() {
        let mut q = TimerQueue::new();
        q.schedule_at(ms(300), "c");
        q.schedule_at(ms(100), "a");
        q.schedule_at(ms(200), "b");

        assert_eq!(q.next_deadline(), Some(ms(100)));
        let fired: Vec<_> = std::iter::from_fn(|| q.pop_due(ms(1000)).map(|(_, m)| m)).collect();
        assert_eq!(fired, vec!["a", "b", "c"]);
        assert!(q.is_empty());
    }

    #[test]
    fn ties_fire_in_arming_order() {
        let mut q = TimerQueue::new();
        q.schedule_at(ms(50), 1);
        q.schedule_at(ms(50), 2);
        q.schedule_at(ms(50), 3);
        let fired: Vec<_> = std::iter::from_fn(|| q.pop_due(ms(50)).map(|(_, m)| m)).collect();
        assert_eq!(fired, vec![1, 2, 3]);
    }

    #[test]
    fn not_due_before_deadline() {
        let mut q = TimerQueue::new();
        q.schedule_at(ms(2000), ());
        assert!(q.pop_due(ms(1999)).is_none());
        assert!(q.pop_due(ms(2000)).is_some());
    }

    #[test]
    fn cancel_removes_timer() {
        let mut q = TimerQueue::new();
        let a = q.schedule_at(ms(10), "a");
        let _b = q.schedule_at(ms(20), "b");

        assert_eq!(q.cancel(a), Some("a"));
        assert_eq!(q.cancel(a), None);
        assert_eq!(q.len(), 1);
        assert_eq!(q.next_deadline(), Some(ms(20)));
    }

    #[test]
    fn cancel_after_fire_is_none() {
        let mut q = TimerQueue::new();
        let id = q.schedule_at(ms(0), "x");
        let (fired, _) = q.pop_due(ms(0)).unwrap();
        assert_eq!(fired, id);
        assert_eq!(q.cancel(id), None);
    }

    #[test]
    fn cancel_all_reports_count() {
        let mut q = TimerQueue::new();
        q.schedule_at(ms(1), ());
        q.schedule_at(ms(2), ());
        assert_eq!(q.cancel_all(), 2);
        assert_eq!(q.next_deadline(), None);
        assert_eq!(q.cancel_all(), 0);
    }

    #[test]
    fn manual_clock_never_goes_backwards() {
        let mut clock = ManualClock::new();
        clock.sleep_until(ms(500));
        assert_eq!(clock.now(), ms(500));
        clock.sleep_until(ms(100));
        assert_eq!(clock.now(), ms(500));
        clock.advance(ms(5));
        assert_eq!(clock.now(), ms(505));
    }

    #[test]
    fn system_clock_past_deadline_returns_immediately() {
        let mut clock = SystemClock::new();
        let before = Instant::now();
        clock.sleep_until(Duration::ZERO);
        assert!(before.elapsed() < Duration::from_millis(50));
    }
}

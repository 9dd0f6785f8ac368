#![forbid(unsafe_code)]

//! Application-scoped bookkeeping shared by every view of one tree.
//!
//! Everything that would otherwise be process-global (key counter, render
//! diagnostics, the tick/tock alternator) lives on an [`AppContext`] that is
//! created with the tree and passed to views explicitly. Two contexts never
//! observe each other's counts.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;

use crate::reactive::{KeyAllocator, SubscriberKey};

/// Identifies whose renders a [`RenderCounter`] slot tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CounterKey {
    /// The root view that owns the broadcast sources.
    Root,
    /// A downstream view bound under this key.
    Subscriber(SubscriberKey),
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("root"),
            Self::Subscriber(key) => write!(f, "subscriber {key}"),
        }
    }
}

/// Per-view invocation counts. Diagnostic only.
#[derive(Debug, Default)]
pub struct RenderCounter {
    counts: RefCell<HashMap<CounterKey, u64>>,
}

impl RenderCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one invocation and return the updated count (first call = 1).
    pub fn bump(&self, key: CounterKey) -> u64 {
        let mut counts = self.counts.borrow_mut();
        let count = counts.entry(key).or_insert(0);
        *count += 1;
        *count
    }

    /// Current count for `key` (0 if never bumped).
    #[must_use]
    pub fn get(&self, key: CounterKey) -> u64 {
        self.counts.borrow().get(&key).copied().unwrap_or(0)
    }

    /// All counts, ordered by key.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(CounterKey, u64)> {
        let mut all: Vec<_> = self.counts.borrow().iter().map(|(k, v)| (*k, *v)).collect();
        all.sort_unstable();
        all
    }
}

/// Shared parity counter deciding which channel the next timer firing
/// advances. Starts at 0, so the first [`advance`](Alternator::advance)
/// returns 1 (odd).
#[derive(Debug, Default)]
pub struct Alternator {
    turns: Cell<u64>,
}

impl Alternator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance and return the new turn number.
    pub fn advance(&self) -> u64 {
        let next = self.turns.get() + 1;
        self.turns.set(next);
        next
    }

    /// Turns taken so far.
    #[must_use]
    pub fn turns(&self) -> u64 {
        self.turns.get()
    }
}

/// Owner of the per-tree counters.
#[derive(Debug, Default)]
pub struct AppContext {
    keys: KeyAllocator,
    renders: RenderCounter,
    alternator: Alternator,
}

impl AppContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Key source for bindings that self-assign their key.
    pub fn keys(&self) -> &KeyAllocator {
        &self.keys
    }

    pub fn renders(&self) -> &RenderCounter {
        &self.renders
    }

    pub fn alternator(&self) -> &Alternator {
        &self.alternator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_counter_bumps_per_key() {
        let counter = RenderCounter::new();
        let a = CounterKey::Subscriber(SubscriberKey::new(1));
        assert_eq!(counter.get(a), 0);
        assert_eq!(counter.bump(a), 1);
        assert_eq!(counter.bump(a), 2);
        assert_eq!(counter.bump(CounterKey::Root), 1);
        assert_eq!(counter.get(a), 2);
    }

    #[test]
    fn snapshot_is_sorted() {
        let counter = RenderCounter::new();
        counter.bump(CounterKey::Subscriber(SubscriberKey::new(2)));
        counter.bump(CounterKey::Root);
        counter.bump(CounterKey::Subscriber(SubscriberKey::new(1)));
        let keys: Vec<_> = counter.snapshot().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![
                CounterKey::Root,
                CounterKey::Subscriber(SubscriberKey::new(1)),
                CounterKey::Subscriber(SubscriberKey::new(2)),
            ]
        );
    }

    #[test]
    fn alternator_first_turn_is_odd() {
        let alt = Alternator::new();
        assert_eq!(alt.turns(), 0);
        assert_eq!(alt.advance() % 2, 1);
        assert_eq!(alt.advance() % 2, 0);
        assert_eq!(alt.turns(), 2);
    }

    #[test]
    fn contexts_do_not_share_state() {
        let a = AppContext::new();
        let b = AppContext::new();
        a.renders().bump(CounterKey::Root);
        a.keys().next_key();
        a.alternator().advance();

        assert_eq!(b.renders().get(CounterKey::Root), 0);
        assert_eq!(b.keys().issued(), 0);
        assert_eq!(b.alternator().turns(), 0);
    }

    #[test]
    fn counter_key_display() {
        assert_eq!(CounterKey::Root.to_string(), "root");
        assert_eq!(
            CounterKey::Subscriber(SubscriberKey::new(3)).to_string(),
            "subscriber #3"
        );
    }
}

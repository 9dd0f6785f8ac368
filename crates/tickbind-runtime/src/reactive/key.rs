#![forbid(unsafe_code)]

//! Subscriber keys and the instance-scoped allocator that hands them out.

use std::cell::Cell;
use std::fmt;

/// Opaque identifier of one registration in a [`BroadcastSource`].
///
/// Keys are either supplied by the caller (a stable id) or drawn from a
/// [`KeyAllocator`]. Uniqueness among the live registrations of one source is
/// a caller obligation; registering an existing key overwrites its entry.
///
/// [`BroadcastSource`]: super::BroadcastSource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberKey(u64);

impl SubscriberKey {
    /// Wrap a caller-chosen id.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw id.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for SubscriberKey {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SubscriberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonically increasing key source.
///
/// One allocator is owned by each [`AppContext`](crate::context::AppContext),
/// so two application instances never observe each other's ids. The first
/// key handed out is `1`.
#[derive(Debug, Default)]
pub struct KeyAllocator {
    issued: Cell<u64>,
}

impl KeyAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next key.
    pub fn next_key(&self) -> SubscriberKey {
        let next = self.issued.get() + 1;
        self.issued.set(next);
        SubscriberKey(next)
    }

    /// Number of keys handed out so far.
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.issued.get()
    }
}

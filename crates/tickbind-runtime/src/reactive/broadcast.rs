#![forbid(unsafe_code)]

//! Keyed value broadcast with notify-then-commit publishing.
//!
//! # Design
//!
//! [`BroadcastSource<T>`] owns a value and an ordered registry of notify
//! callbacks keyed by [`SubscriberKey`]. [`publish`](BroadcastSource::publish)
//! hands the new value to every registered callback *before* the source's own
//! value is replaced, then runs the optional commit hook (the owner's state
//! update).
//!
//! Unlike a change-detecting observable, `publish` never compares against the
//! current value: every call notifies and bumps the version.
//!
//! # Performance
//!
//! | Operation      | Complexity                   |
//! |----------------|------------------------------|
//! | `get()`        | O(1) + clone                 |
//! | `publish()`    | O(S) where S = subscribers   |
//! | `register()`   | O(S) (overwrite lookup)      |
//! | `unregister()` | O(S)                         |
//!
//! # Failure Modes
//!
//! - **Re-entrant publish**: a `publish` issued from a callback or the commit
//!   hook is queued and dispatched once the in-flight publish has committed.
//! - **Panicking callback**: the dispatch flag is reset and queued values are
//!   discarded while unwinding, so the source stays usable.
//! - **Key collision**: registering a live key silently replaces its callback.
//!   The older [`Registration`] becomes inert. A key overwritten while a
//!   publish is in flight still hears that publish once, through the new
//!   callback.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::key::SubscriberKey;

type NotifyRc<T> = Rc<dyn Fn(&T)>;

/// Shared with in-flight dispatch snapshots so overwrite and rebind reach
/// them.
type NotifyCell<T> = Rc<RefCell<NotifyRc<T>>>;

struct Entry<T> {
    key: SubscriberKey,
    /// Distinguishes successive registrations under the same key.
    slot: u64,
    notify: NotifyCell<T>,
    /// Cleared on removal so an in-flight dispatch skips the entry.
    live: Rc<Cell<bool>>,
}

struct BroadcastInner<T> {
    value: T,
    version: u64,
    next_slot: u64,
    subscribers: Vec<Entry<T>>,
    commit_hook: Option<NotifyRc<T>>,
    publishing: bool,
    queued: VecDeque<T>,
}

/// A value plus the registry of subscribers that hear about its changes.
///
/// Cloning a `BroadcastSource` creates a new handle to the **same** state.
///
/// # Invariants
///
/// 1. Each publish notifies every entry present at dispatch start exactly
///    once, in registration order, then commits.
/// 2. `version` increments by exactly 1 per committed publish.
/// 3. An entry exists only while its [`Registration`] guard is alive.
/// 4. Publishes never interleave: all subscribers see `v1` before any sees
///    `v2`.
pub struct BroadcastSource<T> {
    inner: Rc<RefCell<BroadcastInner<T>>>,
}

impl<T> Clone for BroadcastSource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for BroadcastSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("BroadcastSource")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("subscriber_count", &inner.subscribers.len())
            .finish()
    }
}

impl<T: Clone + 'static> BroadcastSource<T> {
    /// Create a source holding `value`, at version 0, with no subscribers.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(BroadcastInner {
                value,
                version: 0,
                next_slot: 0,
                subscribers: Vec::new(),
                commit_hook: None,
                publishing: false,
                queued: VecDeque::new(),
            })),
        }
    }

    /// Get a clone of the committed value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Access the committed value by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Number of committed publishes.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    /// Whether `key` currently has an entry.
    #[must_use]
    pub fn contains(&self, key: SubscriberKey) -> bool {
        self.inner.borrow().subscribers.iter().any(|e| e.key == key)
    }

    /// Registered keys in dispatch order.
    #[must_use]
    pub fn keys(&self) -> Vec<SubscriberKey> {
        self.inner.borrow().subscribers.iter().map(|e| e.key).collect()
    }

    /// Install the hook that runs after every commit, replacing any prior one.
    ///
    /// The hook receives the committed value. It is where the owning view
    /// marks itself for refresh.
    pub fn set_commit_hook(&self, hook: impl Fn(&T) + 'static) {
        let hook: NotifyRc<T> = Rc::new(hook);
        let previous = self.inner.borrow_mut().commit_hook.replace(hook);
        drop(previous);
    }

    /// Remove the commit hook.
    pub fn clear_commit_hook(&self) {
        let previous = self.inner.borrow_mut().commit_hook.take();
        drop(previous);
    }

    /// Store `notify` under `key`.
    ///
    /// An existing entry for `key` is overwritten in place (it keeps its
    /// dispatch position). The returned guard removes the entry when dropped.
    pub fn register(&self, key: SubscriberKey, notify: impl Fn(&T) + 'static) -> Registration<T> {
        let notify: NotifyRc<T> = Rc::new(notify);
        let (slot, displaced) = {
            let mut inner = self.inner.borrow_mut();
            inner.next_slot += 1;
            let slot = inner.next_slot;
            match inner.subscribers.iter_mut().find(|e| e.key == key) {
                Some(existing) => {
                    // Same entry, new owner: dispatch position and liveness stay.
                    existing.slot = slot;
                    (slot, Some(existing.notify.replace(notify)))
                }
                None => {
                    inner.subscribers.push(Entry {
                        key,
                        slot,
                        notify: Rc::new(RefCell::new(notify)),
                        live: Rc::new(Cell::new(true)),
                    });
                    (slot, None)
                }
            }
        };
        debug!(key = %key, overwritten = displaced.is_some(), "subscriber registered");
        // Dropped outside the borrow: the old closure may own other guards.
        drop(displaced);

        Registration {
            source: Rc::downgrade(&self.inner),
            key,
            slot,
            released: false,
        }
    }

    /// Notify every registered subscriber of `value`, then commit it.
    ///
    /// Subscribers registered under a new key while the notifications run
    /// are not notified by this call; overwriting a key that is still waiting
    /// its turn delivers to the new callback instead. Calling `publish` from inside a callback or the commit
    /// hook queues the value behind the in-flight publish.
    pub fn publish(&self, value: T) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.publishing {
                trace!(queued = inner.queued.len() + 1, "publish queued behind dispatch");
                inner.queued.push_back(value);
                return;
            }
            inner.publishing = true;
        }

        let _guard = DispatchGuard { inner: &self.inner };
        let mut next = Some(value);
        while let Some(value) = next {
            self.dispatch(value);
            next = self.inner.borrow_mut().queued.pop_front();
        }
    }

    fn dispatch(&self, value: T) {
        let targets: Vec<(NotifyCell<T>, Rc<Cell<bool>>)> = self
            .inner
            .borrow()
            .subscribers
            .iter()
            .map(|e| (Rc::clone(&e.notify), Rc::clone(&e.live)))
            .collect();

        let mut notified = 0usize;
        for (notify, live) in &targets {
            if live.get() {
                let current = Rc::clone(&*notify.borrow());
                current(&value);
                notified += 1;
            }
        }

        let (previous, hook, version) = {
            let mut inner = self.inner.borrow_mut();
            let previous = std::mem::replace(&mut inner.value, value);
            inner.version += 1;
            (previous, inner.commit_hook.clone(), inner.version)
        };
        drop(previous);
        trace!(version, notified, "publish committed");

        if let Some(hook) = hook {
            let committed = self.get();
            hook(&committed);
        }
    }
}

/// Resets the dispatch flag even when a callback unwinds.
struct DispatchGuard<'a, T> {
    inner: &'a RefCell<BroadcastInner<T>>,
}

impl<T> Drop for DispatchGuard<'_, T> {
    fn drop(&mut self) {
        let discarded = match self.inner.try_borrow_mut() {
            Ok(mut inner) => {
                inner.publishing = false;
                std::mem::take(&mut inner.queued)
            }
            Err(_) => return,
        };
        if !discarded.is_empty() {
            debug!(discarded = discarded.len(), "queued publishes discarded");
        }
    }
}

/// RAII guard for one registry entry.
///
/// Dropping the guard (or calling [`unregister`](Registration::unregister))
/// removes the entry. If a later registration overwrote the same key, the
/// guard no longer owns anything and dropping it is a no-op.
pub struct Registration<T> {
    source: Weak<RefCell<BroadcastInner<T>>>,
    key: SubscriberKey,
    slot: u64,
    released: bool,
}

impl<T> Registration<T> {
    /// The key this guard was registered under.
    #[must_use]
    pub fn key(&self) -> SubscriberKey {
        self.key
    }

    /// Whether the entry this guard owns is still in the registry.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.released
            && self.source.upgrade().is_some_and(|inner| {
                inner
                    .borrow()
                    .subscribers
                    .iter()
                    .any(|e| e.slot == self.slot)
            })
    }

    /// Replace the notify function for this entry.
    ///
    /// Takes effect on the next publish, or on the current one if its
    /// dispatch has not reached this entry yet. Returns `false` if the entry is gone
    /// (source dropped, key overwritten, or already unregistered).
    pub fn rebind(&self, notify: impl Fn(&T) + 'static) -> bool {
        if self.released {
            return false;
        }
        let Some(inner) = self.source.upgrade() else {
            return false;
        };
        let notify: NotifyRc<T> = Rc::new(notify);
        let previous = {
            let mut inner = inner.borrow_mut();
            match inner.subscribers.iter_mut().find(|e| e.slot == self.slot) {
                Some(entry) => entry.notify.replace(notify),
                None => return false,
            }
        };
        drop(previous);
        trace!(key = %self.key, "subscriber rebound");
        true
    }

    /// Remove the entry now. Returns `true` if an entry was removed.
    pub fn unregister(mut self) -> bool {
        self.release()
    }

    fn release(&mut self) -> bool {
        if std::mem::replace(&mut self.released, true) {
            return false;
        }
        let Some(inner) = self.source.upgrade() else {
            return false;
        };
        let removed = {
            let mut inner = inner.borrow_mut();
            let idx = inner.subscribers.iter().position(|e| e.slot == self.slot);
            idx.map(|idx| inner.subscribers.remove(idx))
        };
        match removed {
            Some(entry) => {
                entry.live.set(false);
                debug!(key = %self.key, "subscriber unregistered");
                // Dropped outside the borrow.
                drop(entry);
                true
            }
            None => false,
        }
    }
}

impl<T> Drop for Registration<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T> fmt::Debug for Registration<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("key", &self.key)
            .field("slot", &self.slot)
            .field("released", &self.released)
            .finish()
    }
}

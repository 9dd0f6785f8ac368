#![forbid(unsafe_code)]

//! Keyed value broadcast and selective view bindings.
//!
//! This module provides the primitives that let a parent-held value refresh
//! only the child views subscribed to it:
//!
//! - [`BroadcastSource`]: a shared value plus an ordered registry of notify
//!   callbacks keyed by [`SubscriberKey`].
//! - [`Registration`]: RAII guard that removes its registry entry on drop.
//! - [`BoundView`]: registration point that re-evaluates one downstream view
//!   only when its own subscription is notified.
//!
//! # Architecture
//!
//! Sources use `Rc<RefCell<..>>` for single-threaded shared ownership. No
//! borrow is held while user callbacks run, so callbacks may register,
//! unregister, or publish.
//!
//! # Invariants
//!
//! 1. Subscribers are notified in registration order, before the source
//!    commits the new value.
//! 2. Every publish notifies and commits; there is no equality short-circuit.
//! 3. Dropping a [`Registration`] removes the entry immediately.
//! 4. An isolated [`BoundView`] is never re-evaluated by an ancestor render
//!    alone.

pub mod binding;
pub mod broadcast;
pub mod key;

pub use binding::{BindingState, BoundProps, BoundView, Downstream, KeyAssignment, RefreshPolicy};
pub use broadcast::{BroadcastSource, Registration};
pub use key::{KeyAllocator, SubscriberKey};

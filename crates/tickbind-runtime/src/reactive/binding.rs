#![forbid(unsafe_code)]

//! Selective-refresh binding between a [`BroadcastSource`] and one view.
//!
//! A [`BoundView`] registers itself with a source once, queues every value
//! it is notified with, and re-evaluates its wrapped [`Downstream`] view once
//! per queued value on the next render. When the ancestor renders for any
//! other reason the binding replays its cached output.
//!
//! # Usage
//!
//! ```
//! use tickbind_runtime::context::AppContext;
//! use tickbind_runtime::frame::Frame;
//! use tickbind_runtime::reactive::{BoundProps, BoundView, BroadcastSource, KeyAssignment};
//!
//! let ctx = AppContext::new();
//! let source = BroadcastSource::new(0u64);
//! let mut view = BoundView::new(0u64, |props: &BoundProps<'_, u64>, frame: &mut Frame| {
//!     frame.push_line(format!("value {}", props.value));
//! });
//! view.activate(&source, KeyAssignment::Allocate, &ctx);
//!
//! source.publish(5);
//! let mut frame = Frame::new();
//! view.render(&0, &ctx, &mut frame);
//! assert_eq!(frame.text(), "value 5");
//! // Mount plus the one notification.
//! assert_eq!(view.evaluations(), 2);
//! ```
//!
//! # State machine
//!
//! ```text
//! Unregistered --activate--> Registered --teardown/drop--> Destroyed
//! ```
//!
//! `activate` runs once; a second call returns the existing key. The
//! registry entry is removed on teardown.
//!
//! # Invariants
//!
//! 1. With [`RefreshPolicy::Isolated`], the downstream view is evaluated
//!    once on the first render after activation, then exactly once per
//!    notification received, in delivery order, at the next render.
//! 2. Ancestor props never influence an isolated binding after mount.
//! 3. A destroyed binding has no registry entry and renders nothing.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace, warn};

use super::broadcast::{BroadcastSource, Registration};
use super::key::SubscriberKey;
use crate::context::AppContext;
use crate::frame::Frame;

// ---------------------------------------------------------------------------
// Downstream view contract
// ---------------------------------------------------------------------------

/// What a bound view receives each time it is evaluated.
#[derive(Debug)]
pub struct BoundProps<'a, T> {
    /// Latest value delivered to this binding.
    pub value: &'a T,
    /// Key this binding is registered under.
    pub key: SubscriberKey,
    /// Context of the owning tree.
    pub ctx: &'a AppContext,
}

/// A view wrapped by a [`BoundView`].
pub trait Downstream<T> {
    /// Render into `frame`. Called only when the binding decides to
    /// re-evaluate.
    fn render(&mut self, props: &BoundProps<'_, T>, frame: &mut Frame);
}

impl<T, F> Downstream<T> for F
where
    F: FnMut(&BoundProps<'_, T>, &mut Frame),
{
    fn render(&mut self, props: &BoundProps<'_, T>, frame: &mut Frame) {
        self(props, frame);
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Where the key of a binding comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAssignment {
    /// Caller-supplied stable id.
    Explicit(SubscriberKey),
    /// Next key from the context's allocator.
    Allocate,
}

/// Whether a binding follows the owning view's refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshPolicy {
    /// Output is a pure function of notification state: ancestor renders
    /// without a notification replay the cached output.
    #[default]
    Isolated,
    /// Re-evaluate on every ancestor render, taking the ancestor's props.
    Inherit,
}

/// Lifecycle phase of a [`BoundView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// Constructed but not yet activated; renders nothing.
    Unregistered,
    /// Holds a registry entry and renders.
    Registered,
    /// Torn down; the registry entry is gone and activation is refused.
    Destroyed,
}

// ---------------------------------------------------------------------------
// BoundView
// ---------------------------------------------------------------------------

/// State written by notifications.
struct Slot<T> {
    last_value: T,
    /// Values delivered since the last render, oldest first.
    queued: Vec<T>,
    notifications: u64,
}

/// Registration point connecting one [`Downstream`] view to a source.
pub struct BoundView<T: Clone + 'static, V> {
    state: BindingState,
    policy: RefreshPolicy,
    key: Option<SubscriberKey>,
    slot: Rc<RefCell<Slot<T>>>,
    registration: Option<Registration<T>>,
    view: V,
    /// Value for the mount evaluation, set on activation.
    mount: Option<T>,
    cached: Option<Vec<String>>,
    evaluations: u64,
}

impl<T: Clone + 'static, V: Downstream<T>> BoundView<T, V> {
    /// Wrap `view`, starting from `initial` until the first notification.
    pub fn new(initial: T, view: V) -> Self {
        Self {
            state: BindingState::Unregistered,
            policy: RefreshPolicy::default(),
            key: None,
            slot: Rc::new(RefCell::new(Slot {
                last_value: initial,
                queued: Vec::new(),
                notifications: 0,
            })),
            registration: None,
            view,
            mount: None,
            cached: None,
            evaluations: 0,
        }
    }

    /// Choose the refresh policy. Fixed for the binding's lifetime.
    #[must_use]
    pub fn with_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Register with `source`.
    ///
    /// Runs once: on a registered binding this returns the existing key
    /// without touching the registry, and a destroyed binding is refused.
    pub fn activate(
        &mut self,
        source: &BroadcastSource<T>,
        assignment: KeyAssignment,
        ctx: &AppContext,
    ) -> Option<SubscriberKey> {
        match self.state {
            BindingState::Registered => {
                trace!(key = ?self.key, "binding already registered");
                return self.key;
            }
            BindingState::Destroyed => {
                debug!("activation refused: binding destroyed");
                return None;
            }
            BindingState::Unregistered => {}
        }

        let key = match assignment {
            KeyAssignment::Explicit(key) => key,
            KeyAssignment::Allocate => ctx.keys().next_key(),
        };

        let slot = Rc::downgrade(&self.slot);
        let registration = source.register(key, move |value: &T| {
            let Some(slot) = slot.upgrade() else {
                warn!(key = %key, "notification for destroyed binding dropped");
                return;
            };
            let mut slot = slot.borrow_mut();
            slot.last_value = value.clone();
            slot.queued.push(value.clone());
            slot.notifications += 1;
        });

        self.mount = Some(self.slot.borrow().last_value.clone());
        self.key = Some(key);
        self.registration = Some(registration);
        self.state = BindingState::Registered;
        debug!(key = %key, policy = ?self.policy, "binding activated");
        Some(key)
    }

    /// Render into `frame`, re-evaluating the downstream view only if this
    /// binding's policy and notification state call for it.
    ///
    /// An isolated binding evaluates once for its mount and then once for
    /// every notification queued since the previous render, oldest first;
    /// several publishes between two renders are never coalesced. The frame
    /// receives the output of the last evaluation.
    ///
    /// `ancestor_props` is what the owning view would pass down; isolated
    /// bindings ignore it.
    pub fn render(&mut self, ancestor_props: &T, ctx: &AppContext, frame: &mut Frame) {
        if self.state != BindingState::Registered {
            return;
        }
        let Some(key) = self.key else {
            return;
        };

        let values = {
            let mut slot = self.slot.borrow_mut();
            match self.policy {
                RefreshPolicy::Isolated => {
                    let mut values: Vec<T> = self.mount.take().into_iter().collect();
                    values.append(&mut slot.queued);
                    values
                }
                RefreshPolicy::Inherit => {
                    self.mount = None;
                    slot.queued.clear();
                    slot.last_value = ancestor_props.clone();
                    vec![ancestor_props.clone()]
                }
            }
        };

        for value in &values {
            let mut own = Frame::new();
            self.view.render(&BoundProps { value, key, ctx }, &mut own);
            self.evaluations += 1;
            trace!(key = %key, evaluations = self.evaluations, "bound view evaluated");
            self.cached = Some(own.into_lines());
        }

        if let Some(lines) = &self.cached {
            frame.extend_from_slice(lines);
        }
    }

    /// Unregister and enter the terminal state.
    pub fn teardown(&mut self) {
        if self.state == BindingState::Destroyed {
            return;
        }
        let removed = self
            .registration
            .take()
            .is_some_and(Registration::unregister);
        self.cached = None;
        self.mount = None;
        self.slot.borrow_mut().queued.clear();
        self.state = BindingState::Destroyed;
        debug!(key = ?self.key, removed, "binding torn down");
    }

    #[must_use]
    pub fn state(&self) -> BindingState {
        self.state
    }

    #[must_use]
    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    /// Assigned key, once activated.
    #[must_use]
    pub fn key(&self) -> Option<SubscriberKey> {
        self.key
    }

    /// Latest value this binding holds.
    #[must_use]
    pub fn last_value(&self) -> T {
        self.slot.borrow().last_value.clone()
    }

    /// Whether a notification arrived since the last evaluation.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.slot.borrow().queued.is_empty()
    }

    /// Notifications waiting for the next render.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.slot.borrow().queued.len()
    }

    /// Notifications received so far.
    #[must_use]
    pub fn notifications(&self) -> u64 {
        self.slot.borrow().notifications
    }

    /// Times the downstream view has been evaluated.
    #[must_use]
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// The wrapped downstream view.
    pub fn view(&self) -> &V {
        &self.view
    }
}

impl<T: Clone + fmt::Debug + 'static, V> fmt::Debug for BoundView<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.borrow();
        f.debug_struct("BoundView")
            .field("state", &self.state)
            .field("policy", &self.policy)
            .field("key", &self.key)
            .field("last_value", &slot.last_value)
            .field("pending", &slot.queued.len())
            .field("evaluations", &self.evaluations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CounterKey;

    /// Downstream view that reports its own invocation count.
    fn counting_view() -> impl FnMut(&BoundProps<'_, u64>, &mut Frame) {
        |props: &BoundProps<'_, u64>, frame: &mut Frame| {
            let n = props
                .ctx
                .renders()
                .bump(CounterKey::Subscriber(props.key));
            frame.push_line(format!("{} -> {} ({n})", props.key, props.value));
        }
    }

    fn render_text<V: Downstream<u64>>(
        view: &mut BoundView<u64, V>,
        props: u64,
        ctx: &AppContext,
    ) -> String {
        let mut frame = Frame::new();
        view.render(&props, ctx, &mut frame);
        frame.text()
    }

    #[test]
    fn unregistered_renders_nothing() {
        let ctx = AppContext::new();
        let mut view = BoundView::new(0u64, counting_view());
        assert_eq!(view.state(), BindingState::Unregistered);
        assert_eq!(render_text(&mut view, 0, &ctx), "");
        assert_eq!(view.evaluations(), 0);
    }

    #[test]
    fn activation_registers_explicit_key() {
        let ctx = AppContext::new();
        let source = BroadcastSource::new(0u64);
        let mut view = BoundView::new(0u64, counting_view());

        let key = view.activate(&source, KeyAssignment::Explicit(SubscriberKey::new(7)), &ctx);
        assert_eq!(key, Some(SubscriberKey::new(7)));
        assert_eq!(view.state(), BindingState::Registered);
        assert!(source.contains(SubscriberKey::new(7)));
        assert_eq!(ctx.keys().issued(), 0);
    }

    #[test]
    fn allocated_keys_come_from_context() {
        let ctx = AppContext::new();
        let source = BroadcastSource::new(0u64);
        let mut a = BoundView::new(0u64, counting_view());
        let mut b = BoundView::new(0u64, counting_view());

        let ka = a.activate(&source, KeyAssignment::Allocate, &ctx);
        let kb = b.activate(&source, KeyAssignment::Allocate, &ctx);
        assert_eq!(ka, Some(SubscriberKey::new(1)));
        assert_eq!(kb, Some(SubscriberKey::new(2)));
        assert_eq!(source.subscriber_count(), 2);
    }

    #[test]
    fn second_activation_is_noop() {
        let ctx = AppContext::new();
        let source = BroadcastSource::new(0u64);
        let other = BroadcastSource::new(0u64);
        let mut view = BoundView::new(0u64, counting_view());

        let first = view.activate(&source, KeyAssignment::Allocate, &ctx);
        let second = view.activate(&other, KeyAssignment::Allocate, &ctx);
        assert_eq!(first, second);
        assert_eq!(other.subscriber_count(), 0);
        assert_eq!(ctx.keys().issued(), 1);
    }

    #[test]
    fn first_render_evaluates_then_caches() {
        let ctx = AppContext::new();
        let source = BroadcastSource::new(0u64);
        let mut view = BoundView::new(0u64, counting_view());
        view.activate(&source, KeyAssignment::Explicit(SubscriberKey::new(1)), &ctx);

        assert_eq!(render_text(&mut view, 0, &ctx), "#1 -> 0 (1)");
        // Ancestor renders again with different props: cached output, no evaluation.
        assert_eq!(render_text(&mut view, 99, &ctx), "#1 -> 0 (1)");
        assert_eq!(view.evaluations(), 1);
    }

    #[test]
    fn notification_triggers_single_evaluation() {
        let ctx = AppContext::new();
        let source = BroadcastSource::new(0u64);
        let mut view = BoundView::new(0u64, counting_view());
        view.activate(&source, KeyAssignment::Explicit(SubscriberKey::new(1)), &ctx);
        render_text(&mut view, 0, &ctx);

        source.publish(5);
        assert!(view.is_pending());
        assert_eq!(view.last_value(), 5);

        assert_eq!(render_text(&mut view, 5, &ctx), "#1 -> 5 (2)");
        assert_eq!(render_text(&mut view, 5, &ctx), "#1 -> 5 (2)");
        assert_eq!(view.evaluations(), 2);
        assert_eq!(view.notifications(), 1);
    }

    #[test]
    fn publishes_between_renders_each_evaluate_once() {
        let ctx = AppContext::new();
        let source = BroadcastSource::new(0u64);
        let mut view = BoundView::new(0u64, counting_view());
        view.activate(&source, KeyAssignment::Explicit(SubscriberKey::new(1)), &ctx);
        render_text(&mut view, 0, &ctx);

        source.publish(1);
        source.publish(2);
        assert_eq!(view.pending_count(), 2);

        assert_eq!(render_text(&mut view, 0, &ctx), "#1 -> 2 (3)");
        assert_eq!(view.notifications(), 2);
        assert_eq!(view.evaluations(), 3);
        assert!(!view.is_pending());

        // Nothing new: cached replay.
        assert_eq!(render_text(&mut view, 0, &ctx), "#1 -> 2 (3)");
        assert_eq!(view.evaluations(), 3);
    }

    #[test]
    fn evaluations_see_each_delivered_value_in_order() {
        let ctx = AppContext::new();
        let source = BroadcastSource::new(0u64);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut view = BoundView::new(0u64, move |props: &BoundProps<'_, u64>, _: &mut Frame| {
            sink.borrow_mut().push(*props.value);
        });
        view.activate(&source, KeyAssignment::Allocate, &ctx);

        source.publish(4);
        source.publish(9);
        render_text(&mut view, 0, &ctx);
        assert_eq!(*seen.borrow(), vec![0, 4, 9]);
    }

    #[test]
    fn sibling_notification_does_not_reevaluate() {
        let ctx = AppContext::new();
        let tick = BroadcastSource::new(0u64);
        let tock = BroadcastSource::new(0u64);
        let mut a = BoundView::new(0u64, counting_view());
        let mut b = BoundView::new(0u64, counting_view());
        a.activate(&tick, KeyAssignment::Explicit(SubscriberKey::new(1)), &ctx);
        b.activate(&tock, KeyAssignment::Explicit(SubscriberKey::new(2)), &ctx);
        render_text(&mut a, 0, &ctx);
        render_text(&mut b, 0, &ctx);

        tock.publish(1);
        render_text(&mut a, 0, &ctx);
        render_text(&mut b, 1, &ctx);

        assert_eq!(a.evaluations(), 1);
        assert_eq!(b.evaluations(), 2);
    }

    #[test]
    fn inherit_policy_follows_ancestor() {
        let ctx = AppContext::new();
        let source = BroadcastSource::new(0u64);
        let mut view =
            BoundView::new(0u64, counting_view()).with_policy(RefreshPolicy::Inherit);
        view.activate(&source, KeyAssignment::Explicit(SubscriberKey::new(1)), &ctx);

        assert_eq!(render_text(&mut view, 0, &ctx), "#1 -> 0 (1)");
        assert_eq!(render_text(&mut view, 3, &ctx), "#1 -> 3 (2)");
        assert_eq!(view.policy(), RefreshPolicy::Inherit);
    }

    #[test]
    fn teardown_removes_entry_and_is_terminal() {
        let ctx = AppContext::new();
        let source = BroadcastSource::new(0u64);
        let mut view = BoundView::new(0u64, counting_view());
        view.activate(&source, KeyAssignment::Explicit(SubscriberKey::new(1)), &ctx);
        render_text(&mut view, 0, &ctx);

        view.teardown();
        assert_eq!(view.state(), BindingState::Destroyed);
        assert_eq!(source.subscriber_count(), 0);
        assert_eq!(render_text(&mut view, 0, &ctx), "");

        source.publish(1);
        assert_eq!(view.notifications(), 0);
        assert_eq!(
            view.activate(&source, KeyAssignment::Allocate, &ctx),
            None
        );
    }

    #[test]
    fn drop_removes_entry() {
        let ctx = AppContext::new();
        let source = BroadcastSource::new(0u64);
        {
            let mut view = BoundView::new(0u64, counting_view());
            view.activate(&source, KeyAssignment::Allocate, &ctx);
            assert_eq!(source.subscriber_count(), 1);
        }
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn shared_source_notifies_both_keys() {
        let ctx = AppContext::new();
        let source = BroadcastSource::new(0u64);
        let mut one = BoundView::new(0u64, counting_view());
        let mut two = BoundView::new(0u64, counting_view());
        let mut bystander = BoundView::new(0u64, counting_view());
        let other = BroadcastSource::new(0u64);
        one.activate(&source, KeyAssignment::Explicit(SubscriberKey::new(1)), &ctx);
        two.activate(&source, KeyAssignment::Explicit(SubscriberKey::new(2)), &ctx);
        bystander.activate(&other, KeyAssignment::Explicit(SubscriberKey::new(3)), &ctx);
        for view in [&mut one, &mut two, &mut bystander] {
            render_text(view, 0, &ctx);
        }

        source.publish(5);
        for view in [&mut one, &mut two, &mut bystander] {
            render_text(view, 5, &ctx);
        }

        assert_eq!(one.last_value(), 5);
        assert_eq!(two.last_value(), 5);
        let count = |id| ctx.renders().get(CounterKey::Subscriber(SubscriberKey::new(id)));
        assert_eq!(count(1), 2);
        assert_eq!(count(2), 2);
        assert_eq!(count(3), 1);
    }
}

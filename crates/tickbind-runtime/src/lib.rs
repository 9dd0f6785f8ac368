#![forbid(unsafe_code)]

//! Runtime: keyed value broadcast, selective view bindings, and a
//! cooperative timer-driven program loop.
//!
//! # Role in tickbind
//! `tickbind-runtime` lets a root view own values whose changes refresh only
//! the child views that subscribed to them. The demo crate builds its
//! tick/tock application on top of these pieces.
//!
//! # Primary responsibilities
//! - **BroadcastSource**: value plus keyed subscriber registry, notify-then-commit.
//! - **BoundView**: registration point isolating a child view's refresh.
//! - **AppContext**: instance-scoped key allocator, render counters, alternator.
//! - **Program**: Elm-style update/view loop over single-shot timers.
//!
//! # How it fits in the system
//! Everything runs on one thread. Timers never preempt: they only decide
//! when the next message is delivered to the model.

pub mod context;
pub mod frame;
pub mod presenter;
pub mod program;
pub mod reactive;
pub mod timer;

pub use context::{Alternator, AppContext, CounterKey, RenderCounter};
pub use frame::Frame;
pub use presenter::{Presenter, ScreenMode};
pub use program::{Cmd, Model, Program, ProgramConfig};
pub use reactive::{
    BindingState, BoundProps, BoundView, BroadcastSource, Downstream, KeyAllocator, KeyAssignment,
    RefreshPolicy, Registration, SubscriberKey,
};
pub use timer::{Clock, ManualClock, SystemClock, TimerId, TimerQueue};

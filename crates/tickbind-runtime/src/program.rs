#![forbid(unsafe_code)]

//! Elm-style program loop driven by single-shot timers.
//!
//! The program owns a [`Model`], a [`TimerQueue`] and a [`Presenter`]. Each
//! step waits for the next timer deadline, delivers every due message to
//! [`Model::update`], and re-renders if anything changed. All work happens
//! on the calling thread; timers only decide *when* the next message runs.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use tickbind_runtime::frame::Frame;
//! use tickbind_runtime::program::{Cmd, Model, Program, ProgramConfig};
//!
//! struct Countdown(u32);
//!
//! impl Model for Countdown {
//!     type Message = ();
//!
//!     fn init(&mut self) -> Cmd<()> {
//!         Cmd::after(Duration::from_secs(1), ())
//!     }
//!
//!     fn update(&mut self, _: ()) -> Cmd<()> {
//!         self.0 -= 1;
//!         if self.0 == 0 { Cmd::quit() } else { Cmd::after(Duration::from_secs(1), ()) }
//!     }
//!
//!     fn view(&mut self, frame: &mut Frame) {
//!         frame.push_line(format!("{} left", self.0));
//!     }
//! }
//!
//! Program::new(Countdown(3)).run()?;
//! ```
//!
//! # Teardown
//!
//! When the loop stops (quit, exit deadline, or nothing left to wait for) or
//! the program is dropped, every pending timer is cancelled before
//! [`Model::teardown`] runs, so no message reaches a torn-down model.

use std::io::{self, Stdout, Write};
use std::time::Duration;

use tracing::{debug, debug_span, info, info_span};

use crate::frame::Frame;
use crate::presenter::{Presenter, ScreenMode};
use crate::timer::{Clock, SystemClock, TimerId, TimerQueue};

/// Application state and behavior.
pub trait Model: Sized {
    /// Messages delivered by timers and [`Cmd::Msg`].
    type Message: 'static;

    /// Startup commands. Called once before the first render.
    fn init(&mut self) -> Cmd<Self::Message> {
        Cmd::none()
    }

    /// Core state transition.
    fn update(&mut self, msg: Self::Message) -> Cmd<Self::Message>;

    /// Render the current state.
    ///
    /// Takes `&mut self` so bound child views can cache their output.
    fn view(&mut self, frame: &mut Frame);

    /// Called once when the program stops, after pending timers have been
    /// cancelled.
    fn teardown(&mut self) {}
}

/// Side effects returned from `init()` and `update()`.
#[derive(Default)]
pub enum Cmd<M> {
    /// No operation.
    #[default]
    None,
    /// Stop the program after the current step.
    Quit,
    /// Execute commands in order.
    Batch(Vec<Cmd<M>>),
    /// Deliver a message immediately.
    Msg(M),
    /// Deliver a message once, after a delay.
    After(Duration, M),
}

impl<M: std::fmt::Debug> std::fmt::Debug for Cmd<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Quit => write!(f, "Quit"),
            Self::Batch(cmds) => f.debug_tuple("Batch").field(cmds).finish(),
            Self::Msg(m) => f.debug_tuple("Msg").field(m).finish(),
            Self::After(d, m) => f.debug_tuple("After").field(d).field(m).finish(),
        }
    }
}

impl<M> Cmd<M> {
    #[inline]
    pub fn none() -> Self {
        Self::None
    }

    #[inline]
    pub fn quit() -> Self {
        Self::Quit
    }

    #[inline]
    pub fn msg(m: M) -> Self {
        Self::Msg(m)
    }

    /// Arm a single-shot timer delivering `m` after `delay`.
    #[inline]
    pub fn after(delay: Duration, m: M) -> Self {
        Self::After(delay, m)
    }

    /// Create a batch of commands.
    pub fn batch(mut cmds: Vec<Self>) -> Self {
        if cmds.len() > 1 {
            return Self::Batch(cmds);
        }
        cmds.pop().unwrap_or(Self::None)
    }
}

/// Configuration for the program runtime.
#[derive(Debug, Clone, Default)]
pub struct ProgramConfig {
    /// How frames share the output.
    pub screen_mode: ScreenMode,
    /// Stop once this much program time has elapsed.
    pub exit_after: Option<Duration>,
}

impl ProgramConfig {
    pub fn with_screen_mode(mut self, mode: ScreenMode) -> Self {
        self.screen_mode = mode;
        self
    }

    pub fn with_exit_after(mut self, limit: Duration) -> Self {
        self.exit_after = Some(limit);
        self
    }
}

/// The program runtime that manages the update/view loop.
pub struct Program<M: Model, W: Write = Stdout, C: Clock = SystemClock> {
    model: M,
    presenter: Presenter<W>,
    timers: TimerQueue<M::Message>,
    clock: C,
    exit_after: Option<Duration>,
    started: bool,
    running: bool,
    dirty: bool,
    torn_down: bool,
    updates: u64,
}

impl<M: Model> Program<M, Stdout, SystemClock> {
    /// Program writing to stdout on the wall clock.
    pub fn new(model: M) -> Self {
        Self::with_config(model, ProgramConfig::default())
    }

    pub fn with_config(model: M, config: ProgramConfig) -> Self {
        Self::with_parts(model, config, io::stdout(), SystemClock::new())
    }
}

impl<M: Model, W: Write, C: Clock> Program<M, W, C> {
    /// Program with an explicit output and clock.
    pub fn with_parts(model: M, config: ProgramConfig, out: W, clock: C) -> Self {
        Self {
            model,
            presenter: Presenter::new(out, config.screen_mode),
            timers: TimerQueue::new(),
            clock,
            exit_after: config.exit_after,
            started: false,
            running: true,
            dirty: true,
            torn_down: false,
            updates: 0,
        }
    }

    /// Run until the model quits, the exit deadline passes, or no timer is
    /// left to wait for.
    pub fn run(&mut self) -> io::Result<()> {
        let _run_span = info_span!("program_run").entered();
        while self.step()? {}
        info!(updates = self.updates, "program stopped");
        Ok(())
    }

    /// Wait for the next deadline, deliver due messages and render.
    ///
    /// Returns `false` once the program has stopped.
    pub fn step(&mut self) -> io::Result<bool> {
        self.start()?;
        if !self.running {
            self.shutdown();
            return Ok(false);
        }

        let deadline = match (self.timers.next_deadline(), self.exit_after) {
            (Some(timer), Some(limit)) => Some(timer.min(limit)),
            (timer, None) => timer,
            (None, limit) => limit,
        };
        let Some(deadline) = deadline else {
            info!("no pending timers, stopping");
            self.running = false;
            self.shutdown();
            return Ok(false);
        };

        self.clock.sleep_until(deadline);
        let now = self.clock.now();

        while self.running {
            let Some((id, msg)) = self.timers.pop_due(now) else {
                break;
            };
            debug!(timer = id.get(), now_ms = now.as_millis() as u64, "timer fired");
            self.dispatch(msg);
        }

        if self.exit_after.is_some_and(|limit| now >= limit) {
            info!(now_ms = now.as_millis() as u64, "exit deadline reached");
            self.running = false;
        }

        if self.dirty {
            self.render_frame()?;
        }

        if !self.running {
            self.shutdown();
            return Ok(false);
        }
        Ok(true)
    }

    /// Deliver `msg` to the model now, outside any timer.
    pub fn send(&mut self, msg: M::Message) -> io::Result<()> {
        self.start()?;
        if !self.running {
            return Ok(());
        }
        self.dispatch(msg);
        if self.dirty {
            self.render_frame()?;
        }
        Ok(())
    }

    fn start(&mut self) -> io::Result<()> {
        if self.started {
            return Ok(());
        }
        self.started = true;
        let cmd = self.model.init();
        self.execute_cmd(cmd);
        self.render_frame()
    }

    fn dispatch(&mut self, msg: M::Message) {
        let cmd = self.model.update(msg);
        self.updates += 1;
        self.dirty = true;
        self.execute_cmd(cmd);
    }

    fn execute_cmd(&mut self, cmd: Cmd<M::Message>) {
        match cmd {
            Cmd::None => {}
            Cmd::Quit => self.running = false,
            Cmd::Msg(m) => self.dispatch(m),
            Cmd::Batch(cmds) => {
                for c in cmds {
                    self.execute_cmd(c);
                }
            }
            Cmd::After(delay, m) => {
                self.schedule(delay, m);
            }
        }
    }

    /// Arm a single-shot timer delivering `msg` after `delay`.
    pub fn schedule(&mut self, delay: Duration, msg: M::Message) -> TimerId {
        let deadline = self.clock.now() + delay;
        let id = self.timers.schedule_at(deadline, msg);
        debug!(
            timer = id.get(),
            deadline_ms = deadline.as_millis() as u64,
            "timer armed"
        );
        id
    }

    fn render_frame(&mut self) -> io::Result<()> {
        let mut frame = Frame::new();
        {
            let _view_span = debug_span!("model_view").entered();
            self.model.view(&mut frame);
        }
        self.presenter.present(&frame)?;
        self.dirty = false;
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.running = false;
        let cancelled = self.timers.cancel_all();
        debug!(cancelled, "pending timers cancelled");
        self.model.teardown();
    }

    /// Disarm one timer. Returns whether it was still pending.
    pub fn cancel_timer(&mut self, id: TimerId) -> bool {
        self.timers.cancel(id).is_some()
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Program time.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Messages delivered to the model so far.
    pub fn updates(&self) -> u64 {
        self.updates
    }

    pub fn presenter(&self) -> &Presenter<W> {
        &self.presenter
    }

    /// Request a quit; the next step tears the program down.
    pub fn quit(&mut self) {
        self.running = false;
    }
}

impl<M: Model, W: Write, C: Clock> Drop for Program<M, W, C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

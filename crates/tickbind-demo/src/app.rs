#![forbid(unsafe_code)]

//! The tick/tock application model.
//!
//! The root owns two [`BroadcastSource`]s. Two children subscribe to the tick
//! source and one to the tock source; each child is wrapped in an isolated
//! [`BoundView`], so a publish re-evaluates only the children registered on
//! that source while the root itself re-renders on every firing.
//!
//! A single-shot timer drives the loop. Each firing advances the shared
//! alternator: odd turns publish `tock + 1`, even turns publish `tick + 1`,
//! so the very first firing goes to tock.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tickbind_runtime::context::{AppContext, CounterKey};
use tickbind_runtime::frame::Frame;
use tickbind_runtime::program::{Cmd, Model};
use tickbind_runtime::reactive::{
    BoundProps, BoundView, BroadcastSource, Downstream, KeyAssignment, SubscriberKey,
};
use tracing::{debug, info, warn};

use crate::jsonl::{Channel, FireRecord, JsonlSink};

/// Default delay between firings.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(2000);

/// How the children obtain their subscriber keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyMode {
    /// Fixed ids 1, 2 and 3.
    #[default]
    Explicit,
    /// Drawn from the context's allocator.
    Allocated,
}

impl KeyMode {
    /// Case-insensitive lookup of `explicit` / `allocated`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "explicit" => Some(Self::Explicit),
            "allocated" => Some(Self::Allocated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Msg {
    /// The single-shot timer fired.
    Fire,
}

// ---------------------------------------------------------------------------
// Children
// ---------------------------------------------------------------------------

/// Child view reporting the value it received and how often it ran.
#[derive(Debug, Clone, Copy)]
pub struct Ticker {
    noun: &'static str,
}

impl Ticker {
    pub const fn new(noun: &'static str) -> Self {
        Self { noun }
    }
}

impl Downstream<u64> for Ticker {
    fn render(&mut self, props: &BoundProps<'_, u64>, frame: &mut Frame) {
        let calls = props.ctx.renders().bump(CounterKey::Subscriber(props.key));
        frame.push_line(format!(
            "{} #{} received. I've been called {calls} times.",
            self.noun, props.value
        ));
    }
}

struct Child {
    label: &'static str,
    channel: Channel,
    explicit_key: SubscriberKey,
    view: BoundView<u64, Ticker>,
}

impl Child {
    fn new(label: &'static str, channel: Channel, id: u64) -> Self {
        let noun = match channel {
            Channel::Tick => "Tick",
            Channel::Tock => "Tock",
        };
        Self {
            label,
            channel,
            explicit_key: SubscriberKey::new(id),
            view: BoundView::new(0, Ticker::new(noun)),
        }
    }
}

// ---------------------------------------------------------------------------
// Root model
// ---------------------------------------------------------------------------

/// Root of the demo view tree.
pub struct TickTockApp {
    ctx: AppContext,
    tick: BroadcastSource<u64>,
    tock: BroadcastSource<u64>,
    children: Vec<Child>,
    interval: Duration,
    key_mode: KeyMode,
    max_fires: u64,
    fires: u64,
    changes: Rc<RefCell<Vec<(Channel, u64)>>>,
    jsonl: Option<JsonlSink>,
}

impl Default for TickTockApp {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

impl TickTockApp {
    /// App firing every `interval`, running until stopped from outside.
    pub fn new(interval: Duration) -> Self {
        let tick = BroadcastSource::new(0u64);
        let tock = BroadcastSource::new(0u64);
        let changes = Rc::new(RefCell::new(Vec::new()));

        for (channel, source) in [(Channel::Tick, &tick), (Channel::Tock, &tock)] {
            let log = Rc::clone(&changes);
            source.set_commit_hook(move |value: &u64| {
                debug!(%channel, value, "state committed");
                log.borrow_mut().push((channel, *value));
            });
        }

        Self {
            ctx: AppContext::new(),
            tick,
            tock,
            children: vec![
                Child::new("Ticker (Child)", Channel::Tick, 1),
                Child::new("Ticker (Child 2)", Channel::Tick, 2),
                Child::new("Tocker (Child)", Channel::Tock, 3),
            ],
            interval,
            key_mode: KeyMode::Explicit,
            max_fires: 0,
            fires: 0,
            changes,
            jsonl: None,
        }
    }

    /// Quit after `n` firings; 0 runs forever.
    #[must_use]
    pub fn with_max_fires(mut self, n: u64) -> Self {
        self.max_fires = n;
        self
    }

    #[must_use]
    pub fn with_key_mode(mut self, mode: KeyMode) -> Self {
        self.key_mode = mode;
        self
    }

    /// Record every firing to `sink`.
    #[must_use]
    pub fn with_jsonl(mut self, sink: JsonlSink) -> Self {
        self.jsonl = Some(sink);
        self
    }

    pub fn ctx(&self) -> &AppContext {
        &self.ctx
    }

    pub fn tick(&self) -> &BroadcastSource<u64> {
        &self.tick
    }

    pub fn tock(&self) -> &BroadcastSource<u64> {
        &self.tock
    }

    /// Firings handled so far.
    pub fn fires(&self) -> u64 {
        self.fires
    }

    /// Committed `(channel, value)` changes in chronological order.
    pub fn changes(&self) -> Vec<(Channel, u64)> {
        self.changes.borrow().clone()
    }

    /// Keys of the children in display order (`None` before mount).
    pub fn child_keys(&self) -> Vec<Option<SubscriberKey>> {
        self.children.iter().map(|c| c.view.key()).collect()
    }

    /// Times the child at `index` evaluated its view.
    pub fn child_evaluations(&self, index: usize) -> Option<u64> {
        self.children.get(index).map(|c| c.view.evaluations())
    }

    fn source(&self, channel: Channel) -> &BroadcastSource<u64> {
        match channel {
            Channel::Tick => &self.tick,
            Channel::Tock => &self.tock,
        }
    }

    fn mount(&mut self) {
        for child in &mut self.children {
            let assignment = match self.key_mode {
                KeyMode::Explicit => KeyAssignment::Explicit(child.explicit_key),
                KeyMode::Allocated => KeyAssignment::Allocate,
            };
            let source = match child.channel {
                Channel::Tick => &self.tick,
                Channel::Tock => &self.tock,
            };
            let key = child.view.activate(source, assignment, &self.ctx);
            debug!(label = child.label, key = ?key, "child mounted");
        }
    }

    fn record(&mut self, channel: Channel, value: u64) {
        let Some(sink) = self.jsonl.as_mut() else {
            return;
        };
        let record = FireRecord {
            fire: self.fires,
            channel,
            value,
            tick: self.tick.get(),
            tock: self.tock.get(),
        };
        if let Err(err) = sink.write(&record) {
            warn!(%err, "fire record dropped");
        }
    }
}

impl Model for TickTockApp {
    type Message = Msg;

    fn init(&mut self) -> Cmd<Msg> {
        self.mount();
        info!(
            interval_ms = self.interval.as_millis() as u64,
            max_fires = self.max_fires,
            keys = ?self.key_mode,
            "tick/tock started"
        );
        Cmd::after(self.interval, Msg::Fire)
    }

    fn update(&mut self, msg: Msg) -> Cmd<Msg> {
        match msg {
            Msg::Fire => {
                self.fires += 1;
                let turn = self.ctx.alternator().advance();
                let channel = if turn % 2 == 1 {
                    Channel::Tock
                } else {
                    Channel::Tick
                };
                let source = self.source(channel);
                let value = source.get() + 1;
                info!(fire = self.fires, %channel, value, "publishing");
                source.publish(value);
                self.record(channel, value);

                if self.max_fires != 0 && self.fires >= self.max_fires {
                    info!(fires = self.fires, "fire limit reached");
                    Cmd::quit()
                } else {
                    Cmd::after(self.interval, Msg::Fire)
                }
            }
        }
    }

    fn view(&mut self, frame: &mut Frame) {
        let calls = self.ctx.renders().bump(CounterKey::Root);
        for child in &mut self.children {
            frame.push_line(child.label);
            let ancestor = match child.channel {
                Channel::Tick => self.tick.get(),
                Channel::Tock => self.tock.get(),
            };
            child.view.render(&ancestor, &self.ctx, frame);
        }
        frame.push_line("Parent");
        frame.push_line(format!("I've been called {calls} times."));
    }

    fn teardown(&mut self) {
        for child in &mut self.children {
            child.view.teardown();
        }
        self.tick.clear_commit_hook();
        self.tock.clear_commit_hook();
        debug!(fires = self.fires, "tick/tock torn down");
    }
}

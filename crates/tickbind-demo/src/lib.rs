#![forbid(unsafe_code)]

//! tickbind tick/tock demo library.
//!
//! Exposes the application model so integration tests can drive it on a
//! manual clock and assert frames, counters and the fire log.
//!
//! # How it fits in the system
//! The demo is the consumer of `tickbind-runtime`: one root, two broadcast
//! sources, three bound children and a single re-armed timer.

pub mod app;
pub mod cli;
pub mod jsonl;
pub mod logging;

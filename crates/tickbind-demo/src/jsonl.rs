#![forbid(unsafe_code)]

//! JSONL fire log: one JSON object per timer firing.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

/// Which source a firing published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Tick,
    Tock,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tick => "tick",
            Self::Tock => "tock",
        })
    }
}

/// One timer firing and the state it left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FireRecord {
    /// 1-based firing number.
    pub fire: u64,
    pub channel: Channel,
    /// Value published on `channel`.
    pub value: u64,
    /// Committed tick value after the firing.
    pub tick: u64,
    /// Committed tock value after the firing.
    pub tock: u64,
}

#[derive(Debug)]
pub enum JsonlError {
    Io(io::Error),
    Encode(serde_json::Error),
}

impl fmt::Display for JsonlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "jsonl write failed: {err}"),
            Self::Encode(err) => write!(f, "jsonl encode failed: {err}"),
        }
    }
}

impl std::error::Error for JsonlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Encode(err) => Some(err),
        }
    }
}

impl From<io::Error> for JsonlError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for JsonlError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encode(err)
    }
}

enum Target {
    File(BufWriter<File>),
    Stderr,
}

/// Line-oriented JSON writer.
pub struct JsonlSink {
    target: Target,
    written: u64,
}

impl fmt::Debug for JsonlSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match self.target {
            Target::File(_) => "file",
            Target::Stderr => "stderr",
        };
        f.debug_struct("JsonlSink")
            .field("target", &target)
            .field("written", &self.written)
            .finish()
    }
}

impl JsonlSink {
    /// Open `spec` for appending; `-` selects stderr.
    pub fn open(spec: &str) -> Result<Self, JsonlError> {
        if spec == "-" {
            return Ok(Self::stderr());
        }
        Self::open_path(spec)
    }

    pub fn open_path(path: impl AsRef<Path>) -> Result<Self, JsonlError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            target: Target::File(BufWriter::new(file)),
            written: 0,
        })
    }

    pub fn stderr() -> Self {
        Self {
            target: Target::Stderr,
            written: 0,
        }
    }

    /// Serialize `record` as one line and flush it.
    pub fn write<R: Serialize>(&mut self, record: &R) -> Result<(), JsonlError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        match &mut self.target {
            Target::File(out) => {
                out.write_all(line.as_bytes())?;
                out.flush()?;
            }
            Target::Stderr => {
                let mut err = io::stderr().lock();
                err.write_all(line.as_bytes())?;
                err.flush()?;
            }
        }
        self.written += 1;
        Ok(())
    }

    /// Records written so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

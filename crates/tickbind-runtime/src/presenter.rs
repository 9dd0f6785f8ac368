#![forbid(unsafe_code)]

//! Writes rendered frames to an output stream.

use std::io::{self, Write};

use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};

use crate::frame::Frame;

/// How successive frames share the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScreenMode {
    /// Clear the screen and repaint from the top-left corner.
    #[default]
    Redraw,
    /// Write each frame after the previous one, separated by a blank line.
    Append,
}

/// Frame presenter. Identical consecutive frames are written once.
#[derive(Debug)]
pub struct Presenter<W: Write> {
    out: W,
    mode: ScreenMode,
    last: Option<Frame>,
    presented: u64,
}

impl<W: Write> Presenter<W> {
    pub fn new(out: W, mode: ScreenMode) -> Self {
        Self {
            out,
            mode,
            last: None,
            presented: 0,
        }
    }

    /// Write `frame` unless it matches the last presented one.
    ///
    /// Returns whether anything was written.
    pub fn present(&mut self, frame: &Frame) -> io::Result<bool> {
        if self.last.as_ref() == Some(frame) {
            return Ok(false);
        }

        match self.mode {
            ScreenMode::Redraw => queue!(self.out, MoveTo(0, 0), Clear(ClearType::All))?,
            ScreenMode::Append => {
                if self.presented > 0 {
                    writeln!(self.out)?;
                }
            }
        }
        for line in frame.lines() {
            writeln!(self.out, "{line}")?;
        }
        self.out.flush()?;

        self.last = Some(frame.clone());
        self.presented += 1;
        Ok(true)
    }

    /// Frames written so far.
    #[must_use]
    pub fn presented(&self) -> u64 {
        self.presented
    }

    #[must_use]
    pub fn mode(&self) -> ScreenMode {
        self.mode
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

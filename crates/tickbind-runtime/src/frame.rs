#![forbid(unsafe_code)]

//! Line-oriented render target.

/// The output of one view pass: an ordered list of text lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    lines: Vec<String>,
}

impl Frame {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line.
    pub fn push_line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Append previously rendered lines.
    pub fn extend_from_slice(&mut self, lines: &[String]) {
        self.lines.extend_from_slice(lines);
    }

    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    #[must_use]
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines joined with `\n`, no trailing newline.
    #[must_use]
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

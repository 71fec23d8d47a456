//! Percent-complete tracking from git progress output

use std::sync::LazyLock;

use regex::Regex;

/// Only the local transfer phases count; the remote's counting and
/// compressing phases reach 100% before any data arrives.
static PERCENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[Rr]eceiving objects|[Rr]esolving deltas|Updating files).*?(\d{1,3})%")
        .expect("valid regex")
});

/// Highest percentage seen so far, capped at 100.
///
/// Receiving, resolving and checkout phases each restart at 0%; the tracker
/// never moves backwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressTracker {
    best: u8,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one output line. Returns the current percentage when the line
    /// reported progress of a tracked phase.
    pub fn observe(&mut self, line: &str) -> Option<u8> {
        let caps = PERCENT_RE.captures(line)?;
        let value: u16 = caps[1].parse().ok()?;
        let value = value.min(100) as u8;
        self.best = self.best.max(value);
        Some(self.best)
    }

    pub fn percent(&self) -> u8 {
        self.best
    }
}

/// Split raw process output into lines, treating `\r` like `\n`.
pub fn split_progress_lines(chunk: &str) -> impl Iterator<Item = &str> {
    chunk
        .split(['\r', '\n'])
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
}

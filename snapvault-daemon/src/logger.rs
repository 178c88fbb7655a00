//! Leveled log output for the daemon.
//!
//! Commands and the copy runner log through the [`Logger`] trait so tests can
//! capture what an operator would see. [`StderrLogger`] prefixes each line
//! with an RFC 3339 UTC timestamp and the level.

use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};

/// Message level, ordered from always shown to most detailed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Warn,
    Info,
    /// Shown with `-v`; copy tool output lives here.
    Verbose,
    /// Shown with `-vv`.
    Debug,
}

impl Level {
    /// Most detailed level shown for a repeated `-v` flag.
    pub fn from_flag_count(count: u8) -> Self {
        match count {
            0 => Level::Info,
            1 => Level::Verbose,
            _ => Level::Debug,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Verbose => "VERB",
            Level::Debug => "DEBUG",
        }
    }
}

/// Sink for daemon log lines.
///
/// Shared between the controller and the copy tool's output drain task.
pub trait Logger: Send + Sync {
    fn record(&self, level: Level, message: &str);

    /// Whether messages at `level` would be kept.
    fn enabled(&self, _level: Level) -> bool {
        true
    }

    fn warn(&self, message: &str) {
        self.record(Level::Warn, message);
    }

    fn info(&self, message: &str) {
        self.record(Level::Info, message);
    }

    fn verbose(&self, message: &str) {
        self.record(Level::Verbose, message);
    }

    fn debug(&self, message: &str) {
        self.record(Level::Debug, message);
    }
}

impl<L: Logger + ?Sized> Logger for Arc<L> {
    fn record(&self, level: Level, message: &str) {
        (**self).record(level, message);
    }

    fn enabled(&self, level: Level) -> bool {
        (**self).enabled(level)
    }
}

/// `<timestamp> <LEVEL> <message>`, with the level padded to one width.
pub fn format_line(timestamp: &str, level: Level, message: &str) -> String {
    format!("{} {:<5} {}", timestamp, level.as_str(), message)
}

/// Writes lines up to a maximum level to stderr.
#[derive(Debug, Clone, Copy)]
pub struct StderrLogger {
    max: Level,
}

impl StderrLogger {
    pub fn new(max: Level) -> Self {
        Self { max }
    }
}

impl Logger for StderrLogger {
    fn record(&self, level: Level, message: &str) {
        if !self.enabled(level) {
            return;
        }
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let _ = writeln!(std::io::stderr().lock(), "{}", format_line(&now, level, message));
    }

    fn enabled(&self, level: Level) -> bool {
        level <= self.max
    }
}

/// Captures every line regardless of level. Clones share one buffer.
#[derive(Debug, Clone, Default)]
pub struct MockLogger {
    lines: Arc<Mutex<Vec<(Level, String)>>>,
}

impl MockLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every captured line with its level, oldest first.
    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines.lock().unwrap().clone()
    }

    /// Captured messages at exactly `level`.
    pub fn at(&self, level: Level) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }

    /// Whether any captured message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().unwrap().iter().any(|(_, m)| m.contains(needle))
    }
}

impl Logger for MockLogger {
    fn record(&self, level: Level, message: &str) {
        self.lines.lock().unwrap().push((level, message.to_string()));
    }
}

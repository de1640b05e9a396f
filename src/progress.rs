//! Progress, log events and cooperative cancellation
//!
//! Engines never print. They push [`Event`]s through a [`Reporter`], which
//! mirrors every log line into `tracing` and optionally forwards it to a
//! channel owned by whoever drives the operation.

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// Shared flag polled between units of work
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the operation holding this token
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Severity of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    /// A block was refused because it would write outside the output directory
    Security,
}

/// A single log line emitted during an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: LogLevel,
    pub message: String,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            LogLevel::Info => write!(f, "{}", self.message),
            LogLevel::Warning => write!(f, "Warning: {}", self.message),
            LogLevel::Error => write!(f, "Error: {}", self.message),
            LogLevel::Security => write!(f, "Security: {}", self.message),
        }
    }
}

/// Terminal state of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failed,
    Cancelled,
}

/// Final result delivered to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub status: Status,
    pub message: String,
    /// The merged artifact when the merge targeted memory
    pub merged_text: Option<String>,
}

impl Outcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self { status: Status::Success, message: message.into(), merged_text: None }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { status: Status::Failed, message: message.into(), merged_text: None }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self { status: Status::Cancelled, message: message.into(), merged_text: None }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

/// Notification sent from a running operation to its caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Percentage in `0..=100`, never decreasing within one operation
    Progress(u8),
    Log(LogLine),
    Finished(Outcome),
}

/// Sink for the events of one operation
///
/// Owned by the worker for the lifetime of the operation. Sends to a
/// disconnected receiver are dropped silently so a caller that stopped
/// listening cannot stall the work.
#[derive(Debug, Default)]
pub struct Reporter {
    events: Option<Sender<Event>>,
    cancel: CancelToken,
    last_percent: Cell<Option<u8>>,
}

impl Reporter {
    /// A reporter that only logs through `tracing`
    pub fn new(cancel: CancelToken) -> Self {
        Self { events: None, cancel, last_percent: Cell::new(None) }
    }

    /// A reporter that also forwards events to `events`
    pub fn with_events(cancel: CancelToken, events: Sender<Event>) -> Self {
        Self { events: Some(events), cancel, last_percent: Cell::new(None) }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        self.send_log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.send_log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{message}");
        self.send_log(LogLevel::Error, message);
    }

    pub fn security(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(security = true, "{message}");
        self.send_log(LogLevel::Security, message);
    }

    /// Report progress, dropping values that would move backwards
    pub fn progress(&self, percent: u8) {
        let percent = percent.min(100);
        if let Some(last) = self.last_percent.get() {
            if percent <= last {
                return;
            }
        }
        self.last_percent.set(Some(percent));
        tracing::debug!(percent, "progress");
        self.send(Event::Progress(percent));
    }

    /// Report `done` out of `total` as a percentage
    pub fn progress_ratio(&self, done: u64, total: u64) {
        self.progress(percent(done, total));
    }

    pub fn finish(&self, outcome: Outcome) {
        match outcome.status {
            Status::Success => tracing::info!("{}", outcome.message),
            Status::Failed => tracing::error!("{}", outcome.message),
            Status::Cancelled => tracing::warn!("{}", outcome.message),
        }
        self.send(Event::Finished(outcome));
    }

    fn send_log(&self, level: LogLevel, message: String) {
        self.send(Event::Log(LogLine { level, message }));
    }

    fn send(&self, event: Event) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

/// `done / total` as a whole percentage, clamped to 100
pub fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let scaled = (u128::from(done) * 100) / u128::from(total);
    scaled.min(100) as u8
}

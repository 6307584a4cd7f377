//! Progress reporting for report actions.
//!
//! Actions never print. Every step they take (or would take in dry-run mode) is pushed to a
//! [`ProgressSink`] supplied by the caller, which decides where it goes: the log, a terminal,
//! a channel feeding a UI, or an in-memory buffer.

use std::sync::mpsc;

use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { action: String, dry_run: bool },
    Step { action: String, message: String },
    Finished { action: String, changed: bool },
    Skipped { action: String, reason: String },
}

impl ProgressEvent {
    pub fn action(&self) -> &str {
        match self {
            ProgressEvent::Started { action, .. }
            | ProgressEvent::Step { action, .. }
            | ProgressEvent::Finished { action, .. }
            | ProgressEvent::Skipped { action, .. } => action,
        }
    }
}

/// Consumer of [`ProgressEvent`]s.
pub trait ProgressSink {
    fn emit(&mut self, event: ProgressEvent);
}

impl<S: ProgressSink + ?Sized> ProgressSink for &mut S {
    fn emit(&mut self, event: ProgressEvent) {
        (**self).emit(event)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&mut self, _event: ProgressEvent) {}
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn emit(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { action, dry_run } => {
                if dry_run {
                    log::info!("{action}: started (dry run)");
                } else {
                    log::info!("{action}: started");
                }
            }
            ProgressEvent::Step { action, message } => log::info!("{action}: {message}"),
            ProgressEvent::Finished { action, changed } => {
                log::info!("{action}: finished (changed: {changed})")
            }
            ProgressEvent::Skipped { action, reason } => log::warn!("{action}: skipped ({reason})"),
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct CollectSink {
    events: Vec<ProgressEvent>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[ProgressEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<ProgressEvent> {
        self.events
    }

    /// Step messages only, in emission order.
    pub fn messages(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ProgressEvent::Step { message, .. } => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for CollectSink {
    fn emit(&mut self, event: ProgressEvent) {
        self.events.push(event);
    }
}

/// Streams events over a channel. A disconnected receiver drops events silently.
impl ProgressSink for mpsc::Sender<ProgressEvent> {
    fn emit(&mut self, event: ProgressEvent) {
        let _ = self.send(event);
    }
}

/// Outcome of a single action run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ActionReport {
    pub action: String,
    pub changed: bool,
    pub details: Vec<String>,
}

/// Book-keeping shared by every action: records details and mirrors them to the sink.
pub(crate) struct ActionRun<'s> {
    action: &'static str,
    dry_run: bool,
    sink: &'s mut dyn ProgressSink,
    details: Vec<String>,
}

impl<'s> ActionRun<'s> {
    pub(crate) fn start(
        action: &'static str,
        dry_run: bool,
        sink: &'s mut dyn ProgressSink,
    ) -> Self {
        sink.emit(ProgressEvent::Started {
            action: action.to_string(),
            dry_run,
        });
        Self {
            action,
            dry_run,
            sink,
            details: Vec::new(),
        }
    }

    pub(crate) fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Pick the past-tense wording for live runs and the conditional one for dry runs.
    pub(crate) fn verb(&self, done: &'static str, planned: &'static str) -> &'static str {
        if self.dry_run {
            planned
        } else {
            done
        }
    }

    pub(crate) fn step(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.sink.emit(ProgressEvent::Step {
            action: self.action.to_string(),
            message: message.clone(),
        });
        self.details.push(message);
    }

    /// Debug-level message that is not a change detail.
    pub(crate) fn note(&mut self, message: impl Into<String>) {
        log::debug!("{}: {}", self.action, message.into());
    }

    pub(crate) fn finish(self, changed: bool) -> ActionReport {
        self.sink.emit(ProgressEvent::Finished {
            action: self.action.to_string(),
            changed,
        });
        ActionReport {
            action: self.action.to_string(),
            changed,
            details: self.details,
        }
    }
}

//! Progress reporting for long-running stages.
//!
//! Stages report human-readable progress through a [`Status`] handle.
//! Messages always go to the log; when a sink is attached they are also
//! appended to it. Sinks are plain thread-safe logs that a presentation
//! layer polls or drains, never direct UI calls.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

/// Receiver of progress messages. Must tolerate calls from worker tasks.
pub trait StatusSink: Send + Sync {
    fn write(&self, message: &str);
}

/// Append-only, mutex-guarded message log.
#[derive(Debug, Default)]
pub struct StatusLog {
    entries: Mutex<Vec<String>>,
}

impl StatusLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all messages written so far.
    pub fn snapshot(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Take all messages written so far, leaving the log empty.
    pub fn drain(&self) -> Vec<String> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *entries)
    }
}

impl StatusSink for StatusLog {
    fn write(&self, message: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message.to_string());
    }
}

/// Terminal spinner showing the latest message.
pub struct SpinnerSink {
    bar: ProgressBar,
}

impl SpinnerSink {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Default for SpinnerSink {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSink for SpinnerSink {
    fn write(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }
}

/// Cheap, cloneable handle passed to every stage.
#[derive(Clone, Default)]
pub struct Status {
    sink: Option<Arc<dyn StatusSink>>,
}

impl Status {
    /// A handle that only logs.
    pub fn silent() -> Self {
        Self { sink: None }
    }

    pub fn with_sink(sink: Arc<dyn StatusSink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// Report a progress message.
    pub fn report(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!("{}", message);
        if let Some(sink) = &self.sink {
            sink.write(message);
        }
    }
}

impl std::fmt::Debug for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Status")
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_collects_and_drains() {
        let log = Arc::new(StatusLog::new());
        let status = Status::with_sink(log.clone());

        status.report("first");
        status.report(String::from("second"));

        assert_eq!(log.snapshot(), vec!["first", "second"]);
        assert_eq!(log.drain().len(), 2);
        assert!(log.snapshot().is_empty());
    }

    #[test]
    fn test_silent_status_does_not_panic() {
        Status::silent().report("nobody listens");
    }

    #[test]
    fn test_concurrent_writes_are_all_kept() {
        let log = Arc::new(StatusLog::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let status = Status::with_sink(log.clone());
                std::thread::spawn(move || {
                    for j in 0..50 {
                        status.report(format!("worker {} message {}", i, j));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(log.snapshot().len(), 400);
    }
}

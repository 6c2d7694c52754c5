//! Advisory progress reporting for directory scans and volume loads.
//!
//! Sinks receive updates but never influence control flow; dropping every
//! update is always acceptable.

use std::io::Write;

/// A sink for advisory progress updates.
pub trait ProgressSink {
    /// A new activity begins, with an expected total amount of work.
    fn start(&mut self, _label: &str, _unit: &str, _total: usize) {}

    /// The activity has progressed to `progress` out of the total.
    fn set_progress(&mut self, _progress: usize) {}

    /// An out-of-band message: warnings and per-file notes.
    fn write(&mut self, _message: &str) {}

    /// The activity finished, with an optional closing message.
    fn finish(&mut self, _message: Option<&str>) {}
}

/// A sink that discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {}

/// A sink that prints updates to standard output.
#[derive(Debug, Default)]
pub struct StdoutProgress {
    label: String,
    total: usize,
}

impl ProgressSink for StdoutProgress {
    fn start(&mut self, label: &str, unit: &str, total: usize) {
        self.label = label.to_string();
        self.total = total;
        if unit.is_empty() {
            println!("{} ...", label);
        } else {
            println!("{} ({} {}) ...", label, total, unit);
        }
    }

    fn set_progress(&mut self, progress: usize) {
        if self.total > 0 {
            print!("\r{}: {}/{}", self.label, progress, self.total);
            let _ = std::io::stdout().flush();
        }
    }

    fn write(&mut self, message: &str) {
        println!("{}", message);
    }

    fn finish(&mut self, message: Option<&str>) {
        match message {
            Some(message) => println!("\n{}", message),
            None => println!(),
        }
    }
}

/// How progress should be reported, as chosen by the caller.
///
/// The conversion from `bool` mirrors the common configuration surface:
/// `true` prints to standard output, `false` keeps quiet.
pub enum Progress {
    /// Print progress to standard output.
    Stdout,
    /// Discard all updates.
    Silent,
    /// Deliver updates to a user-supplied sink.
    Sink(Box<dyn ProgressSink>),
}

impl Progress {
    pub(crate) fn into_sink(self) -> Box<dyn ProgressSink> {
        match self {
            Progress::Stdout => Box::new(StdoutProgress::default()),
            Progress::Silent => Box::new(NullProgress),
            Progress::Sink(sink) => sink,
        }
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Progress::Stdout => f.write_str("Stdout"),
            Progress::Silent => f.write_str("Silent"),
            Progress::Sink(_) => f.write_str("Sink(..)"),
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Progress::Stdout
    }
}

impl From<bool> for Progress {
    fn from(enabled: bool) -> Self {
        if enabled {
            Progress::Stdout
        } else {
            Progress::Silent
        }
    }
}

impl<S: ProgressSink + 'static> From<Box<S>> for Progress {
    fn from(sink: Box<S>) -> Self {
        Progress::Sink(sink)
    }
}

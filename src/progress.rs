//! Progress reporting infrastructure

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::borrow::Cow;

/// CLI progress report of ongoing downloads and example generation
///
/// To avoid corrupted terminal output, you should not write anything to stdout
/// or stderr yourself as long as a report is being displayed. Please use logs
/// for debug messages.
#[derive(Clone, Debug, Default)]
pub struct ProgressReport(MultiProgress);
//
impl ProgressReport {
    /// Prepare to report progress on the cli
    pub fn new() -> Self {
        Self::default()
    }

    /// Progress report that is never displayed
    #[allow(unused)]
    pub fn hidden() -> Self {
        Self(MultiProgress::with_draw_target(ProgressDrawTarget::hidden()))
    }

    /// Prepare to report on a new operation
    ///
    /// The progress bar is displayed until [`ProgressTracker::finish()`] is
    /// called.
    pub fn add(&self, what: impl Into<Cow<'static, str>>, work: Work) -> ProgressTracker {
        let template = match work {
            Work::Steps(Some(_)) => "{prefix} {wide_bar} {pos}/{len} ({per_sec})",
            Work::Steps(None) => "{prefix} {spinner} {pos} ({per_sec})",
            Work::Bytes(Some(_)) => {
                "{prefix} {wide_bar} {decimal_bytes}/{decimal_total_bytes} ({decimal_bytes_per_sec})"
            }
            Work::Bytes(None) => "{prefix} {spinner} {decimal_bytes} ({decimal_bytes_per_sec})",
        };
        let bar = match work.len() {
            Some(len) => ProgressBar::new(len),
            None => ProgressBar::new_spinner(),
        }
        .with_prefix(what.into())
        .with_style(
            ProgressStyle::with_template(template)
                .expect("all styles above should be valid indicatif styles"),
        );
        ProgressTracker {
            bar: self.0.add(bar),
            report: self.0.clone(),
        }
    }
}

/// Work whose progression can be tracked
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Work {
    /// Steps to be taken, if their number is known
    Steps(Option<u64>),

    /// Bytes to be processed, if their number is known
    Bytes(Option<u64>),
}
//
impl Work {
    /// Expected amount of work, if known
    fn len(self) -> Option<u64> {
        match self {
            Work::Steps(len) | Work::Bytes(len) => len,
        }
    }
}

/// Mechanism to track progress
#[derive(Clone, Debug)]
pub struct ProgressTracker {
    /// Progress bar for this specific operation
    bar: ProgressBar,

    /// Underlying process report
    report: MultiProgress,
}
//
impl ProgressTracker {
    /// Show that a certain amount of progress has been made
    pub fn make_progress(&self, progress: u64) {
        self.bar.inc(progress);
    }

    /// Hide the progress bar once the operation is over
    pub fn finish(&self) {
        self.bar.finish_and_clear();
        self.report.remove(&self.bar);
    }
}

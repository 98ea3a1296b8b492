/* Coarse progress reporting for long-running computations */

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Receives milestone updates (0..=100). Implementations must be cheap and thread safe.
pub trait ProgressSink: Send + Sync {
    fn set(&self, percent: u8, message: &str);
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn set(&self, _percent: u8, _message: &str) {}
}

// forward milestones to the log
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn set(&self, percent: u8, message: &str) {
        info!(percent, "{message}");
    }
}

pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template("{spinner} [{elapsed_precise}] [{bar:40}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style.progress_chars("=> "));
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish();
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarProgress {
    fn set(&self, percent: u8, message: &str) {
        self.bar.set_position(u64::from(percent.min(100)));
        self.bar.set_message(message.to_string());
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::ProgressSink;
    use std::sync::Mutex;

    // records every milestone for assertions
    #[derive(Default)]
    pub struct RecordingProgress {
        pub steps: Mutex<Vec<u8>>,
    }

    impl ProgressSink for RecordingProgress {
        fn set(&self, percent: u8, _message: &str) {
            if let Ok(mut steps) = self.steps.lock() {
                steps.push(percent);
            }
        }
    }
}

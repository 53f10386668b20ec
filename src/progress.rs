//! Progress reporting for pagination runs.
//!
//! The paginator only knows the [`ProgressReporter`] capability. A fresh
//! reporter is made per run by a [`ProgressFactory`], given the component
//! name as a label.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tracing::info;

/// Receives totals and increments from a pagination run. Purely observational.
pub trait ProgressReporter: Send {
    /// Called once, on the first successful page
    fn set_total(&mut self, total: u64);

    /// Called after each page with the number of records emitted
    fn advance(&mut self, n: u64);

    /// Called when the run ends cleanly
    fn finish(&mut self) {}
}

/// Builds a reporter for a run over the named component
pub type ProgressFactory = Arc<dyn Fn(&str) -> Box<dyn ProgressReporter> + Send + Sync>;

/// Factory for [`NoProgress`]
pub fn no_progress() -> ProgressFactory {
    Arc::new(|_: &str| -> Box<dyn ProgressReporter> { Box::new(NoProgress) })
}

/// Factory for [`BarProgress`]
pub fn progress_bar() -> ProgressFactory {
    Arc::new(|component: &str| -> Box<dyn ProgressReporter> {
        Box::new(BarProgress::new(component))
    })
}

/// Factory for [`LogProgress`]
pub fn log_progress() -> ProgressFactory {
    Arc::new(|component: &str| -> Box<dyn ProgressReporter> {
        Box::new(LogProgress::new(component))
    })
}

/// Discards everything
#[derive(Debug, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn set_total(&mut self, _total: u64) {}
    fn advance(&mut self, _n: u64) {}
}

/// Terminal progress bar
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    /// Bar labelled with the component name, sized once the total is known
    pub fn new(component: &str) -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template(
            "{msg}: {percent}%|{wide_bar}| {pos}/{len} [{elapsed_precise}<{eta_precise}, {per_sec}]",
        ) {
            bar.set_style(style);
        }
        bar.set_message(component.to_string());
        Self { bar }
    }
}

impl ProgressReporter for BarProgress {
    fn set_total(&mut self, total: u64) {
        self.bar.set_length(total);
    }

    fn advance(&mut self, n: u64) {
        self.bar.inc(n);
    }

    fn finish(&mut self) {
        self.bar.finish();
    }
}

/// Reports through `tracing`, for non-interactive runs
#[derive(Debug)]
pub struct LogProgress {
    component: String,
    total: u64,
    done: u64,
}

impl LogProgress {
    /// Reporter that logs under the component name
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            total: 0,
            done: 0,
        }
    }
}

impl ProgressReporter for LogProgress {
    fn set_total(&mut self, total: u64) {
        self.total = total;
        info!(component = %self.component, total, "Expecting records");
    }

    fn advance(&mut self, n: u64) {
        self.done += n;
        info!(
            component = %self.component,
            done = self.done,
            total = self.total,
            "Progress"
        );
    }

    fn finish(&mut self) {
        info!(component = %self.component, done = self.done, "Finished");
    }
}

//! Progress reporting for long-running commands.

use triad_core::ProgressMonitor;

/// Logs task boundaries at `debug` and keeps a running tick count.
#[derive(Debug, Default)]
pub struct LoggingMonitor {
    task: String,
    total: u32,
    done: u32,
}

impl LoggingMonitor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressMonitor for LoggingMonitor {
    fn begin_task(&mut self, name: &str, total_work: u32) {
        self.task = name.to_string();
        self.total = total_work;
        self.done = 0;
        tracing::debug!(task = name, total = total_work, "task started");
    }

    fn sub_task(&mut self, name: &str) {
        tracing::debug!(task = %self.task, step = name, "working");
    }

    fn worked(&mut self, work: u32) {
        self.done = self.done.saturating_add(work).min(self.total);
    }

    fn is_canceled(&self) -> bool {
        false
    }

    fn done(&mut self) {
        tracing::debug!(task = %self.task, worked = self.done, total = self.total, "task finished");
    }
}

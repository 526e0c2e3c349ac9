use std::io::IsTerminal;

use indicatif::{ProgressBar, ProgressStyle};
use patchvm_core::{TaskContext, TaskMessage};
use tokio_util::sync::CancellationToken;

/// Renders task reports on a terminal progress bar.
///
/// Cancellation is requested through the shared token, which `main` cancels
/// on Ctrl-C.
pub struct TerminalContext {
    bar: ProgressBar,
    cancel: CancellationToken,
}

impl TerminalContext {
    pub fn new(cancel: CancellationToken) -> Self {
        let bar = if std::io::stderr().is_terminal() {
            let bar = ProgressBar::new(0);
            bar.set_style(bar_style());
            bar
        } else {
            ProgressBar::hidden()
        };
        Self { bar, cancel }
    }

    #[cfg(test)]
    fn hidden(cancel: CancellationToken) -> Self {
        Self {
            bar: ProgressBar::hidden(),
            cancel,
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    pub fn abandon(&self) {
        self.bar.abandon();
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg:32} [{bar:40.cyan/blue}] {percent:>3}%")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸━")
}

impl TaskContext for TerminalContext {
    fn report_message(&self, message: TaskMessage) {
        if !matches!(message, TaskMessage::Downloaded { .. }) {
            log::debug!("{message}");
        }
        self.bar.set_message(message.to_string());
    }

    fn report_progress(&self, done: u64, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(done);
    }

    fn is_cancellation_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

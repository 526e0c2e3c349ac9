//! What a running check or download reports to its host.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMessage {
    Checking,
    FindingLatest,
    Downloading,
    Downloaded { kib: u64 },
}

impl fmt::Display for TaskMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Checking => f.write_str("Checking for a new version"),
            Self::FindingLatest => f.write_str("Finding the latest version"),
            Self::Downloading => f.write_str("Downloading the latest version"),
            Self::Downloaded { kib } => write!(f, "Downloaded {kib} KiB"),
        }
    }
}

/// Host side of a running operation.
///
/// Cancellation is cooperative: operations poll
/// [`is_cancellation_requested`](Self::is_cancellation_requested) at fixed
/// points and stop with [`Error::Cancelled`](crate::Error::Cancelled).
pub trait TaskContext: Send + Sync {
    fn report_message(&self, message: TaskMessage);

    fn report_progress(&self, done: u64, total: u64);

    fn is_cancellation_requested(&self) -> bool;
}

/// Ignores reports and is cancelled only through [`NoopContext::cancel`].
#[derive(Debug, Default)]
pub struct NoopContext {
    cancelled: AtomicBool,
}

impl NoopContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl TaskContext for NoopContext {
    fn report_message(&self, _message: TaskMessage) {}

    fn report_progress(&self, _done: u64, _total: u64) {}

    fn is_cancellation_requested(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

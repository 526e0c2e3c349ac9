use std::sync::Arc;

use log::info;

use crate::error::Error;
use crate::ordering;
use crate::session::RemoteSession;
use crate::task::{TaskContext, TaskMessage};

/// Finds out whether the remote publishes a version newer than the caller's.
#[derive(Clone)]
pub struct UpdateChecker {
    session: Arc<RemoteSession>,
}

impl UpdateChecker {
    #[must_use]
    pub fn new(session: Arc<RemoteSession>) -> Self {
        Self { session }
    }

    #[must_use]
    pub fn cancelable(&self) -> bool {
        true
    }

    /// Return the latest published version if it sorts after
    /// `current_version`, `None` otherwise.
    ///
    /// The version list is fetched again on every call.
    ///
    /// # Errors
    /// Returns [`Error::Cancelled`] if cancellation is requested before the
    /// list is available, or the session error that prevented listing.
    pub async fn check(
        &self,
        current_version: &str,
        context: &dyn TaskContext,
    ) -> Result<Option<String>, Error> {
        ensure_not_cancelled(context)?;
        context.report_message(TaskMessage::Checking);

        let versions = self
            .session
            .list_versions()
            .await
            .map_err(|error| cancellation_or(error, context))?;
        ensure_not_cancelled(context)?;

        let Some(latest) = versions.latest() else {
            info!("No version published yet");
            return Ok(None);
        };
        if ordering::is_newer(latest, current_version) {
            info!("Version {latest} is available (current: {current_version})");
            Ok(Some(latest.to_string()))
        } else {
            info!("Version {current_version} is up to date (latest: {latest})");
            Ok(None)
        }
    }
}

pub(crate) fn ensure_not_cancelled(context: &dyn TaskContext) -> Result<(), Error> {
    if context.is_cancellation_requested() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// Once cancellation has been requested it is reported instead of `error`.
pub(crate) fn cancellation_or(error: Error, context: &dyn TaskContext) -> Error {
    if context.is_cancellation_requested() {
        Error::Cancelled
    } else {
        error
    }
}

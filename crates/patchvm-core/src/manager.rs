use std::sync::{Arc, Mutex, PoisonError};

use log::debug;
use tokio::io::AsyncWrite;

use crate::checker::UpdateChecker;
use crate::config::{ConfigProvider, Manageable};
use crate::downloader::{DownloadSummary, PatchDownloader};
use crate::error::Error;
use crate::session::RemoteSession;
use crate::task::TaskContext;
use crate::transport::Transport;

pub const DEFAULT_ENDPOINT: &str = "https://gitlab.com";

/// Entry point for a host managing the updates of one application.
///
/// The session is built from the first application's config and then shared
/// by every check and download, so the login happens at most once.
pub struct VersionManager {
    endpoint: String,
    provider: Arc<dyn ConfigProvider>,
    transport: Arc<dyn Transport>,
    session: Mutex<Option<Arc<RemoteSession>>>,
}

impl VersionManager {
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        provider: Arc<dyn ConfigProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            provider,
            transport,
            session: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// # Errors
    /// See [`UpdateChecker::check`]; also fails with
    /// [`Error::Configuration`] when no valid config is available.
    pub async fn check(
        &self,
        application: &dyn Manageable,
        context: &dyn TaskContext,
    ) -> Result<Option<String>, Error> {
        let session = self.session(application)?;
        UpdateChecker::new(session)
            .check(application.current_version(), context)
            .await
    }

    /// # Errors
    /// See [`PatchDownloader::download`]; also fails with
    /// [`Error::Configuration`] when no valid config is available.
    pub async fn store<W>(
        &self,
        application: &dyn Manageable,
        sink: &mut W,
        context: &dyn TaskContext,
    ) -> Result<DownloadSummary, Error>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let session = self.session(application)?;
        PatchDownloader::new(session).download(sink, context).await
    }

    fn session(&self, application: &dyn Manageable) -> Result<Arc<RemoteSession>, Error> {
        let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = slot.as_ref() {
            return Ok(Arc::clone(session));
        }

        let config = self.provider.connection_config(application)?;
        let session = Arc::new(RemoteSession::new(
            &self.endpoint,
            config,
            Arc::clone(&self.transport),
        )?);
        debug!("Created session for {}", self.endpoint);
        *slot = Some(Arc::clone(&session));
        Ok(session)
    }
}

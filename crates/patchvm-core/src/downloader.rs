use std::sync::Arc;

use log::{debug, info};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::checker::{cancellation_or, ensure_not_cancelled};
use crate::error::{Error, FailureCause};
use crate::progress::DownloadProgress;
use crate::session::RemoteSession;
use crate::task::{TaskContext, TaskMessage};

pub const CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSummary {
    pub version: String,
    pub bytes: u64,
}

/// Streams the patch of the latest published version into a sink.
#[derive(Clone)]
pub struct PatchDownloader {
    session: Arc<RemoteSession>,
}

impl PatchDownloader {
    #[must_use]
    pub fn new(session: Arc<RemoteSession>) -> Self {
        Self { session }
    }

    #[must_use]
    pub fn cancelable(&self) -> bool {
        true
    }

    /// Copy the patch of the latest version into `sink`.
    ///
    /// Cancellation is checked once the version list is known and after
    /// every chunk. On any error the sink holds a partial patch and must be
    /// discarded by the caller.
    ///
    /// # Errors
    /// Returns [`Error::Cancelled`] when cancellation is requested,
    /// [`Error::Discovery`] when no version is published, [`Error::Transfer`]
    /// when reading the patch or writing the sink fails, or the session error
    /// that prevented listing or opening the patch.
    pub async fn download<W>(
        &self,
        sink: &mut W,
        context: &dyn TaskContext,
    ) -> Result<DownloadSummary, Error>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        ensure_not_cancelled(context)?;
        context.report_message(TaskMessage::FindingLatest);
        context.report_progress(0, 1);

        let versions = self
            .session
            .list_versions()
            .await
            .map_err(|error| cancellation_or(error, context))?;
        ensure_not_cancelled(context)?;
        context.report_progress(1, 1);

        let config = self.session.config();
        let latest = versions.latest().ok_or_else(|| Error::Discovery {
            project_id: config.project_id.clone(),
            branch: config.branch.clone(),
            cause: FailureCause::Empty,
        })?;

        context.report_message(TaskMessage::Downloading);
        let mut stream = self
            .session
            .open_patch_stream(latest)
            .await
            .map_err(|error| cancellation_or(error, context))?;
        let transfer = |source| {
            cancellation_or(
                Error::Transfer {
                    version: latest.to_string(),
                    source,
                },
                context,
            )
        };

        let mut progress = DownloadProgress::new(stream.size_hint);
        if !progress.is_size_known() {
            debug!("Size of patch {latest} is unknown, reporting nominal progress");
        }
        context.report_progress(progress.done(), progress.total());

        let mut buffer = vec![0_u8; CHUNK_SIZE];
        loop {
            let read = stream.reader.read(&mut buffer).await.map_err(transfer)?;
            if read == 0 {
                break;
            }
            sink.write_all(&buffer[..read]).await.map_err(transfer)?;

            progress.advance(read);
            if !progress.is_complete() {
                context.report_progress(progress.done(), progress.total());
            }
            context.report_message(TaskMessage::Downloaded {
                kib: progress.bytes() / 1024,
            });
            ensure_not_cancelled(context)?;
        }
        sink.flush().await.map_err(transfer)?;

        progress.finish();
        context.report_progress(progress.done(), progress.total());
        info!("Downloaded patch {latest} ({} bytes)", progress.bytes());

        Ok(DownloadSummary {
            version: stream.version,
            bytes: progress.bytes(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};

    use tokio::io::AsyncWrite;

    use super::{CHUNK_SIZE, PatchDownloader};
    use crate::config::test_config;
    use crate::error::{Error, FailureCause};
    use crate::fake::{FakeRemote, PATCH};
    use crate::progress::NOMINAL_TOTAL;
    use crate::session::RemoteSession;
    use crate::task::TaskMessage;
    use crate::task::testing::RecordingContext;

    fn downloader(remote: &Arc<FakeRemote>) -> PatchDownloader {
        let session = RemoteSession::new("http://localhost:8880", test_config(), remote.clone())
            .expect("session should be created");
        PatchDownloader::new(Arc::new(session))
    }

    fn completions(progress: &[(u64, u64)]) -> usize {
        progress
            .iter()
            .filter(|(done, total)| *total > 1 && done == total)
            .count()
    }

    struct FailingSink;

    impl AsyncWrite for FailingSink {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::Error::other("disk full")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn known_length_patch_is_copied_with_single_completion() {
        let remote = Arc::new(FakeRemote::new());
        let context = RecordingContext::new();
        let mut sink = Vec::new();

        let summary = downloader(&remote)
            .download(&mut sink, &context)
            .await
            .expect("download should succeed");

        assert_eq!(sink, PATCH.as_bytes());
        assert_eq!(summary.version, "1.0.2");
        assert_eq!(summary.bytes, PATCH.len() as u64);

        let entries: Vec<&str> = std::str::from_utf8(&sink)
            .expect("patch should be UTF-8")
            .lines()
            .collect();
        assert_eq!(entries, vec!["key1=value1", "key2=value2", "key3=value3"]);

        let progress = context.progress();
        let total = PATCH.len() as u64;
        assert_eq!(progress.first(), Some(&(0, 1)));
        assert_eq!(progress.last(), Some(&(total, total)));
        assert_eq!(completions(&progress), 1);
    }

    #[tokio::test]
    async fn unknown_length_uses_nominal_progress() {
        let body = vec![b'x'; CHUNK_SIZE * 3];
        let remote = Arc::new(FakeRemote::new().with_patch(body.clone(), false));
        let context = RecordingContext::new();
        let mut sink = Vec::new();

        downloader(&remote)
            .download(&mut sink, &context)
            .await
            .expect("download should succeed");

        assert_eq!(sink, body);
        let progress = context.progress();
        assert!(progress[2..].iter().all(|(_, total)| *total == NOMINAL_TOTAL));
        assert_eq!(progress[2], (0, NOMINAL_TOTAL));
        assert_eq!(progress[3], (40, NOMINAL_TOTAL));
        assert!(
            progress[2..progress.len() - 1]
                .iter()
                .all(|(done, _)| *done < NOMINAL_TOTAL)
        );
        assert_eq!(progress.last(), Some(&(NOMINAL_TOTAL, NOMINAL_TOTAL)));
        assert_eq!(completions(&progress), 1);
    }

    #[tokio::test]
    async fn cancellation_after_first_chunk_leaves_partial_sink() {
        let body: Vec<u8> = (0..6000_u32).map(|i| (i % 251) as u8).collect();
        let remote = Arc::new(FakeRemote::new().with_patch(body.clone(), true));
        // (0,1), (1,1), (0,total), then the first chunk.
        let context = RecordingContext::cancel_after_progress(4);
        let mut sink = Vec::new();

        let result = downloader(&remote).download(&mut sink, &context).await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(sink, body[..CHUNK_SIZE]);
    }

    #[tokio::test]
    async fn cancelled_before_start_sends_nothing() {
        let remote = Arc::new(FakeRemote::new());
        let mut sink = Vec::new();

        let result = downloader(&remote)
            .download(&mut sink, &RecordingContext::cancelled())
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(remote.calls().is_empty());
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn empty_remote_is_a_discovery_error() {
        let remote = Arc::new(FakeRemote::new().with_versions(&[]));
        let mut sink = Vec::new();

        let result = downloader(&remote)
            .download(&mut sink, &RecordingContext::new())
            .await;

        assert!(matches!(
            result,
            Err(Error::Discovery {
                cause: FailureCause::Empty,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn sink_failure_is_a_transfer_error() {
        let remote = Arc::new(FakeRemote::new());

        let result = downloader(&remote)
            .download(&mut FailingSink, &RecordingContext::new())
            .await;

        match result {
            Err(Error::Transfer { version, source }) => {
                assert_eq!(version, "1.0.2");
                assert_eq!(source.to_string(), "disk full");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn broken_patch_stream_is_a_transfer_error() {
        let remote = Arc::new(FakeRemote::new().with_broken_patch());
        let mut sink = Vec::new();

        let result = downloader(&remote)
            .download(&mut sink, &RecordingContext::new())
            .await;

        match result {
            Err(Error::Transfer { version, source }) => {
                assert_eq!(version, "1.0.2");
                assert_eq!(source.to_string(), "connection reset");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_wins_over_a_failing_read() {
        let remote = Arc::new(FakeRemote::new().with_broken_patch());
        // (0,1), (1,1) and (0,total) are reported before the first read.
        let context = RecordingContext::cancel_after_progress(3);
        let mut sink = Vec::new();

        let result = downloader(&remote).download(&mut sink, &context).await;

        assert!(context.is_cancelled());
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn cancellation_during_listing_stops_before_the_patch_request() {
        let remote = Arc::new(FakeRemote::new());
        let context = RecordingContext::cancel_on_message(TaskMessage::FindingLatest);
        let mut sink = Vec::new();

        let result = downloader(&remote).download(&mut sink, &context).await;

        assert!(matches!(result, Err(Error::Cancelled)));
        let calls = remote.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].url.path().ends_with("/repository/tree"));
        assert_eq!(context.progress(), vec![(0, 1)]);
    }

    #[tokio::test]
    async fn cancellation_wins_over_a_failing_listing() {
        let remote = Arc::new(FakeRemote::new());
        let mut config = test_config();
        config.project_id = "654321".to_string();
        let session = RemoteSession::new("http://localhost:8880", config, remote.clone())
            .expect("session should be created");
        let context = RecordingContext::cancel_on_message(TaskMessage::FindingLatest);
        let mut sink = Vec::new();

        let result = PatchDownloader::new(Arc::new(session))
            .download(&mut sink, &context)
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(remote.calls().len(), 2);
    }

    #[tokio::test]
    async fn summary_reports_copied_bytes_when_stream_ends_early() {
        let announced = PATCH.len() as u64 * 2;
        let remote = Arc::new(FakeRemote::new().announcing_length(announced));
        let context = RecordingContext::new();
        let mut sink = Vec::new();

        let summary = downloader(&remote)
            .download(&mut sink, &context)
            .await
            .expect("download should succeed");

        assert_eq!(summary.bytes, PATCH.len() as u64);
        assert_eq!(sink, PATCH.as_bytes());
        assert_eq!(context.progress().last(), Some(&(announced, announced)));
        assert_eq!(completions(&context.progress()), 1);
    }
}

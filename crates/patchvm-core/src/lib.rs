//! Core logic of patchvm, independent of the host and its user interface:
//! - Version ordering of release names.
//! - An authenticated session against the release repository.
//! - Update checks and patch downloads with progress and cancellation.
//!
//! The HTTP layer sits behind the [`Transport`] trait; [`ReqwestTransport`]
//! is the production implementation.

mod checker;
mod config;
mod downloader;
mod error;
#[cfg(test)]
mod fake;
mod manager;
pub mod ordering;
mod progress;
mod session;
mod task;
pub mod transport;
mod versions;

/// Update check against the latest published version.
pub use checker::UpdateChecker;
/// Repository coordinates and the host-side config traits.
pub use config::{ConfigProvider, ConnectionConfig, Manageable};
/// Streaming patch download.
pub use downloader::{CHUNK_SIZE, DownloadSummary, PatchDownloader};
/// Error taxonomy shared by every operation.
pub use error::{AuthError, Error, FailureCause};
/// Facade building one shared session per host.
pub use manager::{DEFAULT_ENDPOINT, VersionManager};
/// Download progress arithmetic, including the nominal scale for unknown sizes.
pub use progress::{DownloadProgress, NOMINAL_TOTAL};
/// Lazily authenticated access to the release repository.
pub use session::{PatchStream, RemoteSession};
/// Progress, message and cancellation contract with the host.
pub use task::{NoopContext, TaskContext, TaskMessage};
pub use transport::{ReqwestTransport, Transport, TransportError, TransportOptions};
/// Ordered set of published versions.
pub use versions::VersionSet;

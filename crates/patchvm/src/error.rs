use std::path::PathBuf;

use patchvm_platform::AppPathsError;
use thiserror::Error;

use crate::settings::SettingsError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Paths(#[from] AppPathsError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Core(#[from] patchvm_core::Error),

    #[error(transparent)]
    Transport(#[from] patchvm_core::TransportError),

    #[error("no current version given, use --current-version or set current_version in {}", settings.display())]
    MissingCurrentVersion { settings: PathBuf },

    #[error("could not write {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AppError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Core(error) if error.is_cancelled())
    }
}

use std::path::{Path, PathBuf};
use thiserror::Error;

const APP_DIR: &str = "patchvm";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AppPathsError {
    #[error("Could not determine home directory")]
    HomeDirUnavailable,
    #[error("Could not determine config directory")]
    ConfigDirUnavailable,
    #[error("Could not determine data directory")]
    DataDirUnavailable,
}

/// Where patchvm keeps its settings, log and downloaded patches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Build application paths for the current platform.
    ///
    /// # Errors
    /// Returns an error when the user home, config or data directory cannot
    /// be determined.
    pub fn new() -> Result<Self, AppPathsError> {
        #[cfg(target_os = "macos")]
        {
            let home = dirs::home_dir().ok_or(AppPathsError::HomeDirUnavailable)?;
            let support = home.join("Library/Application Support").join(APP_DIR);
            Ok(Self {
                config_dir: support.clone(),
                data_dir: support,
            })
        }

        #[cfg(not(target_os = "macos"))]
        {
            Ok(Self {
                config_dir: dirs::config_dir()
                    .ok_or(AppPathsError::ConfigDirUnavailable)?
                    .join(APP_DIR),
                data_dir: dirs::data_dir()
                    .ok_or(AppPathsError::DataDirUnavailable)?
                    .join(APP_DIR),
            })
        }
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("debug.log")
    }

    #[must_use]
    pub fn patches_dir(&self) -> PathBuf {
        self.data_dir.join("patches")
    }

    /// Default destination of a downloaded patch: one directory per version.
    ///
    /// Only the final component of `file_name` is kept so a configured name
    /// cannot point outside the patches directory.
    #[must_use]
    pub fn patch_file(&self, version: &str, file_name: &str) -> PathBuf {
        let name = Path::new(file_name)
            .file_name()
            .map_or_else(|| PathBuf::from("patch"), PathBuf::from);
        let version = Path::new(version)
            .file_name()
            .map_or_else(|| PathBuf::from("unknown"), PathBuf::from);
        self.patches_dir().join(version).join(name)
    }

    /// Ensure the config and data directories exist on disk.
    ///
    /// # Errors
    /// Returns an error if any directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

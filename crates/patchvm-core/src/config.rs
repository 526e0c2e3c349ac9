use std::fmt;

use serde::Deserialize;

use crate::error::Error;

/// Coordinates and credentials of the repository holding the releases.
///
/// The branch holds one directory per released version, named after the
/// version id, each containing a file named `patch_file_name`.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionConfig {
    pub login: String,
    pub password: String,
    pub project_owner: String,
    pub project_id: String,
    pub project_name: String,
    pub branch: String,
    pub patch_file_name: String,
}

impl ConnectionConfig {
    /// Check the config before any request is sent.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the login or the password is empty.
    pub fn validate(&self) -> Result<(), Error> {
        if self.login.is_empty() || self.password.is_empty() {
            return Err(Error::Configuration(
                "the login and/or password cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("project_owner", &self.project_owner)
            .field("project_id", &self.project_id)
            .field("project_name", &self.project_name)
            .field("branch", &self.branch)
            .field("patch_file_name", &self.patch_file_name)
            .finish()
    }
}

/// An application whose updates are managed.
pub trait Manageable: Send + Sync {
    fn current_version(&self) -> &str;
}

impl Manageable for &str {
    fn current_version(&self) -> &str {
        self
    }
}

impl Manageable for String {
    fn current_version(&self) -> &str {
        self
    }
}

/// Supplies the connection config for an application.
pub trait ConfigProvider: Send + Sync {
    /// # Errors
    /// Returns [`Error::Configuration`] when no usable config exists.
    fn connection_config(&self, application: &dyn Manageable) -> Result<ConnectionConfig, Error>;
}

impl ConfigProvider for ConnectionConfig {
    fn connection_config(&self, _application: &dyn Manageable) -> Result<ConnectionConfig, Error> {
        Ok(self.clone())
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> ConnectionConfig {
    ConnectionConfig {
        login: "esso/bedo".to_string(),
        password: ":\\/".to_string(),
        project_owner: "owner2".to_string(),
        project_id: "123456".to_string(),
        project_name: "project3".to_string(),
        branch: "branch1".to_string(),
        patch_file_name: "patch.properties".to_string(),
    }
}

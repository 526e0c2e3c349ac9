use reqwest::StatusCode;
use thiserror::Error;

use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid connection configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Authentication(#[from] AuthError),

    #[error("could not find the versions of project '{project_id}' in branch '{branch}': {cause}")]
    Discovery {
        project_id: String,
        branch: String,
        cause: FailureCause,
    },

    #[error("could not access file '{file}': {cause}")]
    Access { file: String, cause: FailureCause },

    #[error("could not download version {version}: {source}")]
    Transfer {
        version: String,
        #[source]
        source: std::io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Failure of the login exchange.
///
/// Cloneable so that every caller joined to the same login attempt receives
/// the same error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("could not get the private token: {0}")]
    Transport(TransportError),

    #[error("could not connect to the server: HTTP {status}{body_snippet}")]
    Rejected {
        status: StatusCode,
        body_snippet: String,
    },

    #[error("could not extract the private token: {0}")]
    MalformedResponse(String),

    #[error("no private token could be found")]
    MissingToken,
}

/// Why a remote request did not produce the expected response.
#[derive(Debug, Error)]
pub enum FailureCause {
    #[error(transparent)]
    Transport(TransportError),

    #[error("HTTP {status}{body_snippet}")]
    Status {
        status: StatusCode,
        body_snippet: String,
    },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("no versions published")]
    Empty,
}

pub(crate) fn response_snippet(body: &str, max_chars: usize) -> String {
    let snippet: String = body.trim().chars().take(max_chars).collect();
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}

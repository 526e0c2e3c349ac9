//! Authenticated access to the release repository.
//!
//! A [`RemoteSession`] logs in lazily and keeps the private token for its
//! whole lifetime. The token is never refreshed: once the server stops
//! accepting it, requests fail with an HTTP error.
//!
//! Concurrent first callers share one login request. The first caller
//! installs a shared in-flight login future, later callers await the same
//! future, and all of them observe its outcome. A failed login leaves the
//! session unauthenticated so the next call starts a fresh attempt.

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use log::{debug, info, warn};
use reqwest::{StatusCode, Url};
use serde::Deserialize;

use crate::config::ConnectionConfig;
use crate::error::{AuthError, Error, FailureCause, response_snippet};
use crate::transport::{
    BodyReader, RedirectMode, ReqwestTransport, Transport, TransportOptions, TransportResponse,
};
use crate::versions::VersionSet;

const MIN_FAILURE_STATUS: u16 = 400;
const SNIPPET_CHARS: usize = 160;

type LoginFlight = Shared<BoxFuture<'static, Result<Arc<str>, AuthError>>>;

enum TokenState {
    Unauthenticated,
    Authenticating { attempt: u64, flight: LoginFlight },
    Authenticated(Arc<str>),
}

struct TokenSlot {
    state: TokenState,
    attempts: u64,
}

#[derive(Deserialize)]
struct SessionResponse {
    #[serde(default)]
    private_token: Option<String>,
}

#[derive(Deserialize)]
struct TreeEntry {
    name: String,
}

/// The body of a patch file, ready to be read.
pub struct PatchStream {
    pub version: String,
    /// Announced size of the patch; `None` when unknown or zero.
    pub size_hint: Option<u64>,
    pub reader: BodyReader,
}

pub struct RemoteSession {
    transport: Arc<dyn Transport>,
    base: Url,
    config: ConnectionConfig,
    token: Mutex<TokenSlot>,
}

impl RemoteSession {
    /// Create an unauthenticated session. No request is sent.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the credentials are empty or the
    /// endpoint is not a usable base URL.
    pub fn new(
        endpoint: &str,
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, Error> {
        config.validate()?;
        let base = Url::parse(endpoint).map_err(|error| {
            Error::Configuration(format!("invalid endpoint '{endpoint}': {error}"))
        })?;
        if base.cannot_be_a_base() {
            return Err(Error::Configuration(format!(
                "invalid endpoint '{endpoint}': not a base URL"
            )));
        }

        Ok(Self {
            transport,
            base,
            config,
            token: Mutex::new(TokenSlot {
                state: TokenState::Unauthenticated,
                attempts: 0,
            }),
        })
    }

    /// Create a session talking HTTP through `reqwest`.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the config is invalid or the HTTP
    /// client cannot be built.
    pub fn connect(
        endpoint: &str,
        config: ConnectionConfig,
        options: TransportOptions,
    ) -> Result<Self, Error> {
        config.validate()?;
        let transport = ReqwestTransport::new(options)
            .map_err(|error| Error::Configuration(error.to_string()))?;
        Self::new(endpoint, config, Arc::new(transport))
    }

    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self.lock_token().state, TokenState::Authenticated(_))
    }

    /// Return the private token, logging in first if needed.
    ///
    /// # Errors
    /// Returns an [`AuthError`] when the login request fails, is rejected, or
    /// its response carries no token.
    pub async fn ensure_token(&self) -> Result<Arc<str>, AuthError> {
        let (attempt, flight) = {
            let mut slot = self.lock_token();
            if let TokenState::Authenticated(token) = &slot.state {
                return Ok(Arc::clone(token));
            }
            if let TokenState::Authenticating { attempt, flight } = &slot.state {
                (*attempt, flight.clone())
            } else {
                slot.attempts += 1;
                let attempt = slot.attempts;
                let flight = login(Arc::clone(&self.transport), self.session_url())
                    .boxed()
                    .shared();
                slot.state = TokenState::Authenticating {
                    attempt,
                    flight: flight.clone(),
                };
                (attempt, flight)
            }
        };

        let outcome = flight.await;

        let mut slot = self.lock_token();
        let current = matches!(
            slot.state,
            TokenState::Authenticating { attempt: running, .. } if running == attempt
        );
        if current {
            slot.state = match &outcome {
                Ok(token) => {
                    info!("Session established for project {}", self.config.project_id);
                    TokenState::Authenticated(Arc::clone(token))
                }
                Err(_) => TokenState::Unauthenticated,
            };
        }
        outcome
    }

    /// List the version directories of the release branch.
    ///
    /// # Errors
    /// Returns [`Error::Authentication`] if no token can be obtained and
    /// [`Error::Discovery`] if the listing fails or cannot be parsed.
    pub async fn list_versions(&self) -> Result<VersionSet, Error> {
        let token = self.ensure_token().await?;

        let mut url = self.endpoint(&[
            "api",
            "v3",
            "projects",
            &self.config.project_id,
            "repository",
            "tree",
        ]);
        url.query_pairs_mut()
            .append_pair("private_token", &token)
            .append_pair("ref_name", &self.config.branch);

        let response = self
            .transport
            .get(url, RedirectMode::Follow)
            .await
            .map_err(|error| self.discovery_error(FailureCause::Transport(error)))?;
        let status = response.status;
        let body = response
            .text()
            .await
            .map_err(|error| self.discovery_error(FailureCause::Transport(error)))?;

        if status.as_u16() >= MIN_FAILURE_STATUS {
            return Err(self.discovery_error(FailureCause::Status {
                status,
                body_snippet: response_snippet(&body, SNIPPET_CHARS),
            }));
        }

        let entries: Vec<TreeEntry> = serde_json::from_str(&body)
            .map_err(|error| self.discovery_error(FailureCause::Malformed(error.to_string())))?;
        let versions: VersionSet = entries.into_iter().map(|entry| entry.name).collect();
        debug!(
            "Found {} versions in branch {}",
            versions.len(),
            self.config.branch
        );
        Ok(versions)
    }

    /// Open the patch file of `version`.
    ///
    /// Redirects are not followed: the server answers unauthorized raw file
    /// requests with a redirect to its login page.
    ///
    /// # Errors
    /// Returns [`Error::Authentication`] if no token can be obtained and
    /// [`Error::Access`] unless the server answers `200 OK`.
    pub async fn open_patch_stream(&self, version: &str) -> Result<PatchStream, Error> {
        let token = self.ensure_token().await?;
        let url = self.patch_url(version, &token);

        let response = self
            .transport
            .get(url, RedirectMode::Manual)
            .await
            .map_err(|error| self.access_error(FailureCause::Transport(error)))?;

        if response.status != StatusCode::OK {
            return Err(self.access_error(rejected(response).await));
        }

        if response.content_length == Some(0) {
            warn!("Server announced an empty patch for {version}, size is unknown");
        }
        Ok(PatchStream {
            version: version.to_string(),
            size_hint: response.content_length.filter(|size| *size > 0),
            reader: response.body,
        })
    }

    pub(crate) fn patch_url(&self, version: &str, token: &str) -> Url {
        let mut url = self.endpoint(&[
            &self.config.project_owner,
            &self.config.project_name,
            "raw",
            &self.config.branch,
            version,
            &self.config.patch_file_name,
        ]);
        url.query_pairs_mut().append_pair("private_token", token);
        url
    }

    pub(crate) fn session_url(&self) -> Url {
        let mut url = self.endpoint(&["api", "v3", "session"]);
        url.query_pairs_mut()
            .append_pair("login", &self.config.login)
            .append_pair("password", &self.config.password);
        url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        url.set_query(None);
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn discovery_error(&self, cause: FailureCause) -> Error {
        Error::Discovery {
            project_id: self.config.project_id.clone(),
            branch: self.config.branch.clone(),
            cause,
        }
    }

    fn access_error(&self, cause: FailureCause) -> Error {
        Error::Access {
            file: self.config.patch_file_name.clone(),
            cause,
        }
    }

    fn lock_token(&self) -> std::sync::MutexGuard<'_, TokenSlot> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn login(transport: Arc<dyn Transport>, url: Url) -> Result<Arc<str>, AuthError> {
    let response = transport.post(url).await.map_err(AuthError::Transport)?;
    let status = response.status;
    let body = response.text().await.map_err(AuthError::Transport)?;

    if status.as_u16() >= MIN_FAILURE_STATUS {
        return Err(AuthError::Rejected {
            status,
            body_snippet: response_snippet(&body, SNIPPET_CHARS),
        });
    }

    let session: SessionResponse = serde_json::from_str(&body)
        .map_err(|error| AuthError::MalformedResponse(error.to_string()))?;
    match session.private_token {
        Some(token) if !token.is_empty() => Ok(Arc::from(token)),
        _ => Err(AuthError::MissingToken),
    }
}

async fn rejected(response: TransportResponse) -> FailureCause {
    let status = response.status;
    let body_snippet = response
        .text()
        .await
        .ok()
        .map(|body| response_snippet(&body, SNIPPET_CHARS))
        .unwrap_or_default();
    FailureCause::Status {
        status,
        body_snippet,
    }
}

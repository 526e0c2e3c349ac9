//! The HTTP seam between the session and the network.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use log::debug;
use reqwest::{StatusCode, Url};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub type BodyReader = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    Follow,
    /// Hand 3xx responses back to the caller as-is.
    Manual,
}

pub struct TransportResponse {
    pub status: StatusCode,
    /// Size announced by the server, if any.
    pub content_length: Option<u64>,
    pub body: BodyReader,
}

impl TransportResponse {
    #[must_use]
    pub fn new(status: StatusCode, content_length: Option<u64>, body: BodyReader) -> Self {
        Self {
            status,
            content_length,
            body,
        }
    }

    /// Build a fully buffered response.
    pub fn from_bytes(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        let length = body.len() as u64;
        Self::new(status, Some(length), Box::new(std::io::Cursor::new(body)))
    }

    /// Read the remaining body as UTF-8 text, replacing invalid sequences.
    ///
    /// # Errors
    /// Returns an error if reading the body fails.
    pub async fn text(mut self) -> Result<String, TransportError> {
        let mut buffer = Vec::new();
        self.body
            .read_to_end(&mut buffer)
            .await
            .map_err(|error| TransportError::new("failed to read response body", error))?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{context}: {details}")]
pub struct TransportError {
    pub context: &'static str,
    pub details: String,
}

impl TransportError {
    pub fn new<E>(context: &'static str, error: E) -> Self
    where
        E: fmt::Display,
    {
        Self {
            context,
            details: error.to_string(),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, url: Url) -> Result<TransportResponse, TransportError>;

    async fn get(
        &self,
        url: Url,
        redirects: RedirectMode,
    ) -> Result<TransportResponse, TransportError>;
}

#[derive(Debug, Clone, Copy)]
pub struct TransportOptions {
    /// Maximum idle time between two reads of a response.
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    no_redirect: reqwest::Client,
}

impl ReqwestTransport {
    /// # Errors
    /// Returns an error if an HTTP client cannot be built.
    pub fn new(options: TransportOptions) -> Result<Self, TransportError> {
        let client = Self::builder(options)
            .build()
            .map_err(|error| TransportError::new("failed to build HTTP client", error))?;
        let no_redirect = Self::builder(options)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|error| TransportError::new("failed to build HTTP client", error))?;
        Ok(Self {
            client,
            no_redirect,
        })
    }

    fn builder(options: TransportOptions) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .read_timeout(options.timeout)
            .connect_timeout(options.connect_timeout)
            .user_agent(format!("patchvm/{}", env!("CARGO_PKG_VERSION")))
    }

    fn into_response(response: reqwest::Response) -> TransportResponse {
        let status = response.status();
        let content_length = response.content_length();
        let stream = response.bytes_stream().map_err(std::io::Error::other);
        TransportResponse::new(
            status,
            content_length,
            Box::new(StreamReader::new(Box::pin(stream))),
        )
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post(&self, url: Url) -> Result<TransportResponse, TransportError> {
        debug!("POST {}", redacted(&url));
        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|error| TransportError::new("request failed", error.without_url()))?;
        Ok(Self::into_response(response))
    }

    async fn get(
        &self,
        url: Url,
        redirects: RedirectMode,
    ) -> Result<TransportResponse, TransportError> {
        debug!("GET {}", redacted(&url));
        let client = match redirects {
            RedirectMode::Follow => &self.client,
            RedirectMode::Manual => &self.no_redirect,
        };
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|error| TransportError::new("request failed", error.without_url()))?;
        Ok(Self::into_response(response))
    }
}

/// The URL without its query, which carries credentials or the token.
fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

//! In-memory remote used by the unit tests.

use std::io;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::Semaphore;

use crate::transport::{RedirectMode, Transport, TransportError, TransportResponse};

pub const TOKEN: &str = "kaC25JPG1Evrpbdy3EGy";
pub const PATCH: &str = "key1=value1\nkey2=value2\nkey3=value3\n";

pub struct FakeRemote {
    versions: Vec<String>,
    patch: Vec<u8>,
    announce_length: bool,
    announced_length: Option<u64>,
    broken_patch: bool,
    reject_login: bool,
    gate: Option<Semaphore>,
    calls: Mutex<Vec<Call>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub method: &'static str,
    pub url: Url,
    pub redirects: Option<RedirectMode>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self {
            versions: vec!["1.0".to_string(), "1.0.1".to_string(), "1.0.2".to_string()],
            patch: PATCH.as_bytes().to_vec(),
            announce_length: true,
            announced_length: None,
            broken_patch: false,
            reject_login: false,
            gate: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_versions(mut self, versions: &[&str]) -> Self {
        self.versions = versions.iter().map(ToString::to_string).collect();
        self
    }

    pub fn with_patch(mut self, patch: Vec<u8>, announce_length: bool) -> Self {
        self.patch = patch;
        self.announce_length = announce_length;
        self
    }

    /// Announce `length` instead of the real patch size.
    pub fn announcing_length(mut self, length: u64) -> Self {
        self.announced_length = Some(length);
        self
    }

    /// Serve a patch body whose every read fails.
    pub fn with_broken_patch(mut self) -> Self {
        self.broken_patch = true;
        self
    }

    pub fn rejecting_login(mut self) -> Self {
        self.reject_login = true;
        self
    }

    /// Hold every login request until [`open_gate`](Self::open_gate).
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(Semaphore::MAX_PERMITS);
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn login_calls(&self) -> usize {
        self.calls().iter().filter(|call| call.method == "POST").count()
    }

    fn record(&self, method: &'static str, url: &Url, redirects: Option<RedirectMode>) {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(Call {
                method,
                url: url.clone(),
                redirects,
            });
    }

    fn list_versions(&self, segments: &[&str], url: &Url) -> TransportResponse {
        if segments.get(3) != Some(&"123456") {
            return json(StatusCode::NOT_FOUND, r#"{"message":"404 Project Not Found"}"#);
        }
        if query(url, "private_token").as_deref() != Some(TOKEN) {
            return json(StatusCode::UNAUTHORIZED, r#"{"message":"401 Unauthorized"}"#);
        }
        if query(url, "ref_name").as_deref() != Some("branch1") {
            return json(StatusCode::NOT_FOUND, r#"{"message":"404 Tree Not Found"}"#);
        }
        let entries: Vec<String> = self
            .versions
            .iter()
            .map(|version| format!(r#"{{"id":"a1b2","name":"{version}","type":"tree","mode":"040000"}}"#))
            .collect();
        json(StatusCode::OK, &format!("[{}]", entries.join(",")))
    }

    fn raw_file(&self, segments: &[&str], url: &Url) -> TransportResponse {
        let [owner, project, "raw", branch, version, file] = segments else {
            return html(StatusCode::NOT_FOUND);
        };
        if *owner != "owner2"
            || *project != "project3"
            || query(url, "private_token").as_deref() != Some(TOKEN)
        {
            return html(StatusCode::FOUND);
        }
        if *branch != "branch1"
            || !self.versions.iter().any(|known| known == version)
            || *file != "patch.properties"
        {
            return html(StatusCode::NOT_FOUND);
        }
        let length = self
            .announced_length
            .or_else(|| self.announce_length.then_some(self.patch.len() as u64));
        if self.broken_patch {
            return TransportResponse::new(StatusCode::OK, length, Box::new(BrokenBody));
        }
        TransportResponse::new(
            StatusCode::OK,
            length,
            Box::new(std::io::Cursor::new(self.patch.clone())),
        )
    }
}

struct BrokenBody;

impl AsyncRead for BrokenBody {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::other("connection reset")))
    }
}

#[async_trait]
impl Transport for FakeRemote {
    async fn post(&self, url: Url) -> Result<TransportResponse, TransportError> {
        self.record("POST", &url, None);
        tokio::task::yield_now().await;
        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|error| TransportError::new("login gate closed", error))?;
        }

        if url.path() != "/api/v3/session" {
            return Ok(html(StatusCode::NOT_FOUND));
        }
        let accepted = !self.reject_login
            && query(&url, "login").as_deref() == Some("esso/bedo")
            && query(&url, "password").as_deref() == Some(":\\/");
        if accepted {
            Ok(json(
                StatusCode::CREATED,
                &format!(r#"{{"id":1,"username":"essobedo","private_token":"{TOKEN}"}}"#),
            ))
        } else {
            Ok(json(StatusCode::UNAUTHORIZED, r#"{"message":"401 Unauthorized"}"#))
        }
    }

    async fn get(
        &self,
        url: Url,
        redirects: RedirectMode,
    ) -> Result<TransportResponse, TransportError> {
        self.record("GET", &url, Some(redirects));

        let segments: Vec<&str> = url.path_segments().map(Iterator::collect).unwrap_or_default();
        if segments.starts_with(&["api", "v3", "projects"]) {
            Ok(self.list_versions(&segments, &url))
        } else {
            Ok(self.raw_file(&segments, &url))
        }
    }
}

fn query(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.into_owned())
}

fn json(status: StatusCode, body: &str) -> TransportResponse {
    TransportResponse::from_bytes(status, body.as_bytes().to_vec())
}

fn html(status: StatusCode) -> TransportResponse {
    TransportResponse::from_bytes(status, b"<html><body>Redirected</body></html>".to_vec())
}

//! In-memory fakes for testing without network access.
//!
//! `RecordingTransport` stands in for the destinations: it records every
//! webhook call and answers manifest requests from canned responses.
//! `RecordingMonitor` counts build-started signals.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use build_ledger::BuildId;

use crate::notifier::BuildMonitor;
use crate::transport::{HttpResponse, HttpTransport, TransportError};

#[derive(Default)]
struct TransportState {
    posts: Vec<(String, BuildId)>,
    failures: HashMap<String, String>,
    manifests: HashMap<String, HttpResponse>,
    gated: HashMap<String, (String, HttpResponse)>,
    manifest_requests: Vec<String>,
    credential_attempts: Vec<(String, String)>,
}

/// Fake [`HttpTransport`].
///
/// Webhook posts succeed unless the URL was registered with [`Self::fail`].
/// Manifest requests for unknown URLs fail like a refused connection.
#[derive(Default)]
pub struct RecordingTransport {
    state: Mutex<TransportState>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make webhook posts to `url` fail with `error`.
    pub fn fail(&self, url: impl Into<String>, error: impl Into<String>) {
        self.lock().failures.insert(url.into(), error.into());
    }

    /// Answer `GET url` with `response`.
    pub fn serve_manifest(&self, url: impl Into<String>, response: HttpResponse) {
        self.lock().manifests.insert(url.into(), response);
    }

    /// Answer `GET url` with 401, and a form POST carrying `password` with
    /// `response`. Any other password gets another 401.
    pub fn serve_gated_manifest(
        &self,
        url: impl Into<String>,
        password: impl Into<String>,
        response: HttpResponse,
    ) {
        let url = url.into();
        let mut state = self.lock();
        state
            .manifests
            .insert(url.clone(), HttpResponse::new(401, "Unauthorized"));
        state.gated.insert(url, (password.into(), response));
    }

    /// Every webhook call attempted, in order, failed ones included.
    pub fn posts(&self) -> Vec<(String, BuildId)> {
        self.lock().posts.clone()
    }

    pub fn posts_to(&self, url: &str) -> Vec<BuildId> {
        self.lock()
            .posts
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn manifest_requests(&self) -> Vec<String> {
        self.lock().manifest_requests.clone()
    }

    /// `(url, password)` of every credential retry.
    pub fn credential_attempts(&self) -> Vec<(String, String)> {
        self.lock().credential_attempts.clone()
    }

    fn lock(&self) -> MutexGuard<'_, TransportState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn post_build_notification(
        &self,
        url: &str,
        build_id: BuildId,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.posts.push((url.to_string(), build_id));
        match state.failures.get(url) {
            Some(error) => Err(TransportError::Request(error.clone())),
            None => Ok(()),
        }
    }

    async fn fetch_manifest(&self, url: &str) -> Result<HttpResponse, TransportError> {
        let mut state = self.lock();
        state.manifest_requests.push(url.to_string());
        state
            .manifests
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError::Request(format!("connection refused: {url}")))
    }

    async fn post_manifest_credential(
        &self,
        url: &str,
        password: &str,
    ) -> Result<HttpResponse, TransportError> {
        let mut state = self.lock();
        state
            .credential_attempts
            .push((url.to_string(), password.to_string()));
        match state.gated.get(url) {
            Some((expected, response)) if expected == password => Ok(response.clone()),
            Some(_) => Ok(HttpResponse::new(401, "Unauthorized")),
            None => Err(TransportError::Request(format!("connection refused: {url}"))),
        }
    }
}

/// Fake [`BuildMonitor`] that counts calls.
#[derive(Debug, Default)]
pub struct RecordingMonitor {
    builds: AtomicUsize,
}

impl RecordingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl BuildMonitor for RecordingMonitor {
    fn mark_building(&self) {
        self.builds.fetch_add(1, Ordering::SeqCst);
    }
}

//! Outbound HTTP: build webhooks and build manifest checks.
//!
//! The core only talks to destinations through [`HttpTransport`], so tests
//! can substitute a recording fake (see `fakes`).

use std::time::Duration;

use async_trait::async_trait;
use build_ledger::BuildId;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Timeout applied to every outbound call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Generic client name. Requests identifying the CMS skip re-sourcing on some
/// build services.
pub const USER_AGENT: &str = "CMS";

/// Errors from an outbound call
#[derive(Debug, Error)]
pub enum TransportError {
    /// The call did not complete within the timeout
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// Connection, TLS, or protocol failure
    #[error("{0}")]
    Request(String),

    /// The destination answered with a non-success status
    #[error("request to {url} failed with status {status}")]
    Status { url: String, status: u16 },
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();
        if err.is_timeout() {
            TransportError::Timeout { url }
        } else if let Some(status) = err.status() {
            TransportError::Status {
                url,
                status: status.as_u16(),
            }
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// Status and body of a manifest request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// JSON body of a build notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuildNotification {
    #[serde(rename = "buildId")]
    pub build_id: BuildId,
}

/// Outbound HTTP used by the notifier and the reconciler.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// `POST <url>` with `{"buildId": <id>}`, following redirects. Non-2xx
    /// answers are errors.
    async fn post_build_notification(
        &self,
        url: &str,
        build_id: BuildId,
    ) -> Result<(), TransportError>;

    /// `GET <url>`; any status is returned, redirects are not followed.
    async fn fetch_manifest(&self, url: &str) -> Result<HttpResponse, TransportError>;

    /// `POST <url>` with form field `password`; any status is returned.
    async fn post_manifest_credential(
        &self,
        url: &str,
        password: &str,
    ) -> Result<HttpResponse, TransportError>;
}

/// [`HttpTransport`] over `reqwest`.
///
/// Webhook posts follow redirects like any HTTP client. Manifest requests
/// do not, so a password gate answering with a redirect to its login page
/// reads as "not current" instead of as that page's body.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    webhooks: reqwest::Client,
    manifests: reqwest::Client,
}

impl ReqwestTransport {
    /// Client with [`DEFAULT_TIMEOUT`].
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let builder = || {
            reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(timeout)
        };
        Ok(Self {
            webhooks: builder().build()?,
            manifests: builder()
                .redirect(reqwest::redirect::Policy::none())
                .build()?,
        })
    }

    async fn into_response(response: reqwest::Response) -> Result<HttpResponse, TransportError> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_build_notification(
        &self,
        url: &str,
        build_id: BuildId,
    ) -> Result<(), TransportError> {
        debug!(url, %build_id, "posting build notification");
        self.webhooks
            .post(url)
            .json(&BuildNotification { build_id })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn fetch_manifest(&self, url: &str) -> Result<HttpResponse, TransportError> {
        debug!(url, "fetching build manifest");
        let response = self.manifests.get(url).send().await?;
        Self::into_response(response).await
    }

    async fn post_manifest_credential(
        &self,
        url: &str,
        password: &str,
    ) -> Result<HttpResponse, TransportError> {
        debug!(url, "retrying build manifest with credential");
        let response = self
            .manifests
            .post(url)
            .form(&[("password", password)])
            .send()
            .await?;
        Self::into_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_body_shape() {
        let body = serde_json::to_value(BuildNotification {
            build_id: BuildId(42),
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"buildId": 42}));
    }

    #[test]
    fn test_client_builds() {
        assert!(ReqwestTransport::new().is_ok());
    }

    #[test]
    fn test_status_error_display() {
        let err = TransportError::Status {
            url: "http://x/hook".to_string(),
            status: 500,
        };
        assert_eq!(err.to_string(), "request to http://x/hook failed with status 500");
    }
}

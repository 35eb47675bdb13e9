//! Build status reconciler.
//!
//! Compares a destination's latest build id with the id its published site
//! reports in `build.json`, so an operator-triggered rebuild can be skipped
//! when the site is already current. Every doubt resolves to "not current".

use std::sync::Arc;

use build_ledger::BuildId;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::messages::Message;
use crate::registry::ServerRegistry;
use crate::tracker::UpdateTracker;
use crate::transport::{HttpResponse, HttpTransport};

/// Manifest file published next to the built site.
pub const BUILD_MANIFEST: &str = "build.json";

/// Manifest field carrying the published build id. The name is kept for
/// compatibility with existing deployments.
pub const MANIFEST_BUILD_ID_FIELD: &str = "drupalBuildId";

const STATUS_OK: u16 = 200;
const STATUS_UNAUTHORIZED: u16 = 401;

/// `<build_url>/build.json`, tolerating a trailing slash on the base.
pub fn manifest_url(build_url: &str) -> String {
    format!("{}/{}", build_url.trim_end_matches('/'), BUILD_MANIFEST)
}

/// Build id published in a manifest body.
///
/// `None` when the body is not a JSON object. A missing or non-numeric
/// field reads as `0`.
pub fn published_build_id(body: &str) -> Option<BuildId> {
    let value: Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;
    let id = match object.get(MANIFEST_BUILD_ID_FIELD) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    };
    Some(BuildId(id))
}

/// Checks published build manifests and triggers catch-up builds.
#[derive(Clone)]
pub struct BuildStatusReconciler {
    registry: Arc<dyn ServerRegistry>,
    transport: Arc<dyn HttpTransport>,
}

impl BuildStatusReconciler {
    pub fn new(registry: Arc<dyn ServerRegistry>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            registry,
            transport,
        }
    }

    /// Whether the destination already publishes `latest_build_id`.
    ///
    /// Not current when: no build URL is configured, the request fails, the
    /// final status is not 200, the body is empty or not a JSON object, or
    /// the ids differ. A 401 is retried once as a form POST carrying the
    /// configured credential.
    pub async fn is_destination_current(&self, latest_build_id: BuildId, destination: &str) -> bool {
        let Some(build_url) = self.registry.resolve_build_status_url(destination) else {
            debug!(destination, "no build url configured, presuming outdated");
            return false;
        };
        let url = manifest_url(&build_url);

        let response = match self.fetch(&url, destination).await {
            Some(response) => response,
            None => return false,
        };

        if response.status != STATUS_OK || response.body.trim().is_empty() {
            debug!(destination, status = response.status, "build manifest unavailable");
            return false;
        }

        match published_build_id(&response.body) {
            Some(published) => {
                debug!(destination, %published, latest = %latest_build_id, "compared build ids");
                published == latest_build_id
            }
            None => {
                warn!(destination, url = %url, "build manifest is not a JSON object");
                false
            }
        }
    }

    async fn fetch(&self, url: &str, destination: &str) -> Option<HttpResponse> {
        let response = match self.transport.fetch_manifest(url).await {
            Ok(response) => response,
            Err(err) => {
                warn!(destination, url, error = %err, "build manifest request failed");
                return None;
            }
        };

        if response.status != STATUS_UNAUTHORIZED {
            return Some(response);
        }
        let Some(password) = self.registry.resolve_status_credential(destination) else {
            return Some(response);
        };

        match self.transport.post_manifest_credential(url, &password).await {
            Ok(response) => Some(response),
            Err(err) => {
                warn!(destination, url, error = %err, "authenticated manifest request failed");
                None
            }
        }
    }

    /// Queue a notification with the destination's latest build id unless
    /// its site is already current.
    ///
    /// The returned message is also added to the unit of work's messenger.
    /// Only a ledger failure is an `Err`.
    pub async fn trigger_latest_build(
        &self,
        tracker: &UpdateTracker,
        destination: &str,
    ) -> Result<Message> {
        let notifier = tracker.notifier();

        if !self.registry.contains(destination) {
            let message = Message::error(format!("No server found with id {destination}."));
            notifier.messenger().add(message.clone());
            return Ok(message);
        }

        let latest = tracker.latest_build(destination).await?;
        let message = if self.is_destination_current(latest, destination).await {
            Message::status(format!(
                "Build is already up-to-date for server {destination}."
            ))
        } else {
            notifier.trigger(destination, latest);
            Message::status(format!("Triggering a build for server {destination}."))
        };

        notifier.messenger().add(message.clone());
        Ok(message)
    }

    /// [`Self::trigger_latest_build`] for the default destination: the first,
    /// by name, with notifications enabled.
    pub async fn trigger_default_latest_build(&self, tracker: &UpdateTracker) -> Result<Message> {
        let candidates = self.registry.destinations_with_notifications_enabled();

        let Some(first) = candidates.first() else {
            let message = Message::error("No default server found.");
            tracker.notifier().messenger().add(message.clone());
            return Ok(message);
        };

        if candidates.len() > 1 {
            warn!(
                chosen = %first,
                candidates = ?candidates,
                "several destinations have notifications enabled, using the first"
            );
        }
        self.trigger_latest_build(tracker, first).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_url_handles_trailing_slash() {
        assert_eq!(
            manifest_url("https://foo.example.com/"),
            "https://foo.example.com/build.json"
        );
        assert_eq!(
            manifest_url("https://foo.example.com"),
            "https://foo.example.com/build.json"
        );
    }

    #[test]
    fn test_published_build_id_reads_field() {
        assert_eq!(
            published_build_id(r#"{"drupalBuildId": 12, "other": true}"#),
            Some(BuildId(12))
        );
        assert_eq!(
            published_build_id(r#"{"drupalBuildId": "7"}"#),
            Some(BuildId(7))
        );
    }

    #[test]
    fn test_published_build_id_defaults_to_zero() {
        assert_eq!(published_build_id(r#"{}"#), Some(BuildId(0)));
        assert_eq!(
            published_build_id(r#"{"drupalBuildId": null}"#),
            Some(BuildId(0))
        );
    }

    #[test]
    fn test_published_build_id_rejects_non_objects() {
        assert_eq!(published_build_id("[1, 2]"), None);
        assert_eq!(published_build_id("<html>"), None);
    }
}

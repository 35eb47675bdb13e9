//! Server registry: resolves logical destination names to their endpoints.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Endpoints and credentials for one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Build webhook. Without it changes are still logged but nobody is notified.
    #[serde(default)]
    pub webhook: Option<String>,
    /// Base URL of the published site, `build.json` is fetched from here.
    #[serde(default)]
    pub build_url: Option<String>,
    /// Password for sites behind a password gate (sent on 401).
    #[serde(default)]
    pub build_url_password: Option<String>,
    /// Whether this destination takes part in build notifications.
    #[serde(default = "default_notifications")]
    pub notifications: bool,
}

fn default_notifications() -> bool {
    true
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            webhook: None,
            build_url: None,
            build_url_password: None,
            notifications: default_notifications(),
        }
    }
}

impl DestinationConfig {
    pub fn with_webhook(mut self, url: impl Into<String>) -> Self {
        self.webhook = Some(url.into());
        self
    }

    pub fn with_build_url(mut self, url: impl Into<String>) -> Self {
        self.build_url = Some(url.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.build_url_password = Some(password.into());
        self
    }

    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.notifications = enabled;
        self
    }
}

/// Lookup contract the core consumes.
///
/// Implementations are read-only from the core's point of view.
pub trait ServerRegistry: Send + Sync {
    /// Whether a destination with this name exists.
    fn contains(&self, destination: &str) -> bool;

    fn resolve_webhook(&self, destination: &str) -> Option<String>;

    fn resolve_build_status_url(&self, destination: &str) -> Option<String>;

    fn resolve_status_credential(&self, destination: &str) -> Option<String>;

    /// Destinations with notifications enabled, in name order.
    fn destinations_with_notifications_enabled(&self) -> Vec<String>;
}

/// Registry backed by a fixed map, usually loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticServerRegistry {
    destinations: BTreeMap<String, DestinationConfig>,
}

impl StaticServerRegistry {
    pub fn new(destinations: BTreeMap<String, DestinationConfig>) -> Self {
        Self { destinations }
    }

    /// Add or replace a destination.
    pub fn with_destination(mut self, name: impl Into<String>, config: DestinationConfig) -> Self {
        self.destinations.insert(name.into(), config);
        self
    }

    pub fn destination(&self, name: &str) -> Option<&DestinationConfig> {
        self.destinations.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.destinations.keys().map(String::as_str)
    }
}

impl ServerRegistry for StaticServerRegistry {
    fn contains(&self, destination: &str) -> bool {
        self.destinations.contains_key(destination)
    }

    fn resolve_webhook(&self, destination: &str) -> Option<String> {
        self.destination(destination)
            .and_then(|d| d.webhook.clone())
            .filter(|url| !url.is_empty())
    }

    fn resolve_build_status_url(&self, destination: &str) -> Option<String> {
        self.destination(destination)
            .and_then(|d| d.build_url.clone())
            .filter(|url| !url.is_empty())
    }

    fn resolve_status_credential(&self, destination: &str) -> Option<String> {
        self.destination(destination)
            .and_then(|d| d.build_url_password.clone())
            .filter(|secret| !secret.is_empty())
    }

    fn destinations_with_notifications_enabled(&self) -> Vec<String> {
        self.destinations
            .iter()
            .filter(|(_, config)| config.notifications)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> StaticServerRegistry {
        StaticServerRegistry::default()
            .with_destination(
                "foo",
                DestinationConfig::default()
                    .with_webhook("http://localhost:8000/__refresh")
                    .with_build_url("https://foo.example.com")
                    .with_password("secret"),
            )
            .with_destination(
                "bar",
                DestinationConfig::default().with_webhook("http://localhost:9000/__refresh"),
            )
            .with_destination("quiet", DestinationConfig::default().with_notifications(false))
    }

    #[test]
    fn test_default_destination_takes_part_in_notifications() {
        let config = DestinationConfig::default();
        assert!(config.notifications);
        assert_eq!(config, toml::from_str::<DestinationConfig>("").unwrap());
    }

    #[test]
    fn test_resolves_configured_endpoints() {
        let registry = registry();
        assert_eq!(
            registry.resolve_webhook("foo").as_deref(),
            Some("http://localhost:8000/__refresh")
        );
        assert_eq!(
            registry.resolve_build_status_url("foo").as_deref(),
            Some("https://foo.example.com")
        );
        assert_eq!(
            registry.resolve_status_credential("foo").as_deref(),
            Some("secret")
        );
    }

    #[test]
    fn test_missing_values_resolve_to_none() {
        let registry = registry();
        assert!(registry.resolve_build_status_url("bar").is_none());
        assert!(registry.resolve_status_credential("bar").is_none());
        assert!(registry.resolve_webhook("quiet").is_none());
        assert!(registry.resolve_webhook("unknown").is_none());
        assert!(!registry.contains("unknown"));
    }

    #[test]
    fn test_empty_webhook_is_treated_as_absent() {
        let registry = StaticServerRegistry::default()
            .with_destination("foo", DestinationConfig::default().with_webhook(""));
        assert!(registry.contains("foo"));
        assert!(registry.resolve_webhook("foo").is_none());
    }

    #[test]
    fn test_enabled_destinations_in_name_order() {
        assert_eq!(
            registry().destinations_with_notifications_enabled(),
            vec!["bar".to_string(), "foo".to_string()]
        );
    }

    #[test]
    fn test_notifications_default_to_enabled() {
        let config: DestinationConfig = toml::from_str("webhook = \"http://x\"").unwrap();
        assert!(config.notifications);
    }
}

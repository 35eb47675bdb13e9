//! Connection configuration for the SurrealDB ledger

use serde::{Deserialize, Serialize};

/// Default endpoint: embedded SurrealKV store in the working directory.
pub const DEFAULT_ENDPOINT: &str = "surrealkv://.sitebuild/db";
const DEFAULT_NAMESPACE: &str = "sitebuild";
const DEFAULT_DATABASE: &str = "ledger";

/// Credentials for a remote SurrealDB instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCredentials {
    pub username: String,
    pub password: String,
    /// Whether this is a root user (true) or database user (false)
    #[serde(default)]
    pub is_root: bool,
}

/// Where the ledger lives and how to sign in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Any SurrealDB engine URL: `mem://`, `surrealkv://path`, `ws://host:port`, `wss://...`
    #[serde(default = "default_endpoint", alias = "url")]
    pub endpoint: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub credentials: Option<LedgerCredentials>,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

impl LedgerConfig {
    /// Configuration for an endpoint with default namespace/database and no auth
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            namespace: default_namespace(),
            database: default_database(),
            credentials: None,
        }
    }

    /// Embedded in-memory store
    pub fn in_memory() -> Self {
        Self::new("mem://")
    }

    /// Set custom namespace
    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    /// Set custom database
    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    /// Sign in with the given credentials after connecting
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        is_root: bool,
    ) -> Self {
        self.credentials = Some(LedgerCredentials {
            username: username.into(),
            password: password.into(),
            is_root,
        });
        self
    }

    /// Local path backing a `surrealkv://` endpoint, if any
    pub fn local_path(&self) -> Option<&str> {
        self.endpoint.strip_prefix("surrealkv://")
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - SITEBUILD_DB_URL (optional, default: "surrealkv://.sitebuild/db")
    /// - SITEBUILD_DB_NAMESPACE (optional, default: "sitebuild")
    /// - SITEBUILD_DB_DATABASE (optional, default: "ledger")
    /// - SITEBUILD_DB_USERNAME / SITEBUILD_DB_PASSWORD (optional, both required for auth)
    /// - SITEBUILD_DB_ROOT (optional, default: "false") - set to "true" for root users
    pub fn from_env() -> Self {
        let endpoint = std::env::var("SITEBUILD_DB_URL").unwrap_or_else(|_| default_endpoint());
        let namespace =
            std::env::var("SITEBUILD_DB_NAMESPACE").unwrap_or_else(|_| default_namespace());
        let database =
            std::env::var("SITEBUILD_DB_DATABASE").unwrap_or_else(|_| default_database());
        let is_root = std::env::var("SITEBUILD_DB_ROOT")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        let credentials = match (
            std::env::var("SITEBUILD_DB_USERNAME"),
            std::env::var("SITEBUILD_DB_PASSWORD"),
        ) {
            (Ok(username), Ok(password)) => Some(LedgerCredentials {
                username,
                password,
                is_root,
            }),
            _ => None,
        };

        Self {
            endpoint,
            namespace,
            database,
            credentials,
        }
    }
}

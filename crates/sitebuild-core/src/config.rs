//! Configuration file loading.
//!
//! ```toml
//! [ledger]
//! url = "surrealkv://.sitebuild/db"
//!
//! [destinations.foo]
//! webhook = "http://localhost:8000/__refresh"
//! build_url = "https://foo.example.com"
//! build_url_password = "secret"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use build_ledger::LedgerConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SiteBuildError};
use crate::registry::{DestinationConfig, StaticServerRegistry};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "SITEBUILD_CONFIG";

/// Used when neither a path nor `SITEBUILD_CONFIG` is given.
pub const DEFAULT_CONFIG_FILE: &str = "sitebuild.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteBuildConfig {
    /// Ledger connection. Falls back to [`LedgerConfig::from_env`] when absent.
    #[serde(default)]
    pub ledger: Option<LedgerConfig>,
    #[serde(default)]
    pub destinations: BTreeMap<String, DestinationConfig>,
}

impl SiteBuildConfig {
    /// Parse configuration from TOML text.
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| SiteBuildError::Config(e.to_string()))
    }

    /// Read and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading configuration");
        let text = std::fs::read_to_string(path).map_err(|e| {
            SiteBuildError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
    }

    /// Load from an explicit path, `SITEBUILD_CONFIG`, or `sitebuild.toml`.
    ///
    /// A missing default file yields an empty configuration; a missing
    /// explicitly named file is an error.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load(&PathBuf::from(path));
        }
        let default = Path::new(DEFAULT_CONFIG_FILE);
        if default.exists() {
            Self::load(default)
        } else {
            debug!("no configuration file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Ledger settings, with the environment as fallback.
    pub fn ledger_config(&self) -> LedgerConfig {
        self.ledger.clone().unwrap_or_else(LedgerConfig::from_env)
    }

    pub fn registry(&self) -> StaticServerRegistry {
        StaticServerRegistry::new(self.destinations.clone())
    }
}

//! Schema definitions for build-ledger SurrealDB tables
//!
//! Tables:
//! - build_log: One row per tracked change, keyed by build id
//! - ledger_sequence: Single-row counter backing build id allocation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage_traits::{BuildId, ChangeRecord};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Row in the `build_log` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRow {
    /// SurrealDB record ID (`build_log:<build_id>`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    /// Global build id
    pub build_id: i64,
    /// Destination (server) name
    pub destination: String,
    /// Entity type that changed
    pub entity_type: String,
    /// Entity id that changed
    pub entity_id: String,
    /// Write timestamp
    #[serde(with = "surreal_datetime")]
    pub recorded_at: DateTime<Utc>,
}

impl ChangeRow {
    /// Create a new row for an allocated build id
    pub fn new(build_id: i64, destination: &str, entity_type: &str, entity_id: &str) -> Self {
        ChangeRow {
            id: None,
            build_id,
            destination: destination.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            recorded_at: Utc::now(),
        }
    }

    /// Convert into the backend-agnostic record
    pub fn into_record(self) -> ChangeRecord {
        ChangeRecord {
            build_id: BuildId(self.build_id),
            destination: self.destination,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            recorded_at: self.recorded_at,
        }
    }
}

/// Counter row in `ledger_sequence`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SequenceRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub value: i64,
}

/// Projection used by `latest_build`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BuildIdRow {
    pub build_id: i64,
}

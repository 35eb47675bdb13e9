//! Storage trait definitions for the build ledger
//!
//! The ledger is an append-only table of [`ChangeRecord`]s. Each record is
//! stamped with a [`BuildId`] drawn from one counter shared by every
//! destination, so ids reflect global write order.
//!
//! The trait is async and backend-agnostic. An in-memory fake is provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// BuildId
// ---------------------------------------------------------------------------

/// Globally monotonic build identifier.
///
/// Serialized as a bare integer. [`BuildId::NONE`] (`-1`) stands for
/// "no builds yet" and is never assigned to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(pub i64);

impl BuildId {
    /// Sentinel for a destination without any recorded change.
    pub const NONE: BuildId = BuildId(-1);

    /// Whether this is the "no builds yet" sentinel.
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    pub fn value(self) -> i64 {
        self.0
    }
}

impl From<i64> for BuildId {
    fn from(value: i64) -> Self {
        BuildId(value)
    }
}

impl std::fmt::Display for BuildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ChangeRecord
// ---------------------------------------------------------------------------

/// A single immutable entry in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Global build id assigned at write time
    pub build_id: BuildId,
    /// Logical target (site/server name)
    pub destination: String,
    /// Classifier of what changed (e.g. "Page")
    pub entity_type: String,
    /// Identifier of what changed
    pub entity_id: String,
    /// Wall-clock time of the write. Informational only; ordering is by `build_id`.
    pub recorded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// BuildLedger
// ---------------------------------------------------------------------------

/// Append-only build ledger.
///
/// Guarantees:
/// - `append` assigns ids from a single counter shared by all destinations;
///   ids start at 1 on a fresh ledger and strictly increase.
/// - Concurrent `append` calls never receive the same id.
/// - Records are never mutated or deleted by these operations.
#[async_trait]
pub trait BuildLedger: Send + Sync {
    /// Persist a change and return the stored record with its new build id.
    async fn append(
        &self,
        destination: &str,
        entity_type: &str,
        entity_id: &str,
    ) -> StorageResult<ChangeRecord>;

    /// Highest build id recorded for `destination`, if any.
    async fn latest_build(&self, destination: &str) -> StorageResult<Option<BuildId>>;

    /// Records for `destination` with `from <= build_id <= to`, ascending by id.
    async fn records_between(
        &self,
        destination: &str,
        from: BuildId,
        to: BuildId,
    ) -> StorageResult<Vec<ChangeRecord>>;
}

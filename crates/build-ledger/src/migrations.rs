//! SurrealDB schema migrations and initialization
//!
//! Sets up the ledger tables with their constraints and indexes.

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::storage_traits::StorageResult;

/// Table holding one row per tracked change.
pub const BUILD_LOG_TABLE: &str = "build_log";

/// Record holding the shared build id counter.
pub const SEQUENCE_RECORD: &str = "ledger_sequence:build_id";

/// Initialize all ledger tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> StorageResult<()> {
    info!("Initializing build ledger schema");

    init_build_log_table(db).await?;
    init_sequence_table(db).await?;

    info!("Build ledger schema initialization complete");
    Ok(())
}

/// Initialize `build_log` table with constraints and indexes
///
/// Schema:
/// ```text
/// TABLE build_log {
///   build_id:     INT (unique, also the record key)
///   destination:  STRING (indexed with build_id)
///   entity_type:  STRING
///   entity_id:    STRING
///   recorded_at:  DATETIME
/// }
/// ```
///
/// Constraints:
/// - `build_id` is unique (a duplicate allocation fails the write)
/// - Rows can be created and read, never updated or deleted
async fn init_build_log_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing build_log table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS build_log SCHEMALESS
            PERMISSIONS
                FOR create, select FULL
                FOR update, delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_build_id ON TABLE build_log COLUMNS build_id UNIQUE;

        -- Range scans for latest_build and diff
        DEFINE INDEX IF NOT EXISTS idx_destination_build_id ON TABLE build_log COLUMNS destination, build_id;
    "#;

    db.query(sql)
        .await
        .and_then(|res| res.check())
        .map_err(|e| StorageError::SchemaSetup(e.to_string()))?;
    info!("✓ build_log table initialized");
    Ok(())
}

/// Initialize `ledger_sequence` table
///
/// The counter row itself is created lazily by the first `UPSERT`.
async fn init_sequence_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing ledger_sequence table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS ledger_sequence SCHEMALESS
            PERMISSIONS
                FOR create, select, update FULL
                FOR delete NONE;
    "#;

    db.query(sql)
        .await
        .and_then(|res| res.check())
        .map_err(|e| StorageError::SchemaSetup(e.to_string()))?;
    info!("✓ ledger_sequence table initialized");
    Ok(())
}

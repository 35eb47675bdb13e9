//! SurrealDB-backed BuildLedger implementation
//!
//! Uses `schema::ChangeRow` for persistence, converting to
//! `storage_traits::ChangeRecord` at the boundary.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::config::LedgerConfig;
use crate::error::StorageError;
use crate::migrations::{self, BUILD_LOG_TABLE, SEQUENCE_RECORD};
use crate::schema::{BuildIdRow, ChangeRow, SequenceRow};
use crate::storage_traits::{BuildId, BuildLedger, ChangeRecord, StorageResult};

/// SurrealDB-backed implementation of [`BuildLedger`].
#[derive(Clone)]
pub struct SurrealBuildLedger {
    db: Surreal<Any>,
}

impl SurrealBuildLedger {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `sitebuild/ledger`, and runs `init_schema`.
    pub async fn in_memory() -> StorageResult<Self> {
        Self::connect(&LedgerConfig::in_memory()).await
    }

    /// Connect using [`LedgerConfig::from_env`].
    pub async fn from_env() -> StorageResult<Self> {
        Self::connect(&LedgerConfig::from_env()).await
    }

    /// Connect to the configured endpoint, sign in if credentials are set,
    /// select namespace/database and initialize the schema.
    #[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
    pub async fn connect(config: &LedgerConfig) -> StorageResult<Self> {
        if let Some(path) = config.local_path() {
            std::fs::create_dir_all(path).map_err(|e| {
                StorageError::Connection(format!(
                    "Failed to create database directory {}: {}",
                    path, e
                ))
            })?;
        }

        let db = surrealdb::engine::any::connect(config.endpoint.as_str())
            .await
            .map_err(|e| {
                StorageError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
            })?;

        if let Some(creds) = &config.credentials {
            if creds.is_root {
                db.signin(Root {
                    username: &creds.username,
                    password: &creds.password,
                })
                .await
                .map_err(|e| StorageError::Connection(format!("Root auth failed: {e}")))?;
            } else {
                db.signin(Database {
                    namespace: &config.namespace,
                    database: &config.database,
                    username: &creds.username,
                    password: &creds.password,
                })
                .await
                .map_err(|e| StorageError::Connection(format!("DB auth failed: {e}")))?;
            }
        }

        db.use_ns(config.namespace.as_str())
            .use_db(config.database.as_str())
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;

        info!("SurrealBuildLedger connected");
        Ok(Self { db })
    }

    // -- private helpers -----------------------------------------------------

    /// Allocate a build id and store the change under it, rerunning both
    /// steps when either one loses a write conflict to a concurrent append.
    ///
    /// A single `UPSERT` is atomic, so concurrent callers never observe the
    /// same counter value. An id whose record write fails is skipped, never
    /// reused.
    async fn append_with_retry(&self, row: ChangeRow) -> StorageResult<ChangeRecord> {
        let mut attempt = 0;
        let mut backoff = BACKOFF_BASE;
        loop {
            match self.try_append(&row).await {
                Ok(AppendAttempt::Stored(record)) => return Ok(record),
                Ok(AppendAttempt::NoSequence) => {
                    return Err(StorageError::SequenceUnavailable {
                        destination: row.destination.clone(),
                    })
                }
                Ok(AppendAttempt::NotStored(build_id)) => {
                    return Err(StorageError::Backend(format!(
                        "build {build_id} was not stored"
                    )))
                }
                // The losing statement had no effect and can rerun.
                Err(e) if attempt < APPEND_CONFLICT_RETRIES && is_write_conflict(&e) => {
                    attempt += 1;
                    debug!(attempt, destination = %row.destination, "append conflicted, retrying");
                    let delay = backoff.min(BACKOFF_MAX) + Duration::from_millis(rand_jitter());
                    tokio::time::sleep(delay).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn try_append(&self, template: &ChangeRow) -> Result<AppendAttempt, surrealdb::Error> {
        let Some(build_id) = self.try_next_build_id().await? else {
            return Ok(AppendAttempt::NoSequence);
        };
        let row = ChangeRow {
            build_id,
            ..template.clone()
        };

        debug!(
            build_id,
            destination = %row.destination,
            entity_type = %row.entity_type,
            entity_id = %row.entity_id,
            "appending change"
        );

        let mut res = self
            .db
            .query("CREATE type::thing($table, $build_id) CONTENT $row")
            .bind(("table", BUILD_LOG_TABLE))
            .bind(("build_id", build_id))
            .bind(("row", row))
            .await?
            .check()?;

        let created: Vec<ChangeRow> = res.take(0)?;
        Ok(match created.into_iter().next() {
            Some(row) => AppendAttempt::Stored(row.into_record()),
            None => AppendAttempt::NotStored(build_id),
        })
    }

    async fn try_next_build_id(&self) -> Result<Option<i64>, surrealdb::Error> {
        let sql = format!("UPSERT {SEQUENCE_RECORD} SET value += 1 RETURN AFTER");
        let mut res = self.db.query(sql).await?.check()?;
        let rows: Vec<SequenceRow> = res.take(0)?;
        Ok(rows.into_iter().next().map(|row| row.value))
    }
}

enum AppendAttempt {
    Stored(ChangeRecord),
    NoSequence,
    NotStored(i64),
}

const APPEND_CONFLICT_RETRIES: u32 = 32;
const BACKOFF_BASE: Duration = Duration::from_millis(2);
const BACKOFF_MAX: Duration = Duration::from_millis(100);

fn is_write_conflict(err: &surrealdb::Error) -> bool {
    let message = err.to_string().to_lowercase();
    message.contains("conflict") || message.contains("can be retried")
}

/// 0-20ms of jitter added to each retry delay.
fn rand_jitter() -> u64 {
    let seed = u64::from(
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos(),
    );
    seed % 20
}

#[async_trait]
impl BuildLedger for SurrealBuildLedger {
    async fn append(
        &self,
        destination: &str,
        entity_type: &str,
        entity_id: &str,
    ) -> StorageResult<ChangeRecord> {
        let row = ChangeRow::new(0, destination, entity_type, entity_id);
        self.append_with_retry(row).await
    }

    async fn latest_build(&self, destination: &str) -> StorageResult<Option<BuildId>> {
        let mut res = self
            .db
            .query(
                "SELECT build_id FROM build_log WHERE destination = $destination \
                 ORDER BY build_id DESC LIMIT 1",
            )
            .bind(("destination", destination.to_string()))
            .await?;

        let rows: Vec<BuildIdRow> = res.take(0)?;
        Ok(rows.into_iter().next().map(|row| BuildId(row.build_id)))
    }

    async fn records_between(
        &self,
        destination: &str,
        from: BuildId,
        to: BuildId,
    ) -> StorageResult<Vec<ChangeRecord>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM build_log WHERE destination = $destination \
                 AND build_id >= $from AND build_id <= $to ORDER BY build_id ASC",
            )
            .bind(("destination", destination.to_string()))
            .bind(("from", from.value()))
            .bind(("to", to.value()))
            .await?;

        let rows: Vec<ChangeRow> = res.take(0)?;
        Ok(rows.into_iter().map(ChangeRow::into_record).collect())
    }
}

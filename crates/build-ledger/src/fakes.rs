//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryBuildLedger`, which satisfies the `BuildLedger` contract
//! without any external dependencies.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::storage_traits::*;

#[derive(Debug, Default)]
struct LedgerState {
    next_id: i64,
    records: Vec<ChangeRecord>,
}

/// In-memory build ledger backed by a `Vec<ChangeRecord>` and a counter.
///
/// The counter and the vector share one lock, so id assignment and the
/// write happen together.
#[derive(Debug, Default)]
pub struct MemoryBuildLedger {
    state: Mutex<LedgerState>,
    fail_writes: AtomicBool,
}

impl MemoryBuildLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `append` calls fail as if the store were unavailable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.fail_writes.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of every stored record in write order.
    pub fn records(&self) -> Vec<ChangeRecord> {
        self.state.lock().unwrap().records.clone()
    }
}

#[async_trait]
impl BuildLedger for MemoryBuildLedger {
    async fn append(
        &self,
        destination: &str,
        entity_type: &str,
        entity_id: &str,
    ) -> StorageResult<ChangeRecord> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("ledger unavailable".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let record = ChangeRecord {
            build_id: BuildId(state.next_id),
            destination: destination.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            recorded_at: Utc::now(),
        };
        state.records.push(record.clone());
        Ok(record)
    }

    async fn latest_build(&self, destination: &str) -> StorageResult<Option<BuildId>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .records
            .iter()
            .filter(|r| r.destination == destination)
            .map(|r| r.build_id)
            .max())
    }

    async fn records_between(
        &self,
        destination: &str,
        from: BuildId,
        to: BuildId,
    ) -> StorageResult<Vec<ChangeRecord>> {
        let state = self.state.lock().unwrap();
        // Records are pushed in id order, so the result is already ascending.
        Ok(state
            .records
            .iter()
            .filter(|r| r.destination == destination && r.build_id >= from && r.build_id <= to)
            .cloned()
            .collect())
    }
}

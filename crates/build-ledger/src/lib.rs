//! Build-Ledger: Append-Only Change Log for SiteBuild
//!
//! This crate provides the persistence layer for the build notification
//! dispatcher. Every content change is stored as an immutable
//! [`ChangeRecord`] stamped with a globally monotonic [`BuildId`].
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: Atomic id assignment, immutability, and range scans per destination.
//!
//! ## Key Components
//!
//! - `BuildLedger`: Backend-agnostic storage trait
//! - `SurrealBuildLedger`: SurrealDB implementation (embedded or remote)
//! - `MemoryBuildLedger`: In-memory fake for tests
//! - `LedgerConfig`: Connection settings, optionally read from the environment

mod config;
mod error;
pub mod fakes;
pub mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_ledger;

pub use config::{LedgerConfig, LedgerCredentials};
pub use error::StorageError;
pub use schema::ChangeRow;
pub use storage_traits::{BuildId, BuildLedger, ChangeRecord, StorageResult};
pub use surreal_ledger::SurrealBuildLedger;

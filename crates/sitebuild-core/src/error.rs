//! Error taxonomy for SiteBuild core operations.

use build_ledger::StorageError;

use crate::transport::TransportError;

/// SiteBuild errors.
#[derive(Debug, thiserror::Error)]
pub enum SiteBuildError {
    #[error("ledger error: {0}")]
    Storage(#[from] StorageError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for SiteBuild core operations.
pub type Result<T> = std::result::Result<T, SiteBuildError>;

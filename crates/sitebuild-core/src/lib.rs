//! SiteBuild Core Library
//!
//! Change tracking, coalesced build notifications and build status
//! reconciliation on top of the [`build_ledger`] change log.

pub mod config;
pub mod error;
pub mod fakes;
pub mod messages;
pub mod notifier;
pub mod obs;
pub mod reconciler;
pub mod registry;
pub mod telemetry;
pub mod tracker;
pub mod transport;
pub mod unit_of_work;

pub use build_ledger::{BuildId, BuildLedger, ChangeRecord, StorageError};

pub use config::SiteBuildConfig;
pub use error::{Result, SiteBuildError};
pub use messages::{Message, MessageLevel, Messenger};
pub use notifier::{BuildMonitor, BuildNotifier, Delivery, FailedDelivery, FlushReport};
pub use reconciler::BuildStatusReconciler;
pub use registry::{DestinationConfig, ServerRegistry, StaticServerRegistry};
pub use tracker::{ChangeUpdate, UpdateTracker};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport, TransportError};
pub use unit_of_work::{BuildServices, UnitOfWork, WorkReport};

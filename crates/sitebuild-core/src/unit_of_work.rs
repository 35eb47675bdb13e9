//! Unit of work: one request, one CLI command, one batch job.
//!
//! [`BuildServices`] holds the long-lived, shared handles (ledger, registry,
//! transport). [`UnitOfWork::begin`] creates a fresh tracker and notifier on
//! top of them; [`UnitOfWork::finish`] flushes queued notifications once and
//! hands back every message produced along the way.

use std::sync::Arc;

use build_ledger::{BuildLedger, SurrealBuildLedger};
use serde::Serialize;
use tracing::{debug, Instrument};
use uuid::Uuid;

use crate::config::SiteBuildConfig;
use crate::error::Result;
use crate::messages::{Message, Messenger};
use crate::notifier::{BuildMonitor, BuildNotifier, FlushReport};
use crate::obs;
use crate::reconciler::BuildStatusReconciler;
use crate::registry::ServerRegistry;
use crate::tracker::UpdateTracker;
use crate::transport::{HttpTransport, ReqwestTransport};

/// Process-wide handles shared by every unit of work.
#[derive(Clone)]
pub struct BuildServices {
    ledger: Arc<dyn BuildLedger>,
    registry: Arc<dyn ServerRegistry>,
    transport: Arc<dyn HttpTransport>,
    monitor: Option<Arc<dyn BuildMonitor>>,
}

impl BuildServices {
    pub fn new(
        ledger: Arc<dyn BuildLedger>,
        registry: Arc<dyn ServerRegistry>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            ledger,
            registry,
            transport,
            monitor: None,
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn BuildMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// SurrealDB ledger and reqwest transport as described by `config`.
    pub async fn from_config(config: &SiteBuildConfig) -> Result<Self> {
        let ledger = SurrealBuildLedger::connect(&config.ledger_config()).await?;
        let transport = ReqwestTransport::new()?;
        Ok(Self::new(
            Arc::new(ledger),
            Arc::new(config.registry()),
            Arc::new(transport),
        ))
    }

    pub fn ledger(&self) -> &Arc<dyn BuildLedger> {
        &self.ledger
    }

    pub fn registry(&self) -> &Arc<dyn ServerRegistry> {
        &self.registry
    }

    pub fn begin(&self) -> UnitOfWork {
        UnitOfWork::begin(self)
    }
}

impl std::fmt::Debug for BuildServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildServices")
            .field("monitor", &self.monitor.is_some())
            .finish_non_exhaustive()
    }
}

/// What a finished unit of work did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkReport {
    pub flush: FlushReport,
    pub messages: Vec<Message>,
}

impl WorkReport {
    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(Message::is_error)
    }
}

/// Scope for deduplication, notification coalescing and messages.
///
/// Always end it with [`UnitOfWork::finish`]. Dropping it unfinished
/// discards whatever notifications are still queued.
pub struct UnitOfWork {
    id: Uuid,
    span: tracing::Span,
    tracker: UpdateTracker,
    reconciler: BuildStatusReconciler,
    messenger: Messenger,
    finished: bool,
}

impl UnitOfWork {
    pub fn begin(services: &BuildServices) -> Self {
        let id = Uuid::new_v4();
        let span = obs::unit_of_work_span(&id.to_string());
        let messenger = Messenger::new();

        let mut notifier = BuildNotifier::new(
            Arc::clone(&services.registry),
            Arc::clone(&services.transport),
            messenger.clone(),
        );
        if let Some(monitor) = &services.monitor {
            notifier = notifier.with_monitor(Arc::clone(monitor));
        }

        let tracker = UpdateTracker::new(Arc::clone(&services.ledger), Arc::new(notifier));
        let reconciler = BuildStatusReconciler::new(
            Arc::clone(&services.registry),
            Arc::clone(&services.transport),
        );

        span.in_scope(|| debug!("unit of work started"));
        Self {
            id,
            span,
            tracker,
            reconciler,
            messenger,
            finished: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Span to instrument this unit's futures with.
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    pub fn tracker(&self) -> &UpdateTracker {
        &self.tracker
    }

    pub fn notifier(&self) -> &Arc<BuildNotifier> {
        self.tracker.notifier()
    }

    pub fn reconciler(&self) -> &BuildStatusReconciler {
        &self.reconciler
    }

    pub fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    /// Flush queued notifications and collect this unit's messages.
    pub async fn finish(mut self) -> WorkReport {
        self.finished = true;
        let flush = self
            .tracker
            .notifier()
            .flush()
            .instrument(self.span.clone())
            .await;
        self.span.in_scope(|| debug!("unit of work finished"));

        WorkReport {
            flush,
            messages: self.messenger.drain(),
        }
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if self.finished || !self.notifier().is_armed() {
            return;
        }
        let _span = obs::UnitOfWorkSpan::enter(&self.id.to_string());
        obs::emit_unit_of_work_abandoned(self.notifier().pending().len());
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("tracker", &self.tracker)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

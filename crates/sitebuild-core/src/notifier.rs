//! Build notifier: coalesces build ids per webhook and flushes them once.
//!
//! Within a unit of work every `trigger` overwrites the pending id for the
//! destination's webhook URL, so only the newest id is ever sent. Nothing is
//! sent until [`BuildNotifier::flush`] runs at the end of the unit of work.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use build_ledger::BuildId;
use futures::future::join_all;
use serde::Serialize;
use tracing::debug;

use crate::messages::Messenger;
use crate::obs;
use crate::registry::ServerRegistry;
use crate::transport::HttpTransport;

/// Substring identifying the build webhook (as opposed to a preview refresh).
pub const BUILD_WEBHOOK_MARKER: &str = "/data_source/publish/";

/// Optional hook told when a full build has been kicked off.
pub trait BuildMonitor: Send + Sync {
    fn mark_building(&self);
}

/// A notification that reached its webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub url: String,
    pub build_id: BuildId,
}

/// A notification that did not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedDelivery {
    pub url: String,
    pub build_id: BuildId,
    pub error: String,
}

/// Outcome of one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub delivered: Vec<Delivery>,
    pub failed: Vec<FailedDelivery>,
}

impl FlushReport {
    /// Number of outbound calls attempted.
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempted() == 0
    }
}

/// Unit-of-work scoped notifier.
pub struct BuildNotifier {
    registry: Arc<dyn ServerRegistry>,
    transport: Arc<dyn HttpTransport>,
    monitor: Option<Arc<dyn BuildMonitor>>,
    messenger: Messenger,
    pending: Mutex<BTreeMap<String, BuildId>>,
    armed: AtomicBool,
}

impl BuildNotifier {
    pub fn new(
        registry: Arc<dyn ServerRegistry>,
        transport: Arc<dyn HttpTransport>,
        messenger: Messenger,
    ) -> Self {
        Self {
            registry,
            transport,
            monitor: None,
            messenger,
            pending: Mutex::new(BTreeMap::new()),
            armed: AtomicBool::new(false),
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn BuildMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn registry(&self) -> &Arc<dyn ServerRegistry> {
        &self.registry
    }

    pub fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    /// Queue `build_id` for the destination's webhook, replacing any id
    /// already queued for the same URL. Destinations without a webhook are
    /// ignored.
    pub fn trigger(&self, destination: &str, build_id: BuildId) {
        if !self.armed.swap(true, Ordering::SeqCst) {
            debug!("end-of-work flush armed");
        }

        match self.registry.resolve_webhook(destination) {
            Some(url) => {
                debug!(destination, url = %url, %build_id, "build notification queued");
                self.lock_pending().insert(url, build_id);
            }
            None => debug!(destination, "no webhook configured, skipping notification"),
        }
    }

    /// Whether a flush has been requested in this unit of work.
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Snapshot of the queued `url -> build id` pairs.
    pub fn pending(&self) -> BTreeMap<String, BuildId> {
        self.lock_pending().clone()
    }

    /// Send every queued notification.
    ///
    /// Calls run concurrently and independently: one failing URL does not
    /// stop the others. Each failure adds two error messages. The queue is
    /// drained, so a repeated call sends nothing.
    pub async fn flush(&self) -> FlushReport {
        if !self.armed.swap(false, Ordering::SeqCst) {
            return FlushReport::default();
        }
        let pending = std::mem::take(&mut *self.lock_pending());

        let attempts = pending.into_iter().map(|(url, build_id)| {
            let transport = Arc::clone(&self.transport);
            async move {
                let result = transport.post_build_notification(&url, build_id).await;
                (url, build_id, result)
            }
        });

        let mut report = FlushReport::default();
        for (url, build_id, result) in join_all(attempts).await {
            match result {
                Ok(()) => {
                    obs::emit_notification_sent(&url, build_id);
                    if url.contains(BUILD_WEBHOOK_MARKER) {
                        if let Some(monitor) = &self.monitor {
                            monitor.mark_building();
                        }
                    }
                    report.delivered.push(Delivery { url, build_id });
                }
                Err(err) => {
                    obs::emit_notification_failed(&url, build_id, &err);
                    self.messenger.add_error(format!(
                        "Could not send build notification to server \"{url}\"."
                    ));
                    self.messenger.add_error(err.to_string());
                    report.failed.push(FailedDelivery {
                        url,
                        build_id,
                        error: err.to_string(),
                    });
                }
            }
        }

        obs::emit_flush_completed(report.delivered.len(), report.failed.len());
        report
    }

    fn lock_pending(&self) -> MutexGuard<'_, BTreeMap<String, BuildId>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for BuildNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildNotifier")
            .field("pending", &self.pending())
            .field("armed", &self.is_armed())
            .finish_non_exhaustive()
    }
}

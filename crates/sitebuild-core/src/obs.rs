//! Structured observability hooks for tracking and notification events.
//!
//! This module provides:
//! - Unit-of-work scoped tracing spans, either as a `Span` to instrument
//!   futures with or via the `UnitOfWorkSpan` RAII guard
//! - Emission functions for key events: change tracked/deduplicated,
//!   notification sent/failed, flush completed

use build_ledger::BuildId;
use tracing::{debug, info, warn};

/// Span tagged with the unit-of-work id, for `Instrument::instrument`.
pub fn unit_of_work_span(unit_of_work: &str) -> tracing::Span {
    tracing::info_span!("sitebuild.unit_of_work", unit_of_work = %unit_of_work)
}

/// RAII guard that enters a unit-of-work span.
///
/// # Example
///
/// ```ignore
/// let _span = UnitOfWorkSpan::enter("5f0c...");
/// // tracing calls are now associated with unit_of_work = "5f0c..."
/// ```
pub struct UnitOfWorkSpan {
    _span: tracing::span::EnteredSpan,
}

impl UnitOfWorkSpan {
    /// Create and enter a span tagged with the unit-of-work id.
    pub fn enter(unit_of_work: &str) -> Self {
        Self {
            _span: unit_of_work_span(unit_of_work).entered(),
        }
    }
}

/// Emit event: a change was written to the ledger.
pub fn emit_change_tracked(
    destination: &str,
    entity_type: &str,
    entity_id: &str,
    build_id: BuildId,
    notify: bool,
) {
    info!(
        event = "change.tracked",
        destination = %destination,
        entity_type = %entity_type,
        entity_id = %entity_id,
        build_id = build_id.value(),
        notify = notify,
    );
}

/// Emit event: a change was already tracked in this unit of work.
pub fn emit_change_deduplicated(destination: &str, entity_type: &str, entity_id: &str) {
    debug!(
        event = "change.deduplicated",
        destination = %destination,
        entity_type = %entity_type,
        entity_id = %entity_id,
    );
}

/// Emit event: a build notification was delivered.
pub fn emit_notification_sent(url: &str, build_id: BuildId) {
    info!(event = "notification.sent", url = %url, build_id = build_id.value());
}

/// Emit event: a build notification could not be delivered (warning level).
pub fn emit_notification_failed(url: &str, build_id: BuildId, error: &dyn std::fmt::Display) {
    warn!(
        event = "notification.failed",
        url = %url,
        build_id = build_id.value(),
        error = %error,
    );
}

/// Emit event: the end-of-work flush finished.
pub fn emit_flush_completed(delivered: usize, failed: usize) {
    info!(event = "flush.completed", delivered = delivered, failed = failed);
}

/// Emit event: a unit of work went away with notifications still queued.
pub fn emit_unit_of_work_abandoned(pending: usize) {
    warn!(
        event = "unit_of_work.abandoned",
        pending = pending,
        "unit of work dropped before finish, queued notifications discarded"
    );
}

//! Update tracker: the public API over the build ledger.
//!
//! - `track` writes a change (once per key per unit of work) and queues a
//!   notification for it.
//! - `latest_build` reports a destination's watermark.
//! - `diff` answers "what changed between build A and build B?".

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use build_ledger::{BuildId, BuildLedger};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::notifier::BuildNotifier;
use crate::obs;

/// An entity that changed, without the build it changed in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeUpdate {
    pub entity_type: String,
    pub entity_id: String,
}

impl ChangeUpdate {
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }
}

/// Dedup key. Scoped per destination: the same entity tracked for two
/// destinations is written twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TrackKey {
    destination: String,
    entity_type: String,
    entity_id: String,
}

impl TrackKey {
    fn new(destination: &str, entity_type: &str, entity_id: &str) -> Self {
        Self {
            destination: destination.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
        }
    }
}

/// Unit-of-work scoped tracker.
///
/// The ledger handle is shared with every other unit of work; the dedup
/// cache is not.
pub struct UpdateTracker {
    ledger: Arc<dyn BuildLedger>,
    notifier: Arc<BuildNotifier>,
    seen: Mutex<HashMap<TrackKey, BuildId>>,
}

impl UpdateTracker {
    pub fn new(ledger: Arc<dyn BuildLedger>, notifier: Arc<BuildNotifier>) -> Self {
        Self {
            ledger,
            notifier,
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn notifier(&self) -> &Arc<BuildNotifier> {
        &self.notifier
    }

    /// Record a change and return its build id.
    ///
    /// A key already tracked in this unit of work is not written again and
    /// queues nothing; the id it was first given is returned. With
    /// `notify == false` the change is recorded but no webhook is queued.
    ///
    /// A ledger failure is returned as-is and nothing is queued.
    pub async fn track(
        &self,
        destination: &str,
        entity_type: &str,
        entity_id: &str,
        notify: bool,
    ) -> Result<BuildId> {
        let key = TrackKey::new(destination, entity_type, entity_id);

        // Held across the write so a concurrent track of the same key in
        // this unit of work waits and then sees the cached id.
        let mut seen = self.seen.lock().await;
        if let Some(build_id) = seen.get(&key) {
            obs::emit_change_deduplicated(destination, entity_type, entity_id);
            return Ok(*build_id);
        }

        let record = self
            .ledger
            .append(destination, entity_type, entity_id)
            .await?;
        seen.insert(key, record.build_id);
        drop(seen);

        obs::emit_change_tracked(destination, entity_type, entity_id, record.build_id, notify);
        if notify {
            self.notifier.trigger(destination, record.build_id);
        }
        Ok(record.build_id)
    }

    /// Highest build id for `destination`, or [`BuildId::NONE`].
    pub async fn latest_build(&self, destination: &str) -> Result<BuildId> {
        Ok(self
            .ledger
            .latest_build(destination)
            .await?
            .unwrap_or(BuildId::NONE))
    }

    /// Distinct entities changed for `destination` in `(from, to]`.
    ///
    /// Returns an empty list unless `from` is [`BuildId::NONE`] or an existing
    /// build of the destination, `to` is an existing build of the destination,
    /// and `from < to`. An empty answer tells the caller to resynchronize
    /// everything.
    pub async fn diff(
        &self,
        from: BuildId,
        to: BuildId,
        destination: &str,
    ) -> Result<Vec<ChangeUpdate>> {
        if from >= to {
            return Ok(Vec::new());
        }

        let records = self.ledger.records_between(destination, from, to).await?;

        let to_exists = records.iter().any(|r| r.build_id == to);
        let from_valid = from.is_none() || records.iter().any(|r| r.build_id == from);
        if !to_exists || !from_valid {
            return Ok(Vec::new());
        }

        let mut seen = HashSet::new();
        Ok(records
            .into_iter()
            .filter(|r| r.build_id > from)
            .map(|r| ChangeUpdate::new(r.entity_type, r.entity_id))
            .filter(|update| seen.insert(update.clone()))
            .collect())
    }

    /// Ids of entities of `entity_type` changed between two builds.
    ///
    /// Empty when either watermark is missing; otherwise [`Self::diff`]
    /// filtered by type.
    pub async fn changes_for_type(
        &self,
        last_build: Option<BuildId>,
        current_build: Option<BuildId>,
        destination: &str,
        entity_type: &str,
    ) -> Result<Vec<String>> {
        let (Some(last), Some(current)) = (last_build, current_build) else {
            return Ok(Vec::new());
        };

        Ok(self
            .diff(last, current, destination)
            .await?
            .into_iter()
            .filter(|update| update.entity_type == entity_type)
            .map(|update| update.entity_id)
            .collect())
    }

    /// Forget which changes were tracked. The ledger and the notifier's
    /// queue are untouched.
    pub async fn clear(&self) {
        self.seen.lock().await.clear();
    }
}

impl std::fmt::Debug for UpdateTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateTracker")
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}

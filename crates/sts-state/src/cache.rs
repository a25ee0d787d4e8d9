use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use sts_types::{LatestStatus, StatusEvent};

/// Latest status per identifier, ordered by identifier.
pub type StatusSnapshot = BTreeMap<String, LatestStatus>;

/// Shared latest-status map. Readers get a whole snapshot; the single writer
/// replaces it wholesale on every status cycle.
#[derive(Debug, Clone)]
pub struct StatusCache {
    snapshot: Arc<ArcSwap<StatusSnapshot>>,
}

impl Default for StatusCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusCache {
    pub fn new() -> Self {
        Self {
            snapshot: Arc::new(ArcSwap::from_pointee(StatusSnapshot::new())),
        }
    }

    pub fn snapshot(&self) -> Arc<StatusSnapshot> {
        self.snapshot.load_full()
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }

    /// Replaces the map with `events`; later duplicates of an identifier win.
    pub fn rebuild(&self, events: &[StatusEvent]) -> usize {
        let mut next = StatusSnapshot::new();
        for event in events {
            next.insert(event.identifier.clone(), event.clone());
        }
        let size = next.len();
        self.snapshot.store(Arc::new(next));
        size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(identifier: &str, status_code: &str) -> StatusEvent {
        StatusEvent {
            identifier: identifier.to_string(),
            status_code: status_code.to_string(),
            ..StatusEvent::default()
        }
    }

    #[test]
    fn functional_rebuild_replaces_previous_snapshot() {
        let cache = StatusCache::new();
        cache.rebuild(&[event("A", "50"), event("B", "60")]);
        let before = cache.snapshot();

        let size = cache.rebuild(&[event("C", "70"), event("C", "72")]);
        assert_eq!(size, 1);
        let after = cache.snapshot();
        assert_eq!(after.keys().collect::<Vec<_>>(), vec!["C"]);
        assert_eq!(after["C"].status_code, "72");
        assert_eq!(before.len(), 2, "readers keep the snapshot they loaded");
    }

    #[test]
    fn unit_clones_share_one_snapshot() {
        let cache = StatusCache::new();
        let reader = cache.clone();
        cache.rebuild(&[event("A", "50")]);
        assert_eq!(reader.len(), 1);
        assert!(!reader.is_empty());
    }
}

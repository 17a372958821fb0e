//! Busy tracking for asset-mutating operations.
//!
//! The system is busy while at least one asset mutation is executing. Busy
//! state gates whole-registry refreshes and delays pause requests.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque identifier of one in-flight operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BusyId(String);

impl BusyId {
    /// Unique id prefixed with the operation label.
    pub fn new(label: &str) -> Self {
        Self(format!("{}-{}", label, Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BusyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Set of in-flight asset mutations. Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct BusyTracker {
    in_flight: Arc<Mutex<HashSet<BusyId>>>,
}

impl BusyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if `id` was already tracked.
    pub fn begin(&self, id: BusyId) -> bool {
        self.in_flight.lock().insert(id)
    }

    /// Returns `false` if `id` was not tracked.
    pub fn end(&self, id: &BusyId) -> bool {
        self.in_flight.lock().remove(id)
    }

    pub fn is_busy(&self) -> bool {
        !self.in_flight.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        !self.is_busy()
    }

    /// Begin tracking a fresh id for `label`; the id ends when the guard drops.
    pub fn track(&self, label: &str) -> BusyGuard {
        let id = BusyId::new(label);
        self.begin(id.clone());
        BusyGuard {
            tracker: self.clone(),
            id,
        }
    }
}

/// Ends its busy id on drop, including when the owning future is dropped or
/// unwinds.
#[derive(Debug)]
pub struct BusyGuard {
    tracker: BusyTracker,
    id: BusyId,
}

impl BusyGuard {
    pub fn id(&self) -> &BusyId {
        &self.id
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.tracker.end(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_end() {
        let tracker = BusyTracker::new();
        assert!(!tracker.is_busy());

        let first = BusyId::new("asset_save");
        let second = BusyId::new("asset_save");
        assert_ne!(first, second);
        assert!(first.as_str().starts_with("asset_save-"));

        assert!(tracker.begin(first.clone()));
        assert!(!tracker.begin(first.clone()));
        assert!(tracker.begin(second.clone()));
        assert_eq!(tracker.len(), 2);

        assert!(tracker.end(&first));
        assert!(tracker.is_busy());
        assert!(tracker.end(&second));
        assert!(!tracker.is_busy());
        assert!(!tracker.end(&second));
    }

    #[test]
    fn test_guard_ends_on_drop() {
        let tracker = BusyTracker::new();
        {
            let guard = tracker.track("asset_delete");
            assert!(tracker.is_busy());
            assert!(guard.id().as_str().starts_with("asset_delete-"));
        }
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_clones_share_state() {
        let tracker = BusyTracker::new();
        let observer = tracker.clone();

        let _guard = tracker.track("asset_move");
        assert!(observer.is_busy());
    }

    #[core_async::test]
    async fn test_guard_ends_when_future_is_dropped() {
        let tracker = BusyTracker::new();
        let inner = tracker.clone();

        let handle = core_async::spawn(async move {
            let _guard = inner.track("asset_reimport");
            core_async::sleep(core_async::Duration::from_secs(60)).await;
        });

        core_async::task::yield_now().await;
        assert!(tracker.is_busy());

        handle.abort();
        let _ = handle.await;
        assert!(!tracker.is_busy());
    }
}

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, PoisonError},
};

use chrono::NaiveDateTime;

use crate::clock::Clock;

#[derive(Default)]
struct Registry {
    next_id: u64,
    pending: BTreeMap<u64, NaiveDateTime>,
}

/// Capture ticks that hold a timestamp but have no row yet.
///
/// Stamping a tick and choosing a rollup's window end both read the clock
/// under the same lock, so a window never ends past a timestamp that is
/// still waiting to be persisted.
#[derive(Clone, Default)]
pub(crate) struct InFlightCaptures {
    registry: Arc<Mutex<Registry>>,
}

impl InFlightCaptures {
    pub(crate) fn stamp(&self, clock: &dyn Clock) -> PendingCapture {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let timestamp = clock.now();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.pending.insert(id, timestamp);

        PendingCapture {
            registry: Arc::clone(&self.registry),
            id,
            timestamp,
        }
    }

    /// `clock.now()`, pulled back to the oldest pending timestamp.
    pub(crate) fn window_end(&self, clock: &dyn Clock) -> NaiveDateTime {
        let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let now = clock.now();
        registry
            .pending
            .values()
            .copied()
            .min()
            .map_or(now, |oldest| oldest.min(now))
    }
}

/// Registration of one capture tick; released on drop, whether the tick
/// persisted or failed.
pub struct PendingCapture {
    registry: Arc<Mutex<Registry>>,
    id: u64,
    timestamp: NaiveDateTime,
}

impl PendingCapture {
    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
}

impl Drop for PendingCapture {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .remove(&self.id);
    }
}

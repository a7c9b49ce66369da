//! Per-battery serialization

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// Keyed async locks; an entry lives only while someone holds or awaits it
#[derive(Default)]
pub struct BatteryLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Exclusive access to one battery's prediction history
pub struct BatteryGuard<'a> {
    locks: &'a BatteryLocks,
    battery_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl BatteryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `battery_id`
    pub async fn acquire(&self, battery_id: &str) -> BatteryGuard<'_> {
        let lock = self
            .locks
            .entry(battery_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = lock.lock_owned().await;
        trace!("Acquired lock for {}", battery_id);

        BatteryGuard {
            locks: self,
            battery_id: battery_id.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of batteries with a live lock entry
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for BatteryGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Map's own reference is the only one left when nobody is waiting
        self.locks
            .locks
            .remove_if(&self.battery_id, |_, lock| Arc::strong_count(lock) == 1);
        trace!("Released lock for {}", self.battery_id);
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// One exclusive in-process lock per event id.
#[derive(Clone, Default)]
pub struct EventLocks {
    inner: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl EventLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for `event_id`, creating it on first use. The table
    /// lock is released before the caller acquires the event lock. Entries are
    /// never pruned; the table grows with the number of events served.
    pub fn for_event(&self, event_id: i64) -> Arc<Mutex<()>> {
        self.inner.lock().entry(event_id).or_default().clone()
    }
}

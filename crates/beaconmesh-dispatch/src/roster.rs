//! Watch roster — bookkeeping sink at the check-engine boundary.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use beaconmesh_registry::MonitoredInstance;

use crate::traits::CheckSink;

/// Tracks the instances this node is currently responsible for watching.
///
/// Stands where a check-execution engine indexes its work: it accepts the
/// dispatcher's add/remove announcements and answers introspection queries.
/// Re-adding an instance already on the roster replaces the record, so the
/// ensure pass re-announcing a known assignment is harmless.
#[derive(Default)]
pub struct WatchRoster {
    watched: Mutex<HashMap<String, Arc<MonitoredInstance>>>,
}

impl WatchRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watched_count(&self) -> usize {
        self.watched.lock().unwrap().len()
    }

    pub fn is_watching(&self, id: &str) -> bool {
        self.watched.lock().unwrap().contains_key(id)
    }

    /// Ids currently on the roster, sorted.
    pub fn watched_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.watched.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// The instances currently on the roster.
    pub fn snapshot(&self) -> Vec<Arc<MonitoredInstance>> {
        self.watched.lock().unwrap().values().cloned().collect()
    }
}

impl CheckSink for WatchRoster {
    fn add_instance(&self, instance: &Arc<MonitoredInstance>) {
        debug!(id = %instance.id(), "roster add");
        self.watched
            .lock()
            .unwrap()
            .insert(instance.id().to_string(), Arc::clone(instance));
    }

    fn remove_instance(&self, instance: &Arc<MonitoredInstance>) {
        debug!(id = %instance.id(), "roster remove");
        self.watched.lock().unwrap().remove(instance.id());
    }
}

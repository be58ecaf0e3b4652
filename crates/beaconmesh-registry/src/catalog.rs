//! In-memory catalog — the dispatcher's source of truth.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::types::{InstanceSpec, MonitoredInstance, PeerNode};

/// Which catalog tables a mutation touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogEvent {
    pub peers_changed: bool,
    pub instances_changed: bool,
}

impl CatalogEvent {
    fn peers() -> Self {
        Self {
            peers_changed: true,
            instances_changed: false,
        }
    }

    fn instances() -> Self {
        Self {
            peers_changed: false,
            instances_changed: true,
        }
    }
}

/// Callback invoked after every effective catalog mutation.
///
/// Runs on the mutating thread with no catalog lock held, so it may freely
/// take its own locks. Expected to be cheap; raising a dirty flag is the
/// intended use.
pub type ChangeCallback = Arc<dyn Fn(CatalogEvent) + Send + Sync>;

#[derive(Default)]
struct Tables {
    peers: HashMap<String, PeerNode>,
    instances: HashMap<String, Arc<MonitoredInstance>>,
}

/// In-memory registry of peer nodes and monitored instances.
///
/// # Concurrency
///
/// Mutations are cheap map writes under a `std::sync::RwLock`; the change
/// callback fires after the write lock is released. Enumeration holds the
/// read lock for the whole visit, so visitors must be fast and must not
/// call back into the catalog.
///
/// Writing an identical value is a no-op and emits no event. This is what
/// lets upstream transports re-deliver full snapshots without waking the
/// dispatcher.
pub struct Catalog {
    tables: RwLock<Tables>,
    on_change: RwLock<Option<ChangeCallback>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            on_change: RwLock::new(None),
        }
    }

    /// Register the mutation callback, replacing any previous one.
    pub fn set_on_change(&self, callback: ChangeCallback) {
        *self.on_change.write().unwrap() = Some(callback);
    }

    fn emit(&self, event: CatalogEvent) {
        let callback = self.on_change.read().unwrap().clone();
        if let Some(callback) = callback {
            callback(event);
        }
    }

    // ── Peers ──────────────────────────────────────────────────────

    /// Insert or update a peer. Emits no event when the stored value is
    /// already identical.
    pub fn upsert_peer(&self, peer: PeerNode) {
        let changed = {
            let mut tables = self.tables.write().unwrap();
            match tables.peers.get(&peer.host) {
                Some(existing) if *existing == peer => false,
                _ => {
                    debug!(
                        host = %peer.host,
                        healthy = peer.healthy,
                        isolated = peer.isolated,
                        "peer upserted"
                    );
                    tables.peers.insert(peer.host.clone(), peer);
                    true
                }
            }
        };
        if changed {
            self.emit(CatalogEvent::peers());
        }
    }

    /// Remove a peer. Returns whether it was present.
    pub fn remove_peer(&self, host: &str) -> bool {
        let removed = self.tables.write().unwrap().peers.remove(host).is_some();
        if removed {
            debug!(%host, "peer removed");
            self.emit(CatalogEvent::peers());
        }
        removed
    }

    pub fn peer_count(&self) -> usize {
        self.tables.read().unwrap().peers.len()
    }

    /// Snapshot of all peers, healthy or not.
    pub fn peers(&self) -> Vec<PeerNode> {
        self.tables.read().unwrap().peers.values().cloned().collect()
    }

    /// Visit every peer without cloning the table.
    pub fn for_each_peer(&self, mut visit: impl FnMut(&PeerNode)) {
        let tables = self.tables.read().unwrap();
        for peer in tables.peers.values() {
            visit(peer);
        }
    }

    // ── Instances ──────────────────────────────────────────────────

    /// Admit or update an instance. The ring key is derived here, once.
    /// Emits no event when the stored value is already identical.
    pub fn upsert_instance(&self, spec: InstanceSpec) {
        let instance = Arc::new(MonitoredInstance::new(spec));
        let changed = {
            let mut tables = self.tables.write().unwrap();
            match tables.instances.get(instance.id()) {
                Some(existing) if **existing == *instance => false,
                _ => {
                    debug!(
                        id = %instance.id(),
                        service = %instance.spec.service,
                        namespace = %instance.spec.namespace,
                        "instance upserted"
                    );
                    tables.instances.insert(instance.id().to_string(), instance);
                    true
                }
            }
        };
        if changed {
            self.emit(CatalogEvent::instances());
        }
    }

    /// Deregister an instance. Returns whether it was present.
    pub fn remove_instance(&self, id: &str) -> bool {
        let removed = self.tables.write().unwrap().instances.remove(id).is_some();
        if removed {
            debug!(%id, "instance removed");
            self.emit(CatalogEvent::instances());
        }
        removed
    }

    pub fn instance_count(&self) -> usize {
        self.tables.read().unwrap().instances.len()
    }

    pub fn get_instance(&self, id: &str) -> Option<Arc<MonitoredInstance>> {
        self.tables.read().unwrap().instances.get(id).cloned()
    }

    /// Snapshot of all monitored instances.
    pub fn instances(&self) -> Vec<Arc<MonitoredInstance>> {
        self.tables.read().unwrap().instances.values().cloned().collect()
    }

    /// Visit every instance without cloning the table.
    pub fn for_each_instance(&self, mut visit: impl FnMut(&Arc<MonitoredInstance>)) {
        let tables = self.tables.read().unwrap();
        for instance in tables.instances.values() {
            visit(instance);
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

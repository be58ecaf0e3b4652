//! Seams between the dispatcher and its collaborators.

use std::sync::Arc;

use beaconmesh_registry::{Catalog, MonitoredInstance, PeerNode};

/// Read access to the cluster as this node currently knows it.
///
/// The dispatcher re-derives full state from this view on every pass and
/// never applies incremental deltas, so implementations need no history,
/// no ordering guarantees, and no delivery guarantees. They are expected
/// to be in-memory and fast; the reconciliation loop calls them inline.
pub trait ClusterView: Send + Sync {
    /// Visit every known peer node, eligible or not.
    fn for_each_peer(&self, visit: &mut dyn FnMut(&PeerNode));

    /// Visit every instance currently registered for checking.
    fn for_each_instance(&self, visit: &mut dyn FnMut(&Arc<MonitoredInstance>));
}

/// Where ownership changes are announced.
///
/// Calls are fire-and-forget: not durable and not acknowledged. Receivers
/// must treat them as idempotent, because a node that restarts re-derives
/// its owned set from scratch and announces all of it again.
pub trait CheckSink: Send + Sync {
    /// This node now owns `instance`; start checking it.
    fn add_instance(&self, instance: &Arc<MonitoredInstance>);

    /// This node no longer owns `instance`; stop checking it.
    fn remove_instance(&self, instance: &Arc<MonitoredInstance>);
}

impl ClusterView for Catalog {
    fn for_each_peer(&self, visit: &mut dyn FnMut(&PeerNode)) {
        Catalog::for_each_peer(self, visit);
    }

    fn for_each_instance(&self, visit: &mut dyn FnMut(&Arc<MonitoredInstance>)) {
        Catalog::for_each_instance(self, visit);
    }
}

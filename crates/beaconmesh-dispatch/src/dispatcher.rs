//! The dispatcher — reconciles this node's share of the check work.
//!
//! One serial loop per node, two timers. The event timer (5s) drains the
//! dirty flags raised when the registry changes; the ensure timer (61s)
//! re-derives membership and ownership unconditionally, which heals any
//! missed or dropped signal. Every pass rebuilds state from the
//! [`ClusterView`] instead of patching it, so a pass is always safe to
//! repeat and the sink only ever hears about genuine differences.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use beaconmesh_registry::MonitoredInstance;
use beaconmesh_ring::{Bucket, Continuum, DEFAULT_BUCKET_WEIGHT};

use crate::signal::DirtyFlags;
use crate::traits::{CheckSink, ClusterView};

/// Short tick: drain pending change signals.
const DEFAULT_EVENT_INTERVAL: Duration = Duration::from_secs(5);

/// Long tick: unconditional self-healing pass. Deliberately a prime offset
/// from the event tick so the two drift apart instead of piling onto the
/// same instant.
const DEFAULT_ENSURE_INTERVAL: Duration = Duration::from_secs(61);

/// State pair replaced wholesale by reconciliation passes.
///
/// The loop is the only writer; everyone else reads. The ring and the
/// ownership table are never mutated in place, so a reader sees the old
/// structure or the new one, never a half-built ring.
#[derive(Default)]
struct DispatchState {
    /// Bucket set the current ring was built from, for change detection.
    buckets: HashSet<Bucket>,
    /// Current ring, absent until a non-empty membership is seen.
    continuum: Option<Arc<Continuum>>,
    /// Instances this node currently owns, by id.
    owned: HashMap<String, Arc<MonitoredInstance>>,
}

/// Assigns monitored instances to nodes over a consistent-hash ring and
/// keeps this node's owned set reconciled as the cluster changes.
///
/// Construction pulls nothing; the first state is derived on the first
/// tick of [`run`](Self::run). All collaborators arrive through the
/// constructor, so a dispatcher can be stood up against fakes with no
/// runtime behind it.
pub struct Dispatcher {
    local_host: String,
    bucket_weight: u32,
    event_interval: Duration,
    ensure_interval: Duration,
    flags: DirtyFlags,
    state: Mutex<DispatchState>,
    view: Arc<dyn ClusterView>,
    sink: Arc<dyn CheckSink>,
}

impl Dispatcher {
    /// Create a dispatcher for the node identified by `local_host`.
    ///
    /// `local_host` must match the host under which peers enroll this node,
    /// or the ring will never hand it any work.
    pub fn new(local_host: &str, view: Arc<dyn ClusterView>, sink: Arc<dyn CheckSink>) -> Self {
        Self {
            local_host: local_host.to_string(),
            bucket_weight: DEFAULT_BUCKET_WEIGHT,
            event_interval: DEFAULT_EVENT_INTERVAL,
            ensure_interval: DEFAULT_ENSURE_INTERVAL,
            flags: DirtyFlags::new(),
            state: Mutex::new(DispatchState::default()),
            view,
            sink,
        }
    }

    /// Set the event-tick period.
    pub fn with_event_interval(mut self, interval: Duration) -> Self {
        self.event_interval = interval;
        self
    }

    /// Set the ensure-tick period.
    pub fn with_ensure_interval(mut self, interval: Duration) -> Self {
        self.ensure_interval = interval;
        self
    }

    /// Set the virtual-node weight every peer bucket enrolls at.
    pub fn with_bucket_weight(mut self, weight: u32) -> Self {
        self.bucket_weight = weight;
        self
    }

    pub fn local_host(&self) -> &str {
        &self.local_host
    }

    // ── Change signals ─────────────────────────────────────────────

    /// Mark cluster state dirty. Callable from any thread; calls between
    /// ticks coalesce into a single reconciliation on the next event tick.
    pub fn notify_change(&self, membership_changed: bool, instances_changed: bool) {
        if membership_changed {
            self.flags.raise_membership();
        }
        if instances_changed {
            self.flags.raise_instances();
        }
    }

    // ── Introspection ──────────────────────────────────────────────

    /// Number of instances this node currently owns.
    pub fn owned_count(&self) -> usize {
        self.state.lock().unwrap().owned.len()
    }

    /// Ids of the instances this node currently owns, sorted.
    pub fn owned_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.lock().unwrap().owned.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// The instances this node currently owns.
    pub fn owned_instances(&self) -> Vec<Arc<MonitoredInstance>> {
        self.state.lock().unwrap().owned.values().cloned().collect()
    }

    /// Bucket set the current ring was built from.
    pub fn membership(&self) -> Vec<Bucket> {
        self.state.lock().unwrap().buckets.iter().cloned().collect()
    }

    /// Virtual nodes on the current ring; zero while no ring exists.
    pub fn ring_point_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .continuum
            .as_ref()
            .map_or(0, |continuum| continuum.point_count())
    }

    // ── Reconciliation loop ────────────────────────────────────────

    /// Run the reconciliation loop until `shutdown` flips.
    ///
    /// Strictly serial: one pass completes before the next timer fire is
    /// handled, so passes never observe each other half-done. Both timers
    /// fire once immediately at startup, which claims a pre-seeded view
    /// without waiting out a full ensure period.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            host = %self.local_host,
            event_interval_secs = self.event_interval.as_secs_f64(),
            ensure_interval_secs = self.ensure_interval.as_secs_f64(),
            "dispatcher started"
        );
        let mut event_tick = tokio::time::interval(self.event_interval);
        let mut ensure_tick = tokio::time::interval(self.ensure_interval);

        loop {
            tokio::select! {
                _ = event_tick.tick() => {
                    self.process_event();
                }
                _ = ensure_tick.tick() => {
                    self.process_ensure();
                }
                _ = shutdown.changed() => {
                    info!(host = %self.local_host, "dispatcher shutting down");
                    break;
                }
            }
        }
    }

    /// Event pass: drain pending signals and reconcile what they touched.
    ///
    /// Both flags are consumed in the same pass. A membership rebuild
    /// forces an ownership reload even without an instance signal, because
    /// a changed ring moves keys all by itself.
    fn process_event(&self) {
        let mut ring_changed = false;
        if self.flags.take_membership() {
            ring_changed = self.reload_membership();
        }
        let instances_dirty = self.flags.take_instances();
        if ring_changed || instances_dirty {
            self.reload_ownership();
        }
    }

    /// Ensure pass: re-derive membership and ownership from the view,
    /// signals or not. Pending flags are left alone; consuming them here
    /// would cost nothing but hide nothing either, since this pass already
    /// does strictly more than an event pass.
    fn process_ensure(&self) {
        self.reload_membership();
        self.reload_ownership();
    }

    /// Rebuild the eligible bucket set from the view and swap in a new
    /// ring if membership actually differs.
    ///
    /// Returns whether the ring was rebuilt.
    fn reload_membership(&self) -> bool {
        let mut next = HashSet::new();
        self.view.for_each_peer(&mut |peer| {
            if peer.eligible() {
                next.insert(Bucket::new(&peer.host, self.bucket_weight));
            }
        });

        {
            let state = self.state.lock().unwrap();
            debug!(
                candidates = next.len(),
                current = state.buckets.len(),
                "membership reload"
            );
            if buckets_equal(&state.buckets, &next) {
                return false;
            }
        }

        // Expensive part happens outside the lock; readers keep the old
        // ring until the swap.
        let continuum = Continuum::new(&next).map(Arc::new);
        match &continuum {
            Some(ring) => info!(
                hosts = ring.host_count(),
                points = ring.point_count(),
                "ring rebuilt"
            ),
            None => debug!("no eligible peers, ring unavailable"),
        }

        let mut state = self.state.lock().unwrap();
        state.buckets = next;
        state.continuum = continuum;
        true
    }

    /// Recompute the owned-instance table and tell the sink the difference.
    ///
    /// With no usable ring the next table stays empty: a node outside any
    /// ring owns nothing, and whatever it still held is released. Before
    /// the first ring exists this degenerates to a quiet no-op.
    fn reload_ownership(&self) {
        let continuum = self.state.lock().unwrap().continuum.clone();

        let mut next: HashMap<String, Arc<MonitoredInstance>> = HashMap::new();
        let mut total = 0usize;
        match &continuum {
            Some(continuum) => {
                self.view.for_each_instance(&mut |instance| {
                    total += 1;
                    if continuum.locate(instance.ring_key) == self.local_host {
                        next.insert(instance.id().to_string(), Arc::clone(instance));
                    }
                });
                info!(
                    owned = next.len(),
                    total,
                    host = %self.local_host,
                    "instances dispatched to local node"
                );
            }
            None => {
                if self.state.lock().unwrap().owned.is_empty() {
                    debug!(host = %self.local_host, "no usable ring, ownership reload skipped");
                    return;
                }
                info!(host = %self.local_host, "ring gone, releasing all owned instances");
            }
        }

        let previous = {
            let mut state = self.state.lock().unwrap();
            std::mem::replace(&mut state.owned, next.clone())
        };

        // Two-way diff drives the sink; the empty-side cases collapse to
        // bulk announcements.
        if previous.is_empty() {
            for instance in next.values() {
                debug!(id = %instance.id(), "check started");
                self.sink.add_instance(instance);
            }
        } else if next.is_empty() {
            for instance in previous.values() {
                debug!(id = %instance.id(), "check stopped");
                self.sink.remove_instance(instance);
            }
        } else {
            for (id, instance) in &next {
                if !previous.contains_key(id) {
                    debug!(%id, "check started");
                    self.sink.add_instance(instance);
                }
            }
            for (id, instance) in &previous {
                if !next.contains_key(id) {
                    debug!(%id, "check stopped");
                    self.sink.remove_instance(instance);
                }
            }
        }
    }
}

/// Unordered equality of two bucket sets.
///
/// An empty `current` set never compares equal, not even to another empty
/// set: before the first successful build there is nothing worth
/// preserving, so the first reload must always fall through to
/// construction.
fn buckets_equal(current: &HashSet<Bucket>, next: &HashSet<Bucket>) -> bool {
    if current.len() != next.len() {
        return false;
    }
    if current.is_empty() {
        return false;
    }
    next.iter().all(|bucket| current.contains(bucket))
}

#[cfg(test)]
mod tests {
    use super::*;
    use beaconmesh_registry::{CheckPolicy, InstanceSpec, PeerNode};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn spec(id: &str) -> InstanceSpec {
        InstanceSpec {
            id: id.to_string(),
            service: "orders".to_string(),
            namespace: "default".to_string(),
            host: "10.1.0.4".to_string(),
            port: 8080,
            check: CheckPolicy::default(),
        }
    }

    #[derive(Default)]
    struct FakeView {
        peers: Mutex<Vec<PeerNode>>,
        instances: Mutex<Vec<Arc<MonitoredInstance>>>,
        peer_scans: AtomicUsize,
        instance_scans: AtomicUsize,
    }

    impl FakeView {
        fn set_peers(&self, hosts: &[&str]) {
            *self.peers.lock().unwrap() =
                hosts.iter().map(|host| PeerNode::new(host, 7710)).collect();
        }

        fn push_peer(&self, peer: PeerNode) {
            self.peers.lock().unwrap().push(peer);
        }

        fn add_instances(&self, ids: &[&str]) {
            let mut instances = self.instances.lock().unwrap();
            for id in ids {
                instances.push(Arc::new(MonitoredInstance::new(spec(id))));
            }
        }

        fn peer_scan_count(&self) -> usize {
            self.peer_scans.load(Ordering::Relaxed)
        }

        fn instance_scan_count(&self) -> usize {
            self.instance_scans.load(Ordering::Relaxed)
        }
    }

    impl ClusterView for FakeView {
        fn for_each_peer(&self, visit: &mut dyn FnMut(&PeerNode)) {
            self.peer_scans.fetch_add(1, Ordering::Relaxed);
            for peer in self.peers.lock().unwrap().iter() {
                visit(peer);
            }
        }

        fn for_each_instance(&self, visit: &mut dyn FnMut(&Arc<MonitoredInstance>)) {
            self.instance_scans.fetch_add(1, Ordering::Relaxed);
            for instance in self.instances.lock().unwrap().iter() {
                visit(instance);
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum SinkEvent {
        Added(String),
        Removed(String),
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<SinkEvent>>,
    }

    impl RecordingSink {
        fn drain(&self) -> Vec<SinkEvent> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }

    impl CheckSink for RecordingSink {
        fn add_instance(&self, instance: &Arc<MonitoredInstance>) {
            self.events
                .lock()
                .unwrap()
                .push(SinkEvent::Added(instance.id().to_string()));
        }

        fn remove_instance(&self, instance: &Arc<MonitoredInstance>) {
            self.events
                .lock()
                .unwrap()
                .push(SinkEvent::Removed(instance.id().to_string()));
        }
    }

    fn mesh(local: &str) -> (Arc<FakeView>, Arc<RecordingSink>, Dispatcher) {
        let view = Arc::new(FakeView::default());
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Dispatcher::new(local, view.clone(), sink.clone());
        (view, sink, dispatcher)
    }

    fn added_ids(events: &[SinkEvent]) -> Vec<String> {
        let mut ids: Vec<String> = events
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Added(id) => Some(id.clone()),
                SinkEvent::Removed(_) => None,
            })
            .collect();
        ids.sort();
        ids
    }

    fn removed_ids(events: &[SinkEvent]) -> Vec<String> {
        let mut ids: Vec<String> = events
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Removed(id) => Some(id.clone()),
                SinkEvent::Added(_) => None,
            })
            .collect();
        ids.sort();
        ids
    }

    #[test]
    fn ensure_claims_everything_on_a_single_node() {
        let (view, sink, dispatcher) = mesh("n1");
        view.set_peers(&["n1"]);
        view.add_instances(&["a", "b", "c"]);

        dispatcher.process_ensure();

        assert_eq!(dispatcher.owned_count(), 3);
        assert_eq!(dispatcher.ring_point_count(), DEFAULT_BUCKET_WEIGHT as usize);
        assert_eq!(added_ids(&sink.drain()), vec!["a", "b", "c"]);
    }

    #[test]
    fn repeated_ensure_is_idempotent() {
        let (view, sink, dispatcher) = mesh("n1");
        view.set_peers(&["n1"]);
        view.add_instances(&["a", "b"]);

        dispatcher.process_ensure();
        sink.drain();
        dispatcher.process_ensure();
        dispatcher.process_ensure();

        assert_eq!(dispatcher.owned_count(), 2);
        assert!(sink.drain().is_empty());
    }

    #[test]
    fn event_without_signals_does_nothing() {
        let (view, sink, dispatcher) = mesh("n1");
        view.set_peers(&["n1"]);
        view.add_instances(&["a"]);

        dispatcher.process_event();

        assert_eq!(dispatcher.owned_count(), 0);
        assert_eq!(view.peer_scan_count(), 0);
        assert_eq!(view.instance_scan_count(), 0);
        assert!(sink.drain().is_empty());
    }

    #[test]
    fn event_consumes_both_signals_in_one_pass() {
        let (view, sink, dispatcher) = mesh("n1");
        view.set_peers(&["n1"]);
        view.add_instances(&["a", "b"]);

        dispatcher.notify_change(true, true);
        dispatcher.process_event();
        assert_eq!(dispatcher.owned_count(), 2);
        assert_eq!(added_ids(&sink.drain()), vec!["a", "b"]);

        // Nothing left to consume.
        dispatcher.process_event();
        assert_eq!(view.peer_scan_count(), 1);
        assert_eq!(view.instance_scan_count(), 1);
    }

    #[test]
    fn signal_bursts_coalesce_into_one_reconcile() {
        let (view, _sink, dispatcher) = mesh("n1");
        view.set_peers(&["n1"]);
        view.add_instances(&["a", "b", "c"]);

        for _ in 0..5 {
            dispatcher.notify_change(true, true);
        }
        dispatcher.process_event();
        dispatcher.process_event();

        assert_eq!(view.peer_scan_count(), 1);
        assert_eq!(view.instance_scan_count(), 1);
        assert_eq!(dispatcher.owned_count(), 3);
    }

    #[test]
    fn instance_signal_before_any_ring_is_harmless() {
        let (view, sink, dispatcher) = mesh("n1");
        view.add_instances(&["a"]);

        dispatcher.notify_change(false, true);
        dispatcher.process_event();

        assert_eq!(dispatcher.owned_count(), 0);
        assert_eq!(dispatcher.ring_point_count(), 0);
        assert!(sink.drain().is_empty());
    }

    #[test]
    fn empty_cluster_reconciles_quietly() {
        let (view, sink, dispatcher) = mesh("n1");
        view.add_instances(&["a", "b"]);

        dispatcher.process_ensure();
        dispatcher.process_ensure();

        assert_eq!(dispatcher.owned_count(), 0);
        assert_eq!(dispatcher.ring_point_count(), 0);
        assert!(sink.drain().is_empty());
    }

    #[test]
    fn ineligible_peers_stay_off_the_ring() {
        let (view, sink, dispatcher) = mesh("n1");
        view.push_peer(PeerNode::new("n1", 7710));
        let mut sick = PeerNode::new("n2", 7710);
        sick.healthy = false;
        view.push_peer(sick);
        let mut fenced = PeerNode::new("n3", 7710);
        fenced.isolated = true;
        view.push_peer(fenced);
        view.add_instances(&["a", "b", "c", "d"]);

        dispatcher.process_ensure();

        let membership = dispatcher.membership();
        assert_eq!(membership.len(), 1);
        assert_eq!(membership[0].host, "n1");
        // Sole eligible node owns the whole population.
        assert_eq!(dispatcher.owned_count(), 4);
        assert_eq!(added_ids(&sink.drain()).len(), 4);
    }

    #[test]
    fn membership_reload_is_a_no_op_when_unchanged() {
        let (view, _sink, dispatcher) = mesh("n1");
        view.set_peers(&["n1", "n2"]);

        assert!(dispatcher.reload_membership());
        assert!(!dispatcher.reload_membership());

        // Same hosts listed in a different order still compare equal.
        view.set_peers(&["n2", "n1"]);
        assert!(!dispatcher.reload_membership());
    }

    #[test]
    fn bucket_comparison_semantics() {
        let set = |hosts: &[&str]| -> HashSet<Bucket> {
            hosts.iter().map(|host| Bucket::new(host, 100)).collect()
        };

        assert!(buckets_equal(&set(&["a", "b"]), &set(&["b", "a"])));
        assert!(!buckets_equal(&set(&["a"]), &set(&["a", "b"])));
        assert!(!buckets_equal(&set(&["a", "b"]), &set(&["a", "c"])));
        // Empty stored membership always reads as changed.
        assert!(!buckets_equal(&set(&[]), &set(&[])));
    }

    #[test]
    fn partition_covers_every_instance_exactly_once() {
        let hosts = ["n1", "n2", "n3"];
        let view = Arc::new(FakeView::default());
        view.set_peers(&hosts);
        let ids: Vec<String> = (0..30).map(|i| format!("inst-{i}")).collect();
        view.add_instances(&ids.iter().map(String::as_str).collect::<Vec<_>>());

        let mut owned_by: HashMap<String, Vec<String>> = HashMap::new();
        for host in hosts {
            let sink = Arc::new(RecordingSink::default());
            let dispatcher = Dispatcher::new(host, view.clone(), sink);
            dispatcher.process_ensure();
            owned_by.insert(host.to_string(), dispatcher.owned_ids());
        }

        let mut union: Vec<String> = owned_by.values().flatten().cloned().collect();
        union.sort();
        let mut expected = ids.clone();
        expected.sort();
        // Disjoint and exhaustive: every instance appears exactly once.
        assert_eq!(union, expected);
    }

    #[test]
    fn node_departure_moves_only_its_keys() {
        let (view, sink, dispatcher) = mesh("n1");
        view.set_peers(&["n1", "n2"]);
        let ids: Vec<String> = (0..40).map(|i| format!("inst-{i}")).collect();
        view.add_instances(&ids.iter().map(String::as_str).collect::<Vec<_>>());

        dispatcher.process_ensure();
        let before = dispatcher.owned_ids();
        sink.drain();

        // Work out which keys n2 held, straight from an equivalent ring.
        let probe = Continuum::new(&[
            Bucket::with_default_weight("n1"),
            Bucket::with_default_weight("n2"),
        ])
        .unwrap();
        let mut n2_keys: Vec<String> = ids
            .iter()
            .filter(|id| probe.locate(beaconmesh_ring::ring_key(id)) == "n2")
            .cloned()
            .collect();
        n2_keys.sort();
        assert!(!n2_keys.is_empty(), "test needs both nodes to own keys");
        assert!(!before.is_empty(), "test needs both nodes to own keys");

        view.set_peers(&["n1"]);
        dispatcher.notify_change(true, false);
        dispatcher.process_event();

        let events = sink.drain();
        // Only the departed node's keys arrive, nothing previously owned moves.
        assert_eq!(added_ids(&events), n2_keys);
        assert!(removed_ids(&events).is_empty());
        assert_eq!(dispatcher.owned_count(), ids.len());
        for id in &before {
            assert!(dispatcher.owned_ids().contains(id));
        }
    }

    #[test]
    fn instance_departure_stops_only_that_check() {
        let (view, sink, dispatcher) = mesh("n1");
        view.set_peers(&["n1"]);
        view.add_instances(&["a", "b", "c"]);
        dispatcher.process_ensure();
        sink.drain();

        view.instances
            .lock()
            .unwrap()
            .retain(|instance| instance.id() != "b");
        dispatcher.notify_change(false, true);
        dispatcher.process_event();

        let events = sink.drain();
        assert_eq!(removed_ids(&events), vec!["b"]);
        assert!(added_ids(&events).is_empty());
        assert_eq!(dispatcher.owned_ids(), vec!["a", "c"]);
    }

    #[test]
    fn ring_dissolution_releases_everything() {
        let (view, sink, dispatcher) = mesh("n1");
        view.set_peers(&["n1"]);
        view.add_instances(&["a", "b"]);
        dispatcher.process_ensure();
        sink.drain();

        view.set_peers(&[]);
        dispatcher.process_ensure();

        assert_eq!(dispatcher.owned_count(), 0);
        assert_eq!(dispatcher.ring_point_count(), 0);
        let events = sink.drain();
        assert_eq!(removed_ids(&events), vec!["a", "b"]);
        assert!(added_ids(&events).is_empty());
    }

    #[test]
    fn bucket_weight_flows_into_the_ring() {
        let view = Arc::new(FakeView::default());
        view.set_peers(&["n1", "n2"]);
        let sink = Arc::new(RecordingSink::default());
        let dispatcher =
            Dispatcher::new("n1", view.clone(), sink).with_bucket_weight(10);

        dispatcher.process_ensure();

        assert_eq!(dispatcher.ring_point_count(), 20);
    }
}

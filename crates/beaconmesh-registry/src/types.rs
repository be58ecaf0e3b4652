//! Domain types for the beaconmesh registry.
//!
//! These types cross three boundaries: TOML seed files, the admin API's
//! JSON, and the in-memory catalog. All of them serialize; only the
//! registration payloads deserialize.

use serde::{Deserialize, Serialize};

/// Unique identifier for a monitored instance.
pub type InstanceId = String;

fn default_true() -> bool {
    true
}

fn default_namespace() -> String {
    "default".to_string()
}

// ── Peers ──────────────────────────────────────────────────────────

/// One node of the mesh as seen by its peers.
///
/// Carries the two predicates that gate ring membership. A peer that is
/// unhealthy or isolated stays in the catalog (it may come back) but never
/// receives check work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerNode {
    /// Identity the node advertises on the ring.
    pub host: String,
    pub port: u16,
    /// Last reported liveness of the node itself.
    #[serde(default = "default_true")]
    pub healthy: bool,
    /// Administratively fenced off from check work.
    #[serde(default)]
    pub isolated: bool,
}

impl PeerNode {
    /// A healthy, non-isolated peer.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            healthy: true,
            isolated: false,
        }
    }

    /// Whether this peer may own check work.
    pub fn eligible(&self) -> bool {
        self.healthy && !self.isolated
    }
}

// ── Instances ──────────────────────────────────────────────────────

/// How an instance is checked once a node owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckPolicy {
    /// The instance reports its own liveness; mark it dead after
    /// `ttl_secs` of silence.
    HeartbeatTtl { ttl_secs: u32 },
    /// Probe an HTTP endpoint on the instance.
    HttpGet { path: String, timeout_secs: u32 },
    /// Probe a plain TCP connect.
    TcpConnect { timeout_secs: u32 },
}

impl Default for CheckPolicy {
    fn default() -> Self {
        Self::HeartbeatTtl { ttl_secs: 5 }
    }
}

/// Registration payload for a service instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub id: InstanceId,
    pub service: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub check: CheckPolicy,
}

/// An instance admitted into the catalog.
///
/// The ring key is derived from the id exactly once, here, so that every
/// ownership pass hashes nothing and every node derives the same key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitoredInstance {
    pub spec: InstanceSpec,
    /// Position-independent hash key; feed to `Continuum::locate`.
    pub ring_key: u32,
}

impl MonitoredInstance {
    /// Admit a spec, deriving its stable ring key.
    pub fn new(spec: InstanceSpec) -> Self {
        let ring_key = beaconmesh_ring::ring_key(&spec.id);
        Self { spec, ring_key }
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }
}

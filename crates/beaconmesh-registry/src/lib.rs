//! beaconmesh-registry — the catalog of peers and monitored instances.
//!
//! Two tables back everything the dispatcher does: the peer nodes that can
//! own check work, and the service instances that need checking. The
//! [`Catalog`] holds both in memory, deduplicates writes, and reports every
//! effective mutation through a single change callback so the dispatch
//! layer can coalesce them into dirty flags.
//!
//! The catalog is deliberately dumb: no persistence, no delta streams, no
//! knowledge of rings or ownership. Consumers re-derive whatever they need
//! from full enumerations, which keeps a missed callback harmless.

pub mod catalog;
pub mod types;

pub use catalog::{Catalog, CatalogEvent, ChangeCallback};
pub use types::{CheckPolicy, InstanceId, InstanceSpec, MonitoredInstance, PeerNode};

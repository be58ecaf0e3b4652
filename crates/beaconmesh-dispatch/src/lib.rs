//! beaconmesh-dispatch — decides which node checks which instance.
//!
//! Every node runs one [`Dispatcher`]. On a short timer it drains change
//! signals ([`DirtyFlags`]) raised by the registry layer; on a long timer it
//! re-derives everything from scratch whether or not anything signalled.
//! Both passes rebuild state functionally: a fresh ring, a fresh ownership
//! table, swapped in whole under a brief lock. The short timer makes the
//! mesh responsive, the long timer makes it self-healing, and the swap
//! discipline means a crash between passes loses nothing that the next
//! pass cannot recompute.
//!
//! The dispatcher touches the outside world through two seams:
//! [`ClusterView`] (where peers and instances come from) and [`CheckSink`]
//! (where ownership changes go). Production wires these to the registry
//! catalog and the check engine; tests wire them to fakes.

pub mod dispatcher;
pub mod roster;
pub mod signal;
pub mod traits;

pub use dispatcher::Dispatcher;
pub use roster::WatchRoster;
pub use signal::DirtyFlags;
pub use traits::{CheckSink, ClusterView};

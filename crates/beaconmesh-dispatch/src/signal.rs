//! Coalescing change signals between the registry and the dispatch loop.

use std::sync::atomic::{AtomicBool, Ordering};

/// Two payload-free dirty flags meaning "recompute from the view".
///
/// Producers raise a flag from any thread; the reconciliation loop takes
/// it, which clears it in the same atomic step. Any number of raises
/// between two passes collapse into one, and a raise can never be consumed
/// twice. Flags carry no data on purpose: the loop re-reads the whole view
/// anyway, so all a signal needs to say is "sooner than the ensure timer".
#[derive(Debug, Default)]
pub struct DirtyFlags {
    membership: AtomicBool,
    instances: AtomicBool,
}

impl DirtyFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the peer set as changed.
    pub fn raise_membership(&self) {
        self.membership.store(true, Ordering::Release);
    }

    /// Mark the monitored-instance population as changed.
    pub fn raise_instances(&self) {
        self.instances.store(true, Ordering::Release);
    }

    /// Consume the membership flag. True at most once per raise burst.
    pub fn take_membership(&self) -> bool {
        self.membership.swap(false, Ordering::AcqRel)
    }

    /// Consume the instances flag. True at most once per raise burst.
    pub fn take_instances(&self) -> bool {
        self.instances.swap(false, Ordering::AcqRel)
    }
}

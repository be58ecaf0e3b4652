//! The continuum — a position-sorted table of virtual nodes.

use sha2::{Digest, Sha256};

use crate::bucket::Bucket;

/// Ring position of virtual node `replica` of `host`.
///
/// First four bytes, big-endian, of `SHA-256("{host}#{replica}")`. The salt
/// keeps a host's replicas from clustering; the digest keeps positions
/// identical across platforms, builds, and releases.
pub fn point_position(host: &str, replica: u32) -> u32 {
    let digest = Sha256::digest(format!("{host}#{replica}"));
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Stable ring key for an arbitrary identity string.
///
/// Instances hash their id through this once and carry the key; lookups
/// against any ring built from the same membership then agree on the owner
/// no matter which node runs them.
pub fn ring_key(id: &str) -> u32 {
    let digest = Sha256::digest(id.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Consistent-hash ring over a set of weighted buckets.
///
/// Construction expands every bucket into `weight` virtual nodes and sorts
/// them by `(position, host index)`, which makes the layout a pure function
/// of the bucket set. A `Continuum` is immutable once built; membership
/// changes are handled by building a fresh ring and swapping it in.
#[derive(Debug, Clone)]
pub struct Continuum {
    /// Interned host names, sorted at construction.
    hosts: Vec<String>,
    /// Virtual nodes as `(ring position, index into hosts)`.
    points: Vec<(u32, u32)>,
}

impl Continuum {
    /// Build a ring from a bucket set.
    ///
    /// Returns `None` when the set is empty or contributes no virtual nodes
    /// (all weights zero). Absence of a ring is a real state for callers:
    /// with no eligible nodes there is no owner for anything.
    pub fn new<'a, I>(buckets: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Bucket>,
    {
        let mut sorted: Vec<&Bucket> = buckets.into_iter().collect();
        sorted.sort_by(|a, b| a.host.cmp(&b.host).then(a.weight.cmp(&b.weight)));

        let mut hosts: Vec<String> = Vec::with_capacity(sorted.len());
        let mut points: Vec<(u32, u32)> = Vec::new();
        for bucket in sorted {
            let index = match hosts.last() {
                Some(last) if *last == bucket.host => hosts.len() as u32 - 1,
                _ => {
                    hosts.push(bucket.host.clone());
                    hosts.len() as u32 - 1
                }
            };
            for replica in 0..bucket.weight {
                points.push((point_position(&bucket.host, replica), index));
            }
        }
        if points.is_empty() {
            return None;
        }
        // Position collisions between hosts resolve by host index, so the
        // winner is the same on every node.
        points.sort_unstable();
        Some(Self { hosts, points })
    }

    /// Host owning `key`: the first virtual node at or after it, wrapping
    /// past the top of the ring to the first point.
    pub fn locate(&self, key: u32) -> &str {
        let at = self.points.partition_point(|&(position, _)| position < key);
        let (_, index) = if at == self.points.len() {
            self.points[0]
        } else {
            self.points[at]
        };
        &self.hosts[index as usize]
    }

    /// Distinct hosts on the ring.
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// Hosts on the ring, in interned (sorted) order.
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(String::as_str)
    }

    /// Total virtual nodes on the ring.
    pub fn point_count(&self) -> usize {
        self.points.len()
    }
}

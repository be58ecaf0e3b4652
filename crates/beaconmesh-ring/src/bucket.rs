//! Weighted ring buckets.

use serde::{Deserialize, Serialize};

/// Default number of virtual nodes a bucket contributes to the ring.
///
/// Every node currently enrolls at this uniform weight. The field stays
/// per-bucket so heterogeneous weights remain a construction-time choice
/// rather than a ring rebuild.
pub const DEFAULT_BUCKET_WEIGHT: u32 = 100;

/// One node eligible to own check work, with its share of the ring.
///
/// A bucket is a value: equality and hashing cover both fields, so a node
/// re-enrolled at a different weight reads as a membership change and
/// triggers a ring rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bucket {
    /// Node identity as advertised to its peers.
    pub host: String,
    /// Virtual nodes this bucket occupies on the ring.
    pub weight: u32,
}

impl Bucket {
    /// Create a bucket with an explicit weight.
    pub fn new(host: &str, weight: u32) -> Self {
        Self {
            host: host.to_string(),
            weight,
        }
    }

    /// Create a bucket at [`DEFAULT_BUCKET_WEIGHT`].
    pub fn with_default_weight(host: &str) -> Self {
        Self::new(host, DEFAULT_BUCKET_WEIGHT)
    }
}

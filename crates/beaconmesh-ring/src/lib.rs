//! beaconmesh-ring — consistent-hash ring for partitioning check work.
//!
//! Every eligible node in the mesh becomes a weighted [`Bucket`]; the
//! [`Continuum`] expands the buckets into virtual nodes on a 32-bit ring and
//! answers "which node owns this key". Instances hash to stable ring keys,
//! so every node that sees the same membership derives the same partition
//! without any coordination.
//!
//! # Why a ring
//!
//! A modulo assignment would reshuffle almost every instance whenever a node
//! joins or leaves. On the continuum, removing a node only reassigns the
//! keys that node owned, and adding one only claims a share proportional to
//! its weight. The mesh reconciles on a timer, so keeping churn small keeps
//! each pass cheap.
//!
//! All hashing is SHA-256 based. Node processes from different builds and
//! platforms must agree on every ring position, which rules out
//! [`std::hash::DefaultHasher`] and friends.

pub mod bucket;
pub mod continuum;

pub use bucket::{Bucket, DEFAULT_BUCKET_WEIGHT};
pub use continuum::{Continuum, point_position, ring_key};

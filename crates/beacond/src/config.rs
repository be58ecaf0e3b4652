//! beacond.toml parsing — node identity, dispatch timers, seed data.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use beaconmesh_registry::{InstanceSpec, PeerNode};
use beaconmesh_ring::DEFAULT_BUCKET_WEIGHT;

/// Errors from loading or validating a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("node.host must not be empty")]
    EmptyHost,
    #[error("dispatch.event_interval_secs must be nonzero")]
    ZeroEventInterval,
    #[error(
        "dispatch.ensure_interval_secs ({ensure}) must be greater than \
         dispatch.event_interval_secs ({event})"
    )]
    EnsureIntervalTooShort { ensure: u64, event: u64 },
    #[error("dispatch.bucket_weight must be nonzero")]
    ZeroBucketWeight,
}

fn default_listen() -> String {
    "0.0.0.0:7710".to_string()
}

fn default_event_interval() -> u64 {
    5
}

fn default_ensure_interval() -> u64 {
    61
}

fn default_bucket_weight() -> u32 {
    DEFAULT_BUCKET_WEIGHT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeacondConfig {
    pub node: NodeConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub seed: SeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Identity this node advertises on the ring. Must match the host under
    /// which peers enroll it, or the ring never hands this node any work.
    pub host: String,
    /// Admin API listen address.
    #[serde(default = "default_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Seconds between event passes (signal drains).
    #[serde(default = "default_event_interval")]
    pub event_interval_secs: u64,
    /// Seconds between ensure passes (unconditional reconciles).
    #[serde(default = "default_ensure_interval")]
    pub ensure_interval_secs: u64,
    /// Virtual nodes each peer occupies on the ring.
    #[serde(default = "default_bucket_weight")]
    pub bucket_weight: u32,
}

/// Peers and instances loaded into the catalog at startup, standing in for
/// an upstream registration transport.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedConfig {
    #[serde(default)]
    pub peers: Vec<PeerNode>,
    #[serde(default)]
    pub instances: Vec<InstanceSpec>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            listen: default_listen(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            event_interval_secs: default_event_interval(),
            ensure_interval_secs: default_ensure_interval(),
            bucket_weight: default_bucket_weight(),
        }
    }
}

impl Default for BeacondConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            dispatch: DispatchConfig::default(),
            seed: SeedConfig::default(),
        }
    }
}

impl DispatchConfig {
    pub fn event_interval(&self) -> Duration {
        Duration::from_secs(self.event_interval_secs)
    }

    pub fn ensure_interval(&self) -> Duration {
        Duration::from_secs(self.ensure_interval_secs)
    }
}

impl BeacondConfig {
    /// Parse a config file. Validation is separate so CLI overrides can be
    /// applied in between.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.dispatch.event_interval_secs == 0 {
            return Err(ConfigError::ZeroEventInterval);
        }
        if self.dispatch.ensure_interval_secs <= self.dispatch.event_interval_secs {
            return Err(ConfigError::EnsureIntervalTooShort {
                ensure: self.dispatch.ensure_interval_secs,
                event: self.dispatch.event_interval_secs,
            });
        }
        if self.dispatch.bucket_weight == 0 {
            return Err(ConfigError::ZeroBucketWeight);
        }
        Ok(())
    }
}

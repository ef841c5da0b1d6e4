//! Node configuration.
//!
//! All protocol constants live here with their production defaults. Every
//! struct deserializes with `#[serde(default)]`, so a config file only needs
//! the fields it overrides.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("remove_threshold ({remove}) must be greater than fail_threshold ({fail})")]
    ThresholdOrder { fail: i64, remove: i64 },
}

/// Membership and failure-detection tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwimConfig {
    /// Age (ticks) after which an entry stops being piggybacked and becomes
    /// a candidate for indirect probing. Also the direct-ping period.
    pub fail_threshold: i64,
    /// Age (ticks) at which an entry is evicted.
    pub remove_threshold: i64,
    /// Hops a gossip message travels before it stops being forwarded.
    pub gossip_ttl: u32,
    /// Peers each gossip message is sent to.
    pub gossip_fanout: usize,
    /// Relays asked to probe a suspect on our behalf.
    pub relay_count: usize,
    /// Maximum entries returned to a joining node.
    pub join_reply_limit: usize,
    /// Gossip evictions to peers instead of letting each node age them out.
    pub gossip_removals: bool,
}

impl Default for SwimConfig {
    fn default() -> Self {
        Self {
            fail_threshold: 5,
            remove_threshold: 20,
            gossip_ttl: 3,
            gossip_fanout: 2,
            relay_count: 2,
            join_reply_limit: 10,
            gossip_removals: false,
        }
    }
}

/// Client request tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Ticks a transaction may wait for its first reply before it is failed.
    pub reply_deadline: i64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self { reply_deadline: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub swim: SwimConfig,
    pub coordinator: CoordinatorConfig,
    /// Number of positions on the hash ring.
    pub ring_size: u64,
    /// Seed for peer selection. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            swim: SwimConfig::default(),
            coordinator: CoordinatorConfig::default(),
            ring_size: 512,
            seed: None,
        }
    }
}

impl NodeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let swim = &self.swim;
        if swim.fail_threshold <= 0 {
            return Err(ConfigError::Zero("fail_threshold"));
        }
        if swim.remove_threshold <= swim.fail_threshold {
            return Err(ConfigError::ThresholdOrder {
                fail: swim.fail_threshold,
                remove: swim.remove_threshold,
            });
        }
        if swim.gossip_fanout == 0 {
            return Err(ConfigError::Zero("gossip_fanout"));
        }
        if self.ring_size == 0 {
            return Err(ConfigError::Zero("ring_size"));
        }
        if self.coordinator.reply_deadline <= 0 {
            return Err(ConfigError::Zero("reply_deadline"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.swim.fail_threshold, 5);
        assert_eq!(config.swim.remove_threshold, 20);
        assert_eq!(config.ring_size, 512);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: NodeConfig =
            serde_json::from_str(r#"{"swim":{"gossip_ttl":4},"seed":7}"#).unwrap();
        assert_eq!(config.swim.gossip_ttl, 4);
        assert_eq!(config.swim.fail_threshold, 5);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.coordinator.reply_deadline, 5);
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let mut config = NodeConfig::default();
        config.swim.remove_threshold = 5;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ThresholdOrder { fail: 5, remove: 5 })
        );
    }

    #[test]
    fn test_rejects_zero_ring() {
        let config = NodeConfig {
            ring_size: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Zero("ring_size")));
    }
}

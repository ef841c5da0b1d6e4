//! Simulator configuration.
//!
//! Loaded from a JSON file; every field is optional and command-line flags
//! override what the file sets.

use ringkv_core::{NodeConfig, Tick};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid simulator config: {0}")]
    Invalid(String),

    #[error("Invalid node config: {0}")]
    Node(#[from] ringkv_core::ConfigError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Nodes in the cluster. Node 1 is the introducer.
    pub nodes: u32,
    /// Minimum length of the run in ticks.
    pub ticks: Tick,
    /// Ticks between two node starts.
    pub join_stagger: Tick,
    /// Fraction of datagrams the network drops.
    pub drop_rate: f64,
    pub seed: u64,
    /// Tick at which a node is failed. `None` fails one right after the
    /// first round of reads.
    pub fail_at: Option<Tick>,
    /// Keys created by the client workload.
    pub workload: usize,
    pub node: NodeConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            nodes: 5,
            ticks: 100,
            join_stagger: 1,
            drop_rate: 0.0,
            seed: 42,
            fail_at: None,
            workload: 20,
            node: NodeConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SimConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::info!("Loaded simulator configuration from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes == 0 {
            return Err(ConfigError::Invalid("nodes must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.drop_rate) {
            return Err(ConfigError::Invalid(format!(
                "drop_rate must be within [0, 1], got {}",
                self.drop_rate
            )));
        }
        if self.join_stagger < 0 {
            return Err(ConfigError::Invalid("join_stagger must not be negative".into()));
        }
        self.node.validate()?;
        Ok(())
    }
}

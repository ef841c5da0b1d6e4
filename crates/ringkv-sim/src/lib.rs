//! ringkv-sim library: discrete-time cluster harness.
//!
//! Exposes the cluster and scenario so integration tests can drive whole
//! clusters the same way the binary does.

pub mod cluster;
pub mod config;
pub mod scenario;

pub use cluster::{Cluster, node_address};
pub use config::{ConfigError, SimConfig};
pub use scenario::{OpCounts, Summary};

//! ringkv-core: peer-to-peer replicated key/value store.
//!
//! This crate provides the core functionality for:
//! - SWIM-style membership with heartbeat gossip and indirect probing
//! - Consistent-hash ring with three-way successor replication
//! - Quorum-based CRUD coordination and per-replica local storage
//! - Stabilization of replicas when the ring changes
//! - Transport and event-log abstractions, with in-memory implementations
//!
//! Everything is driven by discrete ticks: a [`Node`] drains its inbox,
//! runs its periodic duties and returns. There is no I/O or threading inside
//! a node.

pub mod address;
pub mod config;
pub mod events;
pub mod kv;
pub mod node;
pub mod protocol;
pub mod ring;
pub mod swim;
pub mod transport;

pub use address::{Address, AddressError};
pub use config::{ConfigError, CoordinatorConfig, NodeConfig, SwimConfig};
pub use events::{EventBus, EventLog, EventRecord, EventRecorder, KvEvent, NodeEvent, Subscription};
pub use kv::{CrudKind, KvMessage, LocalStore, TransactionId};
pub use node::{BootstrapError, Node};
pub use protocol::WireMessage;
pub use ring::{Neighbors, ReplicaRole, Ring};
pub use swim::{MembershipEntry, MembershipMessage, Tick};
pub use transport::{InMemoryNetwork, NetworkStats, Transport, TransportError};

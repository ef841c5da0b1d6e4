//! SWIM-style membership and failure detection.
//!
//! Every node keeps a heartbeat table of the group and learns about other
//! nodes through gossip and probe traffic.
//!
//! # Protocol Overview
//!
//! **Join:**
//! 1. A starting node sends `JoinRequest` to the introducer
//! 2. The introducer records it, gossips it onward and answers with a
//!    `JoinReply` holding part of its table
//! 3. The joiner merges the reply and gossips what it learned
//!
//! **Failure Detection:**
//! 1. Each node bumps its own heartbeat every tick
//! 2. Every `fail_threshold` ticks it pings a random peer
//! 3. Entries that stopped advancing are probed indirectly through relays
//! 4. Entries that stopped advancing for `remove_threshold` ticks are evicted
//!
//! **Gossip Dissemination:**
//! - Every ping, ack and relay request piggybacks the sender's healthy entries
//! - New entries are flooded with a bounded hop count
//! - Merges keep the highest heartbeat, so duplicates are harmless

pub mod failure;
pub mod gossip;
pub mod membership;
pub mod messages;
pub mod protocol;

pub use failure::{FailureDetector, FailureEvent};
pub use gossip::{GossipDisseminator, GossipOutcome};
pub use membership::{EntryStatus, MembershipEntry, MembershipTable, MergeOutcome, Tick};
pub use messages::{GossipEntry, MembershipMessage};
pub use protocol::{MembershipProtocol, MembershipUpdate};

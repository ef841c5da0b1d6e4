//! Membership protocol message types.
//!
//! Encoded with bincode's fixed-width little-endian layout: a `u32` variant
//! tag, addresses as 6 raw bytes, heartbeats and timestamps as `i64`, flags
//! as single bytes, and lists prefixed with a `u64` count.

use super::membership::MembershipEntry;
use crate::Address;
use serde::{Deserialize, Serialize};

/// A membership entry carried in a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GossipEntry {
    pub entry: MembershipEntry,
    /// `false` marks a gossiped removal.
    pub upsert: bool,
}

impl GossipEntry {
    pub fn upsert(entry: MembershipEntry) -> Self {
        Self {
            entry,
            upsert: true,
        }
    }

    pub fn removal(entry: MembershipEntry) -> Self {
        Self {
            entry,
            upsert: false,
        }
    }
}

/// Membership and failure-detection messages.
///
/// Probe messages carry the sender's healthy entries so every probe doubles
/// as gossip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MembershipMessage {
    /// Sent by a starting node to the introducer.
    JoinRequest { sender: Address, heartbeat: i64 },

    /// Introducer's answer with a partial view of the group.
    JoinReply {
        sender: Address,
        entries: Vec<MembershipEntry>,
    },

    /// Direct probe. `relay_for` names the node that asked a relay to probe
    /// on its behalf; the ack must travel back through the relay.
    Ping {
        sender: Address,
        relay_for: Option<Address>,
        entries: Vec<GossipEntry>,
    },

    /// Ask the recipient to probe `target` for us.
    PingRelayRequest {
        sender: Address,
        target: Address,
        entries: Vec<GossipEntry>,
    },

    /// Answer to a ping. Relay-bound when `relay_for` is set.
    Ack {
        sender: Address,
        relay_for: Option<Address>,
        entries: Vec<GossipEntry>,
    },

    /// Hop-bounded dissemination of membership deltas.
    Gossip {
        hops_remaining: u32,
        entries: Vec<GossipEntry>,
    },
}

impl MembershipMessage {
    pub fn ping(sender: Address, relay_for: Option<Address>, entries: &[MembershipEntry]) -> Self {
        Self::Ping {
            sender,
            relay_for,
            entries: upserts(entries),
        }
    }

    pub fn ack(sender: Address, relay_for: Option<Address>, entries: &[MembershipEntry]) -> Self {
        Self::Ack {
            sender,
            relay_for,
            entries: upserts(entries),
        }
    }

    pub fn ping_relay_request(
        sender: Address,
        target: Address,
        entries: &[MembershipEntry],
    ) -> Self {
        Self::PingRelayRequest {
            sender,
            target,
            entries: upserts(entries),
        }
    }

    pub fn gossip(hops_remaining: u32, entries: Vec<GossipEntry>) -> Self {
        Self::Gossip {
            hops_remaining,
            entries,
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinRequest { .. } => "JOIN_REQUEST",
            Self::JoinReply { .. } => "JOIN_REPLY",
            Self::Ping { .. } => "PING",
            Self::PingRelayRequest { .. } => "PING_RELAY_REQUEST",
            Self::Ack { .. } => "ACK",
            Self::Gossip { .. } => "GOSSIP",
        }
    }

    /// Serialize to bincode bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("MembershipMessage serialization should not fail")
    }

    /// Deserialize from bincode bytes. Returns `None` for malformed input.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        bincode::deserialize(data).ok()
    }
}

fn upserts(entries: &[MembershipEntry]) -> Vec<GossipEntry> {
    entries.iter().copied().map(GossipEntry::upsert).collect()
}

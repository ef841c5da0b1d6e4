//! Wire envelope: every datagram is either a membership message (bincode) or
//! a key/value message (JSON), told apart by its first byte.

use super::encoding::{MessageType, detect_message_type};
use crate::Address;
use crate::kv::KvMessage;
use crate::swim::MembershipMessage;

/// A message addressed to a peer, produced by a protocol component and sent
/// by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing<M> {
    pub to: Address,
    pub message: M,
}

impl<M> Outgoing<M> {
    pub fn new(to: Address, message: M) -> Self {
        Self { to, message }
    }
}

/// Any message a node can receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Membership(MembershipMessage),
    Kv(KvMessage),
}

impl WireMessage {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Membership(msg) => msg.to_bytes(),
            Self::Kv(msg) => msg.to_json(),
        }
    }

    /// Decode a datagram. Empty or malformed input yields `None`.
    pub fn decode(data: &[u8]) -> Option<Self> {
        match detect_message_type(data) {
            MessageType::Json => KvMessage::from_json(data).map(Self::Kv),
            MessageType::Bincode => MembershipMessage::from_bytes(data).map(Self::Membership),
            MessageType::Empty => None,
        }
    }
}

impl From<MembershipMessage> for WireMessage {
    fn from(msg: MembershipMessage) -> Self {
        Self::Membership(msg)
    }
}

impl From<KvMessage> for WireMessage {
    fn from(msg: KvMessage) -> Self {
        Self::Kv(msg)
    }
}

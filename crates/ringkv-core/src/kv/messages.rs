//! Key/value protocol messages.
//!
//! Sent as JSON so every field is self-describing:
//!
//! ```json
//! {"transactionId":536870913,"from":"2:0","type":"read","key":"a"}
//! ```

use super::transaction::{CrudKind, TransactionId};
use crate::Address;
use crate::ring::ReplicaRole;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvMessage {
    pub transaction_id: TransactionId,
    pub from: Address,
    #[serde(flatten)]
    pub payload: KvPayload,
}

/// Request or reply body.
///
/// Requests carrying a `replica` role come from stabilization on another
/// replica, not from a client, and are never answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum KvPayload {
    Create {
        key: String,
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        replica: Option<ReplicaRole>,
    },
    Read {
        key: String,
    },
    Update {
        key: String,
        value: String,
    },
    Delete {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        replica: Option<ReplicaRole>,
    },
    /// Outcome of a create, update or delete.
    Reply {
        success: bool,
    },
    /// Outcome of a read. An empty value means the read failed.
    ReadReply {
        value: String,
    },
}

impl KvPayload {
    /// Client request for `kind`. `value` is ignored for reads and deletes.
    pub fn request(kind: CrudKind, key: String, value: String) -> Self {
        match kind {
            CrudKind::Create => Self::Create {
                key,
                value,
                replica: None,
            },
            CrudKind::Read => Self::Read { key },
            CrudKind::Update => Self::Update { key, value },
            CrudKind::Delete => Self::Delete { key, replica: None },
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Create { key, .. }
            | Self::Read { key }
            | Self::Update { key, .. }
            | Self::Delete { key, .. } => Some(key),
            Self::Reply { .. } | Self::ReadReply { .. } => None,
        }
    }

    pub fn replica(&self) -> Option<ReplicaRole> {
        match self {
            Self::Create { replica, .. } | Self::Delete { replica, .. } => *replica,
            _ => None,
        }
    }

    pub fn is_reply(&self) -> bool {
        matches!(self, Self::Reply { .. } | Self::ReadReply { .. })
    }
}

impl KvMessage {
    pub fn new(transaction_id: TransactionId, from: Address, payload: KvPayload) -> Self {
        Self {
            transaction_id,
            from,
            payload,
        }
    }

    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("KvMessage serialization should not fail")
    }

    /// Deserialize from JSON bytes. Returns `None` for malformed input.
    pub fn from_json(data: &[u8]) -> Option<Self> {
        serde_json::from_slice(data).ok()
    }
}

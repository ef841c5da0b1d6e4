//! Transaction ids.
//!
//! A transaction id packs the CRUD operation into its top three bits and a
//! per-node counter into the remaining 29, so the operation can be read back
//! from the id alone.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

const KIND_SHIFT: u32 = 29;
const COUNTER_MASK: u32 = (1 << KIND_SHIFT) - 1;

/// Client-visible operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CrudKind {
    Create = 0,
    Read = 1,
    Update = 2,
    Delete = 3,
}

impl CrudKind {
    fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(Self::Create),
            1 => Some(Self::Read),
            2 => Some(Self::Update),
            3 => Some(Self::Delete),
            _ => None,
        }
    }
}

impl Display for CrudKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(u32);

impl TransactionId {
    /// Pack an operation and counter. The counter wraps at 2^29.
    pub fn new(kind: CrudKind, counter: u32) -> Self {
        Self(((kind as u32) << KIND_SHIFT) | (counter & COUNTER_MASK))
    }

    pub fn kind(&self) -> Option<CrudKind> {
        CrudKind::from_bits(self.0 >> KIND_SHIFT)
    }

    pub fn counter(&self) -> u32 {
        self.0 & COUNTER_MASK
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl From<u32> for TransactionId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(kind) => write!(f, "{}#{}", kind, self.counter()),
            None => write!(f, "{:#x}", self.0),
        }
    }
}

/// Per-node source of transaction ids.
#[derive(Debug, Default)]
pub struct TransactionCounter {
    next: u32,
}

impl TransactionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, kind: CrudKind) -> TransactionId {
        let id = TransactionId::new(kind, self.next);
        self.next = (self.next + 1) & COUNTER_MASK;
        id
    }
}

//! Address: identity of a node in the cluster.
//!
//! A node is identified by a numeric id plus a port. The same value is used
//! as the network destination and as the input to ring hashing, so equality
//! is byte-exact over the 6-byte wire form.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// Size of an address on the wire: 4 bytes of id, 2 bytes of port.
pub const ADDRESS_LEN: usize = 6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid address format: expected \"id:port\"")]
    InvalidFormat,
    #[error("Invalid number: {0}")]
    InvalidNumber(#[from] std::num::ParseIntError),
}

/// Identity of a node.
///
/// # Examples
/// ```
/// use ringkv_core::Address;
///
/// let addr: Address = "3:0".parse().unwrap();
/// assert_eq!(addr, Address::new(3, 0));
/// assert_eq!(addr.to_string(), "3:0");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    id: u32,
    port: u16,
}

impl Address {
    pub const fn new(id: u32, port: u16) -> Self {
        Self { id, port }
    }

    /// The all-zero address, never a valid node identity.
    pub const fn null() -> Self {
        Self { id: 0, port: 0 }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_null(&self) -> bool {
        *self == Self::null()
    }

    /// Wire form: id little-endian followed by port little-endian.
    pub fn to_bytes(&self) -> [u8; ADDRESS_LEN] {
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes[..4].copy_from_slice(&self.id.to_le_bytes());
        bytes[4..].copy_from_slice(&self.port.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self {
            id: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            port: u16::from_le_bytes([bytes[4], bytes[5]]),
        }
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.port)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, port) = s.split_once(':').ok_or(AddressError::InvalidFormat)?;
        if id.is_empty() || port.is_empty() {
            return Err(AddressError::InvalidFormat);
        }
        Ok(Self {
            id: id.parse()?,
            port: port.parse()?,
        })
    }
}

// Text in human-readable formats (JSON, logs), the raw 6 bytes in bincode
impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.serialize_str(&self.to_string())
        } else {
            self.to_bytes().serialize(s)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        if d.is_human_readable() {
            let s = String::deserialize(d)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            let bytes = <[u8; ADDRESS_LEN]>::deserialize(d)?;
            Ok(Self::from_bytes(bytes))
        }
    }
}

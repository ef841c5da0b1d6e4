//! Wire protocol shared by all nodes.
//!
//! - Encoding detection (JSON vs bincode)
//! - The envelope that unifies membership and key/value messages

pub mod encoding;
pub mod envelope;

pub use encoding::{MessageType, detect_message_type};
pub use envelope::{Outgoing, WireMessage};

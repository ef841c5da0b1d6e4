//! Datagram encoding detection.
//!
//! The node protocol uses two encodings on the same transport:
//! - **Bincode**: membership and failure-detection messages (fixed layout)
//! - **JSON**: key/value requests and replies (self-describing)
//!
//! A bincode message starts with a small little-endian variant tag, so its
//! first byte can never be `{`.

/// Encoding of an inbound datagram, judged by its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// JSON object (key/value traffic)
    Json,
    /// Bincode message (membership traffic)
    Bincode,
    /// Zero-length datagram
    Empty,
}

/// Classify a datagram without parsing it.
pub fn detect_message_type(data: &[u8]) -> MessageType {
    match data.first() {
        Some(b'{') => MessageType::Json,
        Some(_) => MessageType::Bincode,
        None => MessageType::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_request_is_json() {
        let data = br#"{"type":"read","key":"a"}"#;
        assert_eq!(detect_message_type(data), MessageType::Json);
    }

    #[test]
    fn test_membership_tag_is_bincode() {
        let data = vec![0x02, 0x00, 0x00, 0x00];
        assert_eq!(detect_message_type(&data), MessageType::Bincode);
    }

    #[test]
    fn test_empty_datagram() {
        assert_eq!(detect_message_type(&[]), MessageType::Empty);
    }

    #[test]
    fn test_leading_whitespace_is_not_json() {
        // Our serializer never emits leading whitespace; such input fails to
        // parse as bincode and is dropped by the caller.
        let data = b" {\"key\": 1}";
        assert_eq!(detect_message_type(data), MessageType::Bincode);
    }
}

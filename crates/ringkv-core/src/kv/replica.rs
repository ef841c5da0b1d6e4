//! Replica side of the key/value protocol.
//!
//! Applies a request to the local store, logs the local outcome, and answers
//! the coordinator. Stabilization requests (tagged with a replica role) are
//! applied and logged but never answered.

use super::messages::{KvMessage, KvPayload};
use super::store::LocalStore;
use super::transaction::CrudKind;
use crate::Address;
use crate::events::{EventLog, EventRecord, KvEvent};
use crate::protocol::Outgoing;
use tracing::debug;

/// Execute `request` against `store`.
///
/// Returns the reply to send, if any. Replies handed to this function are
/// ignored; they belong to the coordinator.
pub fn serve(
    store: &mut LocalStore,
    local: Address,
    request: KvMessage,
    log: &dyn EventLog,
) -> Option<Outgoing<KvMessage>> {
    let KvMessage {
        transaction_id,
        from,
        payload,
    } = request;
    let stabilization = payload.replica().is_some();

    let (kind, key, value, result) = match payload {
        KvPayload::Create { key, value, .. } => {
            let result = store.create(&key, &value);
            (CrudKind::Create, key, Some(value), result)
        }
        KvPayload::Read { key } => match store.read(&key) {
            Ok(value) => {
                let value = value.to_string();
                (CrudKind::Read, key, Some(value), Ok(()))
            }
            Err(e) => (CrudKind::Read, key, None, Err(e)),
        },
        KvPayload::Update { key, value } => {
            let result = store.update(&key, &value);
            (CrudKind::Update, key, Some(value), result)
        }
        KvPayload::Delete { key, .. } => {
            let result = store.delete(&key).map(|_| ());
            (CrudKind::Delete, key, None, result)
        }
        KvPayload::Reply { .. } | KvPayload::ReadReply { .. } => return None,
    };

    let success = result.is_ok();
    if let Err(e) = &result {
        debug!(node = %local, tx = %transaction_id, key = %key, error = %e, "replica {} failed", kind);
    }

    log.record(EventRecord {
        node: local,
        event: KvEvent::outcome(kind, success),
        coordinator: false,
        transaction_id,
        key,
        value: value.clone(),
    });

    if stabilization {
        return None;
    }

    let payload = match kind {
        CrudKind::Read => KvPayload::ReadReply {
            value: if success { value.unwrap_or_default() } else { String::new() },
        },
        _ => KvPayload::Reply { success },
    };
    Some(Outgoing::new(
        from,
        KvMessage::new(transaction_id, local, payload),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventBus, EventRecorder};
    use crate::kv::TransactionId;
    use crate::ring::ReplicaRole;
    use std::sync::Arc;

    fn local() -> Address {
        Address::new(3, 0)
    }

    fn client() -> Address {
        Address::new(1, 0)
    }

    fn request(kind: CrudKind, key: &str, value: &str) -> KvMessage {
        KvMessage::new(
            TransactionId::new(kind, 1),
            client(),
            KvPayload::request(kind, key.into(), value.into()),
        )
    }

    fn setup() -> (LocalStore, Arc<EventBus>, EventRecorder) {
        let bus = Arc::new(EventBus::new());
        let recorder = EventRecorder::attach(&bus);
        (LocalStore::new(), bus, recorder)
    }

    #[test]
    fn test_create_replies_success() {
        let (mut store, bus, recorder) = setup();
        let reply = serve(&mut store, local(), request(CrudKind::Create, "a", "1"), &*bus).unwrap();

        assert_eq!(reply.to, client());
        assert_eq!(reply.message.from, local());
        assert_eq!(reply.message.payload, KvPayload::Reply { success: true });
        assert_eq!(store.read("a"), Ok("1"));

        let outcomes = recorder.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].event, KvEvent::CreateOk);
        assert!(!outcomes[0].coordinator);
    }

    #[test]
    fn test_duplicate_create_replies_failure() {
        let (mut store, bus, recorder) = setup();
        store.create("a", "1").unwrap();
        let reply = serve(&mut store, local(), request(CrudKind::Create, "a", "2"), &*bus).unwrap();
        assert_eq!(reply.message.payload, KvPayload::Reply { success: false });
        assert_eq!(recorder.outcomes()[0].event, KvEvent::CreateFail);
    }

    #[test]
    fn test_read_replies_value() {
        let (mut store, bus, recorder) = setup();
        store.create("a", "1").unwrap();
        let reply = serve(&mut store, local(), request(CrudKind::Read, "a", ""), &*bus).unwrap();
        assert_eq!(reply.message.payload, KvPayload::ReadReply { value: "1".into() });
        assert_eq!(recorder.outcomes()[0].value.as_deref(), Some("1"));
    }

    #[test]
    fn test_read_missing_replies_empty() {
        let (mut store, bus, recorder) = setup();
        let reply = serve(&mut store, local(), request(CrudKind::Read, "a", ""), &*bus).unwrap();
        assert_eq!(
            reply.message.payload,
            KvPayload::ReadReply {
                value: String::new()
            }
        );
        assert_eq!(recorder.outcomes()[0].event, KvEvent::ReadFail);
    }

    #[test]
    fn test_update_and_delete() {
        let (mut store, bus, recorder) = setup();
        store.create("a", "1").unwrap();

        serve(&mut store, local(), request(CrudKind::Update, "a", "2"), &*bus);
        assert_eq!(store.read("a"), Ok("2"));

        let reply = serve(&mut store, local(), request(CrudKind::Delete, "a", ""), &*bus).unwrap();
        assert_eq!(reply.message.payload, KvPayload::Reply { success: true });
        assert!(!store.contains("a"));

        let events: Vec<KvEvent> = recorder.outcomes().iter().map(|r| r.event).collect();
        assert_eq!(events, vec![KvEvent::UpdateOk, KvEvent::DeleteOk]);
    }

    #[test]
    fn test_stabilization_request_not_answered() {
        let (mut store, bus, recorder) = setup();
        let msg = KvMessage::new(
            TransactionId::new(CrudKind::Create, 5),
            client(),
            KvPayload::Create {
                key: "a".into(),
                value: "1".into(),
                replica: Some(ReplicaRole::Tertiary),
            },
        );
        assert!(serve(&mut store, local(), msg, &*bus).is_none());
        assert_eq!(store.read("a"), Ok("1"));
        assert_eq!(recorder.outcomes()[0].event, KvEvent::CreateOk);
    }

    #[test]
    fn test_reply_is_ignored() {
        let (mut store, bus, recorder) = setup();
        let msg = KvMessage::new(
            TransactionId::new(CrudKind::Create, 5),
            client(),
            KvPayload::Reply { success: true },
        );
        assert!(serve(&mut store, local(), msg, &*bus).is_none());
        assert!(recorder.events().is_empty());
    }
}

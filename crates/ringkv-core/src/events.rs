//! Event infrastructure for ringkv-core.
//!
//! Provides the outcome log (`EventRecord`), membership notifications
//! (`NodeEvent`) and `EventBus` for subscriptions. `EventLog` is the seam the
//! key/value layer writes outcomes through.

use crate::Address;
use crate::kv::{CrudKind, TransactionId};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

/// Outcome of a CRUD operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum KvEvent {
    CreateOk,
    CreateFail,
    ReadOk,
    ReadFail,
    UpdateOk,
    UpdateFail,
    DeleteOk,
    DeleteFail,
}

impl KvEvent {
    pub fn outcome(kind: CrudKind, success: bool) -> Self {
        match (kind, success) {
            (CrudKind::Create, true) => Self::CreateOk,
            (CrudKind::Create, false) => Self::CreateFail,
            (CrudKind::Read, true) => Self::ReadOk,
            (CrudKind::Read, false) => Self::ReadFail,
            (CrudKind::Update, true) => Self::UpdateOk,
            (CrudKind::Update, false) => Self::UpdateFail,
            (CrudKind::Delete, true) => Self::DeleteOk,
            (CrudKind::Delete, false) => Self::DeleteFail,
        }
    }

    pub fn kind(&self) -> CrudKind {
        match self {
            Self::CreateOk | Self::CreateFail => CrudKind::Create,
            Self::ReadOk | Self::ReadFail => CrudKind::Read,
            Self::UpdateOk | Self::UpdateFail => CrudKind::Update,
            Self::DeleteOk | Self::DeleteFail => CrudKind::Delete,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::CreateOk | Self::ReadOk | Self::UpdateOk | Self::DeleteOk
        )
    }
}

/// One logged outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Node that logged the outcome.
    pub node: Address,
    pub event: KvEvent,
    /// `true` for the coordinator's quorum verdict, `false` for a replica's
    /// local result.
    pub coordinator: bool,
    pub transaction_id: TransactionId,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Events published by a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeEvent {
    /// CRUD outcome.
    Outcome(EventRecord),
    /// A peer was added to the node's membership table.
    MemberAdded { node: Address, member: Address },
    /// A peer was evicted from the node's membership table.
    MemberRemoved { node: Address, member: Address },
}

/// Sink for CRUD outcomes.
pub trait EventLog {
    fn record(&self, record: EventRecord);
}

/// Subscription handle that unsubscribes automatically when dropped.
///
/// Follows the disposer pattern: hold this value to keep receiving events,
/// drop it (or let it go out of scope) to unsubscribe.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

type Callback = Arc<dyn Fn(NodeEvent) + Send + Sync>;

/// Event bus for publishing node events to subscribers.
///
/// Wrap in `Arc` to enable subscriptions. One bus may be shared by every
/// node of a simulated cluster.
pub struct EventBus {
    callbacks: RwLock<Vec<(usize, Callback)>>,
    next_id: AtomicUsize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events. Returns `Subscription` that unsubscribes on drop.
    ///
    /// Requires `self` to be wrapped in `Arc`.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(NodeEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: usize) {
        // try_write: Drop may run during unwinding while emit holds a read lock
        if let Ok(mut guard) = self.callbacks.try_write() {
            guard.retain(|(i, _)| *i != id);
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: NodeEvent) {
        // Clone the callback list so a callback may subscribe without deadlock.
        let callbacks: Vec<_> = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(event.clone());
        }
    }
}

impl EventLog for EventBus {
    fn record(&self, record: EventRecord) {
        self.emit(NodeEvent::Outcome(record));
    }
}

/// Collects every event published on a bus.
pub struct EventRecorder {
    events: Arc<Mutex<Vec<NodeEvent>>>,
    _subscription: Subscription,
}

impl EventRecorder {
    pub fn attach(bus: &Arc<EventBus>) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let subscription = bus.subscribe(move |event| {
            sink.lock().unwrap_or_else(|e| e.into_inner()).push(event);
        });
        Self {
            events,
            _subscription: subscription,
        }
    }

    pub fn events(&self) -> Vec<NodeEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Recorded CRUD outcomes, in emission order.
    pub fn outcomes(&self) -> Vec<EventRecord> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                NodeEvent::Outcome(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    /// Coordinator verdicts only.
    pub fn verdicts(&self) -> Vec<EventRecord> {
        self.outcomes()
            .into_iter()
            .filter(|record| record.coordinator)
            .collect()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(event: KvEvent, coordinator: bool) -> EventRecord {
        EventRecord {
            node: Address::new(1, 0),
            event,
            coordinator,
            transaction_id: TransactionId::new(event.kind(), 1),
            key: "k".into(),
            value: Some("v".into()),
        }
    }

    #[test]
    fn test_subscribe_and_emit() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        let _sub = bus.subscribe(move |_event| {
            count_clone.fetch_add(1, Ordering::Relaxed);
        });

        bus.record(record(KvEvent::CreateOk, true));

        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_subscription_unsubscribes_on_drop() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        {
            let _sub = bus.subscribe(move |_event| {
                count_clone.fetch_add(1, Ordering::Relaxed);
            });
            bus.record(record(KvEvent::ReadOk, true));
            assert_eq!(count.load(Ordering::Relaxed), 1);
        }

        bus.record(record(KvEvent::ReadOk, true));
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_recorder_filters_verdicts() {
        let bus = Arc::new(EventBus::new());
        let recorder = EventRecorder::attach(&bus);

        bus.record(record(KvEvent::CreateOk, false));
        bus.record(record(KvEvent::CreateOk, true));
        bus.emit(NodeEvent::MemberAdded {
            node: Address::new(1, 0),
            member: Address::new(2, 0),
        });

        assert_eq!(recorder.events().len(), 3);
        assert_eq!(recorder.outcomes().len(), 2);
        assert_eq!(recorder.verdicts(), vec![record(KvEvent::CreateOk, true)]);

        recorder.clear();
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_outcome_mapping() {
        assert_eq!(KvEvent::outcome(CrudKind::Update, false), KvEvent::UpdateFail);
        assert_eq!(KvEvent::DeleteOk.kind(), CrudKind::Delete);
        assert!(KvEvent::ReadOk.is_success());
        assert!(!KvEvent::ReadFail.is_success());
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_string(&NodeEvent::Outcome(record(KvEvent::ReadOk, true)))
            .unwrap();
        assert!(json.contains("\"type\":\"outcome\""));
        assert!(json.contains("\"event\":\"readOk\""));
        assert!(json.contains("\"node\":\"1:0\""));
        assert!(json.contains("\"coordinator\":true"));

        let json = serde_json::to_string(&NodeEvent::MemberRemoved {
            node: Address::new(1, 0),
            member: Address::new(4, 0),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"memberRemoved","node":"1:0","member":"4:0"}"#);
    }
}

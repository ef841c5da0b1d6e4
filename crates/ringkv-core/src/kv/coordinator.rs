//! Quorum coordinator for client-issued CRUD.
//!
//! Each client call becomes a transaction sent to the key's three replicas.
//! Replies are counted as they arrive:
//! - two successes: the operation succeeded
//! - three replies without two successes: it failed
//!
//! Either verdict is logged exactly once and the transaction is forgotten.
//! Replies to a forgotten transaction are ignored.
//!
//! # Reply window
//!
//! Replies to one request travel the same path, so they normally land in the
//! same tick. A transaction that has started receiving replies is finalized
//! at the end of that tick: any replica that has not answered by then is
//! counted as lost and the transaction fails. This keeps pending state to one
//! tick of outstanding replies at the cost of failing a request whose replies
//! straggle. A transaction that never receives a reply (ring smaller than
//! three nodes, replicas unreachable) fails once it is `reply_deadline` ticks
//! old.

use super::messages::{KvMessage, KvPayload};
use super::transaction::{CrudKind, TransactionCounter, TransactionId};
use crate::Address;
use crate::config::CoordinatorConfig;
use crate::events::{EventLog, EventRecord, KvEvent};
use crate::protocol::Outgoing;
use crate::ring::{REPLICATION_FACTOR, Ring};
use crate::swim::Tick;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Replies needed for success.
pub const QUORUM: usize = 2;

#[derive(Debug, Clone)]
struct PendingTransaction {
    kind: CrudKind,
    key: String,
    value: String,
    issued_at: Tick,
    replies: usize,
    successes: usize,
}

pub struct QuorumCoordinator {
    local: Address,
    reply_deadline: Tick,
    pending: BTreeMap<TransactionId, PendingTransaction>,
}

impl QuorumCoordinator {
    pub fn new(local: Address, config: &CoordinatorConfig) -> Self {
        Self {
            local,
            reply_deadline: config.reply_deadline,
            pending: BTreeMap::new(),
        }
    }

    /// Start a transaction and build the requests for the key's replicas.
    ///
    /// With fewer than three nodes on the ring nothing is sent; the
    /// transaction fails once its deadline passes.
    pub fn issue(
        &mut self,
        kind: CrudKind,
        key: &str,
        value: &str,
        ring: &Ring,
        counter: &mut TransactionCounter,
        now: Tick,
    ) -> (TransactionId, Vec<Outgoing<KvMessage>>) {
        let transaction_id = counter.next(kind);
        self.pending.insert(
            transaction_id,
            PendingTransaction {
                kind,
                key: key.to_string(),
                value: value.to_string(),
                issued_at: now,
                replies: 0,
                successes: 0,
            },
        );

        let replicas = ring.replicas(key);
        if replicas.is_empty() {
            debug!(node = %self.local, tx = %transaction_id, key, "no replicas, ring too small");
        }

        let payload = KvPayload::request(kind, key.to_string(), value.to_string());
        let outgoing = replicas
            .into_iter()
            .map(|replica| {
                Outgoing::new(
                    replica,
                    KvMessage::new(transaction_id, self.local, payload.clone()),
                )
            })
            .collect();

        (transaction_id, outgoing)
    }

    /// Count a reply, logging the verdict once it is decided.
    pub fn on_reply(&mut self, reply: KvMessage, log: &dyn EventLog) {
        let transaction_id = reply.transaction_id;
        let (success, read_value) = match reply.payload {
            KvPayload::Reply { success } => (success, None),
            KvPayload::ReadReply { value } => (!value.is_empty(), Some(value)),
            _ => return,
        };

        let Some(pending) = self.pending.get_mut(&transaction_id) else {
            trace!(node = %self.local, tx = %transaction_id, "reply for finished transaction");
            return;
        };

        pending.replies += 1;
        if success {
            pending.successes += 1;
        }

        if pending.successes >= QUORUM {
            if let Some(pending) = self.pending.remove(&transaction_id) {
                self.log_verdict(transaction_id, pending, true, read_value, log);
            }
        } else if pending.replies >= REPLICATION_FACTOR {
            if let Some(pending) = self.pending.remove(&transaction_id) {
                self.log_verdict(transaction_id, pending, false, None, log);
            }
        }
    }

    /// Fail every transaction whose reply window closed or whose deadline
    /// passed. Returns how many were failed.
    pub fn end_of_tick(&mut self, now: Tick, log: &dyn EventLog) -> usize {
        let expired: Vec<TransactionId> = self
            .pending
            .iter()
            .filter(|(_, p)| p.replies > 0 || now - p.issued_at >= self.reply_deadline)
            .map(|(id, _)| *id)
            .collect();

        for transaction_id in &expired {
            if let Some(pending) = self.pending.remove(transaction_id) {
                debug!(
                    node = %self.local,
                    tx = %transaction_id,
                    replies = pending.replies,
                    "transaction flushed without quorum"
                );
                self.log_verdict(*transaction_id, pending, false, None, log);
            }
        }

        expired.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, transaction_id: &TransactionId) -> bool {
        self.pending.contains_key(transaction_id)
    }

    fn log_verdict(
        &self,
        transaction_id: TransactionId,
        pending: PendingTransaction,
        success: bool,
        read_value: Option<String>,
        log: &dyn EventLog,
    ) {
        let value = match pending.kind {
            CrudKind::Create | CrudKind::Update => Some(pending.value),
            CrudKind::Read => read_value,
            CrudKind::Delete => None,
        };
        log.record(EventRecord {
            node: self.local,
            event: KvEvent::outcome(pending.kind, success),
            coordinator: true,
            transaction_id,
            key: pending.key,
            value,
        });
    }
}

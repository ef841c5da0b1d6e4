//! Stabilization after ring changes.
//!
//! When the ring changes, every held key is checked against its new replica
//! set:
//! - if this node is no longer a replica, it drops its copy
//! - if it is the lead survivor (first member of the new set that was also in
//!   the old set), it tells replicas that fell out of the set to drop the key
//!   and pushes the key to replicas that joined the set
//! - peers that became this node's successors receive the keys they now
//!   replicate
//!
//! Pushes and drops are ordinary create/delete requests tagged with the
//! receiver's replica role, so the receiver never replies.

use super::messages::{KvMessage, KvPayload};
use super::store::LocalStore;
use super::transaction::{CrudKind, TransactionCounter};
use crate::Address;
use crate::events::{EventLog, EventRecord, KvEvent};
use crate::protocol::Outgoing;
use crate::ring::{Neighbors, ReplicaRole, Ring};
use tracing::debug;

pub struct Stabilizer {
    local: Address,
    neighbors: Neighbors,
    /// Ring the held keys were last reconciled against
    ring: Ring,
}

impl Stabilizer {
    pub fn new(local: Address, ring_size: u64) -> Self {
        Self {
            local,
            neighbors: Neighbors::default(),
            ring: Ring::empty(ring_size),
        }
    }

    pub fn neighbors(&self) -> &Neighbors {
        &self.neighbors
    }

    /// Track a ring change without reconciling any keys.
    pub fn observe(&mut self, ring: &Ring) {
        self.neighbors = ring.find_neighbors(&self.local);
        self.ring = ring.clone();
    }

    /// Reconcile the store against `ring`.
    ///
    /// Calling this again with the same ring and store sends nothing.
    pub fn stabilize(
        &mut self,
        ring: &Ring,
        store: &mut LocalStore,
        counter: &mut TransactionCounter,
        log: &dyn EventLog,
    ) -> Vec<Outgoing<KvMessage>> {
        let local = self.local;
        let previous = std::mem::replace(&mut self.ring, ring.clone());
        let old_neighbors = std::mem::replace(&mut self.neighbors, ring.find_neighbors(&local));
        let new_successors: Vec<Address> = self
            .neighbors
            .has_my_replicas
            .iter()
            .filter(|a| !old_neighbors.has_my_replicas.contains(a))
            .copied()
            .collect();

        let held: Vec<(String, String)> = store
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let mut outgoing = Vec::new();
        for (key, value) in held {
            let replicas = ring.replicas(&key);
            if replicas.is_empty() {
                continue;
            }

            if !replicas.contains(&local) {
                self.shed(&key, store, counter, log);
                continue;
            }

            let old_replicas = previous.replicas(&key);
            let lead = replicas
                .iter()
                .find(|a| old_replicas.contains(a))
                .copied()
                .unwrap_or(local);

            let mut targets = Vec::new();
            if lead == local {
                for (position, holder) in old_replicas.iter().enumerate() {
                    if *holder == local || replicas.contains(holder) || !ring.contains(holder) {
                        continue;
                    }
                    debug!(node = %local, peer = %holder, key = %key, "dropping excess replica");
                    outgoing.push(Outgoing::new(
                        *holder,
                        KvMessage::new(
                            counter.next(CrudKind::Delete),
                            local,
                            KvPayload::Delete {
                                key: key.clone(),
                                replica: ReplicaRole::from_position(position),
                            },
                        ),
                    ));
                }
                targets.extend(
                    replicas
                        .iter()
                        .filter(|a| **a != local && !old_replicas.contains(a)),
                );
            }
            for successor in &new_successors {
                if replicas.contains(successor) && !targets.contains(successor) {
                    targets.push(*successor);
                }
            }

            for target in targets {
                let role = replicas
                    .iter()
                    .position(|a| *a == target)
                    .and_then(ReplicaRole::from_position);
                debug!(node = %local, peer = %target, key = %key, ?role, "pushing replica");
                outgoing.push(Outgoing::new(
                    target,
                    KvMessage::new(
                        counter.next(CrudKind::Create),
                        local,
                        KvPayload::Create {
                            key: key.clone(),
                            value: value.clone(),
                            replica: role,
                        },
                    ),
                ));
            }
        }

        outgoing
    }

    fn shed(
        &self,
        key: &str,
        store: &mut LocalStore,
        counter: &mut TransactionCounter,
        log: &dyn EventLog,
    ) {
        let transaction_id = counter.next(CrudKind::Delete);
        let success = store.delete(key).is_ok();
        debug!(node = %self.local, key, "no longer a replica, dropping key");
        log.record(EventRecord {
            node: self.local,
            event: KvEvent::outcome(CrudKind::Delete, success),
            coordinator: false,
            transaction_id,
            key: key.to_string(),
            value: None,
        });
    }
}

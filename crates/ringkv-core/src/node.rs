//! Per-node tick driver.
//!
//! A `Node` owns one member's whole state: membership protocol, ring, local
//! store, coordinator and stabilizer. Each call to [`Node::tick`]:
//! 1. drains the node's inbox and handles every datagram in order
//! 2. runs the membership duties (heartbeat, probes, eviction)
//! 3. rebuilds the ring and stabilizes if it changed
//! 4. closes the coordinator's reply window
//!
//! Nothing inside a node is shared; nodes only talk through the transport.

use crate::Address;
use crate::config::{ConfigError, NodeConfig};
use crate::events::{EventBus, NodeEvent};
use crate::kv::{
    CrudKind, LocalStore, QuorumCoordinator, Stabilizer, TransactionCounter, TransactionId,
    replica,
};
use crate::protocol::WireMessage;
use crate::ring::{Neighbors, Ring};
use crate::swim::{MembershipProtocol, MembershipTable, MembershipUpdate, Tick};
use crate::transport::{Transport, TransportError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Invalid local address: {0}")]
    InvalidAddress(Address),

    #[error("Introducer {introducer} unreachable: {source}")]
    IntroducerUnreachable {
        introducer: Address,
        source: TransportError,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

pub struct Node {
    local: Address,
    ring_size: u64,
    membership: MembershipProtocol,
    ring: Ring,
    store: LocalStore,
    coordinator: QuorumCoordinator,
    stabilizer: Stabilizer,
    counter: TransactionCounter,
    events: Arc<EventBus>,
    rng: StdRng,
}

impl Node {
    /// Start a node and send its join request.
    ///
    /// A node whose address equals `introducer` starts the group on its own.
    /// Outcomes and membership changes are published on `events`.
    pub fn start<T: Transport + ?Sized>(
        local: Address,
        introducer: Address,
        config: NodeConfig,
        events: Arc<EventBus>,
        transport: &mut T,
        now: Tick,
    ) -> Result<Self, BootstrapError> {
        if local.is_null() {
            return Err(BootstrapError::InvalidAddress(local));
        }
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::rng().random()),
        };

        let node = Self {
            local,
            ring_size: config.ring_size,
            membership: MembershipProtocol::new(local, introducer, &config.swim, now),
            ring: Ring::empty(config.ring_size),
            store: LocalStore::new(),
            coordinator: QuorumCoordinator::new(local, &config.coordinator),
            stabilizer: Stabilizer::new(local, config.ring_size),
            counter: TransactionCounter::new(),
            events,
            rng,
        };

        match node.membership.join_request() {
            Some(request) => {
                let data = WireMessage::from(request.message).encode();
                transport
                    .send(local, request.to, data)
                    .map_err(|source| BootstrapError::IntroducerUnreachable { introducer, source })?;
                info!(node = %local, introducer = %introducer, "join request sent");
            }
            None => info!(node = %local, "starting group as introducer"),
        }

        Ok(node)
    }

    pub fn address(&self) -> Address {
        self.local
    }

    pub fn is_in_group(&self) -> bool {
        self.membership.is_in_group()
    }

    pub fn table(&self) -> &MembershipTable {
        self.membership.table()
    }

    /// Ring as of the last tick.
    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn neighbors(&self) -> &Neighbors {
        self.stabilizer.neighbors()
    }

    pub fn pending_transactions(&self) -> usize {
        self.coordinator.pending_count()
    }

    /// Advance this node by one tick.
    pub fn tick<T: Transport + ?Sized>(&mut self, now: Tick, transport: &mut T) {
        for datagram in transport.deliver(self.local) {
            self.receive(&datagram, now, transport);
        }

        let update = self.membership.tick(now, &mut self.rng);
        self.apply_membership(update, transport);

        self.rebuild_ring(transport);

        self.coordinator.end_of_tick(now, &*self.events);
    }

    pub fn client_create<T: Transport + ?Sized>(
        &mut self,
        key: &str,
        value: &str,
        now: Tick,
        transport: &mut T,
    ) -> TransactionId {
        self.client_request(CrudKind::Create, key, value, now, transport)
    }

    pub fn client_read<T: Transport + ?Sized>(
        &mut self,
        key: &str,
        now: Tick,
        transport: &mut T,
    ) -> TransactionId {
        self.client_request(CrudKind::Read, key, "", now, transport)
    }

    pub fn client_update<T: Transport + ?Sized>(
        &mut self,
        key: &str,
        value: &str,
        now: Tick,
        transport: &mut T,
    ) -> TransactionId {
        self.client_request(CrudKind::Update, key, value, now, transport)
    }

    pub fn client_delete<T: Transport + ?Sized>(
        &mut self,
        key: &str,
        now: Tick,
        transport: &mut T,
    ) -> TransactionId {
        self.client_request(CrudKind::Delete, key, "", now, transport)
    }

    fn client_request<T: Transport + ?Sized>(
        &mut self,
        kind: CrudKind,
        key: &str,
        value: &str,
        now: Tick,
        transport: &mut T,
    ) -> TransactionId {
        let (transaction_id, requests) =
            self.coordinator
                .issue(kind, key, value, &self.ring, &mut self.counter, now);
        debug!(node = %self.local, tx = %transaction_id, key, replicas = requests.len(), "client {}", kind);
        for request in requests {
            self.send(transport, request.to, request.message.into());
        }
        transaction_id
    }

    fn receive<T: Transport + ?Sized>(&mut self, data: &[u8], now: Tick, transport: &mut T) {
        match WireMessage::decode(data) {
            None => {
                debug!(node = %self.local, bytes = data.len(), "dropping malformed datagram");
            }
            Some(WireMessage::Membership(msg)) => {
                let update = self.membership.handle(msg, now, &mut self.rng);
                self.apply_membership(update, transport);
            }
            Some(WireMessage::Kv(msg)) if msg.payload.is_reply() => {
                self.coordinator.on_reply(msg, &*self.events);
            }
            Some(WireMessage::Kv(msg)) => {
                trace!(node = %self.local, tx = %msg.transaction_id, peer = %msg.from, "kv request");
                if let Some(reply) = replica::serve(&mut self.store, self.local, msg, &*self.events) {
                    self.send(transport, reply.to, reply.message.into());
                }
            }
        }
    }

    fn apply_membership<T: Transport + ?Sized>(&mut self, update: MembershipUpdate, transport: &mut T) {
        for member in update.joined {
            self.events.emit(NodeEvent::MemberAdded {
                node: self.local,
                member,
            });
        }
        for member in update.departed {
            self.events.emit(NodeEvent::MemberRemoved {
                node: self.local,
                member,
            });
        }
        for out in update.outgoing {
            self.send(transport, out.to, out.message.into());
        }
    }

    fn rebuild_ring<T: Transport + ?Sized>(&mut self, transport: &mut T) {
        let ring = Ring::build(self.membership.table().addresses(), self.ring_size);
        if ring == self.ring {
            return;
        }
        debug!(node = %self.local, nodes = ring.len(), "ring changed");

        if self.store.is_empty() {
            self.stabilizer.observe(&ring);
        } else {
            let pushes =
                self.stabilizer
                    .stabilize(&ring, &mut self.store, &mut self.counter, &*self.events);
            for push in pushes {
                self.send(transport, push.to, push.message.into());
            }
        }
        self.ring = ring;
    }

    fn send<T: Transport + ?Sized>(&self, transport: &mut T, to: Address, message: WireMessage) {
        if let Err(e) = transport.send(self.local, to, message.encode()) {
            debug!(node = %self.local, peer = %to, error = %e, "send failed");
        }
    }
}

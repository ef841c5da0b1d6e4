//! Membership protocol driver.
//!
//! Ties the membership table, gossip, and failure detector together and
//! turns their decisions into messages. Sans-IO: every call returns the
//! messages to send and the membership changes it caused.

use super::failure::{FailureDetector, FailureEvent};
use super::gossip::{GossipDisseminator, GossipOutcome};
use super::membership::{MembershipEntry, MembershipTable, MergeOutcome, Tick};
use super::messages::{GossipEntry, MembershipMessage};
use crate::Address;
use crate::config::SwimConfig;
use crate::protocol::Outgoing;
use rand::Rng;
use tracing::{debug, info, trace};

/// Messages to send and membership changes from one protocol step.
#[derive(Debug, Default)]
pub struct MembershipUpdate {
    pub outgoing: Vec<Outgoing<MembershipMessage>>,
    /// Addresses added to the table.
    pub joined: Vec<Address>,
    /// Addresses evicted or removed by gossip.
    pub departed: Vec<Address>,
}

impl MembershipUpdate {
    fn absorb(&mut self, outcome: GossipOutcome) {
        self.outgoing.extend(outcome.outgoing);
        self.joined.extend(outcome.joined);
        self.departed.extend(outcome.departed);
    }

    fn send(&mut self, to: Address, message: MembershipMessage) {
        self.outgoing.push(Outgoing::new(to, message));
    }
}

pub struct MembershipProtocol {
    table: MembershipTable,
    gossip: GossipDisseminator,
    detector: FailureDetector,
    introducer: Address,
    join_reply_limit: usize,
    in_group: bool,
}

impl MembershipProtocol {
    /// Create the protocol state for `local`.
    ///
    /// The introducer is in the group from the start; every other node waits
    /// for a `JoinReply`.
    pub fn new(local: Address, introducer: Address, config: &SwimConfig, now: Tick) -> Self {
        Self {
            table: MembershipTable::new(
                local,
                config.fail_threshold,
                config.remove_threshold,
                now,
            ),
            gossip: GossipDisseminator::new(config),
            detector: FailureDetector::new(config),
            introducer,
            join_reply_limit: config.join_reply_limit,
            in_group: local == introducer,
        }
    }

    pub fn table(&self) -> &MembershipTable {
        &self.table
    }

    pub fn local_address(&self) -> Address {
        self.table.local_address()
    }

    pub fn introducer(&self) -> Address {
        self.introducer
    }

    pub fn is_in_group(&self) -> bool {
        self.in_group
    }

    /// The join request to send at startup, if we are not the introducer.
    pub fn join_request(&self) -> Option<Outgoing<MembershipMessage>> {
        if self.in_group {
            return None;
        }
        let local = self.table.local_entry();
        Some(Outgoing::new(
            self.introducer,
            MembershipMessage::JoinRequest {
                sender: local.address,
                heartbeat: local.heartbeat,
            },
        ))
    }

    /// Process one received membership message.
    pub fn handle<R: Rng + ?Sized>(
        &mut self,
        msg: MembershipMessage,
        now: Tick,
        rng: &mut R,
    ) -> MembershipUpdate {
        let local = self.local_address();
        let mut update = MembershipUpdate::default();
        trace!(node = %local, kind = msg.kind(), "membership message");

        match msg {
            MembershipMessage::JoinRequest { sender, heartbeat } => {
                let entry = GossipEntry::upsert(MembershipEntry::new(sender, heartbeat, now));
                update.absorb(self.gossip.absorb(&mut self.table, &[entry], now, rng));

                let entries: Vec<MembershipEntry> = self
                    .table
                    .healthy_entries(now)
                    .into_iter()
                    .filter(|e| e.address != sender)
                    .take(self.join_reply_limit)
                    .collect();
                debug!(node = %local, peer = %sender, entries = entries.len(), "answering join");
                update.send(
                    sender,
                    MembershipMessage::JoinReply {
                        sender: local,
                        entries,
                    },
                );
            }

            MembershipMessage::JoinReply { sender, entries } => {
                for entry in &entries {
                    if self.table.merge(entry, now) == MergeOutcome::Inserted {
                        update.joined.push(entry.address);
                    }
                }
                if !self.in_group {
                    info!(node = %local, introducer = %sender, "joined group");
                    self.in_group = true;
                }
                let batch = entries.into_iter().map(GossipEntry::upsert).collect();
                update
                    .outgoing
                    .extend(self.gossip.disseminate(&self.table, batch, rng));
            }

            MembershipMessage::Ping {
                sender,
                relay_for,
                entries,
            } => {
                update.absorb(self.gossip.absorb(&mut self.table, &entries, now, rng));
                let healthy = self.table.healthy_entries(now);
                update.send(sender, MembershipMessage::ack(local, relay_for, &healthy));
            }

            MembershipMessage::PingRelayRequest {
                sender,
                target,
                entries,
            } => {
                update.absorb(self.gossip.absorb(&mut self.table, &entries, now, rng));
                let healthy = self.table.healthy_entries(now);
                update.send(target, MembershipMessage::ping(local, Some(sender), &healthy));
            }

            MembershipMessage::Ack {
                sender: _,
                relay_for,
                entries,
            } => {
                update.absorb(self.gossip.absorb(&mut self.table, &entries, now, rng));
                if let Some(origin) = relay_for {
                    let healthy = self.table.healthy_entries(now);
                    update.send(origin, MembershipMessage::ack(local, None, &healthy));
                }
            }

            MembershipMessage::Gossip {
                hops_remaining,
                entries,
            } => {
                update.absorb(
                    self.gossip
                        .handle(&mut self.table, hops_remaining, entries, now, rng),
                );
            }
        }

        for address in &update.joined {
            info!(node = %local, peer = %address, "member added");
        }
        for address in &update.departed {
            info!(node = %local, peer = %address, "member removed by gossip");
        }
        update
    }

    /// Periodic duties: refresh our heartbeat, probe, evict.
    ///
    /// Does nothing until the node has joined.
    pub fn tick<R: Rng + ?Sized>(&mut self, now: Tick, rng: &mut R) -> MembershipUpdate {
        let mut update = MembershipUpdate::default();
        if !self.in_group {
            return update;
        }

        let local = self.local_address();
        self.table.refresh_local(now);

        let mut evicted = Vec::new();
        for event in self.detector.tick(&mut self.table, now, rng) {
            match event {
                FailureEvent::SendPing { target } => {
                    let healthy = self.table.healthy_entries(now);
                    update.send(target, MembershipMessage::ping(local, None, &healthy));
                }
                FailureEvent::SendPingRelay { target, via } => {
                    debug!(node = %local, peer = %target, relays = via.len(), "indirect probe");
                    let healthy = self.table.healthy_entries(now);
                    for relay in via {
                        update.send(
                            relay,
                            MembershipMessage::ping_relay_request(local, target, &healthy),
                        );
                    }
                }
                FailureEvent::PeerEvicted { entry } => {
                    info!(
                        node = %local,
                        peer = %entry.address,
                        age = entry.age(now),
                        "member removed"
                    );
                    update.departed.push(entry.address);
                    evicted.push(entry);
                }
            }
        }

        update
            .outgoing
            .extend(self.gossip.announce_removal(&self.table, &evicted, rng));
        update
    }
}

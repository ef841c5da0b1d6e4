//! Gossip dissemination.
//!
//! Every entry a node sees for the first time is pushed to `fanout` random
//! peers in a fresh message with the full hop budget. A received gossip
//! message is forwarded, entries untouched, while hops remain. Known entries
//! are merged by heartbeat only, so repeated delivery is harmless.

use super::membership::{MembershipEntry, MembershipTable, MergeOutcome, Tick};
use super::messages::{GossipEntry, MembershipMessage};
use crate::Address;
use crate::config::SwimConfig;
use crate::protocol::Outgoing;
use rand::Rng;

/// What merging a batch of entries did to the table.
#[derive(Debug, Default)]
pub struct GossipOutcome {
    pub outgoing: Vec<Outgoing<MembershipMessage>>,
    /// Addresses inserted into the table.
    pub joined: Vec<Address>,
    /// Addresses removed through gossiped removals.
    pub departed: Vec<Address>,
}

impl GossipOutcome {
    fn extend(&mut self, other: GossipOutcome) {
        self.outgoing.extend(other.outgoing);
        self.joined.extend(other.joined);
        self.departed.extend(other.departed);
    }
}

pub struct GossipDisseminator {
    ttl: u32,
    fanout: usize,
    removals: bool,
}

impl GossipDisseminator {
    pub fn new(config: &SwimConfig) -> Self {
        Self {
            ttl: config.gossip_ttl,
            fanout: config.gossip_fanout,
            removals: config.gossip_removals,
        }
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// Start a new gossip message with a full hop budget.
    pub fn disseminate<R: Rng + ?Sized>(
        &self,
        table: &MembershipTable,
        entries: Vec<GossipEntry>,
        rng: &mut R,
    ) -> Vec<Outgoing<MembershipMessage>> {
        if entries.is_empty() {
            return Vec::new();
        }
        let msg = MembershipMessage::gossip(self.ttl, entries);
        self.fan_out(table, msg, rng)
    }

    /// Merge entries from any membership message.
    ///
    /// Each insert (or applied removal) is re-gossiped on its own.
    pub fn absorb<R: Rng + ?Sized>(
        &self,
        table: &mut MembershipTable,
        entries: &[GossipEntry],
        now: Tick,
        rng: &mut R,
    ) -> GossipOutcome {
        let mut outcome = GossipOutcome::default();

        for gossip in entries {
            if gossip.upsert {
                if table.merge(&gossip.entry, now) == MergeOutcome::Inserted {
                    outcome.joined.push(gossip.entry.address);
                    let fresh = table.get(&gossip.entry.address).copied().unwrap_or(gossip.entry);
                    outcome
                        .outgoing
                        .extend(self.disseminate(table, vec![GossipEntry::upsert(fresh)], rng));
                }
            } else if self.removals && self.apply_removal(table, gossip) {
                outcome.departed.push(gossip.entry.address);
                outcome
                    .outgoing
                    .extend(self.disseminate(table, vec![*gossip], rng));
            }
        }

        outcome
    }

    /// Process a received gossip message: merge, then forward while hops remain.
    pub fn handle<R: Rng + ?Sized>(
        &self,
        table: &mut MembershipTable,
        hops_remaining: u32,
        entries: Vec<GossipEntry>,
        now: Tick,
        rng: &mut R,
    ) -> GossipOutcome {
        let hops_remaining = hops_remaining.saturating_sub(1);
        let mut outcome = GossipOutcome::default();
        outcome.extend(self.absorb(table, &entries, now, rng));

        if hops_remaining > 0 {
            let forward = MembershipMessage::gossip(hops_remaining, entries);
            outcome.outgoing.extend(self.fan_out(table, forward, rng));
        }

        outcome
    }

    /// Announce an eviction, when gossiped removals are enabled.
    pub fn announce_removal<R: Rng + ?Sized>(
        &self,
        table: &MembershipTable,
        evicted: &[MembershipEntry],
        rng: &mut R,
    ) -> Vec<Outgoing<MembershipMessage>> {
        if !self.removals {
            return Vec::new();
        }
        let entries = evicted.iter().copied().map(GossipEntry::removal).collect();
        self.disseminate(table, entries, rng)
    }

    // A removal applies only if we have not seen a newer heartbeat since.
    fn apply_removal(&self, table: &mut MembershipTable, gossip: &GossipEntry) -> bool {
        let address = gossip.entry.address;
        match table.get(&address) {
            Some(existing) if existing.heartbeat <= gossip.entry.heartbeat => {
                table.remove(&address).is_some()
            }
            _ => false,
        }
    }

    fn fan_out<R: Rng + ?Sized>(
        &self,
        table: &MembershipTable,
        msg: MembershipMessage,
        rng: &mut R,
    ) -> Vec<Outgoing<MembershipMessage>> {
        table
            .pick_random_peers(rng, self.fanout, &[])
            .into_iter()
            .map(|peer| Outgoing::new(peer, msg.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn addr(id: u32) -> Address {
        Address::new(id, 0)
    }

    fn table_with_peers(ids: &[u32]) -> MembershipTable {
        let mut table = MembershipTable::new(addr(1), 5, 20, 0);
        for id in ids {
            table.merge(&MembershipEntry::new(addr(*id), 1, 0), 0);
        }
        table
    }

    fn disseminator() -> GossipDisseminator {
        GossipDisseminator::new(&SwimConfig::default())
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn upsert(id: u32, heartbeat: i64) -> GossipEntry {
        GossipEntry::upsert(MembershipEntry::new(addr(id), heartbeat, 0))
    }

    // ==================== Dissemination ====================

    #[test]
    fn test_disseminate_targets_two_distinct_peers() {
        let table = table_with_peers(&[2, 3, 4, 5]);
        let out = disseminator().disseminate(&table, vec![upsert(9, 1)], &mut rng());

        assert_eq!(out.len(), 2);
        assert_ne!(out[0].to, out[1].to);
        assert!(out.iter().all(|o| o.to != addr(1)));
        assert!(matches!(
            out[0].message,
            MembershipMessage::Gossip { hops_remaining: 3, .. }
        ));
    }

    #[test]
    fn test_disseminate_without_peers_sends_nothing() {
        let table = table_with_peers(&[]);
        let out = disseminator().disseminate(&table, vec![upsert(9, 1)], &mut rng());
        assert!(out.is_empty());
    }

    // ==================== Receiving gossip ====================

    #[test]
    fn test_new_entry_is_regossiped_with_full_ttl() {
        let mut table = table_with_peers(&[2, 3, 4]);
        let outcome = disseminator().handle(&mut table, 1, vec![upsert(9, 4)], 10, &mut rng());

        assert_eq!(outcome.joined, vec![addr(9)]);
        assert!(table.contains(&addr(9)));

        // hops 1 -> 0: no forward, only the fresh single-entry message
        assert_eq!(outcome.outgoing.len(), 2);
        for out in &outcome.outgoing {
            match &out.message {
                MembershipMessage::Gossip {
                    hops_remaining,
                    entries,
                } => {
                    assert_eq!(*hops_remaining, 3);
                    assert_eq!(entries.len(), 1);
                    assert_eq!(entries[0].entry.address, addr(9));
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_forward_whole_message_while_hops_remain() {
        let mut table = table_with_peers(&[2, 3, 4]);
        let entries = vec![upsert(2, 1), upsert(3, 1)];
        let outcome = disseminator().handle(&mut table, 3, entries.clone(), 10, &mut rng());

        // Entries are stale, so only the forward goes out
        assert!(outcome.joined.is_empty());
        assert_eq!(outcome.outgoing.len(), 2);
        for out in &outcome.outgoing {
            assert_eq!(out.message, MembershipMessage::gossip(2, entries.clone()));
        }
    }

    #[test]
    fn test_last_hop_is_not_forwarded() {
        let mut table = table_with_peers(&[2, 3, 4]);
        let outcome = disseminator().handle(&mut table, 1, vec![upsert(2, 1)], 10, &mut rng());
        assert!(outcome.outgoing.is_empty());
    }

    #[test]
    fn test_update_is_not_regossiped() {
        let mut table = table_with_peers(&[2, 3, 4]);
        let outcome = disseminator().handle(&mut table, 1, vec![upsert(2, 50)], 10, &mut rng());
        assert!(outcome.outgoing.is_empty());
        assert_eq!(table.get(&addr(2)).unwrap().heartbeat, 50);
        assert_eq!(table.get(&addr(2)).unwrap().timestamp, 10);
    }

    #[test]
    fn test_redelivery_is_idempotent() {
        let mut table = table_with_peers(&[2, 3]);
        let d = disseminator();
        let first = d.absorb(&mut table, &[upsert(9, 4)], 5, &mut rng());
        let second = d.absorb(&mut table, &[upsert(9, 4)], 6, &mut rng());

        assert_eq!(first.joined, vec![addr(9)]);
        assert!(second.joined.is_empty());
        assert!(second.outgoing.is_empty());
        assert_eq!(table.get(&addr(9)).unwrap().timestamp, 5);
    }

    // ==================== Gossiped removals ====================

    #[test]
    fn test_removal_ignored_by_default() {
        let mut table = table_with_peers(&[2, 3]);
        let removal = GossipEntry::removal(MembershipEntry::new(addr(2), 1, 0));
        let outcome = disseminator().absorb(&mut table, &[removal], 5, &mut rng());
        assert!(outcome.departed.is_empty());
        assert!(table.contains(&addr(2)));
    }

    #[test]
    fn test_removal_applied_when_enabled() {
        let config = SwimConfig {
            gossip_removals: true,
            ..Default::default()
        };
        let d = GossipDisseminator::new(&config);
        let mut table = table_with_peers(&[2, 3, 4]);

        let removal = GossipEntry::removal(MembershipEntry::new(addr(2), 1, 0));
        let outcome = d.absorb(&mut table, &[removal], 5, &mut rng());
        assert_eq!(outcome.departed, vec![addr(2)]);
        assert!(!table.contains(&addr(2)));
        assert!(!outcome.outgoing.is_empty());
    }

    #[test]
    fn test_removal_loses_to_newer_heartbeat() {
        let config = SwimConfig {
            gossip_removals: true,
            ..Default::default()
        };
        let d = GossipDisseminator::new(&config);
        let mut table = table_with_peers(&[2, 3]);
        table.merge(&MembershipEntry::new(addr(2), 8, 0), 4);

        let removal = GossipEntry::removal(MembershipEntry::new(addr(2), 5, 0));
        let outcome = d.absorb(&mut table, &[removal], 5, &mut rng());
        assert!(outcome.departed.is_empty());
        assert!(table.contains(&addr(2)));
    }
}

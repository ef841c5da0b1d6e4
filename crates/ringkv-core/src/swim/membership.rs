//! Membership table for tracking known nodes.
//!
//! Each node keeps one entry per known address: the highest heartbeat it has
//! seen for that node and the local tick at which the heartbeat last grew.
//! Liveness is inferred purely from that age:
//! - younger than `fail_threshold`: healthy, shared in piggyback lists
//! - between the thresholds: suspected, indirectly probed every
//!   `fail_threshold` ticks
//! - `remove_threshold` or older: evicted
//!
//! The local node's own entry always exists and is refreshed every tick.

use crate::Address;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Local simulated time, in ticks.
pub type Tick = i64;

/// One row of the membership table.
///
/// `timestamp` is always local time of the node holding the entry; a
/// timestamp received from a peer is never trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipEntry {
    pub address: Address,
    pub heartbeat: i64,
    pub timestamp: Tick,
}

impl MembershipEntry {
    pub fn new(address: Address, heartbeat: i64, timestamp: Tick) -> Self {
        Self {
            address,
            heartbeat,
            timestamp,
        }
    }

    pub fn age(&self, now: Tick) -> Tick {
        now - self.timestamp
    }
}

/// Result of merging an incoming entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First sighting of this address.
    Inserted,
    /// Known address with a higher heartbeat.
    Updated,
    /// Nothing new (stale heartbeat, duplicate, or our own entry).
    Stale,
}

/// Liveness classification of an entry at a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Healthy,
    Suspected {
        /// An indirect probe is due this tick.
        probe_due: bool,
    },
    Expired,
}

/// Membership table owned by a single node.
pub struct MembershipTable {
    local: Address,
    fail_threshold: Tick,
    remove_threshold: Tick,
    /// Ordered so iteration (and therefore the ring snapshot) is deterministic
    entries: BTreeMap<Address, MembershipEntry>,
}

impl MembershipTable {
    pub fn new(local: Address, fail_threshold: Tick, remove_threshold: Tick, now: Tick) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(local, MembershipEntry::new(local, 0, now));
        Self {
            local,
            fail_threshold,
            remove_threshold,
            entries,
        }
    }

    pub fn local_address(&self) -> Address {
        self.local
    }

    /// Our own entry. Always present.
    pub fn local_entry(&self) -> MembershipEntry {
        self.entries
            .get(&self.local)
            .copied()
            .unwrap_or_else(|| MembershipEntry::new(self.local, 0, 0))
    }

    /// Bump our heartbeat and stamp it with the current tick.
    pub fn refresh_local(&mut self, now: Tick) {
        let local = self.local;
        let entry = self
            .entries
            .entry(local)
            .or_insert_with(|| MembershipEntry::new(local, 0, now));
        entry.heartbeat += 1;
        entry.timestamp = now;
    }

    /// Merge an entry learned from a peer.
    ///
    /// Absent addresses are inserted; known ones only move forward when the
    /// incoming heartbeat is strictly higher. Updates about ourselves are
    /// ignored since our own heartbeat is authoritative.
    pub fn merge(&mut self, incoming: &MembershipEntry, now: Tick) -> MergeOutcome {
        if incoming.address == self.local {
            return MergeOutcome::Stale;
        }

        match self.entries.get_mut(&incoming.address) {
            Some(existing) => {
                if incoming.heartbeat > existing.heartbeat {
                    existing.heartbeat = incoming.heartbeat;
                    existing.timestamp = now;
                    MergeOutcome::Updated
                } else {
                    MergeOutcome::Stale
                }
            }
            None => {
                self.entries.insert(
                    incoming.address,
                    MembershipEntry::new(incoming.address, incoming.heartbeat, now),
                );
                MergeOutcome::Inserted
            }
        }
    }

    /// Remove an entry. Never removes ourselves.
    pub fn remove(&mut self, address: &Address) -> Option<MembershipEntry> {
        if *address == self.local {
            return None;
        }
        self.entries.remove(address)
    }

    pub fn get(&self, address: &Address) -> Option<&MembershipEntry> {
        self.entries.get(address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.entries.contains_key(address)
    }

    /// All entries, ours included, in address order.
    pub fn entries(&self) -> impl Iterator<Item = &MembershipEntry> {
        self.entries.values()
    }

    /// Snapshot of every known address, ours included.
    pub fn addresses(&self) -> Vec<Address> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Never true in practice; the local entry is always present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn status(&self, entry: &MembershipEntry, now: Tick) -> EntryStatus {
        let age = entry.age(now);
        if age < self.fail_threshold {
            EntryStatus::Healthy
        } else if age < self.remove_threshold {
            EntryStatus::Suspected {
                probe_due: age % self.fail_threshold == 0,
            }
        } else {
            EntryStatus::Expired
        }
    }

    /// Entries young enough to be shared with peers.
    pub fn healthy_entries(&self, now: Tick) -> Vec<MembershipEntry> {
        self.entries
            .values()
            .filter(|e| self.status(e, now) == EntryStatus::Healthy)
            .copied()
            .collect()
    }

    /// Remote entries whose indirect probe is due this tick.
    pub fn probe_due(&self, now: Tick) -> Vec<Address> {
        self.entries
            .values()
            .filter(|e| e.address != self.local)
            .filter(|e| self.status(e, now) == EntryStatus::Suspected { probe_due: true })
            .map(|e| e.address)
            .collect()
    }

    /// Drop every remote entry that reached `remove_threshold`.
    ///
    /// Returns the evicted entries.
    pub fn evict_expired(&mut self, now: Tick) -> Vec<MembershipEntry> {
        let expired: Vec<Address> = self
            .entries
            .values()
            .filter(|e| e.address != self.local)
            .filter(|e| self.status(e, now) == EntryStatus::Expired)
            .map(|e| e.address)
            .collect();

        expired
            .iter()
            .filter_map(|address| self.entries.remove(address))
            .collect()
    }

    /// Pick one random peer, never ourselves.
    pub fn pick_random_peer<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        exclude: &[Address],
    ) -> Option<Address> {
        self.pick_random_peers(rng, 1, exclude).into_iter().next()
    }

    /// Pick up to `k` distinct random peers, never ourselves.
    ///
    /// Returns fewer than `k` when not enough peers are known.
    pub fn pick_random_peers<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        k: usize,
        exclude: &[Address],
    ) -> Vec<Address> {
        use rand::seq::SliceRandom;

        let mut candidates: Vec<Address> = self
            .entries
            .keys()
            .filter(|a| **a != self.local && !exclude.contains(a))
            .copied()
            .collect();

        candidates.shuffle(rng);
        candidates.truncate(k);
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn local() -> Address {
        Address::new(1, 0)
    }

    fn peer(id: u32) -> Address {
        Address::new(id, 0)
    }

    fn table() -> MembershipTable {
        MembershipTable::new(local(), 5, 20, 0)
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    // ==================== Basic table operations ====================

    #[test]
    fn test_new_table_contains_self() {
        let table = table();
        assert_eq!(table.len(), 1);
        assert!(table.contains(&local()));
        assert_eq!(table.local_entry().heartbeat, 0);
    }

    #[test]
    fn test_refresh_local_bumps_heartbeat() {
        let mut table = table();
        table.refresh_local(3);
        table.refresh_local(4);
        let entry = table.local_entry();
        assert_eq!(entry.heartbeat, 2);
        assert_eq!(entry.timestamp, 4);
    }

    #[test]
    fn test_remove_self_ignored() {
        let mut table = table();
        assert!(table.remove(&local()).is_none());
        assert!(table.contains(&local()));
    }

    #[test]
    fn test_addresses_are_ordered() {
        let mut table = table();
        table.merge(&MembershipEntry::new(peer(9), 1, 0), 0);
        table.merge(&MembershipEntry::new(peer(3), 1, 0), 0);
        assert_eq!(table.addresses(), vec![local(), peer(3), peer(9)]);
    }

    // ==================== Merge rule ====================

    #[test]
    fn test_merge_inserts_with_local_timestamp() {
        let mut table = table();
        let outcome = table.merge(&MembershipEntry::new(peer(2), 7, 999), 10);
        assert_eq!(outcome, MergeOutcome::Inserted);

        let entry = table.get(&peer(2)).unwrap();
        assert_eq!(entry.heartbeat, 7);
        assert_eq!(entry.timestamp, 10);
    }

    #[test]
    fn test_merge_higher_heartbeat_updates() {
        let mut table = table();
        table.merge(&MembershipEntry::new(peer(2), 7, 0), 10);
        let outcome = table.merge(&MembershipEntry::new(peer(2), 8, 0), 12);
        assert_eq!(outcome, MergeOutcome::Updated);
        assert_eq!(table.get(&peer(2)).unwrap().timestamp, 12);
    }

    #[test]
    fn test_merge_equal_or_lower_heartbeat_is_stale() {
        let mut table = table();
        table.merge(&MembershipEntry::new(peer(2), 7, 0), 10);

        assert_eq!(
            table.merge(&MembershipEntry::new(peer(2), 7, 0), 12),
            MergeOutcome::Stale
        );
        assert_eq!(
            table.merge(&MembershipEntry::new(peer(2), 3, 0), 12),
            MergeOutcome::Stale
        );
        let entry = table.get(&peer(2)).unwrap();
        assert_eq!(entry.heartbeat, 7);
        assert_eq!(entry.timestamp, 10);
    }

    #[test]
    fn test_merge_about_self_ignored() {
        let mut table = table();
        let outcome = table.merge(&MembershipEntry::new(local(), 100, 0), 1);
        assert_eq!(outcome, MergeOutcome::Stale);
        assert_eq!(table.local_entry().heartbeat, 0);
    }

    // ==================== Aging ====================

    #[test]
    fn test_status_boundaries() {
        let table = table();
        let entry = MembershipEntry::new(peer(2), 1, 0);

        assert_eq!(table.status(&entry, 4), EntryStatus::Healthy);
        assert_eq!(
            table.status(&entry, 5),
            EntryStatus::Suspected { probe_due: true }
        );
        assert_eq!(
            table.status(&entry, 6),
            EntryStatus::Suspected { probe_due: false }
        );
        assert_eq!(
            table.status(&entry, 10),
            EntryStatus::Suspected { probe_due: true }
        );
        assert_eq!(
            table.status(&entry, 19),
            EntryStatus::Suspected { probe_due: false }
        );
        assert_eq!(table.status(&entry, 20), EntryStatus::Expired);
    }

    #[test]
    fn test_healthy_entries_excludes_aged() {
        let mut table = table();
        table.merge(&MembershipEntry::new(peer(2), 1, 0), 0);
        table.merge(&MembershipEntry::new(peer(3), 1, 0), 4);
        table.refresh_local(6);

        let healthy: Vec<Address> = table.healthy_entries(6).iter().map(|e| e.address).collect();
        assert_eq!(healthy, vec![local(), peer(3)]);
    }

    #[test]
    fn test_probe_due_only_on_multiples() {
        let mut table = table();
        table.merge(&MembershipEntry::new(peer(2), 1, 0), 0);

        assert_eq!(table.probe_due(5), vec![peer(2)]);
        assert!(table.probe_due(7).is_empty());
        assert_eq!(table.probe_due(15), vec![peer(2)]);
    }

    #[test]
    fn test_self_never_probed_or_evicted() {
        let mut table = table();
        assert!(table.probe_due(5).is_empty());
        assert!(table.evict_expired(100).is_empty());
        assert!(table.contains(&local()));
    }

    #[test]
    fn test_eviction_not_before_remove_threshold() {
        let mut table = table();
        table.merge(&MembershipEntry::new(peer(2), 1, 0), 0);

        assert!(table.evict_expired(19).is_empty());
        assert!(table.contains(&peer(2)));

        let evicted = table.evict_expired(20);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].address, peer(2));
        assert!(!table.contains(&peer(2)));
    }

    #[test]
    fn test_heartbeat_increase_resets_age() {
        let mut table = table();
        table.merge(&MembershipEntry::new(peer(2), 1, 0), 0);
        table.merge(&MembershipEntry::new(peer(2), 2, 0), 15);
        assert!(table.evict_expired(30).is_empty());
        assert_eq!(table.evict_expired(35).len(), 1);
    }

    // ==================== Random peer selection ====================

    #[test]
    fn test_pick_random_peer_empty() {
        let table = table();
        assert!(table.pick_random_peer(&mut rng(), &[]).is_none());
    }

    #[test]
    fn test_pick_random_peer_never_self() {
        let mut table = table();
        table.merge(&MembershipEntry::new(peer(2), 1, 0), 0);
        let mut rng = rng();
        for _ in 0..20 {
            assert_eq!(table.pick_random_peer(&mut rng, &[]), Some(peer(2)));
        }
    }

    #[test]
    fn test_pick_random_peers_distinct() {
        let mut table = table();
        for id in 2..8 {
            table.merge(&MembershipEntry::new(peer(id), 1, 0), 0);
        }
        let picked = table.pick_random_peers(&mut rng(), 2, &[peer(4)]);
        assert_eq!(picked.len(), 2);
        assert_ne!(picked[0], picked[1]);
        assert!(!picked.contains(&local()));
        assert!(!picked.contains(&peer(4)));
    }

    #[test]
    fn test_pick_random_peers_fewer_than_k() {
        let mut table = table();
        table.merge(&MembershipEntry::new(peer(2), 1, 0), 0);
        let picked = table.pick_random_peers(&mut rng(), 3, &[]);
        assert_eq!(picked, vec![peer(2)]);
    }
}

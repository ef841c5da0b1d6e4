//! Consistent-hash ring and replica placement.
//!
//! The ring is the membership snapshot hashed onto `ring_size` positions and
//! sorted ascending. It is rebuilt from scratch whenever membership is
//! consulted; two nodes with the same snapshot build identical rings.
//!
//! A key belongs to the first node whose position is at or after the key's
//! position, plus that node's next two successors. Keys past the last node
//! (or at or before the first) wrap to the start of the ring.

use crate::Address;
use serde::{Deserialize, Serialize};

/// Replicas per key.
pub const REPLICATION_FACTOR: usize = 3;

/// Successors that hold copies of a node's primary keys.
const NEIGHBOR_COUNT: usize = REPLICATION_FACTOR - 1;

/// FNV-1a 64-bit. Stable across Rust versions (unlike DefaultHasher), so
/// every node agrees on positions.
pub fn fnv1a_hash(bytes: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Position of a key on a ring of `ring_size` slots.
pub fn key_position(key: &str, ring_size: u64) -> u64 {
    fnv1a_hash(key.as_bytes()) % ring_size
}

/// Position of a key's replica in its replica set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReplicaRole {
    Primary,
    Secondary,
    Tertiary,
}

impl ReplicaRole {
    pub fn from_position(position: usize) -> Option<Self> {
        match position {
            0 => Some(Self::Primary),
            1 => Some(Self::Secondary),
            2 => Some(Self::Tertiary),
            _ => None,
        }
    }
}

/// A node placed on the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingNode {
    pub address: Address,
    pub hash: u64,
}

impl RingNode {
    pub fn new(address: Address, ring_size: u64) -> Self {
        Self {
            address,
            hash: fnv1a_hash(&address.to_bytes()) % ring_size,
        }
    }
}

/// Peers this node shares replicas with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Neighbors {
    /// Successors holding copies of the keys this node is primary for.
    pub has_my_replicas: Vec<Address>,
    /// Predecessors whose primary keys this node holds copies of.
    pub have_replicas_of: Vec<Address>,
}

/// Sorted ring of nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ring {
    nodes: Vec<RingNode>,
    ring_size: u64,
}

impl Ring {
    pub fn empty(ring_size: u64) -> Self {
        Self {
            nodes: Vec::new(),
            ring_size,
        }
    }

    /// Build a ring from a membership snapshot.
    ///
    /// Nodes sharing a position are ordered by address.
    pub fn build(addresses: impl IntoIterator<Item = Address>, ring_size: u64) -> Self {
        let mut nodes: Vec<RingNode> = addresses
            .into_iter()
            .map(|address| RingNode::new(address, ring_size))
            .collect();
        nodes.sort_by_key(|node| (node.hash, node.address));
        nodes.dedup_by_key(|node| node.address);
        Self { nodes, ring_size }
    }

    pub fn nodes(&self) -> &[RingNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ring_size(&self) -> u64 {
        self.ring_size
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.position_of(address).is_some()
    }

    fn position_of(&self, address: &Address) -> Option<usize> {
        self.nodes.iter().position(|node| node.address == *address)
    }

    /// Replica set for a key, ordered primary, secondary, tertiary.
    ///
    /// Empty when the ring has fewer than three nodes.
    pub fn find_nodes(&self, key: &str) -> Vec<RingNode> {
        let n = self.nodes.len();
        if n < REPLICATION_FACTOR {
            return Vec::new();
        }

        let position = key_position(key, self.ring_size);
        let first = self.nodes[0].hash;
        let last = self.nodes[n - 1].hash;

        let start = if position <= first || position > last {
            0
        } else {
            self.nodes
                .iter()
                .position(|node| node.hash >= position)
                .unwrap_or(0)
        };

        (0..REPLICATION_FACTOR)
            .map(|i| self.nodes[(start + i) % n])
            .collect()
    }

    /// Addresses of a key's replicas, ordered by role.
    pub fn replicas(&self, key: &str) -> Vec<Address> {
        self.find_nodes(key).iter().map(|node| node.address).collect()
    }

    /// Successors and predecessors of `local`.
    ///
    /// Small rings yield fewer neighbors; a node is never its own neighbor.
    pub fn find_neighbors(&self, local: &Address) -> Neighbors {
        let Some(position) = self.position_of(local) else {
            return Neighbors::default();
        };
        let n = self.nodes.len();
        let mut neighbors = Neighbors::default();

        for i in 1..=NEIGHBOR_COUNT.min(n - 1) {
            neighbors
                .has_my_replicas
                .push(self.nodes[(position + i) % n].address);
            neighbors
                .have_replicas_of
                .push(self.nodes[(position + n - i) % n].address);
        }

        neighbors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RING_SIZE: u64 = 512;

    fn addr(id: u32) -> Address {
        Address::new(id, 0)
    }

    fn ring_of(ids: &[u32]) -> Ring {
        Ring::build(ids.iter().map(|id| addr(*id)), RING_SIZE)
    }

    /// A key whose position lands in `(lo, hi]`.
    fn key_between(lo: u64, hi: u64) -> String {
        (0..100_000)
            .map(|i| format!("key-{i}"))
            .find(|k| {
                let p = key_position(k, RING_SIZE);
                p > lo && p <= hi
            })
            .unwrap()
    }

    // ==================== Hashing ====================

    #[test]
    fn test_fnv1a_known_values() {
        assert_eq!(fnv1a_hash(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a_hash(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn test_positions_within_ring() {
        for id in 1..50 {
            assert!(RingNode::new(addr(id), RING_SIZE).hash < RING_SIZE);
        }
        assert!(key_position("anything", RING_SIZE) < RING_SIZE);
    }

    // ==================== Ring construction ====================

    #[test]
    fn test_ring_sorted_ascending() {
        let ring = ring_of(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let hashes: Vec<u64> = ring.nodes().iter().map(|n| n.hash).collect();
        let mut sorted = hashes.clone();
        sorted.sort();
        assert_eq!(hashes, sorted);
    }

    #[test]
    fn test_ring_is_deterministic() {
        let a = ring_of(&[5, 1, 4, 2, 3]);
        let b = ring_of(&[3, 2, 1, 5, 4]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_ring_tie_broken_by_address() {
        // A ring of size 1 puts every node on the same position
        let ring = Ring::build([addr(3), addr(1), addr(2)], 1);
        let order: Vec<Address> = ring.nodes().iter().map(|n| n.address).collect();
        assert_eq!(order, vec![addr(1), addr(2), addr(3)]);
    }

    #[test]
    fn test_ring_change_detected() {
        let before = ring_of(&[1, 2, 3, 4]);
        assert_eq!(before, ring_of(&[1, 2, 3, 4]));
        assert_ne!(before, ring_of(&[1, 2, 3]));
    }

    // ==================== find_nodes ====================

    #[test]
    fn test_small_ring_has_no_replicas() {
        assert!(ring_of(&[]).find_nodes("k").is_empty());
        assert!(ring_of(&[1, 2]).find_nodes("k").is_empty());
    }

    #[test]
    fn test_replica_cardinality() {
        for size in 3..10 {
            let ids: Vec<u32> = (1..=size).collect();
            let ring = ring_of(&ids);
            for i in 0..200 {
                let replicas = ring.replicas(&format!("k{i}"));
                assert_eq!(replicas.len(), 3);
                assert_ne!(replicas[0], replicas[1]);
                assert_ne!(replicas[1], replicas[2]);
                assert_ne!(replicas[0], replicas[2]);
            }
        }
    }

    #[test]
    fn test_key_maps_to_first_node_at_or_after() {
        let ring = ring_of(&[1, 2, 3, 4, 5, 6]);
        let nodes = ring.nodes();
        let n = nodes.len();

        // Every gap between two distinct positions, including the ones whose
        // replica sets wrap past the end of the ring
        for i in 1..n {
            if nodes[i - 1].hash == nodes[i].hash {
                continue;
            }
            let key = key_between(nodes[i - 1].hash, nodes[i].hash);
            let replicas = ring.find_nodes(&key);
            assert_eq!(replicas[0], nodes[i]);
            assert_eq!(replicas[1], nodes[(i + 1) % n]);
            assert_eq!(replicas[2], nodes[(i + 2) % n]);
        }
    }

    #[test]
    fn test_key_past_last_node_goes_to_start() {
        let ring = ring_of(&[1, 2, 3, 4]);
        let nodes = ring.nodes();
        let last = nodes[nodes.len() - 1].hash;
        if last + 1 < RING_SIZE {
            let key = key_between(last, RING_SIZE);
            let expected: Vec<RingNode> = nodes[..3].to_vec();
            assert_eq!(ring.find_nodes(&key), expected);
        }
    }

    // ==================== find_neighbors ====================

    #[test]
    fn test_neighbors() {
        let ring = ring_of(&[1, 2, 3, 4, 5]);
        let order: Vec<Address> = ring.nodes().iter().map(|n| n.address).collect();

        let neighbors = ring.find_neighbors(&order[0]);
        assert_eq!(neighbors.has_my_replicas, vec![order[1], order[2]]);
        assert_eq!(neighbors.have_replicas_of, vec![order[4], order[3]]);
    }

    #[test]
    fn test_neighbors_small_ring() {
        let ring = ring_of(&[1, 2]);
        let order: Vec<Address> = ring.nodes().iter().map(|n| n.address).collect();
        let neighbors = ring.find_neighbors(&order[0]);
        assert_eq!(neighbors.has_my_replicas, vec![order[1]]);
        assert_eq!(neighbors.have_replicas_of, vec![order[1]]);
    }

    #[test]
    fn test_neighbors_of_unknown_node() {
        let ring = ring_of(&[1, 2, 3]);
        assert_eq!(ring.find_neighbors(&addr(9)), Neighbors::default());
    }

    #[test]
    fn test_role_positions() {
        assert_eq!(ReplicaRole::from_position(0), Some(ReplicaRole::Primary));
        assert_eq!(ReplicaRole::from_position(2), Some(ReplicaRole::Tertiary));
        assert_eq!(ReplicaRole::from_position(3), None);
    }
}

//! SWIM failure detection.
//!
//! Liveness is read from the age of each membership entry; there is no
//! per-probe timeout bookkeeping. Probes exist to pull fresh heartbeats:
//! 1. Every `fail_threshold` ticks, ping one random peer directly
//! 2. For every entry whose age is a multiple of `fail_threshold` (and below
//!    `remove_threshold`), ask `relay_count` other peers to ping it for us
//! 3. Entries reaching `remove_threshold` are evicted
//!
//! A missed probe has no effect of its own; only staleness evicts.

use super::membership::{MembershipEntry, MembershipTable, Tick};
use crate::Address;
use crate::config::SwimConfig;
use rand::Rng;

/// Event emitted by the failure detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureEvent {
    /// Send a direct ping to this peer
    SendPing { target: Address },
    /// Ask these relays to ping the target on our behalf
    SendPingRelay { target: Address, via: Vec<Address> },
    /// Entry aged out and was removed from the table
    PeerEvicted { entry: MembershipEntry },
}

/// Failure detector for the membership protocol.
///
/// The caller is responsible for:
/// - Calling `tick()` once per tick, after refreshing its own heartbeat
/// - Acting on emitted events
pub struct FailureDetector {
    fail_threshold: Tick,
    relay_count: usize,
    /// Ticks until the next direct ping
    ping_countdown: Tick,
}

impl FailureDetector {
    pub fn new(config: &SwimConfig) -> Self {
        Self {
            fail_threshold: config.fail_threshold,
            relay_count: config.relay_count,
            ping_countdown: config.fail_threshold,
        }
    }

    /// Run one tick of probing and eviction.
    pub fn tick<R: Rng + ?Sized>(
        &mut self,
        table: &mut MembershipTable,
        now: Tick,
        rng: &mut R,
    ) -> Vec<FailureEvent> {
        let mut events = Vec::new();

        for target in table.probe_due(now) {
            let via = table.pick_random_peers(rng, self.relay_count, &[target]);
            if !via.is_empty() {
                events.push(FailureEvent::SendPingRelay { target, via });
            }
        }

        for entry in table.evict_expired(now) {
            events.push(FailureEvent::PeerEvicted { entry });
        }

        self.ping_countdown -= 1;
        if self.ping_countdown <= 0 {
            self.ping_countdown = self.fail_threshold;
            if let Some(target) = table.pick_random_peer(rng, &[]) {
                events.push(FailureEvent::SendPing { target });
            }
        }

        events
    }
}

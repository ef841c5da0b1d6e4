//! Transport abstraction for datagram delivery between nodes.
//!
//! Implementations:
//! - `InMemoryNetwork` - lock-step simulated network for the simulator and tests
//!
//! Sends are fire-and-forget. A node drains its inbox once per tick.

use crate::Address;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(Address),

    #[error("Endpoint is down: {0}")]
    EndpointDown(Address),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Datagram delivery between addressed endpoints.
pub trait Transport {
    /// Queue `data` for delivery to `to`. Delivery is not guaranteed.
    fn send(&mut self, from: Address, to: Address, data: Vec<u8>) -> Result<()>;

    /// Take every datagram currently waiting for `to`.
    fn deliver(&mut self, to: Address) -> Vec<Vec<u8>>;
}

/// Counters for traffic through an `InMemoryNetwork`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub sent: u64,
    pub dropped: u64,
    pub delivered: u64,
}

#[derive(Debug, Default)]
struct Endpoint {
    /// Sent this tick, deliverable after the next `advance`
    in_flight: Vec<Vec<u8>>,
    inbox: VecDeque<Vec<u8>>,
    down: bool,
}

/// In-memory network with one-tick latency.
///
/// Datagrams sent during tick T become deliverable once `advance` is called
/// at the start of tick T+1. Datagrams to a down endpoint, and a random
/// `drop_rate` fraction of the rest, are discarded.
pub struct InMemoryNetwork {
    endpoints: BTreeMap<Address, Endpoint>,
    drop_rate: f64,
    rng: StdRng,
    stats: NetworkStats,
}

impl InMemoryNetwork {
    pub fn new(seed: u64) -> Self {
        Self {
            endpoints: BTreeMap::new(),
            drop_rate: 0.0,
            rng: StdRng::seed_from_u64(seed),
            stats: NetworkStats::default(),
        }
    }

    /// Set the fraction of datagrams to discard, clamped to `[0, 1]`.
    pub fn with_drop_rate(mut self, drop_rate: f64) -> Self {
        self.set_drop_rate(drop_rate);
        self
    }

    pub fn set_drop_rate(&mut self, drop_rate: f64) {
        self.drop_rate = drop_rate.clamp(0.0, 1.0);
    }

    pub fn register(&mut self, address: Address) {
        self.endpoints.entry(address).or_default();
    }

    pub fn is_registered(&self, address: &Address) -> bool {
        self.endpoints.contains_key(address)
    }

    /// Mark an endpoint down (or back up). A down endpoint loses its queued
    /// datagrams and everything sent to it.
    pub fn set_down(&mut self, address: Address, down: bool) {
        if let Some(endpoint) = self.endpoints.get_mut(&address) {
            endpoint.down = down;
            if down {
                endpoint.in_flight.clear();
                endpoint.inbox.clear();
            }
        }
    }

    pub fn is_down(&self, address: &Address) -> bool {
        self.endpoints.get(address).is_some_and(|e| e.down)
    }

    /// Move everything sent during the previous tick into the inboxes.
    pub fn advance(&mut self) {
        for endpoint in self.endpoints.values_mut() {
            let in_flight = std::mem::take(&mut endpoint.in_flight);
            endpoint.inbox.extend(in_flight);
        }
    }

    pub fn stats(&self) -> NetworkStats {
        self.stats
    }
}

impl Transport for InMemoryNetwork {
    fn send(&mut self, from: Address, to: Address, data: Vec<u8>) -> Result<()> {
        if self.is_down(&from) {
            return Err(TransportError::EndpointDown(from));
        }
        let drop_roll = self.drop_rate > 0.0 && self.rng.random::<f64>() < self.drop_rate;
        let endpoint = self
            .endpoints
            .get_mut(&to)
            .ok_or(TransportError::UnknownEndpoint(to))?;

        self.stats.sent += 1;
        if endpoint.down || drop_roll {
            trace!(from = %from, to = %to, bytes = data.len(), "datagram dropped");
            self.stats.dropped += 1;
            return Ok(());
        }
        endpoint.in_flight.push(data);
        Ok(())
    }

    fn deliver(&mut self, to: Address) -> Vec<Vec<u8>> {
        let Some(endpoint) = self.endpoints.get_mut(&to) else {
            return Vec::new();
        };
        if endpoint.down {
            return Vec::new();
        }
        let delivered: Vec<Vec<u8>> = endpoint.inbox.drain(..).collect();
        self.stats.delivered += delivered.len() as u64;
        delivered
    }
}

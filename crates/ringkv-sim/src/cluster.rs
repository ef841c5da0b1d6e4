//! Lock-step cluster of nodes on an in-memory network.
//!
//! Every tick the network is advanced once and each live node ticks in
//! start order. Client calls made between ticks are delivered on the next
//! one.

use ringkv_core::{
    Address, BootstrapError, EventBus, InMemoryNetwork, NetworkStats, Node, NodeConfig, Tick,
    TransactionId,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

pub struct Cluster {
    network: InMemoryNetwork,
    nodes: Vec<Node>,
    failed: BTreeSet<Address>,
    events: Arc<EventBus>,
    config: NodeConfig,
    introducer: Option<Address>,
    seed: u64,
    now: Tick,
}

/// Address of the `n`th node (1-based) in a simulated cluster.
pub fn node_address(n: u32) -> Address {
    Address::new(n, 7000)
}

impl Cluster {
    pub fn new(config: NodeConfig, seed: u64) -> Self {
        Self {
            network: InMemoryNetwork::new(seed),
            nodes: Vec::new(),
            failed: BTreeSet::new(),
            events: Arc::new(EventBus::new()),
            config,
            introducer: None,
            seed,
            now: 0,
        }
    }

    pub fn with_drop_rate(mut self, drop_rate: f64) -> Self {
        self.network.set_drop_rate(drop_rate);
        self
    }

    /// Start nodes 1 to `count`, `stagger` ticks apart.
    pub fn start_nodes(&mut self, count: u32, stagger: Tick) -> Result<(), BootstrapError> {
        for n in 1..=count {
            if n > 1 {
                self.run(stagger);
            }
            self.add_node(node_address(n))?;
        }
        Ok(())
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn now(&self) -> Tick {
        self.now
    }

    /// Start a node. The first node added becomes the introducer.
    pub fn add_node(&mut self, address: Address) -> Result<(), BootstrapError> {
        let introducer = *self.introducer.get_or_insert(address);
        self.network.register(address);

        let config = NodeConfig {
            seed: Some(self.seed.wrapping_add(u64::from(address.id()))),
            ..self.config.clone()
        };
        let node = Node::start(
            address,
            introducer,
            config,
            Arc::clone(&self.events),
            &mut self.network,
            self.now,
        )?;
        self.nodes.push(node);
        Ok(())
    }

    /// Crash a node: it stops ticking and the network drops its traffic.
    pub fn fail(&mut self, address: Address) {
        info!(node = %address, tick = self.now, "failing node");
        self.network.set_down(address, true);
        self.failed.insert(address);
    }

    pub fn is_failed(&self, address: &Address) -> bool {
        self.failed.contains(address)
    }

    pub fn tick(&mut self) {
        self.now += 1;
        self.network.advance();
        for node in &mut self.nodes {
            if self.failed.contains(&node.address()) {
                continue;
            }
            node.tick(self.now, &mut self.network);
        }
    }

    pub fn run(&mut self, ticks: Tick) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    /// Tick until every live node sees exactly the live set, or `limit`
    /// ticks pass. Returns whether the cluster converged.
    pub fn run_until_converged(&mut self, limit: Tick) -> bool {
        for _ in 0..limit {
            if self.is_converged() {
                return true;
            }
            self.tick();
        }
        self.is_converged()
    }

    pub fn node(&self, address: &Address) -> Option<&Node> {
        self.nodes.iter().find(|n| n.address() == *address)
    }

    /// Nodes that have not been failed, in start order.
    pub fn live_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .filter(|n| !self.failed.contains(&n.address()))
    }

    pub fn live_addresses(&self) -> Vec<Address> {
        self.live_nodes().map(|n| n.address()).collect()
    }

    pub fn is_converged(&self) -> bool {
        let live: BTreeSet<Address> = self.live_addresses().into_iter().collect();
        self.live_nodes().all(|node| {
            node.is_in_group()
                && node.table().addresses().into_iter().collect::<BTreeSet<_>>() == live
        })
    }

    pub fn network_stats(&self) -> NetworkStats {
        self.network.stats()
    }

    pub fn create(&mut self, via: Address, key: &str, value: &str) -> Option<TransactionId> {
        self.with_client(via, |node, now, net| node.client_create(key, value, now, net))
    }

    pub fn read(&mut self, via: Address, key: &str) -> Option<TransactionId> {
        self.with_client(via, |node, now, net| node.client_read(key, now, net))
    }

    pub fn update(&mut self, via: Address, key: &str, value: &str) -> Option<TransactionId> {
        self.with_client(via, |node, now, net| node.client_update(key, value, now, net))
    }

    pub fn delete(&mut self, via: Address, key: &str) -> Option<TransactionId> {
        self.with_client(via, |node, now, net| node.client_delete(key, now, net))
    }

    /// Run a client call on a live node. `None` if the node is unknown or failed.
    fn with_client(
        &mut self,
        via: Address,
        call: impl FnOnce(&mut Node, Tick, &mut InMemoryNetwork) -> TransactionId,
    ) -> Option<TransactionId> {
        if self.failed.contains(&via) {
            return None;
        }
        let node = self.nodes.iter_mut().find(|n| n.address() == via)?;
        Some(call(node, self.now, &mut self.network))
    }
}

//! Scripted end-to-end run.
//!
//! Bootstraps the cluster, writes a workload through random coordinators,
//! reads it back, crashes a node, waits for the survivors to evict it and
//! re-replicate, then reads, updates and deletes again.

use crate::cluster::Cluster;
use crate::config::SimConfig;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use ringkv_core::{Address, CrudKind, EventRecorder, NetworkStats};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Ticks given to a round of client requests to settle.
const SETTLE_TICKS: i64 = 3;

/// Coordinator verdict counts for one operation kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OpCounts {
    pub ok: usize,
    pub fail: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub ticks: i64,
    pub converged: bool,
    pub failed_node: Option<Address>,
    pub operations: BTreeMap<String, OpCounts>,
    pub sent: u64,
    pub dropped: u64,
    pub delivered: u64,
}

impl Summary {
    fn new(
        cluster: &Cluster,
        converged: bool,
        failed_node: Option<Address>,
        recorder: &EventRecorder,
    ) -> Self {
        let mut operations: BTreeMap<String, OpCounts> = [
            CrudKind::Create,
            CrudKind::Read,
            CrudKind::Update,
            CrudKind::Delete,
        ]
        .into_iter()
        .map(|kind| (kind.to_string(), OpCounts::default()))
        .collect();

        for record in recorder.verdicts() {
            let counts = operations.entry(record.event.kind().to_string()).or_default();
            if record.event.is_success() {
                counts.ok += 1;
            } else {
                counts.fail += 1;
            }
        }

        let NetworkStats {
            sent,
            dropped,
            delivered,
        } = cluster.network_stats();

        Self {
            ticks: cluster.now(),
            converged,
            failed_node,
            operations,
            sent,
            dropped,
            delivered,
        }
    }

    pub fn counts(&self, kind: CrudKind) -> OpCounts {
        self.operations
            .get(&kind.to_string())
            .copied()
            .unwrap_or_default()
    }
}

/// Run the scenario on a cluster whose nodes have been started.
pub fn run(config: &SimConfig, cluster: &mut Cluster) -> Summary {
    let recorder = EventRecorder::attach(cluster.events());
    let mut rng = StdRng::seed_from_u64(config.seed);
    let swim = &config.node.swim;

    let converge_limit = swim.remove_threshold * 2;
    let converged = cluster.run_until_converged(converge_limit);
    if converged {
        info!(tick = cluster.now(), nodes = config.nodes, "membership converged");
    } else {
        warn!(tick = cluster.now(), "membership did not converge");
    }

    let keys: Vec<(String, String)> = (0..config.workload)
        .map(|i| (format!("key-{i}"), format!("value-{i}")))
        .collect();

    for (key, value) in &keys {
        if let Some(via) = pick_coordinator(cluster, &mut rng) {
            cluster.create(via, key, value);
        }
    }
    cluster.run(SETTLE_TICKS);
    read_all(cluster, &keys, &mut rng);

    if let Some(fail_at) = config.fail_at {
        cluster.run(fail_at - cluster.now());
    }
    let failed_node = cluster
        .live_addresses()
        .into_iter()
        .skip(1)
        .collect::<Vec<_>>()
        .choose(&mut rng)
        .copied();
    if let Some(address) = failed_node {
        cluster.fail(address);
        cluster.run(swim.remove_threshold + swim.fail_threshold);
        read_all(cluster, &keys, &mut rng);
    }

    for (i, (key, value)) in keys.iter().enumerate() {
        let Some(via) = pick_coordinator(cluster, &mut rng) else {
            break;
        };
        if i % 3 == 0 {
            cluster.delete(via, key);
        } else if i % 2 == 0 {
            cluster.update(via, key, &format!("{value}-updated"));
        }
    }
    cluster.run(SETTLE_TICKS);

    cluster.run(config.ticks - cluster.now());

    info!(tick = cluster.now(), verdicts = recorder.verdicts().len(), "scenario finished");
    Summary::new(cluster, converged, failed_node, &recorder)
}

fn read_all(cluster: &mut Cluster, keys: &[(String, String)], rng: &mut StdRng) {
    for (key, _) in keys {
        if let Some(via) = pick_coordinator(cluster, rng) {
            cluster.read(via, key);
        }
    }
    cluster.run(SETTLE_TICKS);
}

fn pick_coordinator(cluster: &Cluster, rng: &mut StdRng) -> Option<Address> {
    cluster.live_addresses().choose(rng).copied()
}

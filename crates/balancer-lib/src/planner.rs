//! Greedy bounded migration planning
//!
//! Pairs the most-surplus node with the most-deficit node and moves one
//! workload at a time, simulating each move on working copies before
//! committing it to the plan. Two guard rails keep plans from oscillating
//! across reruns: a move may not drop the source more than one tolerance
//! band below the mean, and may not push the destination above the surplus
//! threshold. Nodes with no acceptable move are demoted until the next
//! accepted move re-ranks the cluster.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::analyzer::{node_score, workload_score_on, ClusterAnalysis, ScoredNode};
use crate::config::BalancerConfig;
use crate::models::{MigrationAction, MigrationPlan, Node, Workload};

/// Mutable projection of one node's utilization during planning
///
/// Owned exclusively by the planner for the duration of one pass; the
/// snapshot records it was seeded from are never touched.
struct WorkingNode {
    node: Node,
    demoted: bool,
}

impl WorkingNode {
    fn new(scored: &ScoredNode) -> Self {
        Self {
            node: scored.node.clone(),
            demoted: false,
        }
    }

    fn score(&self, config: &BalancerConfig) -> f64 {
        node_score(&self.node, config)
    }

    fn score_without(&self, workload: &Workload, config: &BalancerConfig) -> f64 {
        let projected = Node {
            cpu_used: (self.node.cpu_used - workload.cpu_used).max(0.0),
            mem_used: (self.node.mem_used - workload.mem_used).max(0.0),
            ..self.node.clone()
        };
        node_score(&projected, config)
    }

    fn score_with(&self, workload: &Workload, config: &BalancerConfig) -> f64 {
        let projected = Node {
            cpu_used: self.node.cpu_used + workload.cpu_used,
            mem_used: self.node.mem_used + workload.mem_used,
            ..self.node.clone()
        };
        node_score(&projected, config)
    }

    /// Whether the node's free resources can absolutely absorb the workload
    fn fits(&self, workload: &Workload) -> bool {
        self.node.cpu_used + workload.cpu_used <= self.node.cpu_capacity
            && self.node.mem_used + workload.mem_used <= self.node.mem_capacity
    }

    fn remove(&mut self, workload: &Workload) {
        self.node.cpu_used = (self.node.cpu_used - workload.cpu_used).max(0.0);
        self.node.mem_used = (self.node.mem_used - workload.mem_used).max(0.0);
    }

    fn add(&mut self, workload: &Workload) {
        self.node.cpu_used += workload.cpu_used;
        self.node.mem_used += workload.mem_used;
    }
}

/// Compute a migration plan from the classified cluster
///
/// `candidates` maps each eligible node to its eligible workloads. The plan
/// honours max-migrations, never selects a workload twice, and terminates on
/// degenerate clusters with a partial or empty plan.
pub fn plan(
    analysis: &ClusterAnalysis,
    candidates: &BTreeMap<String, Vec<Workload>>,
    config: &BalancerConfig,
) -> MigrationPlan {
    let mut plan = MigrationPlan::default();

    if analysis.is_balanced() {
        info!("Cluster is balanced; nothing to plan");
        return plan;
    }

    let mean = analysis.mean;
    let tolerance = analysis.tolerance;

    let mut sources: Vec<WorkingNode> = analysis.surplus.iter().map(WorkingNode::new).collect();
    let mut sinks: Vec<WorkingNode> = analysis.deficit.iter().map(WorkingNode::new).collect();
    let mut consumed: BTreeSet<u32> = BTreeSet::new();

    while plan.len() < config.max_migrations {
        // Most-surplus actionable node by working score. Strict comparison
        // keeps the analyzer's ranked order on equal scores.
        let mut src_idx = None;
        let mut src_best = f64::NEG_INFINITY;
        for (i, node) in sources.iter().enumerate() {
            let score = node.score(config);
            if node.demoted || score - mean <= tolerance {
                continue;
            }
            if score > src_best {
                src_best = score;
                src_idx = Some(i);
            }
        }

        // Most-deficit actionable node, same tie behaviour.
        let mut dst_idx = None;
        let mut dst_best = f64::INFINITY;
        for (i, node) in sinks.iter().enumerate() {
            let score = node.score(config);
            if node.demoted || mean - score <= tolerance {
                continue;
            }
            if score < dst_best {
                dst_best = score;
                dst_idx = Some(i);
            }
        }

        let (Some(src_idx), Some(dst_idx)) = (src_idx, dst_idx) else {
            break;
        };

        let gap = sources[src_idx].score(config) - sinks[dst_idx].score(config);
        let target = gap / 2.0;

        let Some(workload) =
            select_workload(&sources[src_idx], candidates, &consumed, mean, tolerance, target, config)
        else {
            debug!(node = %sources[src_idx].node.name, "No movable workload on source; demoting");
            sources[src_idx].demoted = true;
            continue;
        };

        if !sinks[dst_idx].fits(&workload) {
            debug!(
                node = %sinks[dst_idx].node.name,
                vmid = workload.vmid,
                "Destination lacks free capacity; demoting"
            );
            sinks[dst_idx].demoted = true;
            continue;
        }

        let destination_score_after = sinks[dst_idx].score_with(&workload, config);
        if destination_score_after - mean > tolerance {
            debug!(
                node = %sinks[dst_idx].node.name,
                vmid = workload.vmid,
                "Move would overshoot destination; demoting"
            );
            sinks[dst_idx].demoted = true;
            continue;
        }

        let source_score_after = sources[src_idx].score_without(&workload, config);
        sources[src_idx].remove(&workload);
        sinks[dst_idx].add(&workload);
        consumed.insert(workload.vmid);

        info!(
            vmid = workload.vmid,
            kind = %workload.kind,
            source = %workload.node,
            destination = %sinks[dst_idx].node.name,
            source_score_after,
            destination_score_after,
            "Planned migration"
        );

        plan.actions.push(MigrationAction {
            vmid: workload.vmid,
            kind: workload.kind,
            workload_name: workload.name.clone(),
            source: workload.node.clone(),
            destination: sinks[dst_idx].node.name.clone(),
            source_score_after,
            destination_score_after,
        });

        // Working scores changed; earlier demotions are stale.
        for node in sources.iter_mut().chain(sinks.iter_mut()) {
            node.demoted = false;
        }
    }

    info!(actions = plan.len(), "Planning complete");
    plan
}

/// Pick the workload on `source` whose contribution sits closest to half the
/// surplus/deficit gap, among those whose removal keeps the source within
/// one tolerance band below the mean. Ties resolve to the lowest VMID.
fn select_workload(
    source: &WorkingNode,
    candidates: &BTreeMap<String, Vec<Workload>>,
    consumed: &BTreeSet<u32>,
    mean: f64,
    tolerance: f64,
    target: f64,
    config: &BalancerConfig,
) -> Option<Workload> {
    let pool = candidates.get(&source.node.name)?;

    let mut best: Option<(f64, &Workload)> = None;
    for workload in pool {
        if consumed.contains(&workload.vmid) {
            continue;
        }
        let source_after = source.score_without(workload, config);
        if mean - source_after > tolerance {
            continue;
        }

        let size = workload_score_on(workload, &source.node, config);
        let distance = (size - target).abs();
        let better = match best {
            None => true,
            Some((best_distance, best_workload)) => match distance.total_cmp(&best_distance) {
                std::cmp::Ordering::Less => true,
                std::cmp::Ordering::Equal => workload.vmid < best_workload.vmid,
                std::cmp::Ordering::Greater => false,
            },
        };
        if better {
            best = Some((distance, workload));
        }
    }

    best.map(|(_, workload)| workload.clone())
}

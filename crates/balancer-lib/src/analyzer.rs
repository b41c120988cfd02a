//! Load scoring and imbalance classification
//!
//! Every node gets a weighted score combining fractional CPU and memory
//! utilization; nodes further than one tolerance band from the cluster mean
//! are classified surplus or deficit. The planner consumes the ranked
//! classification, most extreme nodes first.

use serde::Serialize;
use tracing::{debug, info};

use crate::config::BalancerConfig;
use crate::models::{Node, Workload};

/// Imbalance class of a node relative to the cluster mean
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeClass {
    Surplus,
    Deficit,
    Balanced,
}

/// A node paired with its load score at classification time
#[derive(Debug, Clone, Serialize)]
pub struct ScoredNode {
    pub node: Node,
    pub score: f64,
}

/// Classification of the eligible nodes for one pass
#[derive(Debug, Clone, Serialize)]
pub struct ClusterAnalysis {
    /// Arithmetic mean score across eligible nodes
    pub mean: f64,
    /// Absolute score band around the mean
    pub tolerance: f64,
    /// Overloaded nodes, most overloaded first
    pub surplus: Vec<ScoredNode>,
    /// Underloaded nodes, most underloaded first
    pub deficit: Vec<ScoredNode>,
    /// Nodes within the tolerance band
    pub balanced: Vec<ScoredNode>,
}

impl ClusterAnalysis {
    /// A cluster with no surplus or no deficit node needs no plan
    pub fn is_balanced(&self) -> bool {
        self.surplus.is_empty() || self.deficit.is_empty()
    }
}

/// Utilization ratio, saturating instead of dividing by zero
///
/// A node advertising zero capacity for a weighted resource counts as fully
/// loaded on that resource.
pub(crate) fn utilization(used: f64, capacity: f64) -> f64 {
    if capacity <= 0.0 {
        1.0
    } else {
        used / capacity
    }
}

/// Weighted load score of a node, in [0, 1] for sane inputs
pub fn node_score(node: &Node, config: &BalancerConfig) -> f64 {
    config.percent_cpu * utilization(node.cpu_used, node.cpu_capacity)
        + config.percent_mem * utilization(node.mem_used, node.mem_capacity)
}

/// A workload's contribution to a given node's score
///
/// Workloads have no capacity of their own; their size is measured against
/// the capacities of the node under consideration.
pub fn workload_score_on(workload: &Workload, node: &Node, config: &BalancerConfig) -> f64 {
    config.percent_cpu * utilization(workload.cpu_used, node.cpu_capacity)
        + config.percent_mem * utilization(workload.mem_used, node.mem_capacity)
}

/// Score and classify the eligible nodes
pub fn analyze(nodes: &[Node], config: &BalancerConfig) -> ClusterAnalysis {
    let scored: Vec<ScoredNode> = nodes
        .iter()
        .map(|node| ScoredNode {
            score: node_score(node, config),
            node: node.clone(),
        })
        .collect();

    let mean = if scored.is_empty() {
        0.0
    } else {
        scored.iter().map(|s| s.score).sum::<f64>() / scored.len() as f64
    };

    let mut analysis = ClusterAnalysis {
        mean,
        tolerance: config.tolerance,
        surplus: Vec::new(),
        deficit: Vec::new(),
        balanced: Vec::new(),
    };

    for entry in scored {
        debug!(node = %entry.node.name, score = entry.score, mean, "Scored node");
        if entry.score - mean > config.tolerance {
            analysis.surplus.push(entry);
        } else if mean - entry.score > config.tolerance {
            analysis.deficit.push(entry);
        } else {
            analysis.balanced.push(entry);
        }
    }

    // Rank by distance from the mean, furthest out first. Name is the
    // secondary key so equal scores order deterministically.
    analysis
        .surplus
        .sort_by(|a, b| match b.score.total_cmp(&a.score) {
            std::cmp::Ordering::Equal => a.node.name.cmp(&b.node.name),
            other => other,
        });
    analysis
        .deficit
        .sort_by(|a, b| match a.score.total_cmp(&b.score) {
            std::cmp::Ordering::Equal => a.node.name.cmp(&b.node.name),
            other => other,
        });

    info!(
        mean = analysis.mean,
        surplus = analysis.surplus.len(),
        deficit = analysis.deficit.len(),
        balanced = analysis.balanced.len(),
        "Cluster classified"
    );

    analysis
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_node(name: &str, cpu_used: f64, mem_used: f64) -> Node {
        Node {
            name: name.to_string(),
            cpu_capacity: 10.0,
            cpu_used,
            mem_capacity: 100e9,
            mem_used,
        }
    }

    fn test_config(percent_cpu: f64, tolerance: f64) -> BalancerConfig {
        BalancerConfig {
            percent_cpu,
            percent_mem: 1.0 - percent_cpu,
            tolerance,
            ..BalancerConfig::default()
        }
    }

    #[test]
    fn test_node_score_weights_resources() {
        let node = test_node("pve1", 5.0, 80e9);
        let config = test_config(0.4, 0.2);

        // 0.4 * 0.5 + 0.6 * 0.8
        let score = node_score(&node, &config);
        assert!((score - 0.68).abs() < 1e-9);
    }

    #[test]
    fn test_zero_capacity_scores_saturated() {
        let node = Node {
            name: "broken".to_string(),
            cpu_capacity: 0.0,
            cpu_used: 0.0,
            mem_capacity: 100e9,
            mem_used: 50e9,
        };
        let config = test_config(0.4, 0.2);

        // CPU term saturates at 1.0 instead of faulting.
        let score = node_score(&node, &config);
        assert!((score - (0.4 + 0.6 * 0.5)).abs() < 1e-9);
    }

    #[test]
    fn test_workload_score_uses_host_capacity() {
        let node = test_node("pve1", 5.0, 50e9);
        let workload = Workload {
            vmid: 100,
            name: "db".to_string(),
            kind: crate::models::WorkloadKind::Qemu,
            cpu_used: 2.0,
            mem_used: 10e9,
            node: "pve1".to_string(),
        };
        let config = test_config(0.5, 0.2);

        let score = workload_score_on(&workload, &node, &config);
        assert!((score - (0.5 * 0.2 + 0.5 * 0.1)).abs() < 1e-9);
    }

    #[test]
    fn test_classification_bands() {
        let nodes = vec![
            test_node("hot", 9.0, 0.0),  // score 0.9
            test_node("cold", 1.0, 0.0), // score 0.1
            test_node("mid", 5.0, 0.0),  // score 0.5
        ];
        let config = test_config(1.0, 0.2);

        let analysis = analyze(&nodes, &config);
        assert!((analysis.mean - 0.5).abs() < 1e-9);
        assert_eq!(analysis.surplus.len(), 1);
        assert_eq!(analysis.surplus[0].node.name, "hot");
        assert_eq!(analysis.deficit.len(), 1);
        assert_eq!(analysis.deficit[0].node.name, "cold");
        assert_eq!(analysis.balanced.len(), 1);
        assert!(!analysis.is_balanced());
    }

    #[test]
    fn test_ranking_most_extreme_first() {
        let nodes = vec![
            test_node("warm", 8.0, 0.0), // 0.8
            test_node("hot", 9.5, 0.0),  // 0.95
            test_node("cool", 2.0, 0.0), // 0.2
            test_node("cold", 0.5, 0.0), // 0.05
        ];
        let config = test_config(1.0, 0.1);

        let analysis = analyze(&nodes, &config);
        let surplus: Vec<&str> = analysis
            .surplus
            .iter()
            .map(|s| s.node.name.as_str())
            .collect();
        let deficit: Vec<&str> = analysis
            .deficit
            .iter()
            .map(|s| s.node.name.as_str())
            .collect();
        assert_eq!(surplus, vec!["hot", "warm"]);
        assert_eq!(deficit, vec!["cold", "cool"]);
    }

    #[test]
    fn test_uniform_cluster_is_balanced() {
        let nodes = vec![
            test_node("a", 5.0, 50e9),
            test_node("b", 5.0, 50e9),
            test_node("c", 5.0, 50e9),
        ];
        let config = test_config(0.4, 0.2);

        let analysis = analyze(&nodes, &config);
        assert!(analysis.is_balanced());
        assert_eq!(analysis.balanced.len(), 3);
    }

    #[test]
    fn test_empty_cluster_is_balanced() {
        let analysis = analyze(&[], &test_config(0.4, 0.2));
        assert!(analysis.is_balanced());
        assert_eq!(analysis.mean, 0.0);
    }
}

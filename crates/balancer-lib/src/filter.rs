//! Node and workload eligibility rules
//!
//! Include/exclude sets keyed by node name, VMID and workload type, reduced
//! to an eligible view of the snapshot. An explicit include always overrides
//! a broader exclude (a VMID included by name stays eligible even when its
//! type is excluded globally). Excluding a node removes it and everything on
//! it; excluding a single workload leaves it on its node for scoring but
//! takes it out of the candidate pool.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{ClusterSnapshot, Node, Workload, WorkloadKind};

/// Include/exclude sets applied to the raw snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterRules {
    pub exclude_nodes: BTreeSet<String>,
    pub include_nodes: BTreeSet<String>,
    pub exclude_vmids: BTreeSet<u32>,
    pub include_vmids: BTreeSet<u32>,
    pub exclude_kinds: BTreeSet<WorkloadKind>,
    pub include_kinds: BTreeSet<WorkloadKind>,
}

impl FilterRules {
    /// Whether a node may take part in the run, as source or destination
    pub fn node_eligible(&self, name: &str) -> bool {
        if self.include_nodes.contains(name) {
            return true;
        }
        !self.exclude_nodes.contains(name)
    }

    /// Whether a workload may be selected for migration
    ///
    /// A VMID-level include wins over every exclude; a VMID-level exclude
    /// wins over type-level rules.
    pub fn workload_eligible(&self, workload: &Workload) -> bool {
        if self.include_vmids.contains(&workload.vmid) {
            return true;
        }
        if self.exclude_vmids.contains(&workload.vmid) {
            return false;
        }
        if self.include_kinds.contains(&workload.kind) {
            return true;
        }
        !self.exclude_kinds.contains(&workload.kind)
    }
}

/// Eligible subset of a snapshot
///
/// `nodes` carries full utilization (including usage from ineligible
/// workloads, which still weigh on their host); `workloads` holds only the
/// migration candidates per node.
#[derive(Debug, Clone, Default)]
pub struct EligibleCluster {
    pub nodes: Vec<Node>,
    pub workloads: BTreeMap<String, Vec<Workload>>,
}

/// Apply the rules to a snapshot, producing the eligible view
///
/// Pure function of snapshot + rules; the snapshot itself is never mutated.
pub fn apply(snapshot: &ClusterSnapshot, rules: &FilterRules) -> EligibleCluster {
    let mut eligible = EligibleCluster::default();

    for (name, record) in &snapshot.nodes {
        if !rules.node_eligible(name) {
            debug!(node = %name, "Node excluded per configuration");
            continue;
        }

        let candidates: Vec<Workload> = record
            .workloads
            .iter()
            .filter(|w| {
                let keep = rules.workload_eligible(w);
                if !keep {
                    debug!(vmid = w.vmid, kind = %w.kind, "Workload excluded per configuration");
                }
                keep
            })
            .cloned()
            .collect();

        eligible.nodes.push(record.node.clone());
        eligible.workloads.insert(name.clone(), candidates);
    }

    eligible
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_node(name: &str) -> Node {
        Node {
            name: name.to_string(),
            cpu_capacity: 8.0,
            cpu_used: 4.0,
            mem_capacity: 32e9,
            mem_used: 16e9,
        }
    }

    fn test_workload(vmid: u32, kind: WorkloadKind, node: &str) -> Workload {
        Workload {
            vmid,
            name: format!("guest-{vmid}"),
            kind,
            cpu_used: 1.0,
            mem_used: 2e9,
            node: node.to_string(),
        }
    }

    fn test_snapshot() -> ClusterSnapshot {
        let mut snapshot = ClusterSnapshot::new();
        snapshot.insert(
            test_node("pve1"),
            vec![
                test_workload(100, WorkloadKind::Qemu, "pve1"),
                test_workload(101, WorkloadKind::Lxc, "pve1"),
            ],
        );
        snapshot.insert(
            test_node("pve2"),
            vec![test_workload(200, WorkloadKind::Qemu, "pve2")],
        );
        snapshot
    }

    #[test]
    fn test_no_rules_keeps_everything() {
        let eligible = apply(&test_snapshot(), &FilterRules::default());
        assert_eq!(eligible.nodes.len(), 2);
        assert_eq!(eligible.workloads["pve1"].len(), 2);
        assert_eq!(eligible.workloads["pve2"].len(), 1);
    }

    #[test]
    fn test_excluded_node_disappears_entirely() {
        let rules = FilterRules {
            exclude_nodes: BTreeSet::from(["pve1".to_string()]),
            ..FilterRules::default()
        };

        let eligible = apply(&test_snapshot(), &rules);
        assert_eq!(eligible.nodes.len(), 1);
        assert_eq!(eligible.nodes[0].name, "pve2");
        assert!(!eligible.workloads.contains_key("pve1"));
    }

    #[test]
    fn test_include_node_overrides_exclude() {
        let rules = FilterRules {
            exclude_nodes: BTreeSet::from(["pve1".to_string()]),
            include_nodes: BTreeSet::from(["pve1".to_string()]),
            ..FilterRules::default()
        };

        let eligible = apply(&test_snapshot(), &rules);
        assert_eq!(eligible.nodes.len(), 2);
    }

    #[test]
    fn test_excluded_workload_stays_on_node_for_scoring() {
        let rules = FilterRules {
            exclude_vmids: BTreeSet::from([100]),
            ..FilterRules::default()
        };

        let eligible = apply(&test_snapshot(), &rules);
        // The node stays, with full utilization, but VMID 100 is no longer
        // a migration candidate.
        assert_eq!(eligible.nodes.len(), 2);
        let vmids: Vec<u32> = eligible.workloads["pve1"].iter().map(|w| w.vmid).collect();
        assert_eq!(vmids, vec![101]);
    }

    #[test]
    fn test_type_exclude_removes_kind() {
        let rules = FilterRules {
            exclude_kinds: BTreeSet::from([WorkloadKind::Lxc]),
            ..FilterRules::default()
        };

        let eligible = apply(&test_snapshot(), &rules);
        let vmids: Vec<u32> = eligible.workloads["pve1"].iter().map(|w| w.vmid).collect();
        assert_eq!(vmids, vec![100]);
    }

    #[test]
    fn test_vmid_include_overrides_type_exclude() {
        let rules = FilterRules {
            exclude_kinds: BTreeSet::from([WorkloadKind::Lxc]),
            include_vmids: BTreeSet::from([101]),
            ..FilterRules::default()
        };

        let eligible = apply(&test_snapshot(), &rules);
        let vmids: Vec<u32> = eligible.workloads["pve1"].iter().map(|w| w.vmid).collect();
        assert_eq!(vmids, vec![100, 101]);
    }

    #[test]
    fn test_vmid_exclude_wins_over_type_include() {
        let rules = FilterRules {
            include_kinds: BTreeSet::from([WorkloadKind::Qemu]),
            exclude_vmids: BTreeSet::from([200]),
            ..FilterRules::default()
        };

        let eligible = apply(&test_snapshot(), &rules);
        assert!(eligible.workloads["pve2"].is_empty());
    }
}

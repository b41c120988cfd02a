//! Core data model for one balancing pass

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Resource capacity and usage for one cluster node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node name as known to the cluster (e.g. "pve1")
    pub name: String,
    /// CPU capacity in cores
    pub cpu_capacity: f64,
    /// CPU in use, in cores
    pub cpu_used: f64,
    /// Memory capacity in bytes
    pub mem_capacity: f64,
    /// Memory in use, in bytes
    pub mem_used: f64,
}

/// Guest kind as reported by the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    /// LXC container (restart migration)
    Lxc,
    /// QEMU virtual machine (live migration)
    Qemu,
}

impl WorkloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Lxc => "lxc",
            WorkloadKind::Qemu => "qemu",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkloadKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lxc" => Ok(WorkloadKind::Lxc),
            "qemu" => Ok(WorkloadKind::Qemu),
            other => Err(format!("unknown workload type '{other}' (expected 'lxc' or 'qemu')")),
        }
    }
}

/// A running guest, attached to exactly one node at snapshot time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    /// Cluster-unique numeric guest identifier
    pub vmid: u32,
    /// Guest name (informational, shown in reports)
    pub name: String,
    pub kind: WorkloadKind,
    /// CPU in use, in cores
    pub cpu_used: f64,
    /// Memory in use, in bytes
    pub mem_used: f64,
    /// Name of the node currently hosting this guest
    pub node: String,
}

/// A node together with its running workloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node: Node,
    pub workloads: Vec<Workload>,
}

/// Immutable view of the cluster at collection time
///
/// All reads happen before any planning decision is made; later stages never
/// observe a mid-run mutation. Keyed by node name with deterministic
/// iteration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub nodes: BTreeMap<String, NodeRecord>,
}

impl ClusterSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and its workloads to the snapshot
    pub fn insert(&mut self, node: Node, workloads: Vec<Workload>) {
        self.nodes
            .insert(node.name.clone(), NodeRecord { node, workloads });
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn workload_count(&self) -> usize {
        self.nodes.values().map(|r| r.workloads.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A single planned workload move, never mutated after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationAction {
    pub vmid: u32,
    pub kind: WorkloadKind,
    /// Guest name at planning time
    pub workload_name: String,
    /// Node the workload is leaving
    pub source: String,
    /// Node the workload is moving to
    pub destination: String,
    /// Source node score projected after the move
    pub source_score_after: f64,
    /// Destination node score projected after the move
    pub destination_score_after: f64,
}

/// Ordered sequence of planned moves, bounded by max-migrations
///
/// Invariant: no VMID appears twice within one plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub actions: Vec<MigrationAction>,
}

impl MigrationPlan {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MigrationAction> {
        self.actions.iter()
    }
}

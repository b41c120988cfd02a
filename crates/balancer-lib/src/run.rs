//! Single balancing pass orchestration
//!
//! Collect → filter → analyze → plan → execute, once per invocation. The
//! process is stateless across runs; re-invocation by an external timer is
//! the convergence mechanism over time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::analyzer::{self, NodeClass};
use crate::cluster::ClusterApi;
use crate::config::BalancerConfig;
use crate::error::BalancerError;
use crate::executor::{ActionResult, PlanExecutor};
use crate::filter;
use crate::models::MigrationPlan;
use crate::planner;

/// Score and class of one eligible node at classification time
#[derive(Debug, Clone, Serialize)]
pub struct NodeScoreEntry {
    pub node: String,
    pub score: f64,
    pub class: NodeClass,
}

/// Structured output of one balancing pass
///
/// A data product suitable for logging, JSON output or dry-run display.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,
    /// No surplus or no deficit node was found
    pub balanced: bool,
    pub mean_score: f64,
    pub tolerance: f64,
    /// Eligible nodes, highest score first
    pub nodes: Vec<NodeScoreEntry>,
    pub plan: MigrationPlan,
    pub results: Vec<ActionResult>,
}

impl RunReport {
    /// Number of migration requests the cluster accepted
    pub fn accepted(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, crate::executor::ActionOutcome::Accepted { .. }))
            .count()
    }

    /// Number of migration requests that failed to dispatch
    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.failed()).count()
    }

    /// One-line human summary of the pass
    pub fn summary(&self) -> String {
        if self.balanced {
            "cluster is balanced; no migrations needed".to_string()
        } else if self.plan.is_empty() {
            "cluster is imbalanced but no actionable migration was found".to_string()
        } else if self.dry_run {
            format!(
                "dry run; {} migration(s) planned, none started",
                self.plan.len()
            )
        } else {
            format!(
                "{} migration(s) planned; {} accepted, {} failed",
                self.plan.len(),
                self.accepted(),
                self.failed()
            )
        }
    }
}

/// Run one balancing pass against the cluster
///
/// Configuration errors surface before any snapshot read; collection errors
/// abort the run before planning. Dispatch failures stay inside the report.
pub async fn run_once(
    api: Arc<dyn ClusterApi>,
    config: &BalancerConfig,
) -> Result<RunReport, BalancerError> {
    config.validate()?;
    let started_at = Utc::now();

    let snapshot = api.collect().await?;
    let eligible = filter::apply(&snapshot, &config.rules);
    let analysis = analyzer::analyze(&eligible.nodes, config);
    let plan = planner::plan(&analysis, &eligible.workloads, config);

    let executor = PlanExecutor::new(api, config.max_migrations);
    let results = executor.execute(&plan, config.dry_run).await;

    let mut nodes: Vec<NodeScoreEntry> = analysis
        .surplus
        .iter()
        .map(|s| (s, NodeClass::Surplus))
        .chain(analysis.balanced.iter().map(|s| (s, NodeClass::Balanced)))
        .chain(analysis.deficit.iter().map(|s| (s, NodeClass::Deficit)))
        .map(|(scored, class)| NodeScoreEntry {
            node: scored.node.name.clone(),
            score: scored.score,
            class,
        })
        .collect();
    nodes.sort_by(|a, b| match b.score.total_cmp(&a.score) {
        std::cmp::Ordering::Equal => a.node.cmp(&b.node),
        other => other,
    });

    let report = RunReport {
        started_at,
        dry_run: config.dry_run,
        balanced: analysis.is_balanced(),
        mean_score: analysis.mean,
        tolerance: analysis.tolerance,
        nodes,
        plan,
        results,
    };

    info!(summary = %report.summary(), "Balancing pass complete");
    Ok(report)
}

//! Plan execution with bounded concurrency
//!
//! Dispatches every action of a plan as an independent migrate request,
//! capped by a semaphore at the configured ceiling. Dispatch is
//! fire-and-monitor: the executor records whether the cluster accepted each
//! request and never waits for migration completion. One failed action does
//! not cancel its siblings. In dry-run mode nothing is dispatched at all.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::cluster::ClusterApi;
use crate::models::{MigrationAction, MigrationPlan};

/// What happened to one dispatched action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ActionOutcome {
    /// The cluster accepted the request and returned a task id
    Accepted { upid: String },
    /// The request was rejected or failed in transport
    Rejected { reason: String },
    /// Dry-run: the action was reported, not dispatched
    Skipped,
}

/// One action paired with its dispatch outcome, in plan order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action: MigrationAction,
    pub outcome: ActionOutcome,
}

impl ActionResult {
    pub fn failed(&self) -> bool {
        matches!(self.outcome, ActionOutcome::Rejected { .. })
    }
}

/// Dispatches a migration plan against the cluster API
pub struct PlanExecutor {
    api: Arc<dyn ClusterApi>,
    /// Upper bound on concurrently in-flight migrate requests
    max_in_flight: usize,
}

impl PlanExecutor {
    pub fn new(api: Arc<dyn ClusterApi>, max_in_flight: usize) -> Self {
        Self {
            api,
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Dispatch the plan, returning per-action outcomes in plan order
    pub async fn execute(&self, plan: &MigrationPlan, dry_run: bool) -> Vec<ActionResult> {
        if dry_run {
            return plan
                .iter()
                .map(|action| {
                    info!(
                        vmid = action.vmid,
                        source = %action.source,
                        destination = %action.destination,
                        "Dry run; migration not started"
                    );
                    ActionResult {
                        action: action.clone(),
                        outcome: ActionOutcome::Skipped,
                    }
                })
                .collect();
        }

        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks: JoinSet<(usize, ActionResult)> = JoinSet::new();

        for (index, action) in plan.iter().cloned().enumerate() {
            let api = Arc::clone(&self.api);
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => match api.migrate(&action).await {
                        Ok(ticket) => {
                            info!(
                                vmid = action.vmid,
                                source = %action.source,
                                destination = %action.destination,
                                upid = %ticket.upid,
                                "Migration request accepted"
                            );
                            ActionOutcome::Accepted { upid: ticket.upid }
                        }
                        Err(e) => {
                            warn!(
                                vmid = action.vmid,
                                source = %action.source,
                                destination = %action.destination,
                                error = %e,
                                "Migration dispatch failed"
                            );
                            ActionOutcome::Rejected {
                                reason: e.to_string(),
                            }
                        }
                    },
                    // The semaphore lives as long as this task set.
                    Err(_) => ActionOutcome::Rejected {
                        reason: "executor shut down before dispatch".to_string(),
                    },
                };

                (index, ActionResult { action, outcome })
            });
        }

        let mut results: Vec<(usize, ActionResult)> = Vec::with_capacity(plan.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(entry) => results.push(entry),
                Err(e) => error!(error = %e, "Dispatch task aborted"),
            }
        }

        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }
}

//! Central scheduling workload balancer for Proxmox VE clusters
//!
//! This crate provides the core functionality for:
//! - Snapshot collection through a narrow, swappable cluster API trait
//! - Weighted CPU/memory load scoring and surplus/deficit classification
//! - Greedy, bounded, simulate-before-commit migration planning
//! - Concurrency-bounded plan execution with per-action outcomes
//!
//! Each invocation operates on a fresh snapshot and carries no state across
//! runs; periodic re-invocation converges the cluster over time.

pub mod analyzer;
pub mod cluster;
pub mod config;
pub mod error;
pub mod executor;
pub mod filter;
pub mod models;
pub mod planner;
pub mod run;

pub use analyzer::{ClusterAnalysis, NodeClass};
pub use cluster::{connect, ApiConfig, ClusterApi, ConnectionScheme, MigrationTicket};
pub use config::BalancerConfig;
pub use error::{BalancerError, CollectionError, ConfigError, DispatchError};
pub use executor::{ActionOutcome, ActionResult, PlanExecutor};
pub use filter::FilterRules;
pub use models::*;
pub use run::{run_once, NodeScoreEntry, RunReport};

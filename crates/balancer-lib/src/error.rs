//! Error taxonomy for the balancer
//!
//! Configuration and collection errors are fatal to a run and propagate to
//! the caller. Dispatch errors stay local to one migration action and are
//! recorded in the run report instead of being raised.

use thiserror::Error;

/// Rejected configuration, detected before any snapshot read
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("percent-cpu and percent-mem must sum to 1.0 (got {cpu} + {mem} = {sum})")]
    WeightSum { cpu: f64, mem: f64, sum: f64 },

    #[error("tolerance must be within [0, 1) (got {0})")]
    ToleranceRange(f64),

    #[error("max-migrations must be at least 1")]
    MaxMigrationsZero,
}

/// Snapshot collection failure, fatal to the run
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("cluster API transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("cluster API returned {status} for {endpoint}: {message}")]
    Api {
        status: u16,
        endpoint: String,
        message: String,
    },

    #[error("malformed response from {endpoint}: {message}")]
    Malformed { endpoint: String, message: String },

    #[error("invalid cluster API endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("connection scheme '{0}' is not supported")]
    UnsupportedScheme(String),
}

/// Failure dispatching a single migration action
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("migration rejected by cluster ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("transport failure during dispatch: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid migration endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// Top-level failure of one balancing pass
#[derive(Debug, Error)]
pub enum BalancerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("snapshot collection failed: {0}")]
    Collection(#[from] CollectionError),
}

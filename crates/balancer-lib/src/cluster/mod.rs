//! Cluster API boundary
//!
//! The core talks to the cluster through the narrow [`ClusterApi`] trait:
//! one read (snapshot collection) and one write (migration dispatch).
//! Backends are swappable implementations of that trait; the shipped one
//! speaks the Proxmox HTTPS JSON API.

mod https;

pub use https::ProxmoxHttps;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{CollectionError, DispatchError};
use crate::models::{ClusterSnapshot, MigrationAction};

/// Receipt for a migration request the cluster accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationTicket {
    /// Task identifier assigned by the cluster (Proxmox UPID)
    pub upid: String,
}

/// The two operations the core needs from the cluster
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Read the current state of every node and its running workloads
    async fn collect(&self) -> Result<ClusterSnapshot, CollectionError>;

    /// Ask the cluster to start one workload migration
    ///
    /// Returns as soon as the request is accepted; migration progress is not
    /// awaited.
    async fn migrate(&self, action: &MigrationAction) -> Result<MigrationTicket, DispatchError>;
}

/// How to reach the cluster API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionScheme {
    Https,
    Ssh,
    Local,
}

impl fmt::Display for ConnectionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionScheme::Https => "https",
            ConnectionScheme::Ssh => "ssh",
            ConnectionScheme::Local => "local",
        };
        f.write_str(s)
    }
}

impl FromStr for ConnectionScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "https" => Ok(ConnectionScheme::Https),
            "ssh" => Ok(ConnectionScheme::Ssh),
            "local" => Ok(ConnectionScheme::Local),
            other => Err(format!(
                "unknown connection scheme '{other}' (expected 'https', 'ssh' or 'local')"
            )),
        }
    }
}

/// Connection settings for the cluster API client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub scheme: ConnectionScheme,
    /// Host running the cluster API
    pub host: String,
    pub port: u16,
    /// API token id, e.g. "balancer@pve!scheduler"
    pub token_id: String,
    pub token_secret: String,
    /// Accept self-signed cluster certificates
    pub insecure_tls: bool,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            scheme: ConnectionScheme::Https,
            host: "localhost".to_string(),
            port: 8006,
            token_id: String::new(),
            token_secret: String::new(),
            insecure_tls: false,
            request_timeout_secs: 30,
        }
    }
}

/// Build the cluster API client for the configured scheme
pub fn connect(config: &ApiConfig) -> Result<Arc<dyn ClusterApi>, CollectionError> {
    match config.scheme {
        ConnectionScheme::Https => {
            info!(host = %config.host, port = config.port, "Using cluster API over https");
            Ok(Arc::new(ProxmoxHttps::new(config)?))
        }
        other => Err(CollectionError::UnsupportedScheme(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_parsing() {
        assert_eq!("https".parse::<ConnectionScheme>().unwrap(), ConnectionScheme::Https);
        assert_eq!("SSH".parse::<ConnectionScheme>().unwrap(), ConnectionScheme::Ssh);
        assert!("telnet".parse::<ConnectionScheme>().is_err());
    }

    #[test]
    fn test_connect_rejects_unsupported_schemes() {
        let config = ApiConfig {
            scheme: ConnectionScheme::Ssh,
            ..ApiConfig::default()
        };

        match connect(&config) {
            Err(CollectionError::UnsupportedScheme(scheme)) => assert_eq!(scheme, "ssh"),
            other => panic!("expected UnsupportedScheme, got {:?}", other.map(|_| ())),
        }
    }
}

//! Proxmox HTTPS JSON API backend
//!
//! Authenticates with an API token, reads node and guest inventory from
//! `/api2/json/nodes`, and starts migrations via the per-guest `migrate`
//! endpoints. QEMU guests migrate live (`online=1`); LXC containers use
//! restart migration (`online=0`). The `data` field of an accepted migrate
//! response is the task UPID.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use super::{ApiConfig, ClusterApi, MigrationTicket};
use crate::error::{CollectionError, DispatchError};
use crate::models::{ClusterSnapshot, MigrationAction, Node, Workload, WorkloadKind};

/// Cluster API client over the Proxmox HTTPS JSON API
pub struct ProxmoxHttps {
    client: reqwest::Client,
    /// API root, e.g. `https://pve1:8006/api2/json/`
    base: Url,
    auth_header: String,
}

/// Envelope every Proxmox JSON response uses
#[derive(Debug, Deserialize)]
struct ApiData<T> {
    data: T,
}

/// One entry of the `/nodes` listing
#[derive(Debug, Deserialize)]
struct NodeEntry {
    node: String,
    status: String,
    /// CPU usage as a fraction of `maxcpu`
    #[serde(default)]
    cpu: f64,
    /// CPU capacity in cores
    #[serde(default)]
    maxcpu: f64,
    /// Memory in use, bytes
    #[serde(default)]
    mem: f64,
    /// Memory capacity, bytes
    #[serde(default)]
    maxmem: f64,
}

/// One entry of a `/nodes/{node}/qemu` or `/nodes/{node}/lxc` listing
#[derive(Debug, Deserialize)]
struct GuestEntry {
    vmid: u32,
    #[serde(default)]
    name: Option<String>,
    status: String,
    /// Cores allocated to the guest
    #[serde(default)]
    cpus: f64,
    /// CPU usage as a fraction of `cpus`
    #[serde(default)]
    cpu: f64,
    /// Memory in use, bytes
    #[serde(default)]
    mem: f64,
}

impl ProxmoxHttps {
    /// Build a client from connection settings
    pub fn new(config: &ApiConfig) -> Result<Self, CollectionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .danger_accept_invalid_certs(config.insecure_tls)
            .build()?;
        let base = Url::parse(&format!("https://{}:{}/api2/json/", config.host, config.port))?;
        let auth_header = format!("PVEAPIToken={}={}", config.token_id, config.token_secret);

        Ok(Self {
            client,
            base,
            auth_header,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, CollectionError> {
        let url = self.base.join(path)?;
        debug!(%url, "GET");

        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, &self.auth_header)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CollectionError::Api {
                status: status.as_u16(),
                endpoint: path.to_string(),
                message,
            });
        }

        let body: ApiData<T> =
            response
                .json()
                .await
                .map_err(|e| CollectionError::Malformed {
                    endpoint: path.to_string(),
                    message: e.to_string(),
                })?;
        Ok(body.data)
    }

    /// Fetch the running guests of one kind on one node
    async fn guests_on(
        &self,
        node: &str,
        kind: WorkloadKind,
    ) -> Result<Vec<Workload>, CollectionError> {
        let entries: Vec<GuestEntry> = self.get_json(&format!("nodes/{node}/{kind}")).await?;

        Ok(entries
            .into_iter()
            .filter(|g| g.status == "running")
            .map(|g| Workload {
                vmid: g.vmid,
                name: g.name.unwrap_or_else(|| g.vmid.to_string()),
                kind,
                cpu_used: g.cpu * g.cpus,
                mem_used: g.mem,
                node: node.to_string(),
            })
            .collect())
    }
}

#[async_trait]
impl ClusterApi for ProxmoxHttps {
    async fn collect(&self) -> Result<ClusterSnapshot, CollectionError> {
        let entries: Vec<NodeEntry> = self.get_json("nodes").await?;
        let mut snapshot = ClusterSnapshot::new();

        for entry in entries {
            if entry.status != "online" {
                warn!(node = %entry.node, status = %entry.status, "Skipping node not reporting online");
                continue;
            }

            let node = Node {
                name: entry.node.clone(),
                cpu_capacity: entry.maxcpu,
                cpu_used: entry.cpu * entry.maxcpu,
                mem_capacity: entry.maxmem,
                mem_used: entry.mem,
            };

            let mut workloads = self.guests_on(&entry.node, WorkloadKind::Qemu).await?;
            workloads.extend(self.guests_on(&entry.node, WorkloadKind::Lxc).await?);
            workloads.sort_by_key(|w| w.vmid);

            snapshot.insert(node, workloads);
        }

        info!(
            nodes = snapshot.node_count(),
            workloads = snapshot.workload_count(),
            "Snapshot collected"
        );
        Ok(snapshot)
    }

    async fn migrate(&self, action: &MigrationAction) -> Result<MigrationTicket, DispatchError> {
        let path = format!(
            "nodes/{}/{}/{}/migrate",
            action.source, action.kind, action.vmid
        );
        let url = self.base.join(&path)?;

        // QEMU guests move live; LXC containers only support restart
        // migration, which the API spells online=0.
        let online = match action.kind {
            WorkloadKind::Qemu => "1",
            WorkloadKind::Lxc => "0",
        };

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, &self.auth_header)
            .form(&[
                ("target", action.destination.as_str()),
                ("online", online),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: ApiData<String> =
            response.json().await.map_err(|e| DispatchError::Rejected {
                status: status.as_u16(),
                message: format!("request accepted but response was unreadable: {e}"),
            })?;

        Ok(MigrationTicket { upid: body.data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkloadKind;

    fn test_api(server: &mockito::Server) -> ProxmoxHttps {
        ProxmoxHttps {
            client: reqwest::Client::new(),
            base: Url::parse(&format!("{}/api2/json/", server.url())).unwrap(),
            auth_header: "PVEAPIToken=balancer@pve!test=secret".to_string(),
        }
    }

    fn test_action(kind: WorkloadKind) -> MigrationAction {
        MigrationAction {
            vmid: 100,
            kind,
            workload_name: "web".to_string(),
            source: "pve1".to_string(),
            destination: "pve2".to_string(),
            source_score_after: 0.5,
            destination_score_after: 0.5,
        }
    }

    #[tokio::test]
    async fn test_collect_parses_nodes_and_running_guests() {
        let mut server = mockito::Server::new_async().await;

        let _nodes = server
            .mock("GET", "/api2/json/nodes")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data":[
                    {"node":"pve1","status":"online","cpu":0.5,"maxcpu":8,"mem":8000000000,"maxmem":16000000000},
                    {"node":"pve2","status":"offline"}
                ]}"#,
            )
            .create_async()
            .await;
        let _qemu = server
            .mock("GET", "/api2/json/nodes/pve1/qemu")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data":[
                    {"vmid":100,"name":"web","status":"running","cpus":4,"cpu":0.25,"mem":2000000000},
                    {"vmid":101,"name":"idle","status":"stopped"}
                ]}"#,
            )
            .create_async()
            .await;
        let _lxc = server
            .mock("GET", "/api2/json/nodes/pve1/lxc")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data":[
                    {"vmid":102,"name":"cache","status":"running","cpus":2,"cpu":0.5,"mem":1000000000}
                ]}"#,
            )
            .create_async()
            .await;

        let snapshot = test_api(&server).collect().await.unwrap();

        // Offline node skipped entirely.
        assert_eq!(snapshot.node_count(), 1);
        let record = &snapshot.nodes["pve1"];
        assert!((record.node.cpu_used - 4.0).abs() < 1e-9);
        assert!((record.node.cpu_capacity - 8.0).abs() < 1e-9);

        // Stopped guest filtered; VMIDs sorted.
        let vmids: Vec<u32> = record.workloads.iter().map(|w| w.vmid).collect();
        assert_eq!(vmids, vec![100, 102]);
        assert_eq!(record.workloads[0].kind, WorkloadKind::Qemu);
        assert!((record.workloads[0].cpu_used - 1.0).abs() < 1e-9);
        assert_eq!(record.workloads[1].kind, WorkloadKind::Lxc);
    }

    #[tokio::test]
    async fn test_collect_surfaces_api_errors() {
        let mut server = mockito::Server::new_async().await;
        let _nodes = server
            .mock("GET", "/api2/json/nodes")
            .with_status(401)
            .with_body("authentication failure")
            .create_async()
            .await;

        let err = test_api(&server).collect().await.unwrap_err();
        match err {
            CollectionError::Api { status, .. } => assert_eq!(status, 401),
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_migrate_qemu_goes_live_and_returns_upid() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api2/json/nodes/pve1/qemu/100/migrate")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("target".into(), "pve2".into()),
                mockito::Matcher::UrlEncoded("online".into(), "1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":"UPID:pve1:0000C3E5:migrate:100:root@pam:"}"#)
            .create_async()
            .await;

        let ticket = test_api(&server)
            .migrate(&test_action(WorkloadKind::Qemu))
            .await
            .unwrap();

        assert!(ticket.upid.starts_with("UPID:pve1"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_migrate_lxc_uses_restart_migration() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api2/json/nodes/pve1/lxc/100/migrate")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("target".into(), "pve2".into()),
                mockito::Matcher::UrlEncoded("online".into(), "0".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":"UPID:pve1:0000C3E6:migrate:100:root@pam:"}"#)
            .create_async()
            .await;

        test_api(&server)
            .migrate(&test_action(WorkloadKind::Lxc))
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_migrate_rejection_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api2/json/nodes/pve1/qemu/100/migrate")
            .with_status(500)
            .with_body("guest is locked")
            .create_async()
            .await;

        let err = test_api(&server)
            .migrate(&test_action(WorkloadKind::Qemu))
            .await
            .unwrap_err();

        match err {
            DispatchError::Rejected { status, message } => {
                assert_eq!(status, 500);
                assert!(message.contains("locked"));
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }
}

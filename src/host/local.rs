//! File-backed host used by the `influxdb-operator` binary and by tests.
//!
//! State is a single JSON document: leadership flag, network bindings,
//! relations with both sides' application data, unit status, opened ports and
//! workload version.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{Host, Protocol, RelationData, RelationId, UnitStatus};
use crate::errors::{Error, Result};

/// One relation as seen from this application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationRecord {
    pub id: RelationId,
    pub name: String,
    pub remote_app: String,
    #[serde(default)]
    pub local_data: RelationData,
    #[serde(default)]
    pub remote_data: RelationData,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpenPort {
    pub protocol: Protocol,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LocalHostState {
    app_name: String,
    #[serde(default = "default_leader")]
    leader: bool,
    #[serde(default)]
    bindings: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    relations: Vec<RelationRecord>,
    #[serde(default)]
    next_relation_id: u64,
    #[serde(default)]
    status: UnitStatus,
    #[serde(default)]
    ports: Vec<OpenPort>,
    #[serde(default)]
    workload_version: Option<String>,
}

impl LocalHostState {
    fn insert_relation(&mut self, id: RelationId, name: &str, remote_app: &str) {
        self.next_relation_id = self.next_relation_id.max(id.get());
        self.relations.push(RelationRecord {
            id,
            name: name.to_string(),
            remote_app: remote_app.to_string(),
            local_data: RelationData::new(),
            remote_data: RelationData::new(),
        });
    }
}

fn default_leader() -> bool {
    true
}

/// Host implementation backed by an in-process state document.
///
/// A fresh host is leader and has no bindings or relations. Clones share state.
#[derive(Debug, Clone)]
pub struct LocalHost {
    app_name: String,
    state: Arc<RwLock<LocalHostState>>,
}

impl LocalHost {
    pub fn new(app_name: impl Into<String>) -> Self {
        let app_name = app_name.into();
        let state = LocalHostState {
            app_name: app_name.clone(),
            leader: true,
            bindings: Default::default(),
            relations: Vec::new(),
            next_relation_id: 0,
            status: UnitStatus::Unknown,
            ports: Vec::new(),
            workload_version: None,
        };
        Self { app_name, state: Arc::new(RwLock::new(state)) }
    }

    /// Load host state from `path`, or start fresh for `app_name` if the file does not exist.
    pub async fn load(path: &Path, app_name: &str) -> Result<Self> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new(app_name)),
            Err(e) => {
                return Err(Error::io(e, format!("Failed to read host state {}", path.display())))
            }
        };
        let state: LocalHostState = serde_json::from_slice(&raw)?;
        Ok(Self { app_name: state.app_name.clone(), state: Arc::new(RwLock::new(state)) })
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_vec_pretty(&*self.state.read().await)?;
        tokio::fs::write(path, raw)
            .await
            .map_err(|e| Error::io(e, format!("Failed to write host state {}", path.display())))
    }

    pub async fn set_leader(&self, leader: bool) {
        self.state.write().await.leader = leader;
    }

    pub async fn set_binding(&self, binding: &str, address: &str) {
        self.state.write().await.bindings.insert(binding.to_string(), address.to_string());
    }

    pub async fn remove_binding(&self, binding: &str) {
        self.state.write().await.bindings.remove(binding);
    }

    /// Establish a new relation with `remote_app` and return its id.
    pub async fn add_relation(&self, name: &str, remote_app: &str) -> RelationId {
        let mut state = self.state.write().await;
        let id = RelationId::new(state.next_relation_id + 1);
        state.insert_relation(id, name, remote_app);
        id
    }

    /// Establish a relation under an id the platform already assigned.
    ///
    /// Both applications of a relation see the same id, and grants are
    /// recorded against it.
    pub async fn add_relation_with_id(
        &self,
        id: RelationId,
        name: &str,
        remote_app: &str,
    ) -> Result<RelationId> {
        let mut state = self.state.write().await;
        if state.relations.iter().any(|r| r.id == id) {
            return Err(Error::validation(format!("Relation {} already exists", id)));
        }
        state.insert_relation(id, name, remote_app);
        Ok(id)
    }

    /// Forget a relation. Returns the removed record.
    pub async fn remove_relation(&self, id: RelationId) -> Option<RelationRecord> {
        let mut state = self.state.write().await;
        let index = state.relations.iter().position(|r| r.id == id)?;
        Some(state.relations.remove(index))
    }

    pub async fn relation(&self, id: RelationId) -> Option<RelationRecord> {
        self.state.read().await.relations.iter().find(|r| r.id == id).cloned()
    }

    pub async fn relations(&self) -> Vec<RelationRecord> {
        self.state.read().await.relations.clone()
    }

    /// Simulate the remote application writing to its side of the relation.
    pub async fn set_remote_data(&self, id: RelationId, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let record = state
            .relations
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::validation(format!("Unknown relation {}", id)))?;
        if value.is_empty() {
            record.remote_data.remove(key);
        } else {
            record.remote_data.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    pub async fn opened_ports(&self) -> Vec<OpenPort> {
        self.state.read().await.ports.clone()
    }

    pub async fn workload_version(&self) -> Option<String> {
        self.state.read().await.workload_version.clone()
    }
}

#[async_trait]
impl Host for LocalHost {
    fn app_name(&self) -> &str {
        &self.app_name
    }

    async fn is_leader(&self) -> Result<bool> {
        Ok(self.state.read().await.leader)
    }

    async fn binding_address(&self, binding: &str) -> Result<Option<String>> {
        Ok(self.state.read().await.bindings.get(binding).cloned())
    }

    async fn relation_data(&self, relation: RelationId, app: &str) -> Result<Option<RelationData>> {
        let state = self.state.read().await;
        let Some(record) = state.relations.iter().find(|r| r.id == relation) else {
            return Ok(None);
        };
        if app == state.app_name {
            Ok(Some(record.local_data.clone()))
        } else if app == record.remote_app {
            Ok(Some(record.remote_data.clone()))
        } else {
            Ok(Some(RelationData::new()))
        }
    }

    async fn update_relation_data(
        &self,
        relation: RelationId,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.leader {
            return Err(Error::validation("Only the leader may write application relation data"));
        }
        let record = state
            .relations
            .iter_mut()
            .find(|r| r.id == relation)
            .ok_or_else(|| Error::validation(format!("Unknown relation {}", relation)))?;
        if value.is_empty() {
            record.local_data.remove(key);
        } else {
            record.local_data.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    async fn set_status(&self, status: UnitStatus) -> Result<()> {
        tracing::info!(status = %status, "Unit status changed");
        self.state.write().await.status = status;
        Ok(())
    }

    async fn status(&self) -> Result<UnitStatus> {
        Ok(self.state.read().await.status.clone())
    }

    async fn open_port(&self, protocol: Protocol, port: u16) -> Result<()> {
        let mut state = self.state.write().await;
        let open = OpenPort { protocol, port };
        if !state.ports.contains(&open) {
            state.ports.push(open);
            state.ports.sort();
        }
        Ok(())
    }

    async fn set_workload_version(&self, version: &str) -> Result<()> {
        self.state.write().await.workload_version = Some(version.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_relation_data_sides() {
        let host = LocalHost::new("influxdb");
        let rel = host.add_relation("influxdb", "grafana").await;

        host.update_relation_data(rel, "k", "v").await.unwrap();
        host.set_remote_data(rel, "remote", "r").await.unwrap();

        let local = host.relation_data(rel, "influxdb").await.unwrap().unwrap();
        assert_eq!(local.get("k").map(String::as_str), Some("v"));
        let remote = host.relation_data(rel, "grafana").await.unwrap().unwrap();
        assert_eq!(remote.get("remote").map(String::as_str), Some("r"));
    }

    #[tokio::test]
    async fn test_relation_with_assigned_id() {
        let host = LocalHost::new("grafana");
        let id = host.add_relation_with_id(RelationId::new(7), "influxdb", "influxdb").await.unwrap();
        assert_eq!(id, RelationId::new(7));
        assert!(host.add_relation_with_id(id, "influxdb", "influxdb").await.is_err());

        // Generated ids continue past assigned ones.
        assert_eq!(host.add_relation("metrics", "prometheus").await, RelationId::new(8));
    }

    #[tokio::test]
    async fn test_empty_value_clears_key() {
        let host = LocalHost::new("influxdb");
        let rel = host.add_relation("influxdb", "grafana").await;
        host.update_relation_data(rel, "k", "v").await.unwrap();
        host.update_relation_data(rel, "k", "").await.unwrap();

        let local = host.relation_data(rel, "influxdb").await.unwrap().unwrap();
        assert!(local.is_empty());
    }

    #[tokio::test]
    async fn test_non_leader_cannot_write_app_data() {
        let host = LocalHost::new("influxdb");
        let rel = host.add_relation("influxdb", "grafana").await;
        host.set_leader(false).await;
        assert!(host.update_relation_data(rel, "k", "v").await.is_err());
    }

    #[tokio::test]
    async fn test_removed_relation_has_no_data() {
        let host = LocalHost::new("influxdb");
        let rel = host.add_relation("influxdb", "grafana").await;
        assert!(host.remove_relation(rel).await.is_some());
        assert!(host.relation_data(rel, "grafana").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_port_is_idempotent() {
        let host = LocalHost::new("influxdb");
        host.open_port(Protocol::Tcp, 8086).await.unwrap();
        host.open_port(Protocol::Tcp, 8086).await.unwrap();
        assert_eq!(host.opened_ports().await, vec![OpenPort { protocol: Protocol::Tcp, port: 8086 }]);
    }

    #[tokio::test]
    async fn test_state_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.json");

        let host = LocalHost::new("influxdb");
        host.set_binding("influxdb-peer", "10.0.0.5").await;
        let rel = host.add_relation("influxdb", "grafana").await;
        host.set_status(UnitStatus::Active).await.unwrap();
        host.save(&path).await.unwrap();

        let loaded = LocalHost::load(&path, "ignored").await.unwrap();
        assert_eq!(loaded.app_name(), "influxdb");
        assert_eq!(
            loaded.binding_address("influxdb-peer").await.unwrap().as_deref(),
            Some("10.0.0.5")
        );
        assert!(loaded.relation(rel).await.is_some());
        assert_eq!(loaded.status().await.unwrap(), UnitStatus::Active);
    }
}

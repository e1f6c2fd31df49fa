//! On-disk state of one unit between CLI invocations.
//!
//! A state directory holds three JSON documents:
//!
//! - `host.json`: leadership, bindings, relations and status
//! - `secrets.json`: the unit's secret store (mode 0600)
//! - `state.json`: operator state and deferred events

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::host::LocalHost;
use crate::operator::OperatorState;
use crate::relation::ClientState;
use crate::scheduler::QueuedEvent;
use crate::secrets::InMemorySecretStore;

pub const HOST_FILE: &str = "host.json";
pub const SECRETS_FILE: &str = "secrets.json";
pub const STATE_FILE: &str = "state.json";

/// Operator state for both roles plus the deferred event queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitState {
    #[serde(default)]
    pub server: OperatorState,
    #[serde(default)]
    pub client: ClientState,
    #[serde(default)]
    pub pending: Vec<QueuedEvent>,
}

/// Paths of a unit's state directory.
#[derive(Debug, Clone)]
pub struct UnitFiles {
    dir: PathBuf,
    secrets_override: Option<PathBuf>,
}

impl UnitFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), secrets_override: None }
    }

    /// Read secrets from another file, typically the providing unit's store.
    pub fn with_secrets_file(mut self, path: Option<PathBuf>) -> Self {
        self.secrets_override = path;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn host_path(&self) -> PathBuf {
        self.dir.join(HOST_FILE)
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.secrets_override.clone().unwrap_or_else(|| self.dir.join(SECRETS_FILE))
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            Error::io(e, format!("Failed to create state directory {}", self.dir.display()))
        })
    }

    pub async fn load_host(&self, app_name: &str) -> Result<LocalHost> {
        LocalHost::load(&self.host_path(), app_name).await
    }

    pub async fn load_secrets(&self) -> Result<InMemorySecretStore> {
        Ok(InMemorySecretStore::load(&self.secrets_path()).await?)
    }

    pub async fn load_state(&self) -> Result<UnitState> {
        let path = self.state_path();
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(UnitState::default()),
            Err(e) => {
                return Err(Error::io(e, format!("Failed to read unit state {}", path.display())))
            }
        };
        Ok(serde_json::from_slice(&raw)?)
    }

    pub async fn save_state(&self, state: &UnitState) -> Result<()> {
        let path = self.state_path();
        let raw = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&path, raw)
            .await
            .map_err(|e| Error::io(e, format!("Failed to write unit state {}", path.display())))
    }
}

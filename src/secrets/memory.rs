//! In-memory authoritative secret store.
//!
//! [`InMemorySecretStore`] plays the part of the platform's secret service for
//! the local host and for tests. It tracks revisions, rotation deadlines and
//! per-relation grants. [`GrantedSecretView`] is what the consuming side of a
//! relation sees: read-only, and only for secrets granted to its relations.
//!
//! The store can be snapshotted to a JSON file. Snapshots contain plaintext
//! credentials and are written with owner-only permissions on unix.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::error::{Result, SecretsError};
use super::store::SecretStore;
use super::types::{RotatePolicy, SecretContent, SecretId, SecretLookup};
use crate::host::RelationId;

#[derive(Debug, Clone)]
struct StoredSecret {
    label: String,
    content: SecretContent,
    revision: u32,
    rotate: RotatePolicy,
    next_rotation: Option<DateTime<Utc>>,
    grants: BTreeSet<RelationId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Metadata about a stored secret, without its content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecretInfo {
    pub id: SecretId,
    pub label: String,
    pub revision: u32,
    pub rotate: RotatePolicy,
    pub next_rotation: Option<DateTime<Utc>>,
    pub grants: Vec<RelationId>,
}

/// Serialized form of the whole store.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreSnapshot {
    secrets: Vec<SecretSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SecretSnapshot {
    id: SecretId,
    label: String,
    content: BTreeMap<String, String>,
    revision: u32,
    rotate: RotatePolicy,
    next_rotation: Option<DateTime<Utc>>,
    #[serde(default)]
    grants: BTreeSet<RelationId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Authoritative in-memory secret store. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemorySecretStore {
    secrets: Arc<RwLock<BTreeMap<SecretId, StoredSecret>>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot written by [`InMemorySecretStore::save`]. A missing file yields an empty store.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };
        let snapshot: StoreSnapshot = serde_json::from_slice(&raw)?;
        let secrets = snapshot
            .secrets
            .into_iter()
            .map(|s| {
                let stored = StoredSecret {
                    label: s.label,
                    content: s.content.into_iter().collect(),
                    revision: s.revision,
                    rotate: s.rotate,
                    next_rotation: s.next_rotation,
                    grants: s.grants,
                    created_at: s.created_at,
                    updated_at: s.updated_at,
                };
                (s.id, stored)
            })
            .collect();
        tracing::debug!(path = %path.display(), "Loaded secret store snapshot");
        Ok(Self { secrets: Arc::new(RwLock::new(secrets)) })
    }

    /// Persist the store as JSON.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let snapshot = {
            let secrets = self.secrets.read().await;
            StoreSnapshot {
                secrets: secrets
                    .iter()
                    .map(|(id, s)| SecretSnapshot {
                        id: id.clone(),
                        label: s.label.clone(),
                        content: s.content.expose(),
                        revision: s.revision,
                        rotate: s.rotate,
                        next_rotation: s.next_rotation,
                        grants: s.grants.clone(),
                        created_at: s.created_at,
                        updated_at: s.updated_at,
                    })
                    .collect(),
            }
        };
        let raw = serde_json::to_vec_pretty(&snapshot)?;
        tokio::fs::write(path, raw).await?;
        restrict_permissions(path).await?;
        Ok(())
    }

    /// Metadata for every stored secret.
    pub async fn list(&self) -> Vec<SecretInfo> {
        let secrets = self.secrets.read().await;
        secrets
            .iter()
            .map(|(id, s)| SecretInfo {
                id: id.clone(),
                label: s.label.clone(),
                revision: s.revision,
                rotate: s.rotate,
                next_rotation: s.next_rotation,
                grants: s.grants.iter().copied().collect(),
            })
            .collect()
    }

    /// Secrets whose rotation deadline has passed.
    pub async fn due_for_rotation(&self, now: DateTime<Utc>) -> Vec<(SecretId, String)> {
        let secrets = self.secrets.read().await;
        secrets
            .iter()
            .filter(|(_, s)| s.next_rotation.is_some_and(|due| due <= now))
            .map(|(id, s)| (id.clone(), s.label.clone()))
            .collect()
    }

    /// Whether `relation` has been granted access to `id`.
    pub async fn is_granted(&self, id: &SecretId, relation: RelationId) -> bool {
        let secrets = self.secrets.read().await;
        secrets.get(id).is_some_and(|s| s.grants.contains(&relation))
    }

    async fn resolve(&self, lookup: &SecretLookup) -> Result<SecretId> {
        let secrets = self.secrets.read().await;
        match lookup {
            SecretLookup::Id(id) if secrets.contains_key(id) => Ok(id.clone()),
            SecretLookup::Label(label) => secrets
                .iter()
                .find(|(_, s)| &s.label == label)
                .map(|(id, _)| id.clone())
                .ok_or_else(|| SecretsError::not_found(lookup.to_string())),
            SecretLookup::Id(_) => Err(SecretsError::not_found(lookup.to_string())),
        }
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn create(
        &self,
        content: SecretContent,
        label: &str,
        rotate: RotatePolicy,
    ) -> Result<SecretId> {
        content.validate()?;
        if label.is_empty() {
            return Err(SecretsError::invalid_content("secret label cannot be empty"));
        }

        let mut secrets = self.secrets.write().await;
        if secrets.values().any(|s| s.label == label) {
            return Err(SecretsError::already_exists(label));
        }

        let now = Utc::now();
        let id = SecretId::generate();
        secrets.insert(
            id.clone(),
            StoredSecret {
                label: label.to_string(),
                content,
                revision: 1,
                rotate,
                next_rotation: rotate.next_rotation(now),
                grants: BTreeSet::new(),
                created_at: now,
                updated_at: now,
            },
        );
        tracing::info!(secret_id = %id, label = %label, rotate = ?rotate, "Created secret");
        Ok(id)
    }

    async fn get(&self, lookup: &SecretLookup, _refresh: bool) -> Result<SecretContent> {
        let id = self.resolve(lookup).await?;
        let secrets = self.secrets.read().await;
        secrets
            .get(&id)
            .map(|s| s.content.clone())
            .ok_or_else(|| SecretsError::not_found(lookup.to_string()))
    }

    async fn set_content(&self, id: &SecretId, content: SecretContent) -> Result<()> {
        content.validate()?;
        let mut secrets = self.secrets.write().await;
        let secret = secrets.get_mut(id).ok_or_else(|| SecretsError::not_found(id.as_str()))?;

        let now = Utc::now();
        secret.content = content;
        secret.revision += 1;
        secret.updated_at = now;
        secret.next_rotation = secret.rotate.next_rotation(now);
        tracing::info!(secret_id = %id, revision = secret.revision, "Updated secret content");
        Ok(())
    }

    async fn grant(&self, id: &SecretId, relation: RelationId) -> Result<()> {
        let mut secrets = self.secrets.write().await;
        let secret = secrets.get_mut(id).ok_or_else(|| SecretsError::not_found(id.as_str()))?;
        if secret.grants.insert(relation) {
            tracing::info!(secret_id = %id, relation = %relation, "Granted secret access");
        }
        Ok(())
    }

    async fn revoke(&self, id: &SecretId, relation: RelationId) -> Result<()> {
        let mut secrets = self.secrets.write().await;
        let secret = secrets.get_mut(id).ok_or_else(|| SecretsError::not_found(id.as_str()))?;
        if secret.grants.remove(&relation) {
            tracing::info!(secret_id = %id, relation = %relation, "Revoked secret access");
        }
        Ok(())
    }

    async fn find_by_label(&self, label: &str) -> Result<Option<SecretId>> {
        match self.resolve(&SecretLookup::label(label)).await {
            Ok(id) => Ok(Some(id)),
            Err(SecretsError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Read-only view of a store from the consuming side of one or more relations.
///
/// Only identifiers are accepted on lookup: labels belong to the owner.
#[derive(Debug, Clone)]
pub struct GrantedSecretView {
    store: InMemorySecretStore,
    relations: BTreeSet<RelationId>,
}

impl GrantedSecretView {
    pub fn new(store: InMemorySecretStore, relations: impl IntoIterator<Item = RelationId>) -> Self {
        Self { store, relations: relations.into_iter().collect() }
    }

    fn read_only(id: impl Into<String>) -> SecretsError {
        SecretsError::access_denied(id, "secret is owned by the remote application")
    }
}

#[async_trait]
impl SecretStore for GrantedSecretView {
    async fn create(
        &self,
        _content: SecretContent,
        label: &str,
        _rotate: RotatePolicy,
    ) -> Result<SecretId> {
        Err(Self::read_only(label))
    }

    async fn get(&self, lookup: &SecretLookup, refresh: bool) -> Result<SecretContent> {
        let SecretLookup::Id(id) = lookup else {
            return Err(SecretsError::access_denied(
                lookup.to_string(),
                "consumers must look secrets up by identifier",
            ));
        };

        let mut granted = false;
        for relation in &self.relations {
            if self.store.is_granted(id, *relation).await {
                granted = true;
                break;
            }
        }
        if !granted {
            return Err(SecretsError::access_denied(
                id.as_str(),
                "not granted to any relation of this unit",
            ));
        }

        self.store.get(lookup, refresh).await
    }

    async fn set_content(&self, id: &SecretId, _content: SecretContent) -> Result<()> {
        Err(Self::read_only(id.as_str()))
    }

    async fn grant(&self, id: &SecretId, _relation: RelationId) -> Result<()> {
        Err(Self::read_only(id.as_str()))
    }

    async fn revoke(&self, id: &SecretId, _relation: RelationId) -> Result<()> {
        Err(Self::read_only(id.as_str()))
    }

    async fn find_by_label(&self, _label: &str) -> Result<Option<SecretId>> {
        Ok(None)
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

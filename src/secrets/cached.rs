//! Local read cache in front of a [`SecretStore`].
//!
//! Mirrors how a unit keeps the revision it last read: reads with
//! `refresh = false` are served from the cache, reads with `refresh = true`
//! always go to the authoritative store and update the cached copy. Writes go
//! through to the inner store first and only then touch the cache.
//!
//! # Security Considerations
//!
//! - Cached content lives in memory only and is never persisted
//! - Rotation is observed only through refreshing reads; callers that must
//!   see the newest credential pass `refresh = true`

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::error::Result;
use super::store::SecretStore;
use super::types::{RotatePolicy, SecretContent, SecretId, SecretLookup};
use crate::host::RelationId;

/// Secret store wrapper that caches content per lookup key.
///
/// Cache keys are the display form of the [`SecretLookup`], so a secret read
/// both by label and by identifier occupies two entries. Both are dropped when
/// the secret's content is replaced through this wrapper.
pub struct CachedSecretStore<S: SecretStore> {
    inner: S,
    cache: Arc<RwLock<HashMap<String, (SecretId, SecretContent)>>>,
}

impl<S: SecretStore> CachedSecretStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner, cache: Arc::new(RwLock::new(HashMap::new())) }
    }

    #[cfg(test)]
    async fn cache_size(&self) -> usize {
        self.cache.read().await.len()
    }

    async fn evict(&self, id: &SecretId) {
        self.cache.write().await.retain(|_, (cached_id, _)| cached_id != id);
    }
}

#[async_trait]
impl<S: SecretStore> SecretStore for CachedSecretStore<S> {
    async fn create(
        &self,
        content: SecretContent,
        label: &str,
        rotate: RotatePolicy,
    ) -> Result<SecretId> {
        self.inner.create(content, label, rotate).await
    }

    async fn get(&self, lookup: &SecretLookup, refresh: bool) -> Result<SecretContent> {
        let key = lookup.to_string();
        if !refresh {
            let cache = self.cache.read().await;
            if let Some((_, content)) = cache.get(&key) {
                tracing::debug!(key = %key, "Cache hit for secret");
                return Ok(content.clone());
            }
        }

        let content = self.inner.get(lookup, true).await?;
        let id = match lookup {
            SecretLookup::Id(id) => Some(id.clone()),
            SecretLookup::Label(label) => self.inner.find_by_label(label).await?,
        };
        if let Some(id) = id {
            self.cache.write().await.insert(key, (id, content.clone()));
        }
        Ok(content)
    }

    async fn set_content(&self, id: &SecretId, content: SecretContent) -> Result<()> {
        self.inner.set_content(id, content).await?;
        self.evict(id).await;
        Ok(())
    }

    async fn grant(&self, id: &SecretId, relation: RelationId) -> Result<()> {
        self.inner.grant(id, relation).await
    }

    async fn revoke(&self, id: &SecretId, relation: RelationId) -> Result<()> {
        self.inner.revoke(id, relation).await
    }

    async fn find_by_label(&self, label: &str) -> Result<Option<SecretId>> {
        self.inner.find_by_label(label).await
    }
}

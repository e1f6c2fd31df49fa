//! The secret store seam.

use async_trait::async_trait;

use super::error::Result;
use super::types::{RotatePolicy, SecretContent, SecretId, SecretLookup};
use crate::host::RelationId;

/// Named, access-controlled credential bundles provided by the host platform.
///
/// Identifiers returned by [`SecretStore::create`] stay stable for the life of
/// the secret; [`SecretStore::set_content`] replaces the content in place.
///
/// # Security Considerations
///
/// - Implementations MUST NOT log secret values
/// - Errors name identifiers or labels, never content
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Store a new secret under a unique label.
    ///
    /// # Errors
    ///
    /// - [`SecretsError::AlreadyExists`](super::SecretsError::AlreadyExists) if the label is taken
    /// - [`SecretsError::InvalidContent`](super::SecretsError::InvalidContent) for empty content
    async fn create(
        &self,
        content: SecretContent,
        label: &str,
        rotate: RotatePolicy,
    ) -> Result<SecretId>;

    /// Read a secret's content.
    ///
    /// With `refresh = true` the authoritative store is consulted even when a
    /// local copy exists, so out-of-band rotation is observed.
    async fn get(&self, lookup: &SecretLookup, refresh: bool) -> Result<SecretContent>;

    /// Replace a secret's content, keeping its identifier.
    async fn set_content(&self, id: &SecretId, content: SecretContent) -> Result<()>;

    /// Allow the remote side of `relation` to read the secret.
    async fn grant(&self, id: &SecretId, relation: RelationId) -> Result<()>;

    /// Withdraw a grant made with [`SecretStore::grant`].
    async fn revoke(&self, id: &SecretId, relation: RelationId) -> Result<()>;

    /// Resolve a label to an identifier without reading content.
    async fn find_by_label(&self, label: &str) -> Result<Option<SecretId>>;
}

//! Providing side of the `influxdb` relation.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{RelationPhase, CREDS_SECRET_ID_KEY};
use crate::credentials::{self, CredentialBundle};
use crate::errors::{Error, Result};
use crate::events::{HandlerOutcome, RelationEvent};
use crate::host::{Host, Leadership, RelationId};
use crate::observability::metrics;
use crate::provisioning::{CredentialProvisioner, Endpoint};
use crate::secrets::{RotatePolicy, SecretId, SecretStore};

/// Per-relation provisioning state, keyed by relation id.
pub type RelationPhases = BTreeMap<RelationId, RelationPhase>;

/// Handles relation events for the database provider.
pub struct InfluxDbProvides {
    host: Arc<dyn Host>,
    secrets: Arc<dyn SecretStore>,
    provisioner: CredentialProvisioner,
    admin_username: String,
    peer_binding: String,
    port: u16,
}

impl InfluxDbProvides {
    pub fn new(
        host: Arc<dyn Host>,
        secrets: Arc<dyn SecretStore>,
        provisioner: CredentialProvisioner,
        admin_username: impl Into<String>,
        peer_binding: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            host,
            secrets,
            provisioner,
            admin_username: admin_username.into(),
            peer_binding: peer_binding.into(),
            port,
        }
    }

    /// Provision and publish credentials for a newly joined consumer.
    ///
    /// Non-leaders ignore the event. Until the database is installed the event
    /// is deferred without side effects. Any failure defers it as well, and
    /// nothing is published.
    pub async fn on_relation_joined(
        &self,
        event: &RelationEvent,
        installed: bool,
        phases: &mut RelationPhases,
    ) -> HandlerOutcome {
        let leader = match Leadership::check(self.host.as_ref(), "relation-joined").await {
            Ok(Some(leader)) => leader,
            Ok(None) => return HandlerOutcome::Done,
            Err(e) => {
                tracing::warn!(error = %e, "Leadership check failed, deferring");
                return HandlerOutcome::Retry;
            }
        };

        phases.entry(event.relation).or_insert(RelationPhase::Joined);

        if !installed {
            tracing::debug!(relation = %event.relation, "InfluxDB not installed yet, deferring relation-joined");
            return HandlerOutcome::Retry;
        }

        match self.already_published(event.relation).await {
            Ok(Some(id)) => {
                tracing::debug!(relation = %event.relation, secret_id = %id, "Credentials already published");
                phases.insert(event.relation, RelationPhase::Provisioned);
                return HandlerOutcome::Done;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, relation = %event.relation, "Failed to read relation data, deferring");
                return HandlerOutcome::Retry;
            }
        }

        match self.publish_credentials(&leader, event).await {
            Ok(id) => {
                tracing::info!(
                    relation = %event.relation,
                    remote_app = %event.remote_app,
                    secret_id = %id,
                    "Published credential secret reference"
                );
                metrics::record_credentials_published(&event.remote_app);
                phases.insert(event.relation, RelationPhase::Provisioned);
                HandlerOutcome::Done
            }
            Err(e) if e.is_precondition() => {
                tracing::warn!(error = %e, relation = %event.relation, "Precondition not met, deferring");
                HandlerOutcome::Retry
            }
            Err(e) => {
                tracing::error!(error = %e, relation = %event.relation, "Failed to provision credentials, deferring");
                HandlerOutcome::Retry
            }
        }
    }

    /// Clear the published identifier. The user, database and secret are kept.
    pub async fn on_relation_broken(
        &self,
        event: &RelationEvent,
        phases: &mut RelationPhases,
    ) -> HandlerOutcome {
        match Leadership::check(self.host.as_ref(), "relation-broken").await {
            Ok(Some(_)) => {}
            Ok(None) => return HandlerOutcome::Done,
            Err(e) => {
                tracing::warn!(error = %e, "Leadership check failed, ignoring relation-broken");
                return HandlerOutcome::Done;
            }
        }

        if let Err(e) = self.host.update_relation_data(event.relation, CREDS_SECRET_ID_KEY, "").await {
            tracing::debug!(error = %e, relation = %event.relation, "Could not clear relation data");
        }
        phases.insert(event.relation, RelationPhase::Broken);
        tracing::info!(relation = %event.relation, remote_app = %event.remote_app, "Relation broken");
        HandlerOutcome::Done
    }

    async fn already_published(&self, relation: RelationId) -> Result<Option<String>> {
        let data = self.host.relation_data(relation, self.host.app_name()).await?;
        Ok(data
            .and_then(|d| d.get(CREDS_SECRET_ID_KEY).cloned())
            .filter(|id| !id.is_empty()))
    }

    async fn publish_credentials(
        &self,
        leader: &Leadership,
        event: &RelationEvent,
    ) -> Result<SecretId> {
        // Resolve the address first so a missing binding causes no server-side changes.
        let host = self
            .host
            .binding_address(&self.peer_binding)
            .await?
            .ok_or_else(|| Error::ingress_unavailable(&self.peer_binding))?;
        let endpoint = Endpoint { host, port: self.port };

        let admin = credentials::admin_credentials(self.secrets.as_ref(), &self.admin_username).await?;
        let bundle = self.provisioner.provision(leader, &admin, &endpoint).await?;

        match self.store_and_share(event, &bundle).await {
            Ok(id) => Ok(id),
            Err(e) => {
                self.provisioner.discard(&admin, &bundle).await;
                Err(e)
            }
        }
    }

    async fn store_and_share(
        &self,
        event: &RelationEvent,
        bundle: &CredentialBundle,
    ) -> Result<SecretId> {
        let label = credentials::relation_secret_label(&event.remote_app);
        let content = bundle.to_secret_content();

        let id = match self.secrets.find_by_label(&label).await? {
            Some(id) => {
                self.secrets.set_content(&id, content).await?;
                id
            }
            None => self.secrets.create(content, &label, RotatePolicy::Never).await?,
        };

        self.secrets.grant(&id, event.relation).await?;
        self.host.update_relation_data(event.relation, CREDS_SECRET_ID_KEY, id.as_str()).await?;
        Ok(id)
    }
}

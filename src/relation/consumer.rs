//! Consuming side of the `influxdb` relation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::CREDS_SECRET_ID_KEY;
use crate::credentials::CredentialBundle;
use crate::errors::Result;
use crate::events::{HandlerOutcome, RelationEvent};
use crate::host::{Host, RelationId};
use crate::secrets::{SecretId, SecretLookup, SecretStore};

/// Persistent state of a client unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientState {
    #[serde(default)]
    pub install_complete: bool,
    #[serde(default)]
    pub secret_id: Option<SecretId>,
    #[serde(default)]
    pub relation: Option<RelationId>,
}

/// Handles relation events for a credential consumer.
pub struct InfluxDbRequires {
    host: Arc<dyn Host>,
    secrets: Arc<dyn SecretStore>,
}

impl InfluxDbRequires {
    pub fn new(host: Arc<dyn Host>, secrets: Arc<dyn SecretStore>) -> Self {
        Self { host, secrets }
    }

    /// Record the secret identifier the provider published, if any.
    pub async fn on_relation_changed(
        &self,
        event: &RelationEvent,
        state: &mut ClientState,
    ) -> HandlerOutcome {
        let data = match self.host.relation_data(event.relation, &event.remote_app).await {
            Ok(Some(data)) => data,
            Ok(None) => return HandlerOutcome::Done,
            Err(e) => {
                tracing::warn!(error = %e, relation = %event.relation, "Failed to read relation data");
                return HandlerOutcome::Retry;
            }
        };

        let Some(raw) = data.get(CREDS_SECRET_ID_KEY).filter(|v| !v.is_empty()) else {
            tracing::debug!(relation = %event.relation, "No credential reference published yet");
            return HandlerOutcome::Done;
        };

        match SecretId::parse(raw) {
            Ok(id) => {
                tracing::info!(relation = %event.relation, secret_id = %id, "Received credential secret reference");
                state.secret_id = Some(id);
                state.relation = Some(event.relation);
                HandlerOutcome::Done
            }
            Err(e) => {
                tracing::error!(error = %e, relation = %event.relation, "Provider published an invalid reference");
                HandlerOutcome::Failed(e.to_string())
            }
        }
    }

    /// Forget the reference received on a relation that is going away.
    pub fn on_relation_broken(&self, event: &RelationEvent, state: &mut ClientState) -> HandlerOutcome {
        if state.relation == Some(event.relation) {
            state.secret_id = None;
            state.relation = None;
            tracing::info!(relation = %event.relation, "Cleared credential reference");
        }
        HandlerOutcome::Done
    }

    /// Resolve the stored reference to current credentials.
    ///
    /// Always reads the newest revision so rotated credentials are seen.
    pub async fn credentials(&self, state: &ClientState) -> Result<Option<CredentialBundle>> {
        let Some(id) = &state.secret_id else {
            return Ok(None);
        };
        let content = self.secrets.get(&SecretLookup::from(id), true).await?;
        Ok(Some(CredentialBundle::from_secret_content(id.as_str(), &content)?))
    }
}

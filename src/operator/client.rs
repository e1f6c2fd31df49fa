//! Operator for an application that consumes InfluxDB credentials.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::Instrument;

use crate::config::OperatorConfig;
use crate::events::{action_error, ActionRequest, ActionResult, Event, EventHandler, HandlerOutcome};
use crate::host::{Host, UnitStatus};
use crate::observability::metrics;
use crate::relation::{ClientState, InfluxDbRequires};
use crate::secrets::SecretStore;
use crate::{action_span, event_span};

/// Returned by `get-influxdb-creds` before any credentials arrived.
pub const NO_CREDENTIALS_MESSAGE: &str = "No credentials found";

pub struct InfluxDbClientOperator {
    config: OperatorConfig,
    host: Arc<dyn Host>,
    requires: InfluxDbRequires,
    state: ClientState,
}

impl InfluxDbClientOperator {
    pub fn new(
        config: OperatorConfig,
        host: Arc<dyn Host>,
        secrets: Arc<dyn SecretStore>,
        state: ClientState,
    ) -> Self {
        let requires = InfluxDbRequires::new(host.clone(), secrets);
        Self { config, host, requires, state }
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    pub fn into_state(self) -> ClientState {
        self.state
    }

    async fn on_install(&mut self) -> HandlerOutcome {
        self.state.install_complete = true;
        if let Err(e) = self.host.set_status(UnitStatus::Active).await {
            tracing::warn!(error = %e, "Failed to set unit status");
        }
        HandlerOutcome::Done
    }

    /// Run a named action. Only `get-influxdb-creds` is supported.
    pub async fn run_action(&self, request: &ActionRequest) -> ActionResult {
        let span = action_span!(request.name);
        let result = async {
            match request.name.as_str() {
                "get-influxdb-creds" => self.get_influxdb_creds().await,
                other => Err(action_error(format!("unknown action: {}", other))),
            }
        }
        .instrument(span)
        .await;

        metrics::record_action(&request.name, result.is_ok());
        result.unwrap_or_else(|error| error)
    }

    async fn get_influxdb_creds(&self) -> Result<ActionResult, ActionResult> {
        match self.requires.credentials(&self.state).await {
            Ok(Some(bundle)) => Ok(bundle
                .to_secret_content()
                .expose()
                .into_iter()
                .map(|(k, v)| (k, serde_json::Value::String(v)))
                .collect()),
            Ok(None) => Err(action_error(NO_CREDENTIALS_MESSAGE)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read shared credentials");
                Err(action_error(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl EventHandler for InfluxDbClientOperator {
    async fn handle(&mut self, event: &Event) -> HandlerOutcome {
        let span = event_span!(event.name());
        async {
            match event {
                Event::Install => self.on_install().await,
                Event::RelationChanged(rel) if rel.relation_name == self.config.unit.relation_name => {
                    self.requires.on_relation_changed(rel, &mut self.state).await
                }
                Event::RelationBroken(rel) if rel.relation_name == self.config.unit.relation_name => {
                    self.requires.on_relation_broken(rel, &mut self.state)
                }
                _ => HandlerOutcome::Done,
            }
        }
        .instrument(span)
        .await
    }
}

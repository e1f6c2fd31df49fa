//! Lifecycle controller for the database unit.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use super::{INSTALLING_MESSAGE, INSTALL_FAILED_MESSAGE};
use crate::config::OperatorConfig;
use crate::credentials::{self, Credentials, ADMIN_SECRET_LABEL};
use crate::errors::{Error, Result};
use crate::event_span;
use crate::events::{Event, EventHandler, HandlerOutcome};
use crate::host::{Host, Leadership, Protocol, UnitStatus};
use crate::influxdb::{InfluxDbAdmin, Installer};
use crate::observability::{check_influxdb, metrics};
use crate::provisioning::CredentialProvisioner;
use crate::relation::provider::RelationPhases;
use crate::relation::InfluxDbProvides;
use crate::secrets::{RotatePolicy, SecretContent, SecretId, SecretStore};

/// Persistent state of the database unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatorState {
    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub admin_secret_id: Option<SecretId>,
    #[serde(default)]
    pub admin_user_created: bool,
    #[serde(default)]
    pub relations: RelationPhases,
}

pub struct InfluxDbOperator {
    pub(super) config: OperatorConfig,
    pub(super) host: Arc<dyn Host>,
    pub(super) secrets: Arc<dyn SecretStore>,
    pub(super) admin: Arc<dyn InfluxDbAdmin>,
    installer: Arc<dyn Installer>,
    provides: InfluxDbProvides,
    state: OperatorState,
}

impl InfluxDbOperator {
    pub fn new(
        config: OperatorConfig,
        host: Arc<dyn Host>,
        secrets: Arc<dyn SecretStore>,
        admin: Arc<dyn InfluxDbAdmin>,
        installer: Arc<dyn Installer>,
        state: OperatorState,
    ) -> Self {
        let provisioner = CredentialProvisioner::new(admin.clone(), config.provisioning.clone());
        let provides = InfluxDbProvides::new(
            host.clone(),
            secrets.clone(),
            provisioner,
            config.influxdb.admin_username.clone(),
            config.unit.peer_binding.clone(),
            config.influxdb.port,
        );
        Self { config, host, secrets, admin, installer, provides, state }
    }

    pub fn state(&self) -> &OperatorState {
        &self.state
    }

    pub fn into_state(self) -> OperatorState {
        self.state
    }

    /// Current admin credentials, read from the authoritative store.
    pub(super) async fn admin_credentials(&self) -> Result<Credentials> {
        Ok(credentials::admin_credentials(self.secrets.as_ref(), &self.config.influxdb.admin_username)
            .await?)
    }

    async fn set_status(&self, status: UnitStatus) {
        if let Err(e) = self.host.set_status(status).await {
            tracing::warn!(error = %e, "Failed to set unit status");
        }
    }

    async fn on_install(&mut self) -> HandlerOutcome {
        self.set_status(UnitStatus::waiting(INSTALLING_MESSAGE)).await;

        if let Err(e) = self.installer.install().await {
            tracing::error!(error = %e, "InfluxDB install failed");
            self.set_status(UnitStatus::blocked(INSTALL_FAILED_MESSAGE)).await;
            return HandlerOutcome::Retry;
        }

        match Leadership::check(self.host.as_ref(), "install").await {
            Ok(Some(leader)) => {
                if let Err(e) = self.bootstrap_admin(&leader).await {
                    tracing::error!(error = %e, "Admin user bootstrap failed");
                    self.set_status(UnitStatus::blocked(INSTALL_FAILED_MESSAGE)).await;
                    return HandlerOutcome::Retry;
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Leadership check failed, deferring install");
                return HandlerOutcome::Retry;
            }
        }

        if let Err(e) = self.installer.write_config_and_restart().await {
            tracing::error!(error = %e, "Writing InfluxDB configuration failed");
            self.set_status(UnitStatus::blocked(INSTALL_FAILED_MESSAGE)).await;
            return HandlerOutcome::Retry;
        }

        self.state.installed = true;
        tracing::info!("InfluxDB installed");
        self.on_update_status().await
    }

    /// Create the admin secret if needed, then the admin user.
    ///
    /// The secret is written before the user so a crash in between leaves a
    /// password that can still be used on replay.
    async fn bootstrap_admin(&mut self, _leader: &Leadership) -> Result<()> {
        let id = match self.secrets.find_by_label(ADMIN_SECRET_LABEL).await? {
            Some(id) => id,
            None => {
                let content =
                    SecretContent::new().with("password", credentials::generate_password());
                self.secrets.create(content, ADMIN_SECRET_LABEL, RotatePolicy::Daily).await?
            }
        };
        self.state.admin_secret_id = Some(id);

        if !self.state.admin_user_created {
            tracing::debug!("Creating influxdb admin user.");
            let admin = self.admin_credentials().await?;
            self.admin.create_user(None, &admin.username, &admin.password, true).await?;
            self.state.admin_user_created = true;
        }
        Ok(())
    }

    async fn on_start(&mut self) -> HandlerOutcome {
        if let Err(e) = self.host.open_port(Protocol::Tcp, self.config.influxdb.port).await {
            tracing::warn!(error = %e, port = self.config.influxdb.port, "Failed to open port");
        }

        let health = check_influxdb(self.admin.as_ref()).await;
        if let Some(version) = health.version() {
            if let Err(e) = self.host.set_workload_version(version).await {
                tracing::warn!(error = %e, "Failed to set workload version");
            }
        }
        HandlerOutcome::Done
    }

    async fn on_update_status(&mut self) -> HandlerOutcome {
        let health = check_influxdb(self.admin.as_ref()).await;
        self.set_status(health.unit_status()).await;
        HandlerOutcome::Done
    }

    async fn on_secret_rotate(&mut self, secret: &SecretId, label: &str) -> HandlerOutcome {
        if label != ADMIN_SECRET_LABEL {
            tracing::debug!(label = %label, "Ignoring rotation of secret not owned by this handler");
            return HandlerOutcome::Done;
        }
        let leader = match Leadership::check(self.host.as_ref(), "secret-rotate").await {
            Ok(Some(leader)) => leader,
            Ok(None) => return HandlerOutcome::Done,
            Err(e) => {
                tracing::warn!(error = %e, "Leadership check failed, deferring rotation");
                return HandlerOutcome::Retry;
            }
        };

        match self.rotate_admin_password(&leader, secret).await {
            Ok(()) => {
                metrics::record_secret_rotation(true);
                tracing::info!(secret_id = %secret, "Rotated admin password");
                HandlerOutcome::Done
            }
            Err(e) => {
                metrics::record_secret_rotation(false);
                tracing::error!(error = %e, secret_id = %secret, "Admin password rotation failed");
                HandlerOutcome::Failed(e.to_string())
            }
        }
    }

    /// Change the admin password in the database, then in the secret.
    ///
    /// If the secret cannot be updated the database change is reverted, so the
    /// stored password always works.
    async fn rotate_admin_password(&self, _leader: &Leadership, secret: &SecretId) -> Result<()> {
        let current = self.admin_credentials().await?;
        let next = credentials::generate_password();

        self.admin.set_password(Some(&current), &current.username, &next).await?;

        let content = SecretContent::new().with("password", next.clone());
        if let Err(e) = self.secrets.set_content(secret, content).await {
            let rotated = Credentials::new(current.username.clone(), next);
            if let Err(revert) =
                self.admin.set_password(Some(&rotated), &current.username, &current.password).await
            {
                tracing::error!(error = %revert, "Failed to revert admin password after secret update failure");
                return Err(Error::internal(format!(
                    "admin password changed but not stored ({}); revert failed ({})",
                    e, revert
                )));
            }
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for InfluxDbOperator {
    async fn handle(&mut self, event: &Event) -> HandlerOutcome {
        let span = event_span!(event.name());
        async {
            match event {
                Event::Install => self.on_install().await,
                Event::Start => self.on_start().await,
                Event::UpdateStatus => self.on_update_status().await,
                Event::SecretRotate { secret, label } => self.on_secret_rotate(secret, label).await,
                Event::RelationJoined(rel) if rel.relation_name == self.config.unit.relation_name => {
                    self.provides
                        .on_relation_joined(rel, self.state.installed, &mut self.state.relations)
                        .await
                }
                Event::RelationBroken(rel) if rel.relation_name == self.config.unit.relation_name => {
                    self.provides.on_relation_broken(rel, &mut self.state.relations).await
                }
                Event::RelationJoined(_) | Event::RelationChanged(_) | Event::RelationBroken(_) => {
                    HandlerOutcome::Done
                }
            }
        }
        .instrument(span)
        .await
    }
}

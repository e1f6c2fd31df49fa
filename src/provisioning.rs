//! # Credential Provisioning
//!
//! Creates a scoped user and database for one consumer:
//!
//! 1. `CREATE USER` with a fresh random name and password
//! 2. `CREATE DATABASE` with a fresh random name
//! 3. `GRANT ALL` on that database to that user
//! 4. `CREATE RETENTION POLICY` on that database, as default
//!
//! The first failing step fails the whole call. When
//! `rollback_on_failure` is set, whatever this call created is dropped again
//! on a best-effort basis before the original error is returned.

use std::sync::Arc;

use crate::config::ProvisioningConfig;
use crate::credentials::{self, CredentialBundle, Credentials};
use crate::errors::Result;
use crate::host::Leadership;
use crate::influxdb::{InfluxDbAdmin, Privilege};

/// Address a consumer should connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

/// Provisions per-consumer users and databases.
#[derive(Clone)]
pub struct CredentialProvisioner {
    admin: Arc<dyn InfluxDbAdmin>,
    config: ProvisioningConfig,
}

impl CredentialProvisioner {
    pub fn new(admin: Arc<dyn InfluxDbAdmin>, config: ProvisioningConfig) -> Self {
        Self { admin, config }
    }

    /// Provision a new user and database and return the bundle describing them.
    ///
    /// Nothing is persisted or published here; the caller owns that.
    pub async fn provision(
        &self,
        _leader: &Leadership,
        auth: &Credentials,
        endpoint: &Endpoint,
    ) -> Result<CredentialBundle> {
        let policy = self.config.retention_policy();
        let bundle = CredentialBundle {
            username: credentials::generate_username(),
            password: credentials::generate_password(),
            host: endpoint.host.clone(),
            port: endpoint.port,
            database: credentials::generate_database_name(),
            policy: policy.name.clone(),
        };

        let mut created = Created::default();
        let result: Result<()> = async {
            self.admin.create_user(Some(auth), &bundle.username, &bundle.password, false).await?;
            created.user = true;
            self.admin.create_database(Some(auth), &bundle.database).await?;
            created.database = true;
            self.admin
                .grant_privilege(Some(auth), Privilege::All, &bundle.database, &bundle.username)
                .await?;
            self.admin.create_retention_policy(Some(auth), &bundle.database, &policy).await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                tracing::info!(
                    username = %bundle.username,
                    database = %bundle.database,
                    policy = %bundle.policy,
                    "Provisioned database credentials"
                );
                Ok(bundle)
            }
            Err(e) => {
                tracing::error!(error = %e, username = %bundle.username, database = %bundle.database, "Provisioning failed");
                if self.config.rollback_on_failure {
                    self.rollback(auth, &bundle, created).await;
                }
                Err(e)
            }
        }
    }

    /// Drop a bundle that was provisioned but could not be handed out.
    pub async fn discard(&self, auth: &Credentials, bundle: &CredentialBundle) {
        if self.config.rollback_on_failure {
            self.rollback(auth, bundle, Created { user: true, database: true }).await;
        }
    }

    async fn rollback(&self, auth: &Credentials, bundle: &CredentialBundle, created: Created) {
        if created.database {
            if let Err(e) = self.admin.drop_database(Some(auth), &bundle.database).await {
                tracing::warn!(error = %e, database = %bundle.database, "Rollback: failed to drop database");
            }
        }
        if created.user {
            if let Err(e) = self.admin.drop_user(Some(auth), &bundle.username).await {
                tracing::warn!(error = %e, username = %bundle.username, "Rollback: failed to drop user");
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Created {
    user: bool,
    database: bool,
}

//! Administrative actions of the database unit.
//!
//! Every action returns a JSON map. Failures come back as `{"error": ...}`
//! rather than as a Rust error, because the caller is an operator at a
//! terminal, not code.

use serde_json::{json, Value};
use tracing::Instrument;

use super::server::InfluxDbOperator;
use crate::action_span;
use crate::credentials::{self, ADMIN_SECRET_LABEL};
use crate::errors::Error;
use crate::events::{action_error, action_result, ActionRequest, ActionResult};
use crate::host::Leadership;
use crate::influxdb::Privilege;
use crate::observability::metrics;
use crate::secrets::{RotatePolicy, SecretContent, SecretLookup, SecretString};

/// Returned when a mutating action runs on a non-leader unit.
pub const NOT_LEADER_MESSAGE: &str = "This action must be run on the leader unit.";

/// Names of every action the database unit understands.
pub const SERVER_ACTIONS: &[&str] = &[
    "get-admin-password",
    "get-user-password",
    "update-user-password",
    "create-user",
    "drop-user",
    "list-users",
    "create-database",
    "drop-database",
    "list-databases",
    "grant-privilege",
    "revoke-privilege",
    "list-privileges",
];

type ActionOutcome = std::result::Result<ActionResult, ActionResult>;

impl InfluxDbOperator {
    /// Run a named action.
    pub async fn run_action(&self, request: &ActionRequest) -> ActionResult {
        let span = action_span!(request.name);
        let outcome = async {
            match request.name.as_str() {
                "get-admin-password" => self.get_admin_password().await,
                "get-user-password" => self.get_user_password(request).await,
                "update-user-password" => self.update_user_password(request).await,
                "create-user" => self.create_user(request).await,
                "drop-user" => self.drop_user(request).await,
                "list-users" => self.list_users().await,
                "create-database" => self.create_database(request).await,
                "drop-database" => self.drop_database(request).await,
                "list-databases" => self.list_databases().await,
                "grant-privilege" => self.change_privilege(request, true).await,
                "revoke-privilege" => self.change_privilege(request, false).await,
                "list-privileges" => self.list_privileges(request).await,
                other => Err(action_error(format!("unknown action: {}", other))),
            }
        }
        .instrument(span)
        .await;

        metrics::record_action(&request.name, outcome.is_ok());
        match outcome {
            Ok(result) => result,
            Err(error) => {
                tracing::warn!(action = %request.name, error = ?error.get("error"), "Action failed");
                error
            }
        }
    }

    async fn require_leader(&self) -> std::result::Result<Leadership, ActionResult> {
        match Leadership::check(self.host.as_ref(), "action").await {
            Ok(Some(leader)) => Ok(leader),
            Ok(None) => Err(action_error(NOT_LEADER_MESSAGE)),
            Err(e) => Err(failed(e)),
        }
    }

    async fn auth(&self) -> std::result::Result<credentials::Credentials, ActionResult> {
        self.admin_credentials().await.map_err(failed)
    }

    async fn get_admin_password(&self) -> ActionOutcome {
        let content = self
            .secrets
            .get(&SecretLookup::label(ADMIN_SECRET_LABEL), true)
            .await
            .map_err(|e| failed(e.into()))?;
        let password = content.require(ADMIN_SECRET_LABEL, "password").map_err(|e| failed(e.into()))?;
        Ok(action_result("password", password.expose_secret()))
    }

    async fn get_user_password(&self, request: &ActionRequest) -> ActionOutcome {
        let username = request.param("username")?;
        let label = credentials::user_secret_label(username);
        let content =
            self.secrets.get(&SecretLookup::label(&label), true).await.map_err(|e| failed(e.into()))?;
        let password = content.require(&label, "password").map_err(|e| failed(e.into()))?;
        Ok(action_result("password", password.expose_secret()))
    }

    /// Set the password in the database first, then record it.
    async fn update_user_password(&self, request: &ActionRequest) -> ActionOutcome {
        let username = request.param("username")?;
        let password = SecretString::new(request.param("password")?);
        self.require_leader().await?;

        let label = credentials::user_secret_label(username);
        let id = self
            .secrets
            .find_by_label(&label)
            .await
            .map_err(|e| failed(e.into()))?
            .ok_or_else(|| action_error(format!("No secret found for user: {}.", username)))?;

        let auth = self.auth().await?;
        self.admin.set_password(Some(&auth), username, &password).await.map_err(failed)?;

        let content = SecretContent::new().with("username", username).with("password", password);
        self.secrets.set_content(&id, content).await.map_err(|e| failed(e.into()))?;

        Ok(action_result("result", format!("Success. Updated password for: {}.", username)))
    }

    async fn create_user(&self, request: &ActionRequest) -> ActionOutcome {
        let username = request.param("username")?;
        self.require_leader().await?;

        let label = credentials::user_secret_label(username);
        if self.secrets.find_by_label(&label).await.map_err(|e| failed(e.into()))?.is_some() {
            return Err(action_error(format!("User secret already exists: {}.", label)));
        }

        let auth = self.auth().await?;
        let password = credentials::generate_password();
        self.admin.create_user(Some(&auth), username, &password, false).await.map_err(failed)?;

        let content =
            SecretContent::new().with("username", username).with("password", password.clone());
        if let Err(e) = self.secrets.create(content, &label, RotatePolicy::Never).await {
            if let Err(drop_err) = self.admin.drop_user(Some(&auth), username).await {
                tracing::warn!(error = %drop_err, username = %username, "Failed to drop user after secret creation failure");
            }
            return Err(failed(e.into()));
        }

        Ok(action_result(
            "results",
            json!({"username": username, "password": password.expose_secret()}),
        ))
    }

    async fn drop_user(&self, request: &ActionRequest) -> ActionOutcome {
        let username = request.param("username")?;
        self.require_leader().await?;
        let auth = self.auth().await?;
        self.admin.drop_user(Some(&auth), username).await.map_err(failed)?;
        Ok(action_result("result", format!("Success. Dropped user: {}.", username)))
    }

    async fn list_users(&self) -> ActionOutcome {
        let auth = self.auth().await?;
        let users = self.admin.list_users(Some(&auth)).await.map_err(failed)?;
        Ok(action_result("result", serde_json::to_value(users).map_err(|e| failed(e.into()))?))
    }

    /// Create a database and its default retention policy.
    async fn create_database(&self, request: &ActionRequest) -> ActionOutcome {
        let database = request.param("database")?;
        self.require_leader().await?;
        let auth = self.auth().await?;

        self.admin.create_database(Some(&auth), database).await.map_err(failed)?;
        let policy = self.config.provisioning.retention_policy();
        self.admin
            .create_retention_policy(Some(&auth), database, &policy)
            .await
            .map_err(failed)?;

        Ok(action_result("result", format!("Success. Created database: {}.", database)))
    }

    async fn drop_database(&self, request: &ActionRequest) -> ActionOutcome {
        let database = request.param("database")?;
        self.require_leader().await?;
        let auth = self.auth().await?;
        self.admin.drop_database(Some(&auth), database).await.map_err(failed)?;
        Ok(action_result("result", format!("Success. Dropped database: {}.", database)))
    }

    async fn list_databases(&self) -> ActionOutcome {
        let auth = self.auth().await?;
        let databases = self.admin.list_databases(Some(&auth)).await.map_err(failed)?;
        Ok(action_result("result", Value::from(databases)))
    }

    async fn change_privilege(&self, request: &ActionRequest, grant: bool) -> ActionOutcome {
        let username = request.param("username")?;
        let database = request.param("database")?;
        let raw = request.param("privilege")?;
        let privilege: Privilege = raw.parse().map_err(failed)?;
        self.require_leader().await?;
        let auth = self.auth().await?;

        let message = if grant {
            self.admin
                .grant_privilege(Some(&auth), privilege, database, username)
                .await
                .map_err(failed)?;
            format!("Success. Granted {} '{}' on {}.", username, raw, database)
        } else {
            self.admin
                .revoke_privilege(Some(&auth), privilege, database, username)
                .await
                .map_err(failed)?;
            format!("Success. Revoked {} '{}' on {}.", username, raw, database)
        };
        Ok(action_result("result", message))
    }

    async fn list_privileges(&self, request: &ActionRequest) -> ActionOutcome {
        let username = request.param("username")?;
        let auth = self.auth().await?;
        let grants = self.admin.list_privileges(Some(&auth), username).await.map_err(failed)?;
        Ok(action_result("result", serde_json::to_value(grants).map_err(|e| failed(e.into()))?))
    }
}

fn failed(error: Error) -> ActionResult {
    action_error(error.to_string())
}

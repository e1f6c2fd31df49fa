//! HTTP administration client for InfluxDB 1.x.
//!
//! Statements go to `/query`: mutations as `POST` with a form body, reads as
//! `GET` with query parameters. Credentials travel as the `u` and `p`
//! parameters. Each call builds its own connection and keeps nothing idle, so
//! the connection is released on success and error alike.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use super::query::{self, Privilege, RetentionPolicy};
use super::AdminOperation;
use crate::credentials::Credentials;
use crate::errors::{Error, Result};
use crate::observability::metrics;
use crate::secrets::SecretString;

/// A user as reported by `SHOW USERS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub user: String,
    pub admin: bool,
}

/// A database grant as reported by `SHOW GRANTS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegeGrant {
    pub database: String,
    pub privilege: String,
}

/// Administrative operations against a running InfluxDB instance.
///
/// `auth` is `None` only while bootstrapping the first admin user, when the
/// server still accepts unauthenticated statements.
#[async_trait]
pub trait InfluxDbAdmin: Send + Sync {
    /// Health check. Returns the server version on success.
    async fn ping(&self) -> Result<String>;

    async fn create_user(
        &self,
        auth: Option<&Credentials>,
        username: &str,
        password: &SecretString,
        admin: bool,
    ) -> Result<()>;

    async fn drop_user(&self, auth: Option<&Credentials>, username: &str) -> Result<()>;

    async fn set_password(
        &self,
        auth: Option<&Credentials>,
        username: &str,
        password: &SecretString,
    ) -> Result<()>;

    async fn list_users(&self, auth: Option<&Credentials>) -> Result<Vec<UserInfo>>;

    async fn create_database(&self, auth: Option<&Credentials>, database: &str) -> Result<()>;

    async fn drop_database(&self, auth: Option<&Credentials>, database: &str) -> Result<()>;

    async fn list_databases(&self, auth: Option<&Credentials>) -> Result<Vec<String>>;

    async fn grant_privilege(
        &self,
        auth: Option<&Credentials>,
        privilege: Privilege,
        database: &str,
        username: &str,
    ) -> Result<()>;

    async fn revoke_privilege(
        &self,
        auth: Option<&Credentials>,
        privilege: Privilege,
        database: &str,
        username: &str,
    ) -> Result<()>;

    async fn list_privileges(
        &self,
        auth: Option<&Credentials>,
        username: &str,
    ) -> Result<Vec<PrivilegeGrant>>;

    async fn create_retention_policy(
        &self,
        auth: Option<&Credentials>,
        database: &str,
        policy: &RetentionPolicy,
    ) -> Result<()>;
}

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<Series>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Series {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl Series {
    fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// [`InfluxDbAdmin`] over the InfluxDB 1.x HTTP API.
#[derive(Debug, Clone)]
pub struct HttpInfluxDbClient {
    base_url: Url,
    timeout: Duration,
}

impl HttpInfluxDbClient {
    /// Client for `http://<host>:<port>`.
    pub fn new(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(&format!("http://{}:{}", host, port))
            .map_err(|e| Error::config(format!("Invalid InfluxDB address {}:{}: {}", host, port, e)))?;
        Ok(Self { base_url, timeout })
    }

    /// Client for an explicit base URL, e.g. a mock server in tests.
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::config(format!("Invalid InfluxDB URL '{}': {}", base_url, e)))?;
        Ok(Self { base_url, timeout })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn http(&self, operation: AdminOperation, target: &str) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| Error::admin(operation, target, format!("HTTP client setup failed: {}", e)))
    }

    fn endpoint(&self, path: &str, operation: AdminOperation, target: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::admin(operation, target, format!("invalid endpoint: {}", e)))
    }

    /// Run one statement and return its result set.
    async fn execute(
        &self,
        operation: AdminOperation,
        target: &str,
        auth: Option<&Credentials>,
        method: Method,
        statement: String,
    ) -> Result<StatementResult> {
        let result = self.send_statement(operation, target, auth, method, statement).await;
        metrics::record_admin_operation(operation, result.is_ok());
        result
    }

    async fn send_statement(
        &self,
        operation: AdminOperation,
        target: &str,
        auth: Option<&Credentials>,
        method: Method,
        statement: String,
    ) -> Result<StatementResult> {
        let fail = |reason: String| Error::admin(operation, target, reason);

        let client = self.http(operation, target)?;
        let url = self.endpoint("query", operation, target)?;

        let mut params: Vec<(&str, &str)> = vec![("q", statement.as_str())];
        if let Some(creds) = auth {
            params.push(("u", creds.username.as_str()));
            params.push(("p", creds.password.expose_secret()));
        }

        let request = if method == Method::GET {
            client.get(url).query(&params)
        } else {
            client.post(url).form(&params)
        };

        tracing::debug!(operation = %operation, target = %target, "Sending InfluxDB statement");
        let response = request.send().await.map_err(|e| fail(format!("request failed: {}", e)))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| fail(format!("reading response failed: {}", e)))?;

        let parsed: QueryResponse = if body.trim().is_empty() {
            QueryResponse::default()
        } else {
            serde_json::from_str(&body).map_err(|e| {
                if status.is_success() {
                    fail(format!("malformed response: {}", e))
                } else {
                    fail(format!("HTTP {}", status))
                }
            })?
        };

        if let Some(error) = parsed.error {
            return Err(fail(error));
        }
        if !status.is_success() {
            return Err(fail(format!("HTTP {}", status)));
        }

        let result = parsed.results.into_iter().next().unwrap_or_default();
        if let Some(error) = result.error {
            return Err(fail(error));
        }
        Ok(result)
    }
}

#[async_trait]
impl InfluxDbAdmin for HttpInfluxDbClient {
    async fn ping(&self) -> Result<String> {
        let operation = AdminOperation::Ping;
        let target = self.base_url.as_str().to_string();
        let client = self.http(operation, &target)?;
        let url = self.endpoint("ping", operation, &target)?;

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::admin(operation, &target, format!("request failed: {}", e)))?;

        if response.status() != StatusCode::NO_CONTENT {
            return Err(Error::admin(
                operation,
                &target,
                format!("unexpected status {}", response.status()),
            ));
        }

        let version = response
            .headers()
            .get("X-Influxdb-Version")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        Ok(version)
    }

    async fn create_user(
        &self,
        auth: Option<&Credentials>,
        username: &str,
        password: &SecretString,
        admin: bool,
    ) -> Result<()> {
        let operation =
            if admin { AdminOperation::CreateAdminUser } else { AdminOperation::CreateUser };
        let statement = query::create_user(username, password.expose_secret(), admin);
        self.execute(operation, username, auth, Method::POST, statement).await?;
        tracing::info!(username = %username, admin = admin, "Created InfluxDB user");
        Ok(())
    }

    async fn drop_user(&self, auth: Option<&Credentials>, username: &str) -> Result<()> {
        self.execute(AdminOperation::DropUser, username, auth, Method::POST, query::drop_user(username))
            .await?;
        tracing::info!(username = %username, "Dropped InfluxDB user");
        Ok(())
    }

    async fn set_password(
        &self,
        auth: Option<&Credentials>,
        username: &str,
        password: &SecretString,
    ) -> Result<()> {
        let statement = query::set_password(username, password.expose_secret());
        self.execute(AdminOperation::SetPassword, username, auth, Method::POST, statement).await?;
        tracing::info!(username = %username, "Updated InfluxDB user password");
        Ok(())
    }

    async fn list_users(&self, auth: Option<&Credentials>) -> Result<Vec<UserInfo>> {
        let result = self
            .execute(AdminOperation::ListUsers, "users", auth, Method::GET, query::show_users())
            .await?;

        let mut users = Vec::new();
        for series in &result.series {
            let user_col = series.column("user");
            let admin_col = series.column("admin");
            for row in &series.values {
                let Some(user) = user_col.and_then(|i| row.get(i)).and_then(|v| v.as_str()) else {
                    continue;
                };
                let admin =
                    admin_col.and_then(|i| row.get(i)).and_then(|v| v.as_bool()).unwrap_or(false);
                users.push(UserInfo { user: user.to_string(), admin });
            }
        }
        Ok(users)
    }

    async fn create_database(&self, auth: Option<&Credentials>, database: &str) -> Result<()> {
        let statement = query::create_database(database);
        self.execute(AdminOperation::CreateDatabase, database, auth, Method::POST, statement).await?;
        tracing::info!(database = %database, "Created InfluxDB database");
        Ok(())
    }

    async fn drop_database(&self, auth: Option<&Credentials>, database: &str) -> Result<()> {
        let statement = query::drop_database(database);
        self.execute(AdminOperation::DropDatabase, database, auth, Method::POST, statement).await?;
        tracing::info!(database = %database, "Dropped InfluxDB database");
        Ok(())
    }

    async fn list_databases(&self, auth: Option<&Credentials>) -> Result<Vec<String>> {
        let result = self
            .execute(
                AdminOperation::ListDatabases,
                "databases",
                auth,
                Method::GET,
                query::show_databases(),
            )
            .await?;

        Ok(result
            .series
            .iter()
            .flat_map(|series| {
                let name_col = series.column("name").unwrap_or(0);
                series
                    .values
                    .iter()
                    .filter_map(move |row| row.get(name_col).and_then(|v| v.as_str()))
                    .map(str::to_string)
            })
            .collect())
    }

    async fn grant_privilege(
        &self,
        auth: Option<&Credentials>,
        privilege: Privilege,
        database: &str,
        username: &str,
    ) -> Result<()> {
        let statement = query::grant(privilege, database, username);
        self.execute(AdminOperation::GrantPrivilege, username, auth, Method::POST, statement)
            .await?;
        tracing::info!(username = %username, database = %database, privilege = %privilege, "Granted privilege");
        Ok(())
    }

    async fn revoke_privilege(
        &self,
        auth: Option<&Credentials>,
        privilege: Privilege,
        database: &str,
        username: &str,
    ) -> Result<()> {
        let statement = query::revoke(privilege, database, username);
        self.execute(AdminOperation::RevokePrivilege, username, auth, Method::POST, statement)
            .await?;
        tracing::info!(username = %username, database = %database, privilege = %privilege, "Revoked privilege");
        Ok(())
    }

    async fn list_privileges(
        &self,
        auth: Option<&Credentials>,
        username: &str,
    ) -> Result<Vec<PrivilegeGrant>> {
        let result = self
            .execute(
                AdminOperation::ListPrivileges,
                username,
                auth,
                Method::GET,
                query::show_grants(username),
            )
            .await?;

        let mut grants = Vec::new();
        for series in &result.series {
            let (Some(db_col), Some(priv_col)) = (series.column("database"), series.column("privilege"))
            else {
                continue;
            };
            for row in &series.values {
                if let (Some(database), Some(privilege)) = (
                    row.get(db_col).and_then(|v| v.as_str()),
                    row.get(priv_col).and_then(|v| v.as_str()),
                ) {
                    grants.push(PrivilegeGrant {
                        database: database.to_string(),
                        privilege: privilege.to_string(),
                    });
                }
            }
        }
        Ok(grants)
    }

    async fn create_retention_policy(
        &self,
        auth: Option<&Credentials>,
        database: &str,
        policy: &RetentionPolicy,
    ) -> Result<()> {
        let statement = query::create_retention_policy(database, policy);
        self.execute(AdminOperation::CreateRetentionPolicy, database, auth, Method::POST, statement)
            .await?;
        tracing::info!(database = %database, policy = %policy.name, duration = %policy.duration, "Created retention policy");
        Ok(())
    }
}

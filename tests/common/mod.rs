//! Common test utilities for all integration tests.
//!
//! Provides an in-process InfluxDB that enforces authentication, a scripted
//! installer and a fixture that wires both into an operator.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use influxdb_operator::config::OperatorConfig;
use influxdb_operator::credentials::Credentials;
use influxdb_operator::errors::{Error, Result};
use influxdb_operator::host::LocalHost;
use influxdb_operator::influxdb::{
    AdminOperation, InfluxDbAdmin, Installer, Privilege, PrivilegeGrant, RetentionPolicy, UserInfo,
};
use influxdb_operator::operator::{InfluxDbOperator, OperatorState};
use influxdb_operator::secrets::{InMemorySecretStore, SecretString};

#[derive(Debug, Default)]
struct FakeState {
    users: BTreeMap<String, (String, bool)>,
    databases: BTreeSet<String>,
    grants: BTreeMap<(String, String), Privilege>,
    policies: BTreeMap<String, RetentionPolicy>,
    fail_on: BTreeSet<AdminOperation>,
    reachable: bool,
    privilege_calls: Vec<PrivilegeCall>,
}

/// One grant or revoke statement as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegeCall {
    pub operation: AdminOperation,
    pub privilege: Privilege,
    pub database: String,
    pub username: String,
}

/// InfluxDB stand-in with real authentication semantics.
///
/// Unauthenticated calls succeed only while no admin user exists.
#[derive(Clone, Debug)]
pub struct FakeInfluxDb {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeInfluxDb {
    fn default() -> Self {
        let state = FakeState { reachable: true, ..FakeState::default() };
        Self { state: Arc::new(Mutex::new(state)) }
    }
}

impl FakeInfluxDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, operation: AdminOperation) {
        self.state.lock().unwrap().fail_on.insert(operation);
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().fail_on.clear();
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().unwrap().reachable = reachable;
    }

    pub fn has_user(&self, username: &str) -> bool {
        self.state.lock().unwrap().users.contains_key(username)
    }

    pub fn user_count(&self) -> usize {
        self.state.lock().unwrap().users.len()
    }

    pub fn database_count(&self) -> usize {
        self.state.lock().unwrap().databases.len()
    }

    pub fn has_database(&self, database: &str) -> bool {
        self.state.lock().unwrap().databases.contains(database)
    }

    pub fn privilege(&self, username: &str, database: &str) -> Option<Privilege> {
        self.state
            .lock()
            .unwrap()
            .grants
            .get(&(username.to_string(), database.to_string()))
            .copied()
    }

    pub fn privilege_calls(&self) -> Vec<PrivilegeCall> {
        self.state.lock().unwrap().privilege_calls.clone()
    }

    pub fn policy(&self, database: &str) -> Option<RetentionPolicy> {
        self.state.lock().unwrap().policies.get(database).cloned()
    }

    /// Whether `username` can log in with `password`.
    pub fn accepts(&self, username: &str, password: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .users
            .get(username)
            .is_some_and(|(stored, _)| stored == password)
    }

    fn check(&self, operation: AdminOperation, auth: Option<&Credentials>) -> Result<()> {
        let state = self.state.lock().unwrap();
        if !state.reachable {
            return Err(Error::admin(operation, "influxdb", "connection refused"));
        }
        if state.fail_on.contains(&operation) {
            return Err(Error::admin(operation, "influxdb", "injected failure"));
        }
        let has_admin = state.users.values().any(|(_, admin)| *admin);
        match auth {
            None if !has_admin => Ok(()),
            None => Err(Error::admin(operation, "influxdb", "unable to parse authentication credentials")),
            Some(creds) => match state.users.get(&creds.username) {
                Some((password, true)) if password == creds.password.expose_secret() => Ok(()),
                _ => Err(Error::admin(operation, "influxdb", "authorization failed")),
            },
        }
    }
}

#[async_trait]
impl InfluxDbAdmin for FakeInfluxDb {
    async fn ping(&self) -> Result<String> {
        if self.state.lock().unwrap().reachable {
            Ok("1.8.10".to_string())
        } else {
            Err(Error::admin(AdminOperation::Ping, "influxdb", "connection refused"))
        }
    }

    async fn create_user(
        &self,
        auth: Option<&Credentials>,
        username: &str,
        password: &SecretString,
        admin: bool,
    ) -> Result<()> {
        let operation = if admin { AdminOperation::CreateAdminUser } else { AdminOperation::CreateUser };
        self.check(operation, auth)?;
        let mut state = self.state.lock().unwrap();
        if state.users.contains_key(username) {
            return Err(Error::admin(operation, username, "user already exists"));
        }
        state.users.insert(username.to_string(), (password.expose_secret().to_string(), admin));
        Ok(())
    }

    async fn drop_user(&self, auth: Option<&Credentials>, username: &str) -> Result<()> {
        self.check(AdminOperation::DropUser, auth)?;
        let mut state = self.state.lock().unwrap();
        state
            .users
            .remove(username)
            .map(|_| ())
            .ok_or_else(|| Error::admin(AdminOperation::DropUser, username, "user not found"))
    }

    async fn set_password(
        &self,
        auth: Option<&Credentials>,
        username: &str,
        password: &SecretString,
    ) -> Result<()> {
        self.check(AdminOperation::SetPassword, auth)?;
        let mut state = self.state.lock().unwrap();
        let user = state
            .users
            .get_mut(username)
            .ok_or_else(|| Error::admin(AdminOperation::SetPassword, username, "user not found"))?;
        user.0 = password.expose_secret().to_string();
        Ok(())
    }

    async fn list_users(&self, auth: Option<&Credentials>) -> Result<Vec<UserInfo>> {
        self.check(AdminOperation::ListUsers, auth)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .users
            .iter()
            .map(|(user, (_, admin))| UserInfo { user: user.clone(), admin: *admin })
            .collect())
    }

    async fn create_database(&self, auth: Option<&Credentials>, database: &str) -> Result<()> {
        self.check(AdminOperation::CreateDatabase, auth)?;
        self.state.lock().unwrap().databases.insert(database.to_string());
        Ok(())
    }

    async fn drop_database(&self, auth: Option<&Credentials>, database: &str) -> Result<()> {
        self.check(AdminOperation::DropDatabase, auth)?;
        let mut state = self.state.lock().unwrap();
        state.databases.remove(database);
        state.policies.remove(database);
        state.grants.retain(|(_, db), _| db != database);
        Ok(())
    }

    async fn list_databases(&self, auth: Option<&Credentials>) -> Result<Vec<String>> {
        self.check(AdminOperation::ListDatabases, auth)?;
        Ok(self.state.lock().unwrap().databases.iter().cloned().collect())
    }

    async fn grant_privilege(
        &self,
        auth: Option<&Credentials>,
        privilege: Privilege,
        database: &str,
        username: &str,
    ) -> Result<()> {
        self.check(AdminOperation::GrantPrivilege, auth)?;
        let mut state = self.state.lock().unwrap();
        state.privilege_calls.push(PrivilegeCall {
            operation: AdminOperation::GrantPrivilege,
            privilege,
            database: database.to_string(),
            username: username.to_string(),
        });
        if !state.users.contains_key(username) {
            return Err(Error::admin(AdminOperation::GrantPrivilege, username, "user not found"));
        }
        state.grants.insert((username.to_string(), database.to_string()), privilege);
        Ok(())
    }

    async fn revoke_privilege(
        &self,
        auth: Option<&Credentials>,
        privilege: Privilege,
        database: &str,
        username: &str,
    ) -> Result<()> {
        self.check(AdminOperation::RevokePrivilege, auth)?;
        let mut state = self.state.lock().unwrap();
        state.privilege_calls.push(PrivilegeCall {
            operation: AdminOperation::RevokePrivilege,
            privilege,
            database: database.to_string(),
            username: username.to_string(),
        });
        state.grants.remove(&(username.to_string(), database.to_string()));
        Ok(())
    }

    async fn list_privileges(
        &self,
        auth: Option<&Credentials>,
        username: &str,
    ) -> Result<Vec<PrivilegeGrant>> {
        self.check(AdminOperation::ListPrivileges, auth)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .grants
            .iter()
            .filter(|((user, _), _)| user == username)
            .map(|((_, database), privilege)| PrivilegeGrant {
                database: database.clone(),
                privilege: privilege.to_string(),
            })
            .collect())
    }

    async fn create_retention_policy(
        &self,
        auth: Option<&Credentials>,
        database: &str,
        policy: &RetentionPolicy,
    ) -> Result<()> {
        self.check(AdminOperation::CreateRetentionPolicy, auth)?;
        self.state.lock().unwrap().policies.insert(database.to_string(), policy.clone());
        Ok(())
    }
}

/// Installer whose outcome is scripted per test.
#[derive(Debug, Default)]
pub struct FakeInstaller {
    pub fail_install: std::sync::atomic::AtomicBool,
    pub installs: AtomicUsize,
    pub restarts: AtomicUsize,
}

impl FakeInstaller {
    pub fn failing() -> Self {
        let installer = Self::default();
        installer.fail_install.store(true, Ordering::SeqCst);
        installer
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_install.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Installer for FakeInstaller {
    async fn install(&self) -> Result<()> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        if self.fail_install.load(Ordering::SeqCst) {
            return Err(Error::install("apt-get install exited with 100"));
        }
        Ok(())
    }

    async fn write_config_and_restart(&self) -> Result<()> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Everything one database unit needs, sharing state with the test.
pub struct ServerFixture {
    pub config: OperatorConfig,
    pub host: LocalHost,
    pub secrets: InMemorySecretStore,
    pub influx: FakeInfluxDb,
    pub installer: Arc<FakeInstaller>,
}

impl ServerFixture {
    pub fn new() -> Self {
        Self::with_installer(FakeInstaller::default())
    }

    pub fn with_installer(installer: FakeInstaller) -> Self {
        Self {
            config: OperatorConfig::default(),
            host: LocalHost::new("influxdb"),
            secrets: InMemorySecretStore::new(),
            influx: FakeInfluxDb::new(),
            installer: Arc::new(installer),
        }
    }

    /// Build an operator over the shared fixture state.
    pub fn operator(&self, state: OperatorState) -> InfluxDbOperator {
        InfluxDbOperator::new(
            self.config.clone(),
            Arc::new(self.host.clone()),
            Arc::new(self.secrets.clone()),
            Arc::new(self.influx.clone()),
            self.installer.clone(),
            state,
        )
    }
}

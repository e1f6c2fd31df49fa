//! # InfluxDB Administration
//!
//! Everything the operator does to the database server itself: the HTTP admin
//! client, InfluxQL statement builders, and package installation.

pub mod client;
pub mod installer;
pub mod query;

use std::fmt;

use serde::Serialize;

pub use client::{HttpInfluxDbClient, InfluxDbAdmin, PrivilegeGrant, UserInfo};
pub use installer::{Installer, SystemInstaller};
pub use query::{Privilege, RetentionPolicy};

/// InfluxDB HTTP API port.
pub const INFLUXDB_PORT: u16 = 8086;

/// Administrative operation, carried by errors and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdminOperation {
    CreateUser,
    CreateAdminUser,
    DropUser,
    SetPassword,
    ListUsers,
    CreateDatabase,
    DropDatabase,
    ListDatabases,
    GrantPrivilege,
    RevokePrivilege,
    ListPrivileges,
    CreateRetentionPolicy,
    Ping,
}

impl AdminOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminOperation::CreateUser => "create-user",
            AdminOperation::CreateAdminUser => "create-admin-user",
            AdminOperation::DropUser => "drop-user",
            AdminOperation::SetPassword => "set-password",
            AdminOperation::ListUsers => "list-users",
            AdminOperation::CreateDatabase => "create-database",
            AdminOperation::DropDatabase => "drop-database",
            AdminOperation::ListDatabases => "list-databases",
            AdminOperation::GrantPrivilege => "grant-privilege",
            AdminOperation::RevokePrivilege => "revoke-privilege",
            AdminOperation::ListPrivileges => "list-privileges",
            AdminOperation::CreateRetentionPolicy => "create-retention-policy",
            AdminOperation::Ping => "ping",
        }
    }
}

impl fmt::Display for AdminOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

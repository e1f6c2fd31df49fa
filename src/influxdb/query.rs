//! InfluxQL statement builders.
//!
//! Every identifier is double-quoted and every string literal single-quoted,
//! with the quote character and backslash escaped, so user-supplied names
//! cannot terminate the statement.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Database privilege levels understood by InfluxDB 1.x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Privilege {
    Read,
    Write,
    All,
}

impl Privilege {
    pub fn as_str(&self) -> &'static str {
        match self {
            Privilege::Read => "READ",
            Privilege::Write => "WRITE",
            Privilege::All => "ALL",
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Privilege {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "READ" => Ok(Privilege::Read),
            "WRITE" => Ok(Privilege::Write),
            "ALL" | "ALL PRIVILEGES" => Ok(Privilege::All),
            other => Err(Error::validation_field(
                format!("unknown privilege '{}', expected READ, WRITE or ALL", other),
                "privilege",
            )),
        }
    }
}

/// Retention policy applied to provisioned databases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub name: String,
    /// InfluxQL duration literal such as `7d` or `INF`.
    pub duration: String,
    pub replication: u32,
    pub default: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { name: "default".to_string(), duration: "7d".to_string(), replication: 1, default: true }
    }
}

/// Quote an identifier (user, database, policy name).
pub fn quote_ident(ident: &str) -> String {
    let mut quoted = String::with_capacity(ident.len() + 2);
    quoted.push('"');
    for c in ident.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Quote a string literal (passwords).
pub fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

/// Whether `value` is a valid InfluxQL duration literal (`INF` or e.g. `1h30m`).
pub fn is_duration_literal(value: &str) -> bool {
    if value.eq_ignore_ascii_case("inf") {
        return true;
    }
    const UNITS: [&str; 9] = ["ns", "u", "µ", "ms", "s", "m", "h", "d", "w"];

    let mut rest = value;
    if rest.is_empty() {
        return false;
    }
    while !rest.is_empty() {
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return false;
        }
        rest = &rest[digits..];
        // Longest match first so "ms" is not read as "m".
        let Some(unit) = UNITS
            .iter()
            .filter(|u| rest.starts_with(*u))
            .max_by_key(|u| u.len())
        else {
            return false;
        };
        rest = &rest[unit.len()..];
    }
    true
}

pub fn create_user(username: &str, password: &str, admin: bool) -> String {
    let mut stmt =
        format!("CREATE USER {} WITH PASSWORD {}", quote_ident(username), quote_literal(password));
    if admin {
        stmt.push_str(" WITH ALL PRIVILEGES");
    }
    stmt
}

pub fn drop_user(username: &str) -> String {
    format!("DROP USER {}", quote_ident(username))
}

pub fn set_password(username: &str, password: &str) -> String {
    format!("SET PASSWORD FOR {} = {}", quote_ident(username), quote_literal(password))
}

pub fn show_users() -> String {
    "SHOW USERS".to_string()
}

pub fn create_database(database: &str) -> String {
    format!("CREATE DATABASE {}", quote_ident(database))
}

pub fn drop_database(database: &str) -> String {
    format!("DROP DATABASE {}", quote_ident(database))
}

pub fn show_databases() -> String {
    "SHOW DATABASES".to_string()
}

pub fn grant(privilege: Privilege, database: &str, username: &str) -> String {
    format!("GRANT {} ON {} TO {}", privilege, quote_ident(database), quote_ident(username))
}

pub fn revoke(privilege: Privilege, database: &str, username: &str) -> String {
    format!("REVOKE {} ON {} FROM {}", privilege, quote_ident(database), quote_ident(username))
}

pub fn show_grants(username: &str) -> String {
    format!("SHOW GRANTS FOR {}", quote_ident(username))
}

pub fn create_retention_policy(database: &str, policy: &RetentionPolicy) -> String {
    let mut stmt = format!(
        "CREATE RETENTION POLICY {} ON {} DURATION {} REPLICATION {}",
        quote_ident(&policy.name),
        quote_ident(database),
        policy.duration,
        policy.replication
    );
    if policy.default {
        stmt.push_str(" DEFAULT");
    }
    stmt
}

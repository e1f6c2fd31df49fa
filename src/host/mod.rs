//! # Host Model
//!
//! The operator never talks to the orchestration platform directly. Everything
//! it needs from the host (leadership, relation data, bindings, unit status,
//! ports) goes through the [`Host`] trait. [`LocalHost`] is a file-backed
//! implementation used by the binary and by tests.

pub mod local;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

pub use local::LocalHost;

/// Identifier of one relation instance between two applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationId(u64);

impl RelationId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Application-level key/value data on one side of a relation.
pub type RelationData = BTreeMap<String, String>;

/// Workload status reported to the platform.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum UnitStatus {
    #[default]
    Unknown,
    Active,
    Waiting(String),
    Blocked(String),
}

impl UnitStatus {
    pub fn waiting(message: impl Into<String>) -> Self {
        Self::Waiting(message.into())
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        Self::Blocked(message.into())
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitStatus::Unknown => write!(f, "unknown"),
            UnitStatus::Active => write!(f, "active"),
            UnitStatus::Waiting(m) => write!(f, "waiting: {}", m),
            UnitStatus::Blocked(m) => write!(f, "blocked: {}", m),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
        }
    }
}

/// Services the hosting platform provides to a unit.
#[async_trait]
pub trait Host: Send + Sync {
    /// Name of the application this unit belongs to.
    fn app_name(&self) -> &str;

    /// Whether this unit currently holds leadership of its application.
    async fn is_leader(&self) -> Result<bool>;

    /// Ingress address of a network binding, if the binding exists.
    async fn binding_address(&self, binding: &str) -> Result<Option<String>>;

    /// Application data published by `app` on `relation`.
    ///
    /// Returns `None` when the relation no longer exists.
    async fn relation_data(&self, relation: RelationId, app: &str) -> Result<Option<RelationData>>;

    /// Write a key in this application's data for `relation`. An empty value removes the key.
    async fn update_relation_data(&self, relation: RelationId, key: &str, value: &str)
        -> Result<()>;

    async fn set_status(&self, status: UnitStatus) -> Result<()>;

    async fn status(&self) -> Result<UnitStatus>;

    async fn open_port(&self, protocol: Protocol, port: u16) -> Result<()>;

    async fn set_workload_version(&self, version: &str) -> Result<()>;
}

/// Proof that this unit was leader when the token was issued.
///
/// Mutating paths take a `&Leadership`, so they cannot be reached without
/// going through [`Leadership::check`].
#[derive(Debug)]
pub struct Leadership {
    _private: (),
}

impl Leadership {
    /// Issue a token if this unit is leader. `handler` names the caller in logs.
    pub async fn check(host: &dyn Host, handler: &str) -> Result<Option<Leadership>> {
        if host.is_leader().await? {
            Ok(Some(Leadership { _private: () }))
        } else {
            tracing::debug!(handler = %handler, "Not leader, skipping");
            Ok(None)
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Leadership { _private: () }
    }
}

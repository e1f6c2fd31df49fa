//! # Relation Protocol
//!
//! The providing side provisions credentials when a consumer joins, stores
//! them in a secret granted to that relation and publishes only the secret's
//! identifier in its application data. The consuming side records the
//! identifier and resolves it on demand.

pub mod consumer;
pub mod provider;

use serde::{Deserialize, Serialize};

pub use consumer::{ClientState, InfluxDbRequires};
pub use provider::InfluxDbProvides;

/// Application data key carrying the credential secret identifier.
pub const CREDS_SECRET_ID_KEY: &str = "influx_client_creds_secret_id";

/// Where a provider relation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationPhase {
    /// Joined, credentials not published yet.
    Joined,
    /// Credentials published.
    Provisioned,
    /// Relation gone, published identifier cleared.
    Broken,
}

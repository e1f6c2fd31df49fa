//! Secret storage for operator-managed credentials.
//!
//! Credentials never travel over relation data. The owner stores them in a
//! [`SecretStore`], grants the remote side read access and publishes only the
//! opaque [`SecretId`].
//!
//! # Architecture
//!
//! - [`SecretStore`]: the host seam (create, get, set-content, grant, revoke)
//! - [`InMemorySecretStore`]: authoritative store with revisions, rotation
//!   deadlines and grants, persisted as a JSON snapshot by the local host
//! - [`GrantedSecretView`]: what a consumer unit sees of that store
//! - [`CachedSecretStore`]: local read cache honouring `refresh`
//!
//! # Example
//!
//! ```rust,ignore
//! use influxdb_operator::secrets::{InMemorySecretStore, RotatePolicy, SecretContent, SecretStore};
//!
//! let store = InMemorySecretStore::new();
//! let id = store
//!     .create(SecretContent::new().with("password", "s3cret"), "influxdb-admin-password", RotatePolicy::Daily)
//!     .await?;
//! store.grant(&id, relation).await?;
//! ```
//!
//! # Security Considerations
//!
//! - Secret values are wrapped in [`SecretString`] and never logged
//! - Errors name identifiers and labels only

pub mod cached;
pub mod error;
pub mod memory;
pub mod store;
pub mod types;

pub use cached::CachedSecretStore;
pub use error::{Result, SecretsError};
pub use memory::{GrantedSecretView, InMemorySecretStore, SecretInfo};
pub use store::SecretStore;
pub use types::{RotatePolicy, SecretContent, SecretId, SecretLookup, SecretString};

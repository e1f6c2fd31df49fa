//! # InfluxDB Operator
//!
//! Lifecycle management for an InfluxDB 1.x deployment, and the consuming
//! side that receives credentials from it.
//!
//! ## Architecture
//!
//! ```text
//! Host events → EventScheduler → InfluxDbOperator ──→ InfluxDB HTTP API
//!                    ↑                 │
//!              deferred retries        ├──→ SecretStore (admin + per-relation secrets)
//!                                      └──→ relation data (secret id) → InfluxDbClientOperator
//! ```
//!
//! ## Core Components
//!
//! - **Operators**: [`operator::InfluxDbOperator`] installs the database,
//!   bootstraps and rotates the admin credential, serves administrative
//!   actions and provisions a user and database per related application.
//!   [`operator::InfluxDbClientOperator`] records the credentials it is given.
//! - **Host**: [`host::Host`] abstracts the platform (leadership, relation
//!   data, bindings, status). [`host::LocalHost`] is file-backed.
//! - **Secrets**: [`secrets::SecretStore`] with an authoritative in-memory
//!   store, a read-through cache and a grant-checked consumer view.
//! - **Scheduler**: [`scheduler::EventScheduler`] redelivers deferred events
//!   with exponential backoff.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use influxdb_operator::{
//!     config::OperatorConfig,
//!     events::Event,
//!     host::LocalHost,
//!     influxdb::{HttpInfluxDbClient, SystemInstaller},
//!     operator::{InfluxDbOperator, OperatorState},
//!     scheduler::{BackoffPolicy, EventScheduler},
//!     secrets::InMemorySecretStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> influxdb_operator::Result<()> {
//!     let config = OperatorConfig::load(None)?;
//!     let admin = HttpInfluxDbClient::new("127.0.0.1", 8086, config.influxdb.request_timeout())?;
//!     let mut operator = InfluxDbOperator::new(
//!         config.clone(),
//!         Arc::new(LocalHost::new("influxdb")),
//!         Arc::new(InMemorySecretStore::new()),
//!         Arc::new(admin),
//!         Arc::new(SystemInstaller::new(&config.influxdb)),
//!         OperatorState::default(),
//!     );
//!     let mut scheduler = EventScheduler::new(BackoffPolicy::from(&config.scheduler));
//!     scheduler.dispatch(&mut operator, Event::Install, chrono::Utc::now()).await;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod events;
pub mod host;
pub mod influxdb;
pub mod observability;
pub mod operator;
pub mod provisioning;
pub mod relation;
pub mod scheduler;
pub mod secrets;

// Re-export commonly used types and traits
pub use config::OperatorConfig;
pub use errors::{Error, Result};
pub use events::{Event, EventHandler, HandlerOutcome};
pub use operator::{InfluxDbClientOperator, InfluxDbOperator};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

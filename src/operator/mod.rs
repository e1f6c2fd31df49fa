//! # Operators
//!
//! [`InfluxDbOperator`] runs next to the database: it installs it, keeps the
//! admin credential, serves administrative actions and provides credentials
//! to related applications. [`InfluxDbClientOperator`] runs in a consuming
//! application and exposes the credentials it was given.

pub mod actions;
pub mod client;
pub mod server;

pub use client::InfluxDbClientOperator;
pub use server::{InfluxDbOperator, OperatorState};

/// Status shown while packages are being installed.
pub const INSTALLING_MESSAGE: &str = "Installing base system dependencies.";

/// Status shown when installation failed and will be retried.
pub const INSTALL_FAILED_MESSAGE: &str = "Influxdb install failed.";

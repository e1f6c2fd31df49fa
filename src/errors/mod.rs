//! # Error Handling
//!
//! Error types for the InfluxDB operator, defined with `thiserror`.
//!
//! Precondition failures (not installed, not leader) never reach this type:
//! handlers express them as a [`HandlerOutcome`](crate::events::HandlerOutcome).
//! Everything that does surface here is a genuine failure that ends up in a
//! unit status, an action result or a log line.

pub mod types;

pub use types::{Error, Result};

//! # Error Types

use crate::influxdb::AdminOperation;
use crate::secrets::SecretsError;

/// Result type for operator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the InfluxDB operator
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Package installation or service configuration failed
    #[error("Install failed: {message}")]
    Install { message: String },

    /// An administrative call against InfluxDB failed
    #[error("Administrative operation '{operation}' failed for '{target}': {reason}")]
    AdminOperation { operation: AdminOperation, target: String, reason: String },

    /// No network binding is available to derive an ingress address from
    #[error("Ingress address unavailable for binding '{binding}'")]
    IngressUnavailable { binding: String },

    /// A secret was missing or could not be accessed
    #[error("Secret access failed: {0}")]
    SecretAccess(#[from] SecretsError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Validation errors (configuration values, action parameters)
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Create an install error
    pub fn install<S: Into<String>>(message: S) -> Self {
        Self::Install { message: message.into() }
    }

    /// Create an administrative operation error
    pub fn admin<T: Into<String>, R: Into<String>>(
        operation: AdminOperation,
        target: T,
        reason: R,
    ) -> Self {
        Self::AdminOperation { operation, target: target.into(), reason: reason.into() }
    }

    /// Create an ingress unavailable error
    pub fn ingress_unavailable<S: Into<String>>(binding: S) -> Self {
        Self::IngressUnavailable { binding: binding.into() }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create an I/O error with context
    pub fn io<S: Into<String>>(source: std::io::Error, context: S) -> Self {
        Self::Io { source, context: context.into() }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Whether the error describes a transient precondition rather than a failure.
    ///
    /// Only missing bindings qualify; everything else is surfaced.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Error::IngressUnavailable { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<config::ConfigError> for Error {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::validation(format!("Validation failed: {}", message))
    }
}

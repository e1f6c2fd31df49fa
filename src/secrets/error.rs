//! Error types for secret store operations.

use thiserror::Error;

/// Result type for secret store operations.
pub type Result<T> = std::result::Result<T, SecretsError>;

/// Errors that can occur while reading or writing secrets.
///
/// Messages carry identifiers and labels only, never secret content.
#[derive(Error, Debug)]
pub enum SecretsError {
    /// No secret matches the given identifier or label.
    #[error("Secret not found: {key}")]
    NotFound { key: String },

    /// A secret with the same label already exists.
    #[error("Secret label already in use: {label}")]
    AlreadyExists { label: String },

    /// The caller has not been granted access to the secret.
    #[error("Access denied to secret '{key}': {reason}")]
    AccessDenied { key: String, reason: String },

    /// Secret content is missing a required field.
    #[error("Secret '{key}' has no '{field}' field")]
    MissingField { key: String, field: String },

    /// Secret content was rejected.
    #[error("Invalid secret content: {reason}")]
    InvalidContent { reason: String },

    /// Backend-specific error.
    #[error("Backend error: {message}")]
    Backend { message: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SecretsError {
    /// Create a not found error.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create an already exists error.
    pub fn already_exists(label: impl Into<String>) -> Self {
        Self::AlreadyExists { label: label.into() }
    }

    /// Create an access denied error.
    pub fn access_denied(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AccessDenied { key: key.into(), reason: reason.into() }
    }

    /// Create a missing field error.
    pub fn missing_field(key: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField { key: key.into(), field: field.into() }
    }

    /// Create an invalid content error.
    pub fn invalid_content(reason: impl Into<String>) -> Self {
        Self::InvalidContent { reason: reason.into() }
    }

    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend { message: message.into() }
    }
}

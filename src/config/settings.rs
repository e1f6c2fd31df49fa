//! # Configuration Settings
//!
//! Defines the configuration structure for the InfluxDB operator.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{Error, Result};
use crate::influxdb::query::{is_duration_literal, RetentionPolicy};
use crate::influxdb::INFLUXDB_PORT;

/// Main operator configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct OperatorConfig {
    /// Database server connection and packaging
    #[validate(nested)]
    pub influxdb: InfluxDbConfig,

    /// Per-consumer provisioning
    #[validate(nested)]
    pub provisioning: ProvisioningConfig,

    /// Deferred event redelivery
    #[validate(nested)]
    pub scheduler: SchedulerConfig,

    /// Identity of this unit and where its state lives
    #[validate(nested)]
    pub unit: UnitConfig,

    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl OperatorConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;
        self.validate_custom()?;
        Ok(())
    }

    /// Checks the validator derive cannot express
    fn validate_custom(&self) -> Result<()> {
        if !is_duration_literal(&self.provisioning.retention_duration) {
            return Err(Error::validation_field(
                format!(
                    "Retention duration '{}' is not an InfluxQL duration",
                    self.provisioning.retention_duration
                ),
                "provisioning.retention_duration",
            ));
        }

        if self.influxdb.packages.iter().any(|p| p.trim().is_empty()) {
            return Err(Error::validation_field(
                "Package names cannot be empty",
                "influxdb.packages",
            ));
        }

        if self.scheduler.initial_backoff() > self.scheduler.max_backoff() {
            return Err(Error::validation(
                "Initial backoff cannot exceed the maximum backoff",
            ));
        }

        Ok(())
    }
}

/// InfluxDB server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct InfluxDbConfig {
    #[validate(length(min = 1, message = "Host cannot be empty"))]
    pub host: String,

    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// Name of the administrative account
    #[validate(length(min = 1, message = "Admin username cannot be empty"))]
    pub admin_username: String,

    /// Per-request timeout in seconds
    #[validate(range(min = 1, max = 300, message = "Timeout must be between 1 and 300 seconds"))]
    pub request_timeout_seconds: u64,

    /// Packages installed at install time
    #[validate(length(min = 1, message = "At least one package is required"))]
    pub packages: Vec<String>,

    /// Configuration file copied into place at install time
    pub config_template: PathBuf,

    /// Destination of the configuration file
    pub config_path: PathBuf,

    /// systemd unit restarted after writing the configuration
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,
}

impl Default for InfluxDbConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: INFLUXDB_PORT,
            admin_username: "admin".to_string(),
            request_timeout_seconds: 10,
            packages: vec!["influxdb".to_string(), "influxdb-client".to_string()],
            config_template: PathBuf::from("templates/influxdb.conf"),
            config_path: PathBuf::from("/etc/influxdb/influxdb.conf"),
            service_name: "influxdb".to_string(),
        }
    }
}

impl InfluxDbConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// What each consumer gets
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ProvisioningConfig {
    #[validate(length(min = 1, message = "Retention policy name cannot be empty"))]
    pub retention_policy: String,

    /// InfluxQL duration literal, e.g. `7d`
    pub retention_duration: String,

    #[validate(range(min = 1, message = "Replication factor must be at least 1"))]
    pub replication: u32,

    /// Drop the user and database again when a later step fails
    pub rollback_on_failure: bool,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            retention_policy: "default".to_string(),
            retention_duration: "7d".to_string(),
            replication: 1,
            rollback_on_failure: true,
        }
    }
}

impl ProvisioningConfig {
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            name: self.retention_policy.clone(),
            duration: self.retention_duration.clone(),
            replication: self.replication,
            default: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SchedulerConfig {
    #[validate(range(min = 1, message = "Initial backoff must be at least 1ms"))]
    pub initial_backoff_ms: u64,

    #[validate(range(min = 1.0, max = 10.0, message = "Backoff multiplier must be between 1 and 10"))]
    pub backoff_multiplier: f64,

    #[validate(range(
        min = 1,
        max = 604_800,
        message = "Maximum backoff must be between 1 second and 7 days"
    ))]
    pub max_backoff_seconds: u64,

    /// Redeliveries before a deferred event is dropped; unset retries forever
    pub max_attempts: Option<u32>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 1000,
            backoff_multiplier: 2.0,
            max_backoff_seconds: 300,
            max_attempts: None,
        }
    }
}

impl SchedulerConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct UnitConfig {
    #[validate(length(min = 1, message = "Application name cannot be empty"))]
    pub app_name: String,

    /// Relation over which credentials are provided or consumed
    #[validate(length(min = 1, message = "Relation name cannot be empty"))]
    pub relation_name: String,

    /// Binding whose ingress address is handed to consumers
    #[validate(length(min = 1, message = "Peer binding cannot be empty"))]
    pub peer_binding: String,

    /// Directory holding host, secret and operator state
    pub state_dir: PathBuf,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            app_name: "influxdb".to_string(),
            relation_name: "influxdb".to_string(),
            peer_binding: "influxdb-peer".to_string(),
            state_dir: PathBuf::from(".influxdb-operator"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "influxdb-operator".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

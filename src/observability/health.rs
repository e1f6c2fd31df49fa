//! # Health Checking
//!
//! The database is healthy when `/ping` answers `204 No Content`.

use serde::Serialize;

use crate::host::UnitStatus;
use crate::influxdb::InfluxDbAdmin;

/// Status message shown while the database refuses connections.
pub const UNHEALTHY_MESSAGE: &str = "InfluxDB is not accepting connections, please debug.";

/// Health of the managed database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum HealthStatus {
    /// Accepting connections, reporting `version`
    Healthy { version: String },
    /// Not reachable or not answering as expected
    Unhealthy { message: String },
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy { .. })
    }

    pub fn version(&self) -> Option<&str> {
        match self {
            HealthStatus::Healthy { version } => Some(version),
            HealthStatus::Unhealthy { .. } => None,
        }
    }

    /// Unit status to report for this health.
    pub fn unit_status(&self) -> UnitStatus {
        match self {
            HealthStatus::Healthy { .. } => UnitStatus::Active,
            HealthStatus::Unhealthy { .. } => UnitStatus::blocked(UNHEALTHY_MESSAGE),
        }
    }
}

/// Ping the database and classify the answer.
pub async fn check_influxdb(admin: &dyn InfluxDbAdmin) -> HealthStatus {
    match admin.ping().await {
        Ok(version) => {
            tracing::debug!(version = %version, "InfluxDB healthy");
            HealthStatus::Healthy { version }
        }
        Err(e) => {
            tracing::warn!(error = %e, "InfluxDB health check failed");
            HealthStatus::Unhealthy { message: e.to_string() }
        }
    }
}

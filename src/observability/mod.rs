//! # Observability
//!
//! Structured logging through `tracing`, counters through the `metrics`
//! facade, and the database health check.
//!
//! No metrics exporter is installed here; whoever embeds the operator decides
//! where counters go.

pub mod health;
pub mod logging;
pub mod metrics;

pub use health::{check_influxdb, HealthStatus};
pub use logging::log_config_info;

use tracing_subscriber::EnvFilter;

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `log_level`. Output goes to stderr so command output
/// on stdout stays machine-readable. Calling this twice is harmless.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::try_new(directives),
        _ => EnvFilter::try_new(&config.log_level),
    }
    .map_err(|e| Error::config(format!("Invalid log filter: {}", e)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = if config.json_logging {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if installed.is_err() {
        // Subscriber already set elsewhere (e.g. integration tests); ignore.
        return Ok(());
    }

    metrics::register_metrics();
    tracing::debug!(service_name = %config.service_name, json = config.json_logging, "Logging initialized");
    Ok(())
}

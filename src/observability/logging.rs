//! # Structured Logging
//!
//! Span macros for event handling and administrative calls, and the startup
//! configuration summary.

/// Create a tracing span for one lifecycle event.
///
/// ```rust,ignore
/// let span = event_span!("relation-joined", relation = 3);
/// ```
#[macro_export]
macro_rules! event_span {
    ($event:expr) => {
        tracing::info_span!(
            "event",
            event = %$event,
            event_id = %uuid::Uuid::new_v4()
        )
    };
    ($event:expr, $($field:tt)*) => {
        tracing::info_span!(
            "event",
            event = %$event,
            event_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for an action invocation.
#[macro_export]
macro_rules! action_span {
    ($action:expr) => {
        tracing::info_span!(
            "action",
            action = %$action,
            action_id = %uuid::Uuid::new_v4()
        )
    };
}

/// Log configuration at startup. Never logs credentials.
pub fn log_config_info(config: &crate::config::OperatorConfig) {
    tracing::info!(
        app_name = %config.unit.app_name,
        influxdb_address = %config.influxdb.address(),
        admin_username = %config.influxdb.admin_username,
        retention_policy = %config.provisioning.retention_policy,
        retention_duration = %config.provisioning.retention_duration,
        rollback_on_failure = config.provisioning.rollback_on_failure,
        state_dir = %config.unit.state_dir.display(),
        "InfluxDB operator configuration"
    );
}

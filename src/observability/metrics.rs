//! # Metrics Collection
//!
//! Counters recorded through the `metrics` facade. With no recorder installed
//! every call is a no-op.

use metrics::{counter, describe_counter, Unit};

use crate::influxdb::AdminOperation;

/// Describe every counter this crate records.
pub fn register_metrics() {
    describe_counter!(
        "influxdb_operator_events_total",
        Unit::Count,
        "Lifecycle events handled, by event and outcome"
    );
    describe_counter!(
        "influxdb_operator_admin_operations_total",
        Unit::Count,
        "Administrative InfluxDB calls, by operation and status"
    );
    describe_counter!(
        "influxdb_operator_secret_rotations_total",
        Unit::Count,
        "Admin secret rotations, by status"
    );
    describe_counter!(
        "influxdb_operator_credentials_published_total",
        Unit::Count,
        "Credential secret references published to consumers"
    );
    describe_counter!(
        "influxdb_operator_actions_total",
        Unit::Count,
        "Actions run, by action and status"
    );
}

/// Record the outcome of one event delivery (`done`, `deferred`, `failed`, `dropped`).
pub fn record_event(event: &str, outcome: &str) {
    let labels = [("event", event.to_string()), ("outcome", outcome.to_string())];
    counter!("influxdb_operator_events_total", &labels).increment(1);
}

pub fn record_admin_operation(operation: AdminOperation, success: bool) {
    let status = if success { "success" } else { "error" };
    let labels = [("operation", operation.to_string()), ("status", status.to_string())];
    counter!("influxdb_operator_admin_operations_total", &labels).increment(1);
}

pub fn record_secret_rotation(success: bool) {
    let status = if success { "success" } else { "error" };
    let labels = [("status", status.to_string())];
    counter!("influxdb_operator_secret_rotations_total", &labels).increment(1);
}

pub fn record_credentials_published(remote_app: &str) {
    let labels = [("remote_app", remote_app.to_string())];
    counter!("influxdb_operator_credentials_published_total", &labels).increment(1);
}

pub fn record_action(action: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    let labels = [("action", action.to_string()), ("status", status.to_string())];
    counter!("influxdb_operator_actions_total", &labels).increment(1);
}

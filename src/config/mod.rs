//! # Configuration Management
//!
//! Layers, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. An optional TOML (or YAML/JSON) file
//! 3. `INFLUXDB_OPERATOR__<SECTION>__<KEY>` environment variables,
//!    e.g. `INFLUXDB_OPERATOR__INFLUXDB__PORT=8087`
//!
//! The result is validated before it is returned.

pub mod settings;

use std::path::Path;

pub use settings::{
    InfluxDbConfig, ObservabilityConfig, OperatorConfig, ProvisioningConfig, SchedulerConfig,
    UnitConfig,
};

use crate::errors::Result;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "INFLUXDB_OPERATOR";

impl OperatorConfig {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// A `path` that does not exist is an error; pass `None` to skip the file layer.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("influxdb.packages"),
        );

        let config: OperatorConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}

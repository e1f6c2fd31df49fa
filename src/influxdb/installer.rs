//! Package installation and service configuration.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::InfluxDbConfig;
use crate::errors::{Error, Result};

/// System-level setup of the InfluxDB service on this machine.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Install the database packages.
    async fn install(&self) -> Result<()>;

    /// Write the service configuration and restart the service.
    async fn write_config_and_restart(&self) -> Result<()>;
}

/// [`Installer`] that shells out to `apt-get` and `systemctl`.
#[derive(Debug, Clone)]
pub struct SystemInstaller {
    packages: Vec<String>,
    config_template: PathBuf,
    config_path: PathBuf,
    service_name: String,
}

impl SystemInstaller {
    pub fn new(config: &InfluxDbConfig) -> Self {
        Self {
            packages: config.packages.clone(),
            config_template: config.config_template.clone(),
            config_path: config.config_path.clone(),
            service_name: config.service_name.clone(),
        }
    }

    async fn run(program: &str, args: &[&str]) -> Result<()> {
        tracing::debug!(program = %program, args = ?args, "Running command");
        let output = Command::new(program)
            .args(args)
            .env("DEBIAN_FRONTEND", "noninteractive")
            .output()
            .await
            .map_err(|e| Error::install(format!("failed to run {}: {}", program, e)))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(Error::install(format!(
                "{} {} exited with {}: {}",
                program,
                args.join(" "),
                output.status,
                stderr.trim()
            )))
        }
    }
}

#[async_trait]
impl Installer for SystemInstaller {
    async fn install(&self) -> Result<()> {
        Self::run("apt-get", &["update"]).await?;

        tracing::info!(packages = ?self.packages, "Installing packages using apt");
        let mut args = vec!["install", "-y"];
        args.extend(self.packages.iter().map(String::as_str));
        Self::run("apt-get", &args).await.map_err(|e| {
            Error::install(format!(
                "failed to install influxdb packages {:?}. reason: {}",
                self.packages, e
            ))
        })?;

        tracing::info!(packages = ?self.packages, "Packages successfully installed on unit");
        Ok(())
    }

    async fn write_config_and_restart(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::io(e, format!("Failed to create {}", parent.display()))
            })?;
        }
        tokio::fs::copy(&self.config_template, &self.config_path).await.map_err(|e| {
            Error::io(
                e,
                format!(
                    "Failed to copy {} to {}",
                    self.config_template.display(),
                    self.config_path.display()
                ),
            )
        })?;
        tracing::info!(path = %self.config_path.display(), "Wrote InfluxDB configuration");

        Self::run("systemctl", &["restart", &self.service_name]).await?;
        tracing::info!(service = %self.service_name, "Restarted service");
        Ok(())
    }
}

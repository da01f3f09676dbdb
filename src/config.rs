//! Operator configuration
//!
//! Settings come from an optional YAML file named by
//! `CAPI_ENDPOINT_OPERATOR_CONFIG`, then individual environment variables.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

/// Environment variable holding the path of the YAML config file
pub const CONFIG_PATH_ENV: &str = "CAPI_ENDPOINT_OPERATOR_CONFIG";

/// Operator settings
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct OperatorConfig {
    /// Port of the metrics and health server
    pub metrics_port: u16,

    /// Only watch Clusters in this namespace; all namespaces when unset
    pub watch_namespace: Option<String>,

    /// Field manager recorded on merge patches
    pub field_manager: String,

    /// Requeue interval after a successful propagation
    pub requeue_after_secs: u64,

    /// Requeue interval after a transient failure
    pub error_requeue_secs: u64,

    /// Requeue interval after a failure that needs the Cluster to change
    pub terminal_requeue_secs: u64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            metrics_port: 8080,
            watch_namespace: None,
            field_manager: "capi-endpoint-operator".to_string(),
            requeue_after_secs: 300,
            error_requeue_secs: 30,
            terminal_requeue_secs: 300,
        }
    }
}

impl OperatorConfig {
    /// Load from the config file (if any) and the process environment
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => Self::from_file(path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML config file; missing keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// Override settings from environment variables looked up through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = lookup("METRICS_PORT") {
            self.metrics_port = port
                .parse()
                .map_err(|e| Error::Config(format!("METRICS_PORT={:?}: {}", port, e)))?;
        }
        if let Some(ns) = lookup("WATCH_NAMESPACE") {
            self.watch_namespace = Some(ns).filter(|ns| !ns.is_empty());
        }
        if let Some(manager) = lookup("FIELD_MANAGER") {
            self.field_manager = manager;
        }
        if let Some(secs) = lookup("REQUEUE_AFTER_SECS") {
            self.requeue_after_secs = secs
                .parse()
                .map_err(|e| Error::Config(format!("REQUEUE_AFTER_SECS={:?}: {}", secs, e)))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.field_manager.is_empty() {
            return Err(Error::Config("fieldManager cannot be empty".to_string()));
        }
        if self.requeue_after_secs == 0
            || self.error_requeue_secs == 0
            || self.terminal_requeue_secs == 0
        {
            return Err(Error::Config("requeue intervals must be >= 1 second".to_string()));
        }
        Ok(())
    }

    pub fn requeue_after(&self) -> Duration {
        Duration::from_secs(self.requeue_after_secs)
    }

    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }

    pub fn terminal_requeue(&self) -> Duration {
        Duration::from_secs(self.terminal_requeue_secs)
    }
}

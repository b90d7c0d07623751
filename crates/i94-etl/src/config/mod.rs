//! Configuration loading and validation.

mod types;
mod validation;
pub mod vars;

pub use types::*;

use crate::error::{EtlError, Result};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string, expanding `${VAR}` references.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let expanded = vars::interpolate(yaml).map_err(|errors| {
            EtlError::Config(format!("config interpolation failed: {}", errors.join("; ")))
        })?;
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl WarehouseConfig {
    /// libpq-style connection string with the password masked, for logs.
    pub fn display_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} sslmode={}",
            self.host, self.port, self.database, self.user, self.ssl_mode
        )
    }
}

//! Engine configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strata_schema::NamingPolicy;

use crate::error::{MigrateResult, MigrationError};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "strata.toml";

/// Configuration for planning and running migrations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrateConfig {
    /// Schema the migrations target.
    pub schema: String,
    /// Declared identifiers are camelCase and stored as snake_case.
    pub camel_case: bool,
    /// Directory holding rename intent files.
    pub renames_dir: PathBuf,
    /// Whether programs may drop tables or columns.
    pub allow_data_loss: bool,
    /// Build indexes on existing tables with `CONCURRENTLY`.
    pub concurrent_indexes: bool,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            camel_case: false,
            renames_dir: PathBuf::from(".strata/renames"),
            allow_data_loss: false,
            concurrent_indexes: true,
        }
    }
}

impl MigrateConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target schema.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Enable camelCase to snake_case conversion.
    pub fn camel_case(mut self, enabled: bool) -> Self {
        self.camel_case = enabled;
        self
    }

    /// Set the rename intent directory.
    pub fn renames_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.renames_dir = dir.into();
        self
    }

    /// Allow data loss operations.
    pub fn allow_data_loss(mut self, allow: bool) -> Self {
        self.allow_data_loss = allow;
        self
    }

    /// Set whether indexes on existing tables are built concurrently.
    pub fn concurrent_indexes(mut self, enabled: bool) -> Self {
        self.concurrent_indexes = enabled;
        self
    }

    /// Naming policy implied by this configuration.
    pub fn naming_policy(&self) -> NamingPolicy {
        NamingPolicy {
            camel_case: self.camel_case,
        }
    }

    /// Check the configuration for values the engine cannot work with.
    pub fn validate(&self) -> MigrateResult<()> {
        if self.schema.trim().is_empty() {
            return Err(MigrationError::config("schema must not be empty"));
        }
        Ok(())
    }

    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub async fn load(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            MigrationError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub async fn save(&self, path: impl AsRef<Path>) -> MigrateResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

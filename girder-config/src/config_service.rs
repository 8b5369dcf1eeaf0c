// ConfigService - High-level configuration service

use crate::{ConfigManager, FileFormat, Result};
use girder_core::ConfigRepository;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::PathBuf;

/// High-level configuration service
#[derive(Clone, Default)]
pub struct ConfigService {
    manager: ConfigManager,
}

impl ConfigService {
    /// Create a new configuration service
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from an existing manager
    pub fn from_manager(manager: ConfigManager) -> Self {
        Self { manager }
    }

    /// Builder for creating configured service
    pub fn builder() -> ConfigServiceBuilder {
        ConfigServiceBuilder::new()
    }

    /// Get configuration value
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.manager.get(key)
    }

    /// Get configuration value with default
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.manager.get_or(key, default)
    }

    pub fn get_string(&self, key: &str) -> Result<String> {
        self.manager.get_string(key)
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        self.manager.get_int(key)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.manager.get_bool(key)
    }

    /// Check if key exists
    pub fn has(&self, key: &str) -> bool {
        self.manager.get_value(key).is_some()
    }

    /// Get underlying manager
    pub fn manager(&self) -> &ConfigManager {
        &self.manager
    }
}

impl ConfigRepository for ConfigService {
    fn get_value(&self, key: &str) -> Option<Value> {
        self.manager.get_value(key)
    }
}

/// Builder for ConfigService
///
/// Sources are applied in a fixed order: `.env` file, environment, then
/// configuration files in the order they were added.
#[derive(Default)]
pub struct ConfigServiceBuilder {
    manager: ConfigManager,
    load_env: bool,
    load_dotenv: bool,
    dotenv_path: Option<String>,
    config_files: Vec<(PathBuf, Option<FileFormat>)>,
    defaults: Vec<(String, Value)>,
}

impl ConfigServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set environment variable prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.manager = ConfigManager::with_prefix(prefix);
        self
    }

    /// Enable loading from environment variables
    pub fn load_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Enable loading from .env file
    pub fn load_dotenv(mut self, path: Option<String>) -> Self {
        self.load_dotenv = true;
        self.dotenv_path = path;
        self
    }

    /// Add configuration file to load
    pub fn add_file(mut self, path: impl Into<PathBuf>, format: FileFormat) -> Self {
        self.config_files.push((path.into(), Some(format)));
        self
    }

    /// Add a configuration file whose format follows its extension
    pub fn add_file_auto(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_files.push((path.into(), None));
        self
    }

    /// Value used when no source provides `key`
    pub fn default_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.push((key.into(), value.into()));
        self
    }

    /// Build the configuration service
    pub fn build(self) -> Result<ConfigService> {
        for (key, value) in &self.defaults {
            self.manager.set(key, value)?;
        }

        if self.load_dotenv {
            self.manager.load_dotenv(self.dotenv_path.as_deref())?;
        } else if self.load_env {
            self.manager.load_env()?;
        }

        for (path, format) in self.config_files {
            match format {
                Some(format) => self.manager.load_file(&path, format)?,
                None => self.manager.load_file_auto(&path)?,
            }
        }

        Ok(ConfigService::from_manager(self.manager))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use girder_core::ConfigRepositoryExt;

    #[test]
    fn test_defaults_are_overridable() {
        let service = ConfigService::builder()
            .default_value("app.name", "girder")
            .default_value("app.maintenance", false)
            .build()
            .unwrap();

        assert_eq!(service.get_string("app.name").unwrap(), "girder");
        assert!(!service.get_bool("app.maintenance").unwrap());
        assert!(service.has("app.name"));

        service.manager().set("app.maintenance", true).unwrap();
        assert!(ConfigRepositoryExt::get_bool(&service, "app.maintenance"));
    }

    #[test]
    fn test_missing_file_fails_the_build() {
        let result = ConfigService::builder()
            .add_file("/nonexistent/girder.toml", FileFormat::Toml)
            .build();
        assert!(result.is_err());
    }
}

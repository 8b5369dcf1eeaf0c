//! Configuration management for the Girder framework
//!
//! [`ConfigManager`] gathers values from environment variables, `.env` files
//! and JSON/TOML/env files, and implements the core
//! [`ConfigRepository`](girder_core::ConfigRepository) contract so it can be
//! handed straight to an application builder.
//!
//! ```
//! use girder_config::ConfigManager;
//! use girder_core::ConfigRepository;
//!
//! let config = ConfigManager::new();
//! config.set("app", serde_json::json!({"maintenance": true})).unwrap();
//!
//! assert!(config.get_bool("app.maintenance").unwrap());
//! assert!(ConfigRepository::has(&config, "app.maintenance"));
//! ```

pub mod config_service;
pub mod env;
pub mod error;
pub mod loader;

pub use config_service::{ConfigService, ConfigServiceBuilder};
pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};

use girder_core::{ConfigRepository, lookup};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Main configuration manager
///
/// Clones share the same values. Later loads override earlier ones key by key.
#[derive(Clone, Default)]
pub struct ConfigManager {
    config: Arc<RwLock<HashMap<String, Value>>>,
    env_prefix: Option<String>,
}

impl ConfigManager {
    /// Create a new configuration manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with environment variable prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            env_prefix: Some(prefix.into()),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables
    pub fn load_env(&self) -> Result<()> {
        let loader = EnvLoader::new(self.env_prefix.clone());
        let env_vars = loader.load()?;
        debug!(count = env_vars.len(), "Loaded environment variables");

        let mut config = self.config.write();
        for (key, value) in env_vars {
            config.insert(key, Value::String(value));
        }

        Ok(())
    }

    /// Load a `.env` file into the process environment, then load the environment
    ///
    /// Without a path a missing `.env` in the working directory is not an error.
    pub fn load_dotenv(&self, path: Option<&str>) -> Result<()> {
        match path {
            Some(path) => {
                dotenvy::from_path(path).map_err(|e| ConfigError::LoadError(e.to_string()))?;
            }
            None => {
                dotenvy::dotenv().ok();
            }
        }
        self.load_env()
    }

    /// Load configuration from file
    ///
    /// Top-level keys of JSON and TOML files become configuration keys; env
    /// files go through the same name mapping as environment variables.
    pub fn load_file(&self, path: impl AsRef<Path>, format: FileFormat) -> Result<()> {
        let path = path.as_ref();
        let data = ConfigLoader::new(format).load_file(path)?;

        let Value::Object(map) = data else {
            return Err(ConfigError::ParseError(format!(
                "{} must contain a table at its top level",
                path.display()
            )));
        };

        debug!(path = %path.display(), keys = map.len(), "Loaded configuration file");
        let mut config = self.config.write();
        for (key, value) in map {
            let key = match format {
                FileFormat::Env => env::config_key(&key),
                FileFormat::Json | FileFormat::Toml => key,
            };
            config.insert(key, value);
        }

        Ok(())
    }

    /// Load a file, detecting its format from the extension
    pub fn load_file_auto(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let format = ConfigLoader::auto(path)?.format();
        self.load_file(path, format)
    }

    /// Set a configuration value
    pub fn set<T: serde::Serialize>(&self, key: &str, value: T) -> Result<()> {
        let json_value = serde_json::to_value(value)
            .map_err(|e| ConfigError::SerializationError(e.to_string()))?;

        self.config.write().insert(key.to_string(), json_value);
        Ok(())
    }

    /// Get a configuration value; dotted keys descend into tables
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .get_value(key)
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;

        serde_json::from_value(value).map_err(|e| ConfigError::DeserializationError(e.to_string()))
    }

    /// Get a configuration value with default
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Get a string value
    pub fn get_string(&self, key: &str) -> Result<String> {
        self.get(key)
    }

    /// Get an integer value; numeric strings from the environment are accepted
    pub fn get_int(&self, key: &str) -> Result<i64> {
        match self.get_value(key) {
            Some(Value::String(text)) => text
                .trim()
                .parse()
                .map_err(|_| ConfigError::DeserializationError(format!("{} is not an integer", key))),
            _ => self.get(key),
        }
    }

    /// Get a boolean value; `true`/`1`/`on`/`yes` strings count as true
    pub fn get_bool(&self, key: &str) -> Result<bool> {
        match self.get_value(key) {
            Some(Value::String(text)) => Ok(matches!(
                text.trim().to_ascii_lowercase().as_str(),
                "true" | "1" | "on" | "yes"
            )),
            _ => self.get(key),
        }
    }

    /// Get a float value
    pub fn get_float(&self, key: &str) -> Result<f64> {
        self.get(key)
    }

    /// Get all top-level configuration keys
    pub fn keys(&self) -> Vec<String> {
        self.config.read().keys().cloned().collect()
    }

    /// Merge configuration from another manager; `other` wins on conflicts
    pub fn merge(&self, other: &ConfigManager) -> Result<()> {
        if Arc::ptr_eq(&self.config, &other.config) {
            return Ok(());
        }
        let other_config = other.config.read().clone();
        self.config.write().extend(other_config);
        Ok(())
    }
}

impl ConfigRepository for ConfigManager {
    fn get_value(&self, key: &str) -> Option<Value> {
        lookup(&self.config.read(), key).cloned()
    }
}

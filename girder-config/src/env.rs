// Environment variable loading

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::env;

/// Environment variable loader
///
/// Variable names map to configuration keys by lowercasing them and turning
/// `__` into `.`, so `APP__MAINTENANCE` becomes `app.maintenance`.
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    /// Create a new environment loader
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    /// Load every variable carrying the prefix, or all of them without one
    pub fn load(&self) -> Result<HashMap<String, String>> {
        Ok(self.collect(env::vars()))
    }

    fn collect<I>(&self, vars: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        vars.into_iter()
            .filter_map(|(key, value)| {
                let key = match &self.prefix {
                    Some(prefix) => key.strip_prefix(prefix.as_str())?.strip_prefix('_')?,
                    None => key.as_str(),
                };
                (!key.is_empty()).then(|| (config_key(key), value))
            })
            .collect()
    }

    /// Load a specific environment variable
    pub fn load_var(&self, key: &str) -> Result<String> {
        let full_key = match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, env_name(key)),
            None => env_name(key),
        };

        env::var(&full_key).map_err(ConfigError::EnvError)
    }

    /// Load with default value
    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(None)
    }
}

/// `APP__MAINTENANCE_RETRY` -> `app.maintenance_retry`
pub fn config_key(name: &str) -> String {
    name.to_lowercase().replace("__", ".")
}

/// `app.maintenance_retry` -> `APP__MAINTENANCE_RETRY`
pub fn env_name(key: &str) -> String {
    key.to_uppercase().replace('.', "__")
}

//! Configuration lookup used while booting an application.
//!
//! The core only needs read access to configuration values; the full loader
//! lives in `girder-config`, which implements [`ConfigRepository`].

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;

/// Read-only configuration source
pub trait ConfigRepository: Send + Sync {
    /// Raw value for a dotted key such as `app.maintenance`
    fn get_value(&self, key: &str) -> Option<Value>;

    fn has(&self, key: &str) -> bool {
        self.get_value(key).is_some()
    }
}

/// Typed accessors available on every [`ConfigRepository`], including trait objects
pub trait ConfigRepositoryExt: ConfigRepository {
    /// Deserialize the value at `key`; `None` when missing or of another shape
    fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_value(key)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Booleans also accept the strings `true`, `1`, `on` and `yes` (any case),
    /// as found in environment files; any other string is `false`
    fn get_bool(&self, key: &str) -> bool {
        match self.get_value(key) {
            Some(Value::Bool(value)) => value,
            Some(Value::Number(number)) => number.as_i64().is_some_and(|n| n != 0),
            Some(Value::String(value)) => matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "true" | "1" | "on" | "yes"
            ),
            _ => false,
        }
    }
}

impl<T: ConfigRepository + ?Sized> ConfigRepositoryExt for T {}

/// Look up a dotted key: first as a flat key, then by descending into objects
pub fn lookup<'a>(values: &'a HashMap<String, Value>, key: &str) -> Option<&'a Value> {
    if let Some(value) = values.get(key) {
        return Some(value);
    }

    let mut parts = key.split('.');
    let mut current = values.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// In-memory configuration, used when an application is built without one
#[derive(Debug, Clone, Default)]
pub struct MemoryConfig {
    values: HashMap<String, Value>,
}

impl MemoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }
}

impl ConfigRepository for MemoryConfig {
    fn get_value(&self, key: &str) -> Option<Value> {
        lookup(&self.values, key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_key_wins_over_nested() {
        let config = MemoryConfig::new()
            .with("app.name", "flat")
            .with("app", json!({"name": "nested", "debug": true}));

        assert_eq!(config.get::<String>("app.name"), Some("flat".to_string()));
        assert!(config.get_bool("app.debug"));
    }

    #[test]
    fn test_nested_lookup_through_arrays() {
        let config = MemoryConfig::new().with("servers", json!([{"port": 80}, {"port": 443}]));
        assert_eq!(config.get::<u16>("servers.1.port"), Some(443));
        assert_eq!(config.get::<u16>("servers.2.port"), None);
    }

    #[test]
    fn test_typed_helpers_on_trait_object() {
        let config: Box<dyn ConfigRepository> = Box::new(
            MemoryConfig::new()
                .with("app.maintenance", "on")
                .with("app.maintenance_retry", 30),
        );

        assert!(config.get_bool("app.maintenance"));
        assert_eq!(config.get_or("app.maintenance_retry", 0u64), 30);
        assert_eq!(config.get_or("app.missing", 5u64), 5);
        assert!(config.has("app.maintenance"));
        assert!(!config.get_bool("app.missing"));
    }
}

// Configuration management for the Gantry framework

pub mod env;
pub mod error;
pub mod loader;

pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};

use gantry_core::Environment;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Main configuration manager.
///
/// Values are loaded at boot from environment variables, `.env` files, or
/// TOML/JSON files, then bound into the container as an instance for
/// services to consume.
#[derive(Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<HashMap<String, serde_json::Value>>>,
    env_prefix: Option<String>,
}

impl ConfigManager {
    /// Create a new configuration manager
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(HashMap::new())),
            env_prefix: None,
        }
    }

    /// Create with environment variable prefix
    pub fn with_prefix(prefix: String) -> Self {
        Self {
            config: Arc::new(RwLock::new(HashMap::new())),
            env_prefix: Some(prefix),
        }
    }

    /// Load configuration from environment variables
    pub fn load_env(&self) -> Result<()> {
        let loader = EnvLoader::new(self.env_prefix.clone());
        let env_vars = loader.load()?;

        let mut config = self.config.write().unwrap();
        for (key, value) in env_vars {
            config.insert(key, serde_json::Value::String(value));
        }

        Ok(())
    }

    /// Load configuration from .env file
    pub fn load_dotenv(&self, path: Option<&str>) -> Result<()> {
        if let Some(path) = path {
            dotenvy::from_path(path).map_err(|e| ConfigError::LoadError(e.to_string()))?;
        } else {
            dotenvy::dotenv().ok(); // Ignore if .env doesn't exist
        }
        self.load_env()
    }

    /// Load configuration from file
    pub fn load_file(&self, path: &str, format: FileFormat) -> Result<()> {
        let loader = ConfigLoader::new(format);
        let data = loader.load_file(path)?;

        let mut config = self.config.write().unwrap();
        if let serde_json::Value::Object(map) = data {
            for (key, value) in map {
                config.insert(key, value);
            }
        }

        Ok(())
    }

    /// Set a configuration value
    pub fn set<T: serde::Serialize>(&self, key: &str, value: T) -> Result<()> {
        let json_value = serde_json::to_value(value)
            .map_err(|e| ConfigError::SerializationError(e.to_string()))?;

        let mut config = self.config.write().unwrap();
        config.insert(key.to_string(), json_value);

        Ok(())
    }

    /// Get a configuration value
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let config = self.config.read().unwrap();

        let value = config
            .get(key)
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;

        serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))
    }

    /// Get a configuration value with default
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Get a string value
    pub fn get_string(&self, key: &str) -> Result<String> {
        self.get(key)
    }

    /// Get an integer value
    pub fn get_int(&self, key: &str) -> Result<i64> {
        self.get(key)
    }

    /// Get a boolean value
    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.get(key)
    }

    /// Check if a key exists
    pub fn has(&self, key: &str) -> bool {
        self.config.read().unwrap().contains_key(key)
    }

    /// The runtime environment: the `env` config key when present and valid,
    /// the `GANTRY_ENV` variable otherwise.
    pub fn environment(&self) -> Environment {
        self.get_string("env")
            .ok()
            .and_then(|v| Environment::from_str(&v))
            .unwrap_or_else(Environment::from_env)
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let config = ConfigManager::new();
        config.set("port", 8080).unwrap();
        config.set("name", "gantry").unwrap();

        assert_eq!(config.get_int("port").unwrap(), 8080);
        assert_eq!(config.get_string("name").unwrap(), "gantry");
        assert!(config.has("port"));
        assert!(!config.has("missing"));
    }

    #[test]
    fn test_missing_key() {
        let config = ConfigManager::new();
        assert!(matches!(
            config.get_string("nope"),
            Err(ConfigError::KeyNotFound(_))
        ));
        assert_eq!(config.get_or("nope", 7i64), 7);
    }

    #[test]
    fn test_environment_from_config_key() {
        let config = ConfigManager::new();
        config.set("env", "development").unwrap();
        assert_eq!(config.environment(), Environment::Development);

        config.set("env", "not-a-mode").unwrap();
        // Invalid values fall back to GANTRY_ENV / Production
        let env = config.environment();
        assert!(matches!(
            env,
            Environment::Production | Environment::Development | Environment::Test
        ));
    }

    #[test]
    fn test_load_file_toml() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "port = 9090\nenv = \"test\"").unwrap();

        let config = ConfigManager::new();
        config
            .load_file(file.path().to_str().unwrap(), FileFormat::Toml)
            .unwrap();

        assert_eq!(config.get_int("port").unwrap(), 9090);
        assert_eq!(config.environment(), Environment::Test);
    }
}

// Configuration file loading

use crate::{ConfigError, Result};

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Toml,
    Json,
}

impl FileFormat {
    /// Guess the format from a file extension
    pub fn from_path(path: &str) -> Option<Self> {
        match path.rsplit('.').next()? {
            "toml" => Some(FileFormat::Toml),
            "json" => Some(FileFormat::Json),
            _ => None,
        }
    }
}

/// Configuration file loader
pub struct ConfigLoader {
    format: FileFormat,
}

impl ConfigLoader {
    pub fn new(format: FileFormat) -> Self {
        Self { format }
    }

    /// Load and parse a configuration file into a JSON value
    pub fn load_file(&self, path: &str) -> Result<serde_json::Value> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadError(format!("{}: {}", path, e)))?;
        self.parse(&contents)
    }

    /// Parse configuration contents into a JSON value
    pub fn parse(&self, contents: &str) -> Result<serde_json::Value> {
        match self.format {
            FileFormat::Json => serde_json::from_str(contents)
                .map_err(|e| ConfigError::ParseError(e.to_string())),
            FileFormat::Toml => {
                let value: toml::Value =
                    toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
                serde_json::to_value(value)
                    .map_err(|e| ConfigError::SerializationError(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json() {
        let loader = ConfigLoader::new(FileFormat::Json);
        let value = loader.parse(r#"{"port": 8080, "debug": true}"#).unwrap();
        assert_eq!(value["port"], 8080);
        assert_eq!(value["debug"], true);
    }

    #[test]
    fn test_parse_toml() {
        let loader = ConfigLoader::new(FileFormat::Toml);
        let value = loader.parse("port = 8080\ndebug = true\n").unwrap();
        assert_eq!(value["port"], 8080);
        assert_eq!(value["debug"], true);
    }

    #[test]
    fn test_parse_error() {
        let loader = ConfigLoader::new(FileFormat::Json);
        assert!(loader.parse("{ nope").is_err());
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(FileFormat::from_path("app.toml"), Some(FileFormat::Toml));
        assert_eq!(FileFormat::from_path("app.json"), Some(FileFormat::Json));
        assert_eq!(FileFormat::from_path("app.yaml"), None);
    }

    #[test]
    fn test_missing_file() {
        let loader = ConfigLoader::new(FileFormat::Toml);
        assert!(loader.load_file("/no/such/file.toml").is_err());
    }
}

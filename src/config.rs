//! Configuration types for hatchify.toml

use serde::Deserialize;
use std::path::Path;

#[cfg(feature = "rusqlite")]
use hatchify_sqlite::SqliteConfig;

/// Main configuration struct for hatchify.toml
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct HatchifyConfig {
    /// Path prefix every resource endpoint is served under
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// Database connection configuration
    #[cfg(feature = "rusqlite")]
    #[serde(default)]
    pub database: SqliteConfig,
}

fn default_api_prefix() -> String {
    "/api".to_string()
}

impl Default for HatchifyConfig {
    fn default() -> Self {
        Self {
            api_prefix: default_api_prefix(),
            #[cfg(feature = "rusqlite")]
            database: SqliteConfig::default(),
        }
    }
}

impl HatchifyConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::parse(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        if !config.api_prefix.is_empty() && !config.api_prefix.starts_with('/') {
            return Err(ConfigError::InvalidPrefix(config.api_prefix));
        }
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("API prefix '{0}' must start with '/'")]
    InvalidPrefix(String),
}

#[cfg(all(test, feature = "rusqlite"))]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_config() {
        let toml = r#"
api_prefix = "/v1"

[database]
path = "./dev.db"
transaction = "immediate"
"#;

        let config = HatchifyConfig::parse(toml).unwrap();
        assert_eq!(config.api_prefix, "/v1");
        assert_eq!(config.database.path, "./dev.db");
        assert_eq!(
            config.database.transaction,
            hatchify_sqlite::TransactionMode::Immediate
        );
    }

    #[test]
    fn test_default_config() {
        let config = HatchifyConfig::parse("").unwrap();
        assert_eq!(config, HatchifyConfig::default());
        assert_eq!(config.api_prefix, "/api");
        assert!(config.database.is_memory());
    }

    #[test]
    fn test_rejects_unknown_transaction_mode() {
        let err = HatchifyConfig::parse("[database]\ntransaction = \"eventual\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_rejects_relative_prefix() {
        let err = HatchifyConfig::parse("api_prefix = \"api\"").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPrefix(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "api_prefix = \"/internal\"").unwrap();

        let config = HatchifyConfig::from_file(file.path()).unwrap();
        assert_eq!(config.api_prefix, "/internal");

        let missing = HatchifyConfig::from_file(Path::new("/nonexistent/hatchify.toml"));
        assert!(matches!(missing, Err(ConfigError::IoError(_))));
    }
}

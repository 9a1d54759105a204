//! Configuration file management.
//!
//! The config lives at `<config dir>/nodewatch/config.toml`:
//!
//! ```toml
//! [database]
//! url = "https://example-default-rtdb.firebaseio.com"
//! path = "nodes"
//!
//! [display]
//! locale = "en"
//!
//! [selection]
//! policy = "keep-previous"
//! default_node = "greenhouse"
//!
//! [file]
//! poll_interval_ms = 1000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use nodewatch_core::{DEFAULT_PATH, Locale, SelectionPolicy};
use serde::{Deserialize, Serialize};

/// Environment variable overriding `database.url`.
pub const ENV_DATABASE_URL: &str = "NODEWATCH_DATABASE_URL";
/// Environment variable overriding `database.auth`.
pub const ENV_DATABASE_AUTH: &str = "NODEWATCH_DATABASE_AUTH";

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default)]
    pub file: FileConfig,
}

/// Remote database connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Realtime database URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Path of the node collection.
    #[serde(default = "default_path")]
    pub path: String,

    /// Auth token sent as the `auth` query parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            path: default_path(),
            auth: None,
        }
    }
}

fn default_path() -> String {
    DEFAULT_PATH.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Language for dates and relative ages: "en" or "es".
    #[serde(default)]
    pub locale: Locale,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// "keep-previous" or "accept-absent".
    #[serde(default)]
    pub policy: SelectionPolicy,

    /// Node shown by `show` and followed by `watch` when none is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_node: Option<String>,
}

/// Local JSON file source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    /// File to read when no database URL is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// How often the file is checked for changes.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl FileConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Default configuration file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nodewatch")
            .join("config.toml")
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Load configuration from a file, or the defaults if it does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load, apply environment overrides, then validate.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_or_default(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Apply `NODEWATCH_DATABASE_URL` and `NODEWATCH_DATABASE_AUTH`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_DATABASE_URL).filter(|v| !v.is_empty()) {
            self.database.url = Some(url);
        }
        if let Some(auth) = lookup(ENV_DATABASE_AUTH).filter(|v| !v.is_empty()) {
            self.database.auth = Some(auth);
        }
    }

    /// Validate the configuration and return any errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if let Some(url) = &self.database.url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            errors.push(ValidationError {
                field: "database.url".to_string(),
                message: format!("invalid URL '{}': expected http:// or https://", url),
            });
        }

        if self.database.path.trim_matches('/').is_empty() {
            errors.push(ValidationError {
                field: "database.path".to_string(),
                message: "path cannot be empty".to_string(),
            });
        }

        if let Some(node) = &self.selection.default_node
            && node.trim().is_empty()
        {
            errors.push(ValidationError {
                field: "selection.default_node".to_string(),
                message: "node id cannot be empty".to_string(),
            });
        }

        if self.file.poll_interval_ms == 0 {
            errors.push(ValidationError {
                field: "file.poll_interval_ms".to_string(),
                message: "poll interval must be greater than 0".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Copy of this config with the auth token masked, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.database.auth.is_some() {
            config.database.auth = Some("********".to_string());
        }
        config
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `database.url`).
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.database.url.is_none());
        assert_eq!(config.database.path, "nodes");
        assert_eq!(config.display.locale, Locale::English);
        assert_eq!(config.selection.policy, SelectionPolicy::KeepPrevious);
        assert_eq!(config.file.poll_interval(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [database]
            url = "https://demo-default-rtdb.firebaseio.com"
            path = "sites/north"
            auth = "secret"

            [display]
            locale = "es"

            [selection]
            policy = "accept-absent"
            default_node = "greenhouse"

            [file]
            poll_interval_ms = 250
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.database.path, "sites/north");
        assert_eq!(config.database.auth.as_deref(), Some("secret"));
        assert_eq!(config.display.locale, Locale::Spanish);
        assert_eq!(config.selection.policy, SelectionPolicy::AcceptAbsent);
        assert_eq!(config.selection.default_node.as_deref(), Some("greenhouse"));
        assert_eq!(config.file.poll_interval_ms, 250);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str("[database]\nurl = \"https://x.io\"\n").unwrap();
        assert_eq!(config.database.path, "nodes");
        assert_eq!(config.file.poll_interval_ms, 1000);
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = Config::default();
        config.database.url = Some("ftp://nope".to_string());
        config.database.path = "/".to_string();
        config.selection.default_node = Some("  ".to_string());
        config.file.poll_interval_ms = 0;

        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(
                    fields,
                    vec![
                        "database.url",
                        "database.path",
                        "selection.default_node",
                        "file.poll_interval_ms"
                    ]
                );
            }
            other => panic!("expected validation errors, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_error_message() {
        let mut config = Config::default();
        config.file.poll_interval_ms = 0;
        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("  - file.poll_interval_ms: poll interval must be greater than 0"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.database.url = Some("https://from-file.io".to_string());
        config.apply_overrides(|key| match key {
            ENV_DATABASE_URL => Some("https://from-env.io".to_string()),
            ENV_DATABASE_AUTH => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.database.url.as_deref(), Some("https://from-env.io"));
        assert!(config.database.auth.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.database.url = Some("https://demo.firebaseio.com".to_string());
        config.selection.default_node = Some("north".to_string());
        config.display.locale = Locale::Spanish;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(Config::load(&path), Err(ConfigError::Read { .. })));
        assert_eq!(Config::load_or_default(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[database\nurl = ").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let result: Result<Config, _> = toml::from_str("[selection]\npolicy = \"sometimes\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_redacted_hides_auth() {
        let mut config = Config::default();
        config.database.auth = Some("secret".to_string());
        let shown = toml::to_string_pretty(&config.redacted()).unwrap();
        assert!(!shown.contains("secret"));
        assert!(Config::default().redacted().database.auth.is_none());
    }

    #[test]
    fn test_default_path_ends_with_config_toml() {
        let path = Config::default_path();
        assert!(path.ends_with("nodewatch/config.toml"));
    }
}

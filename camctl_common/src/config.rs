//! Configuration loading traits and types.
//!
//! Every camctl binary reads a single TOML file. The pieces shared by all of
//! them live here; application crates embed [`SharedConfig`] in their own
//! config struct and get [`ConfigLoader::load`] for free.
//!
//! ```rust,no_run
//! use camctl_common::config::{ConfigError, ConfigLoader, SharedConfig};
//! use serde::Deserialize;
//! use std::path::Path;
//!
//! #[derive(Debug, Deserialize)]
//! struct DaemonConfig {
//!     shared: SharedConfig,
//!     port: u16,
//! }
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = DaemonConfig::load(Path::new("camctl.toml"))?;
//!     println!("{} on port {}", config.shared.service_name, config.port);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::Level;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log verbosity, spelled in lowercase in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

fn default_service_name() -> String {
    "camctl".to_string()
}

/// Fields common to every camctl process.
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "camctl-bench-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Instance identifier, used as the root tracing span name.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: default_service_name(),
        }
    }
}

impl SharedConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads any deserializable type from a TOML file.
///
/// - `ConfigError::FileNotFound` if the file does not exist
/// - `ConfigError::ParseError` for I/O failures and TOML syntax or type errors
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.display().to_string())
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from an in-memory TOML document.
    fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[derive(Debug, Deserialize)]
    struct Wrapper {
        shared: SharedConfig,
    }

    #[test]
    fn log_level_parses_lowercase() {
        #[derive(Debug, Deserialize)]
        struct LevelOnly {
            level: LogLevel,
        }
        for (text, expected) in [
            ("trace", LogLevel::Trace),
            ("debug", LogLevel::Debug),
            ("warn", LogLevel::Warn),
        ] {
            let parsed: LevelOnly = toml::from_str(&format!("level = \"{text}\"")).unwrap();
            assert_eq!(parsed.level, expected);
        }
        assert!(toml::from_str::<LevelOnly>("level = \"DEBUG\"").is_err());
    }

    #[test]
    fn log_level_maps_to_tracing() {
        assert_eq!(Level::from(LogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(LogLevel::default()), Level::INFO);
    }

    #[test]
    fn shared_section_defaults() {
        let cfg = Wrapper::parse("[shared]\n").unwrap();
        assert_eq!(cfg.shared.service_name, "camctl");
        assert_eq!(cfg.shared.log_level, LogLevel::Info);
        assert!(cfg.shared.validate().is_ok());
    }

    #[test]
    fn blank_service_name_is_rejected() {
        let cfg = SharedConfig {
            log_level: LogLevel::Info,
            service_name: "   ".to_string(),
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Wrapper::load(Path::new("/nonexistent/camctl.toml")).unwrap_err();
        match err {
            ConfigError::FileNotFound(p) => assert!(p.ends_with("camctl.toml")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[shared]
log_level = "debug"
service_name = "camctl-test"
"#
        )
        .unwrap();
        file.flush().unwrap();

        let cfg = Wrapper::load(file.path()).unwrap();
        assert_eq!(cfg.shared.log_level, LogLevel::Debug);
        assert_eq!(cfg.shared.service_name, "camctl-test");
    }

    #[test]
    fn broken_toml_is_a_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[shared").unwrap();
        assert!(matches!(
            Wrapper::load(file.path()),
            Err(ConfigError::ParseError(_))
        ));
    }
}

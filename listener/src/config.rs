//! Configuration management for the listener agent
//!
//! Configuration is loaded once at startup from defaults, an optional TOML
//! file and `LISTENER_*` environment variables, validated, and then passed
//! by value to the components that need it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Main configuration structure for the listener agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Path of the rolling history log
    #[serde(alias = "logName")]
    pub log_name: PathBuf,

    /// Seconds between ticks
    #[serde(alias = "delayTime")]
    pub delay_time: f64,

    /// History capacity per channel
    #[serde(alias = "numberOfItemsPerLine")]
    pub number_of_items_per_line: usize,

    /// Files that must be present in `watch_dir`, in reporting order
    pub files: Vec<String>,

    /// Directory checked for required files
    pub watch_dir: PathBuf,

    /// Mount point sampled by the disk channel
    pub disk_mount_point: PathBuf,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,

    /// Emit JSON formatted diagnostics
    pub json: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            log_name: PathBuf::from("listenerLog.log"),
            delay_time: 5.0,
            number_of_items_per_line: 60,
            files: Vec::new(),
            watch_dir: PathBuf::from("."),
            disk_mount_point: PathBuf::from("/"),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl ListenerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.to_string_lossy().to_string(),
        })?;

        let config: ListenerConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError { reason: e.to_string() })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply `LISTENER_*` environment overrides on top of `self`
    pub fn apply_env(self) -> ConfigResult<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    ///
    /// Split out from [`apply_env`](Self::apply_env) so tests do not have to
    /// mutate the process environment.
    pub fn apply_overrides<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(log_name) = lookup("LISTENER_LOG_NAME") {
            self.log_name = PathBuf::from(log_name);
        }

        if let Some(delay_time) = lookup("LISTENER_DELAY_TIME") {
            self.delay_time = delay_time.parse().map_err(|_| ConfigError::InvalidValue {
                field: "LISTENER_DELAY_TIME".to_string(),
                value: delay_time,
            })?;
        }

        if let Some(items) = lookup("LISTENER_ITEMS_PER_LINE") {
            self.number_of_items_per_line = items.parse().map_err(|_| ConfigError::InvalidValue {
                field: "LISTENER_ITEMS_PER_LINE".to_string(),
                value: items,
            })?;
        }

        if let Some(files) = lookup("LISTENER_FILES") {
            self.files = files
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(level) = lookup("LISTENER_LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(self)
    }

    /// Load configuration with fallback order: defaults -> file -> env
    pub fn load_with_fallback<P: AsRef<Path>>(config_path: Option<P>) -> ConfigResult<Self> {
        let mut config = ListenerConfig::default();

        if let Some(path) = config_path {
            let path = path.as_ref();
            if !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.to_string_lossy().to_string(),
                });
            }
            config = ListenerConfig::from_file(path)?;
        } else if let Ok(default_path) = ListenerConfig::default_config_path() {
            if default_path.exists() {
                config = ListenerConfig::from_file(default_path)?;
            }
        }

        let config = config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.number_of_items_per_line == 0 {
            return Err(ConfigError::InvalidValue {
                field: "number_of_items_per_line".to_string(),
                value: "0".to_string(),
            });
        }

        if !self.delay_time.is_finite() || self.delay_time <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "delay_time".to_string(),
                value: self.delay_time.to_string(),
            });
        }

        if self.log_name.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "log_name".to_string(),
                value: String::new(),
            });
        }

        if let Some(name) = self.files.iter().find(|name| name.is_empty() || name.contains('/')) {
            return Err(ConfigError::InvalidValue {
                field: "files".to_string(),
                value: name.clone(),
            });
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::InvalidValue {
                    field: "logging.level".to_string(),
                    value: self.logging.level.clone(),
                })
            }
        }

        Ok(())
    }

    /// Interval between ticks
    pub fn delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay_time)
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> ConfigResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("listener").join("listener.toml"))
            .ok_or_else(|| ConfigError::ValidationFailed {
                reason: "Unable to determine config directory".to_string(),
            })
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|_| ConfigError::ValidationFailed {
                reason: format!("Unable to create config directory: {}", parent.display()),
            })?;
        }

        let content = self.to_toml()?;

        fs::write(path, content).map_err(|_| ConfigError::PermissionDenied {
            path: path.to_string_lossy().to_string(),
        })?;

        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationFailed { reason: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = ListenerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_config_validation() {
        let mut config = ListenerConfig::default();

        config.number_of_items_per_line = 0;
        assert!(config.validate().is_err());

        config.number_of_items_per_line = 3;
        config.delay_time = 0.0;
        assert!(config.validate().is_err());

        config.delay_time = f64::NAN;
        assert!(config.validate().is_err());

        config.delay_time = 0.5;
        config.files = vec!["hosts.txt".to_string(), "sub/config.py".to_string()];
        assert!(config.validate().is_err());

        config.files = vec!["hosts.txt".to_string()];
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "DEBUG".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_file_operations() {
        let mut config = ListenerConfig::default();
        config.files = vec!["hosts.txt".to_string(), "config.py".to_string()];
        let temp_file = NamedTempFile::new().unwrap();

        config.save_to_file(temp_file.path()).unwrap();
        let loaded_config = ListenerConfig::from_file(temp_file.path()).unwrap();

        assert_eq!(config, loaded_config);
    }

    #[test]
    fn test_camel_case_aliases() {
        let content = r#"
logName = "custom.log"
delayTime = 2
numberOfItemsPerLine = 10
files = ["hosts.txt", "config.py"]
"#;
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("listener.toml");
        fs::write(&path, content).unwrap();

        let config = ListenerConfig::from_file(&path).unwrap();
        assert_eq!(config.log_name, PathBuf::from("custom.log"));
        assert_eq!(config.delay_time, 2.0);
        assert_eq!(config.number_of_items_per_line, 10);
        assert_eq!(config.files, vec!["hosts.txt", "config.py"]);
        assert_eq!(config.watch_dir, PathBuf::from("."));
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("listener.toml");
        fs::write(&path, "number_of_items_per_line = 0\n").unwrap();
        assert!(matches!(
            ListenerConfig::from_file(&path),
            Err(ConfigError::InvalidValue { .. })
        ));

        fs::write(&path, "delay_time = \"soon\"\n").unwrap();
        assert!(matches!(
            ListenerConfig::from_file(&path),
            Err(ConfigError::ParseError { .. })
        ));

        assert!(matches!(
            ListenerConfig::from_file(temp_dir.path().join("missing.toml")),
            Err(ConfigError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("LISTENER_LOG_NAME", "/tmp/agent.log"),
            ("LISTENER_DELAY_TIME", "0.25"),
            ("LISTENER_ITEMS_PER_LINE", "4"),
            ("LISTENER_FILES", "hosts.txt, config.py,,"),
        ]
        .into_iter()
        .collect();

        let config = ListenerConfig::default()
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.log_name, PathBuf::from("/tmp/agent.log"));
        assert_eq!(config.delay(), Duration::from_millis(250));
        assert_eq!(config.number_of_items_per_line, 4);
        assert_eq!(config.files, vec!["hosts.txt", "config.py"]);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_bad_override_value() {
        let result = ListenerConfig::default().apply_overrides(|key| {
            (key == "LISTENER_ITEMS_PER_LINE").then(|| "many".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = ListenerConfig::load_with_fallback(Some(temp_dir.path().join("nope.toml")));
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }
}

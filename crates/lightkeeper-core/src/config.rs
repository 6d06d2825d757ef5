//! Configuration loading and typed config structures for Lightkeeper.
//!
//! The host reads `lightkeeper.yaml` from its working directory. Every field
//! has a default, so an empty or missing file is a valid configuration.
//!
//! ```yaml
//! scheduler:
//!   tick_interval_ms: 500
//! controller:
//!   handshake: true
//!   log_ticks: false
//!   loading_description: "Initializing game"
//! logging:
//!   level: "info"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LightkeeperConfig {
    /// Background ticker settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Foreground controller settings.
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LightkeeperConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `LIGHTKEEPER_TICK_INTERVAL_MS` overrides `scheduler.tick_interval_ms`
    /// - `LIGHTKEEPER_HANDSHAKE` overrides `controller.handshake`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, applying environment
    /// overrides and validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config = Self::parse_without_env(yaml)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string without consulting the
    /// environment. Validation still applies.
    ///
    /// # Errors
    ///
    /// Same as [`parse`](Self::parse).
    pub fn parse_without_env(yaml: &str) -> Result<Self, ConfigError> {
        // serde_yml reads an empty document as null, not as an empty map.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Override values with environment variables when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable is set but unparseable.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Override values from `lookup`, which maps a `LIGHTKEEPER_*` variable
    /// name to its value when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a value is set but unparseable.
    pub fn apply_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(val) = lookup("LIGHTKEEPER_TICK_INTERVAL_MS") {
            self.scheduler.tick_interval_ms =
                val.trim().parse().map_err(|e| ConfigError::Invalid {
                    reason: format!("LIGHTKEEPER_TICK_INTERVAL_MS={val}: {e}"),
                })?;
        }
        if let Some(val) = lookup("LIGHTKEEPER_HANDSHAKE") {
            self.controller.handshake =
                val.trim().parse().map_err(|e| ConfigError::Invalid {
                    reason: format!("LIGHTKEEPER_HANDSHAKE={val}: {e}"),
                })?;
        }
        Ok(())
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `scheduler.tick_interval_ms` is 0.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "scheduler.tick_interval_ms must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

/// Background ticker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// Fixed period between tick events, in milliseconds. Not negotiated
    /// with the controller.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl SchedulerConfig {
    /// The tick period as a [`Duration`].
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

/// Foreground controller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ControllerConfig {
    /// Whether the controller performs the `ready-query`/`ready-ack`
    /// exchange before commanding start. When false, `start-command` is sent
    /// right after the scheduler context is created.
    #[serde(default = "default_true")]
    pub handshake: bool,

    /// Log every applied tick at debug level.
    #[serde(default)]
    pub log_ticks: bool,

    /// Text shown by the loading indicator until the scheduler is ready.
    #[serde(default = "default_loading_description")]
    pub loading_description: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            handshake: true,
            log_ticks: false,
            loading_description: default_loading_description(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const fn default_tick_interval_ms() -> u64 {
    1_000
}

fn default_loading_description() -> String {
    "Initializing game".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = LightkeeperConfig::default();
        assert_eq!(config.scheduler.tick_interval_ms, 1_000);
        assert_eq!(config.scheduler.tick_interval(), Duration::from_secs(1));
        assert!(config.controller.handshake);
        assert!(!config.controller.log_ticks);
        assert_eq!(config.controller.loading_description, "Initializing game");
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
scheduler:
  tick_interval_ms: 500

controller:
  handshake: false
  log_ticks: true
  loading_description: "Warming up"

logging:
  level: "debug"
"#;

        let config = LightkeeperConfig::parse_without_env(yaml);
        assert!(config.is_ok());
        let config = config.ok().unwrap_or_default();

        assert_eq!(config.scheduler.tick_interval_ms, 500);
        assert!(!config.controller.handshake);
        assert!(config.controller.log_ticks);
        assert_eq!(config.controller.loading_description, "Warming up");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn parse_minimal_yaml() {
        let yaml = "scheduler:\n  tick_interval_ms: 250\n";
        let config = LightkeeperConfig::parse_without_env(yaml);
        assert!(config.is_ok());
        let config = config.ok().unwrap_or_default();

        assert_eq!(config.scheduler.tick_interval_ms, 250);
        // Everything else uses defaults
        assert!(config.controller.handshake);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parse_empty_yaml() {
        let config = LightkeeperConfig::parse_without_env("");
        assert_eq!(config.ok(), Some(LightkeeperConfig::default()));
    }

    #[test]
    fn zero_tick_interval_is_rejected() {
        let yaml = "scheduler:\n  tick_interval_ms: 0\n";
        let result = LightkeeperConfig::parse_without_env(yaml);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn malformed_yaml_is_rejected() {
        let yaml = "scheduler:\n  tick_interval_ms: [not, a, number]\n";
        let result = LightkeeperConfig::parse_without_env(yaml);
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    fn vars(pairs: &[(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        let pairs = pairs.to_vec();
        move |key: &str| {
            pairs
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value).to_owned())
        }
    }

    #[test]
    fn overrides_replace_yaml_values() {
        let yaml = "scheduler:\n  tick_interval_ms: 250\ncontroller:\n  handshake: true\n";
        let mut config = LightkeeperConfig::parse_without_env(yaml).unwrap_or_default();

        let result = config.apply_overrides_from(vars(&[
            ("LIGHTKEEPER_TICK_INTERVAL_MS", " 40 "),
            ("LIGHTKEEPER_HANDSHAKE", "false"),
        ]));
        assert!(result.is_ok());
        assert_eq!(config.scheduler.tick_interval_ms, 40);
        assert!(!config.controller.handshake);
    }

    #[test]
    fn unset_overrides_leave_config_untouched() {
        let mut config = LightkeeperConfig::default();
        assert!(config.apply_overrides_from(vars(&[])).is_ok());
        assert_eq!(config, LightkeeperConfig::default());
    }

    #[test]
    fn unparseable_interval_override_is_invalid() {
        let mut config = LightkeeperConfig::default();
        let result =
            config.apply_overrides_from(vars(&[("LIGHTKEEPER_TICK_INTERVAL_MS", "abc")]));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
        assert_eq!(config.scheduler.tick_interval_ms, 1_000);
    }

    #[test]
    fn unparseable_handshake_override_is_invalid() {
        let mut config = LightkeeperConfig::default();
        let result = config.apply_overrides_from(vars(&[("LIGHTKEEPER_HANDSHAKE", "yes")]));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
        assert!(config.controller.handshake);
    }

    #[test]
    fn zero_interval_override_fails_validation() {
        let mut config = LightkeeperConfig::default();
        let result = config.apply_overrides_from(vars(&[("LIGHTKEEPER_TICK_INTERVAL_MS", "0")]));
        assert!(result.is_ok());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("does-not-exist.yaml");
        let result = LightkeeperConfig::from_file(&path);
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}

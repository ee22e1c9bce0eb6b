//! Configuration loading and typed config structures for Agrocast.
//!
//! The configuration lives in `agrocast-config.yaml`. This module defines
//! strongly-typed structs mirroring the YAML structure and a loader that
//! reads and validates the file. Every field has a default, so an empty
//! file is a valid configuration.

use std::collections::BTreeMap;
use std::path::Path;

use agrocast_types::WeatherSignalKind;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::weather_alerts::{DEFAULT_TRUST_LIMIT_DAYS, TrustWindow};

/// Environment variable that overrides `run.today`.
pub const TODAY_ENV_VAR: &str = "AGROCAST_TODAY";

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

    /// A value parsed but is not usable.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the field.
        field: &'static str,
        /// What is wrong with it.
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
pub struct SimulationConfig {
    /// Forecast-trust limits for weather alerts.
    #[serde(default)]
    pub alerts: AlertConfig,

    /// Run settings.
    #[serde(default)]
    pub run: RunConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, and
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML and
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.run.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that deserialize but cannot be used.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.step_days == 0 {
            return Err(ConfigError::Invalid {
                field: "run.step_days",
                reason: "must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

/// Forecast-trust limits.
///
/// An alert computed on a day more than the limit past "today" is not
/// raised. Kinds without an entry in `trust_limit_days` use
/// `default_trust_limit_days`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AlertConfig {
    /// Limit for kinds without their own entry.
    #[serde(default = "default_trust_limit_days")]
    pub default_trust_limit_days: i64,

    /// Per-kind limits, keyed by signal name (`TMAX_STRESS`, ...).
    #[serde(default)]
    pub trust_limit_days: BTreeMap<WeatherSignalKind, i64>,
}

impl AlertConfig {
    /// Build the trust window for a run anchored at `today`.
    pub fn trust_window(&self, today: NaiveDate) -> TrustWindow {
        self.trust_limit_days.iter().fold(
            TrustWindow::new(today, self.default_trust_limit_days),
            |window, (kind, limit)| window.with_limit(*kind, *limit),
        )
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            default_trust_limit_days: default_trust_limit_days(),
            trust_limit_days: BTreeMap::new(),
        }
    }
}

/// Run settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunConfig {
    /// Reference "today" for the trust window. The current local date is
    /// used when unset.
    #[serde(default)]
    pub today: Option<NaiveDate>,

    /// Days advanced per step.
    #[serde(default = "default_step_days")]
    pub step_days: u32,
}

impl RunConfig {
    /// Override `today` from `AGROCAST_TODAY` if set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the variable is not a
    /// `YYYY-MM-DD` date.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var(TODAY_ENV_VAR) {
            let today = val.trim().parse::<NaiveDate>().map_err(|err| ConfigError::Invalid {
                field: "run.today",
                reason: format!("{TODAY_ENV_VAR}={val}: {err}"),
            })?;
            self.today = Some(today);
        }
        Ok(())
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            today: None,
            step_days: default_step_days(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when
    /// set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions for serde
// ---------------------------------------------------------------------------

const fn default_trust_limit_days() -> i64 {
    DEFAULT_TRUST_LIMIT_DAYS
}

const fn default_step_days() -> u32 {
    1
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SimulationConfig::default();
        assert_eq!(config.alerts.default_trust_limit_days, 3);
        assert!(config.alerts.trust_limit_days.is_empty());
        assert_eq!(config.run.step_days, 1);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
alerts:
  default_trust_limit_days: 4
  trust_limit_days:
    TMAX_STRESS: 2
    FOG_STRESS: 1

run:
  today: 2024-07-01
  step_days: 1

logging:
  level: debug
  json: true
";
        let config: SimulationConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.alerts.default_trust_limit_days, 4);
        assert_eq!(
            config.alerts.trust_limit_days.get(&WeatherSignalKind::TmaxStress),
            Some(&2)
        );
        assert_eq!(config.run.today, NaiveDate::from_ymd_opt(2024, 7, 1));
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);

        let today = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let window = config.alerts.trust_window(today);
        assert_eq!(window.limit_for(WeatherSignalKind::TmaxStress), 2);
        assert_eq!(window.limit_for(WeatherSignalKind::FogStress), 1);
        assert_eq!(window.limit_for(WeatherSignalKind::RainStress), 4);
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let config: SimulationConfig = serde_yml::from_str("logging:\n  level: warn\n").unwrap();
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.alerts.default_trust_limit_days, 3);
        assert_eq!(config.run.today, None);
    }

    #[test]
    fn zero_step_is_invalid() {
        let config: SimulationConfig = serde_yml::from_str("run:\n  step_days: 0\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "run.step_days",
                ..
            })
        ));
    }

    #[test]
    fn unknown_signal_kind_in_limits_fails_to_parse() {
        let yaml = "alerts:\n  trust_limit_days:\n    HAIL_STRESS: 2\n";
        assert!(serde_yml::from_str::<SimulationConfig>(yaml).is_err());
    }
}

//! Configuration for the hot-swap engine.
//!
//! Loaded from an optional TOML file and overridden field-by-field by
//! `HOTSWAP_*` environment variables, then validated eagerly. An unknown
//! key in the TOML file is rejected rather than silently ignored.

pub mod error;

pub use error::{ConfigError, ConfigResult};

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Verbosity of the validation session's recorded event detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationVerbosity {
    Summary,
    Detailed,
}

/// Engine-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HotswapConfig {
    /// Directories to watch for compiled class artifact changes.
    pub watch_paths: Vec<PathBuf>,

    /// How often the watcher polls for write-settling, in milliseconds.
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,

    /// How many consecutive stable reads are required before a changed
    /// file is considered settled.
    pub settling_attempts: u32,

    /// Delay between settling reads, in milliseconds.
    #[serde(with = "duration_millis")]
    pub settling_delay: Duration,

    /// How many rollback snapshots to retain per class before the
    /// oldest is pruned.
    pub rollback_snapshot_retention_per_class: usize,

    /// When true, any instance update failure aborts and rolls back the
    /// whole hot-swap rather than leaving some instances updated.
    pub instance_update_strict_mode: bool,

    pub validation_session_verbosity: ValidationVerbosity,

    /// Root directory the per-aggregate event log is written under.
    pub event_log_root: PathBuf,

    /// If set, every hot-swap request is attributed to this identifier
    /// instead of resolving one from the environment.
    pub user_identity_override: Option<String>,
}

impl Default for HotswapConfig {
    fn default() -> Self {
        Self {
            watch_paths: Vec::new(),
            poll_interval: Duration::from_millis(1000),
            settling_attempts: 3,
            settling_delay: Duration::from_millis(100),
            rollback_snapshot_retention_per_class: 1,
            instance_update_strict_mode: true,
            validation_session_verbosity: ValidationVerbosity::Summary,
            event_log_root: PathBuf::from("./hotswap-events"),
            user_identity_override: None,
        }
    }
}

impl HotswapConfig {
    /// Parses a TOML configuration file, rejecting unknown keys.
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Loads from an optional file, then applies environment overrides.
    pub fn load(config_path: Option<&std::path::Path>) -> ConfigResult<Self> {
        let mut config = match config_path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
                Self::from_toml_str(&contents)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        if let Ok(paths) = env::var("HOTSWAP_WATCH_PATHS") {
            self.watch_paths = env::split_paths(&paths).collect();
        }
        if let Ok(v) = env::var("HOTSWAP_POLL_INTERVAL_MS") {
            self.poll_interval = Duration::from_millis(parse_env("HOTSWAP_POLL_INTERVAL_MS", &v)?);
        }
        if let Ok(v) = env::var("HOTSWAP_SETTLING_ATTEMPTS") {
            self.settling_attempts = parse_env("HOTSWAP_SETTLING_ATTEMPTS", &v)?;
        }
        if let Ok(v) = env::var("HOTSWAP_SETTLING_DELAY_MS") {
            self.settling_delay = Duration::from_millis(parse_env("HOTSWAP_SETTLING_DELAY_MS", &v)?);
        }
        if let Ok(v) = env::var("HOTSWAP_ROLLBACK_RETENTION") {
            self.rollback_snapshot_retention_per_class = parse_env("HOTSWAP_ROLLBACK_RETENTION", &v)?;
        }
        if let Ok(v) = env::var("HOTSWAP_STRICT_INSTANCE_UPDATES") {
            self.instance_update_strict_mode = parse_env("HOTSWAP_STRICT_INSTANCE_UPDATES", &v)?;
        }
        if let Ok(v) = env::var("HOTSWAP_EVENT_LOG_ROOT") {
            self.event_log_root = PathBuf::from(v);
        }
        if let Ok(v) = env::var("HOTSWAP_USER_IDENTITY") {
            self.user_identity_override = Some(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.watch_paths.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "at least one watch_paths entry is required".into(),
            ));
        }
        if self.settling_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "settling_attempts must be greater than 0".into(),
            ));
        }
        if self.rollback_snapshot_retention_per_class == 0 {
            return Err(ConfigError::ValidationFailed(
                "rollback_snapshot_retention_per_class must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fail_validation_without_watch_paths() {
        let config = HotswapConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_toml_keys() {
        let toml = r#"
            watch_paths = ["/tmp/classes"]
            poll_interval = 250
            settling_attempts = 3
            settling_delay = 100
            rollback_snapshot_retention_per_class = 5
            instance_update_strict_mode = true
            validation_session_verbosity = "summary"
            event_log_root = "./events"
            made_up_field = true
        "#;
        assert!(matches!(
            HotswapConfig::from_toml_str(toml),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn parses_well_formed_toml() {
        let toml = r#"
            watch_paths = ["/tmp/classes"]
            poll_interval = 250
            settling_attempts = 3
            settling_delay = 100
            rollback_snapshot_retention_per_class = 5
            instance_update_strict_mode = true
            validation_session_verbosity = "detailed"
            event_log_root = "./events"
        "#;
        let config = HotswapConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.settling_attempts, 3);
        assert_eq!(config.validation_session_verbosity, ValidationVerbosity::Detailed);
        assert!(config.validate().is_ok());
    }
}

//! Sidecar configuration.
//!
//! Layering, lowest to highest precedence: built-in defaults, the TOML
//! file, environment variables, command line flags.
//!
//! ```toml
//! mcs_address = "ws://127.0.0.1:8020/mcs"
//! reconnect_interval_ms = 2000
//! shutdown_failover_ms = 5000
//! call_timeout_ms = 10000
//! connect_timeout_ms = 5000
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::link::LinkConfig;

pub const ENV_ADDRESS: &str = "MCS_ADDRESS";
pub const ENV_RECONNECT_INTERVAL: &str = "MCSW_RECONNECT_INTERVAL_MS";
pub const ENV_SHUTDOWN_FAILOVER: &str = "MCSW_SHUTDOWN_FAILOVER_MS";
pub const ENV_CALL_TIMEOUT: &str = "MCSW_CALL_TIMEOUT_MS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("no media control server address (set mcs_address, MCS_ADDRESS or --address)")]
    MissingAddress,
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mcs_address: Option<String>,
    pub reconnect_interval_ms: u64,
    pub shutdown_failover_ms: u64,
    pub call_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mcs_address: None,
            reconnect_interval_ms: 2000,
            shutdown_failover_ms: 5000,
            call_timeout_ms: 10_000,
            connect_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Default config file location, `$XDG_CONFIG_HOME/mcsw/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mcsw").join("config.toml"))
    }

    /// Loads the config file.
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// used if present, and built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects timings the link cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("reconnect_interval_ms", self.reconnect_interval_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("call_timeout_ms", self.call_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Applies overrides from the process environment.
    pub fn apply_process_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup` (an environment accessor).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = lookup(ENV_ADDRESS).filter(|a| !a.trim().is_empty()) {
            self.mcs_address = Some(address);
        }
        for (key, field) in [
            (ENV_RECONNECT_INTERVAL, &mut self.reconnect_interval_ms),
            (ENV_SHUTDOWN_FAILOVER, &mut self.shutdown_failover_ms),
            (ENV_CALL_TIMEOUT, &mut self.call_timeout_ms),
        ] {
            if let Some(value) = lookup(key) {
                let parsed: u64 = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.clone(),
                })?;
                if parsed == 0 && key != ENV_SHUTDOWN_FAILOVER {
                    return Err(ConfigError::InvalidValue {
                        key: key.to_string(),
                        value,
                    });
                }
                *field = parsed;
            }
        }
        Ok(())
    }

    /// The server address, required to start the sidecar.
    pub fn require_address(&self) -> Result<&str, ConfigError> {
        self.mcs_address
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .ok_or(ConfigError::MissingAddress)
    }

    #[must_use]
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            reconnect_interval: Duration::from_millis(self.reconnect_interval_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            call_timeout: Duration::from_millis(self.call_timeout_ms),
        }
    }

    #[must_use]
    pub fn shutdown_failover(&self) -> Duration {
        Duration::from_millis(self.shutdown_failover_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.link_config(), LinkConfig::default());
        assert_eq!(config.shutdown_failover(), Duration::from_millis(5000));
        assert!(matches!(config.require_address(), Err(ConfigError::MissingAddress)));
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mcs_address = \"ws://10.0.0.1:8020\"").unwrap();
        writeln!(file, "shutdown_failover_ms = 250").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.require_address().unwrap(), "ws://10.0.0.1:8020");
        assert_eq!(config.shutdown_failover_ms, 250);
        assert_eq!(config.reconnect_interval_ms, 2000);
    }

    #[test]
    fn test_explicit_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_bad_toml_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "reconnect_interval_ms = \"soon\"").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                (ENV_ADDRESS, "ws://mcs:8020"),
                (ENV_RECONNECT_INTERVAL, "750"),
                (ENV_CALL_TIMEOUT, " 3000 "),
            ]))
            .unwrap();
        assert_eq!(config.mcs_address.as_deref(), Some("ws://mcs:8020"));
        assert_eq!(config.reconnect_interval_ms, 750);
        assert_eq!(config.call_timeout_ms, 3000);
        assert_eq!(config.shutdown_failover_ms, 5000);
    }

    #[test]
    fn test_env_rejects_non_numeric() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[(ENV_SHUTDOWN_FAILOVER, "5s")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == ENV_SHUTDOWN_FAILOVER));
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        for key in [ENV_RECONNECT_INTERVAL, ENV_CALL_TIMEOUT] {
            let mut config = Config::default();
            let err = config.apply_env(env(&[(key, "0")])).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { key: ref k, .. } if k == key));
            assert_ne!(config.reconnect_interval_ms, 0);
        }

        for field in ["reconnect_interval_ms", "connect_timeout_ms", "call_timeout_ms"] {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "{field} = 0").unwrap();
            let err = Config::from_file(file.path()).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == field));
        }
    }

    #[test]
    fn test_zero_failover_is_allowed() {
        let mut config = Config::default();
        config.apply_env(env(&[(ENV_SHUTDOWN_FAILOVER, "0")])).unwrap();
        assert_eq!(config.shutdown_failover(), Duration::ZERO);
    }
}

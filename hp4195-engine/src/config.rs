//! Worker configuration.
//!
//! Defaults match a stock HP4195A on GPIB address 17. Any subset of the
//! fields can be overridden from a TOML file:
//!
//! ```toml
//! resource_id = "GPIB0::11::INSTR"
//! timeout = "10s"
//!
//! [[settle]]
//! rbw_hz = 100
//! duration = "41s"
//! ```

use std::path::Path;
use std::time::Duration;

use hp4195_messages::Hertz;
use log::debug;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::settle::SettleTable;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// VISA resource string of the analyzer.
    pub resource_id: String,
    /// Substring the identity response must contain.
    pub device_tag: String,
    /// Bus timeout applied to every query.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Bandwidth used by the low-resolution sweep.
    pub low_res_rbw_hz: f64,
    /// Bandwidth restored after the low-resolution sweep.
    pub normal_rbw_hz: f64,
    pub settle: SettleTable,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            resource_id: "GPIB0::17::INSTR".to_string(),
            device_tag: "HP4195A".to_string(),
            timeout: Duration::from_millis(5000),
            low_res_rbw_hz: 10.0,
            normal_rbw_hz: 100.0,
            settle: SettleTable::default(),
        }
    }
}

impl WorkerConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading worker config from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resource_id.trim().is_empty() {
            return Err(ConfigError::Invalid("resource_id is empty".into()));
        }
        if self.device_tag.trim().is_empty() {
            return Err(ConfigError::Invalid("device_tag is empty".into()));
        }
        if self.settle.is_empty() {
            return Err(ConfigError::Invalid("settle table has no entries".into()));
        }
        for (name, value) in [
            ("low_res_rbw_hz", self.low_res_rbw_hz),
            ("normal_rbw_hz", self.normal_rbw_hz),
        ] {
            if value.is_nan() || value <= 0.0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        if self.settle.entries().iter().any(|entry| entry.rbw_hz <= 0.0) {
            return Err(ConfigError::Invalid(
                "settle bandwidths must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn low_res_rbw(&self) -> Hertz {
        Hertz(self.low_res_rbw_hz)
    }

    pub fn normal_rbw(&self) -> Hertz {
        Hertz(self.normal_rbw_hz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = WorkerConfig::from_toml("").unwrap();
        assert_eq!(config, WorkerConfig::default());
        assert_eq!(config.resource_id, "GPIB0::17::INSTR");
        assert_eq!(config.settle.lookup(Hertz(10.0)), Duration::from_secs(218));
    }

    #[test]
    fn test_partial_override() {
        let config = WorkerConfig::from_toml(
            r#"
            resource_id = "GPIB0::11::INSTR"
            timeout = "10s"

            [[settle]]
            rbw_hz = 100
            duration = "2s"

            [[settle]]
            rbw_hz = 10
            duration = "1m"
            "#,
        )
        .unwrap();

        assert_eq!(config.resource_id, "GPIB0::11::INSTR");
        assert_eq!(config.device_tag, "HP4195A");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.settle.lookup(Hertz(10.0)), Duration::from_secs(60));
        assert_eq!(config.settle.lookup(Hertz(100.0)), Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        assert!(matches!(
            WorkerConfig::from_toml("device_tag = \"\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            WorkerConfig::from_toml("settle = []"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            WorkerConfig::from_toml("normal_rbw_hz = -1.0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            WorkerConfig::from_toml("timeout = 5"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = WorkerConfig::load(Path::new("/nonexistent/hp4195.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}

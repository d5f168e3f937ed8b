//! Configuration file support for mcmgrd
//!
//! Loads and validates the manager configuration from TOML files.
//! Default location: /etc/sonic/mcmgrd.conf

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::rdm::GcMode;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Device geometry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device identifier
    #[serde(default)]
    pub dev_id: u8,

    /// Number of pipes, each with its own replication memory
    #[serde(default = "default_pipe_count")]
    pub pipe_count: u8,

    /// Ports per pipe; port `p` lives in pipe `p / ports_per_pipe`
    #[serde(default = "default_ports_per_pipe")]
    pub ports_per_pipe: u16,
}

/// Registry and table sizes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablesConfig {
    #[serde(default = "default_max_mgrps")]
    pub max_mgrps: u32,

    #[serde(default = "default_max_nodes")]
    pub max_nodes: u32,

    #[serde(default = "default_max_ecmps")]
    pub max_ecmps: u32,

    /// Number of LAG membership entries
    #[serde(default = "default_lag_table_size")]
    pub lag_table_size: u16,

    /// LAG id kept back for internal use
    #[serde(default = "default_reserved_lag_id")]
    pub reserved_lag_id: Option<u16>,

    /// Number of L2 exclusion entries
    #[serde(default = "default_prune_table_size")]
    pub prune_table_size: u16,
}

/// Replication memory sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdmConfig {
    /// Cells per pipe
    #[serde(default = "default_cells_per_pipe")]
    pub cells_per_pipe: u32,
}

/// Garbage collection policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcConfig {
    #[serde(default)]
    pub mode: GcMode,

    /// Sweep cadence used by the daemon in periodic mode
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,
}

/// Session behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long a synchronous completion may wait for the hardware
    #[serde(default = "default_hw_timeout")]
    pub hw_timeout_ms: u64,
}

/// Complete mcmgrd configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct McMgrConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub tables: TablesConfig,

    #[serde(default)]
    pub rdm: RdmConfig,

    #[serde(default)]
    pub gc: GcConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

// Default functions
fn default_pipe_count() -> u8 {
    4
}

fn default_ports_per_pipe() -> u16 {
    72
}

fn default_max_mgrps() -> u32 {
    65536
}

fn default_max_nodes() -> u32 {
    16384
}

fn default_max_ecmps() -> u32 {
    4096
}

fn default_lag_table_size() -> u16 {
    256
}

fn default_reserved_lag_id() -> Option<u16> {
    Some(255)
}

fn default_prune_table_size() -> u16 {
    288
}

fn default_cells_per_pipe() -> u32 {
    49152
}

fn default_sweep_interval() -> u64 {
    1000
}

fn default_hw_timeout() -> u64 {
    2000
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            dev_id: 0,
            pipe_count: default_pipe_count(),
            ports_per_pipe: default_ports_per_pipe(),
        }
    }
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            max_mgrps: default_max_mgrps(),
            max_nodes: default_max_nodes(),
            max_ecmps: default_max_ecmps(),
            lag_table_size: default_lag_table_size(),
            reserved_lag_id: default_reserved_lag_id(),
            prune_table_size: default_prune_table_size(),
        }
    }
}

impl Default for RdmConfig {
    fn default() -> Self {
        Self {
            cells_per_pipe: default_cells_per_pipe(),
        }
    }
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            mode: GcMode::default(),
            sweep_interval_ms: default_sweep_interval(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hw_timeout_ms: default_hw_timeout(),
        }
    }
}

impl McMgrConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    path = %path.display(),
                    "config file not found, using defaults"
                );
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> Result<Self> {
        Self::load_or_default("/etc/sonic/mcmgrd.conf")
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(format!("Failed to serialize config: {}", e)))?;
        fs::write(path.as_ref(), content)?;
        Ok(())
    }

    pub fn hw_timeout(&self) -> Duration {
        Duration::from_millis(self.session.hw_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.gc.sweep_interval_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.device.pipe_count == 0 {
            return Err(ConfigError::Invalid("pipe_count must be > 0".to_string()));
        }
        if self.device.ports_per_pipe == 0 {
            return Err(ConfigError::Invalid(
                "ports_per_pipe must be > 0".to_string(),
            ));
        }
        if u32::from(self.device.pipe_count) * u32::from(self.device.ports_per_pipe)
            > u32::from(u16::MAX) + 1
        {
            return Err(ConfigError::Invalid(
                "pipe_count * ports_per_pipe exceeds the port id space".to_string(),
            ));
        }

        let t = &self.tables;
        if t.max_mgrps == 0 || t.max_nodes == 0 || t.max_ecmps == 0 {
            return Err(ConfigError::Invalid(
                "registry sizes must be > 0".to_string(),
            ));
        }
        if t.lag_table_size == 0 || t.prune_table_size == 0 {
            return Err(ConfigError::Invalid(
                "lag_table_size and prune_table_size must be > 0".to_string(),
            ));
        }
        if let Some(reserved) = t.reserved_lag_id {
            if reserved >= t.lag_table_size {
                return Err(ConfigError::Invalid(format!(
                    "reserved_lag_id {} is outside a {}-entry LAG table",
                    reserved, t.lag_table_size
                )));
            }
        }

        if self.rdm.cells_per_pipe == 0 {
            return Err(ConfigError::Invalid(
                "cells_per_pipe must be > 0".to_string(),
            ));
        }
        if self.gc.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "sweep_interval_ms must be > 0".to_string(),
            ));
        }
        if self.session.hw_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "hw_timeout_ms must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = McMgrConfig::default();
        assert_eq!(config.device.pipe_count, 4);
        assert_eq!(config.device.ports_per_pipe, 72);
        assert_eq!(config.tables.lag_table_size, 256);
        assert_eq!(config.tables.reserved_lag_id, Some(255));
        assert_eq!(config.tables.prune_table_size, 288);
        assert_eq!(config.rdm.cells_per_pipe, 49152);
        assert_eq!(config.gc.mode, GcMode::Interrupt);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(McMgrConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_pipes() {
        let mut config = McMgrConfig::default();
        config.device.pipe_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_reserved_lag_outside_table() {
        let mut config = McMgrConfig::default();
        config.tables.lag_table_size = 16;
        assert!(config.validate().is_err());
        config.tables.reserved_lag_id = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_pool() {
        let mut config = McMgrConfig::default();
        config.rdm.cells_per_pipe = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = McMgrConfig::default();
        config.session.hw_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_durations() {
        let config = McMgrConfig::default();
        assert_eq!(config.hw_timeout(), Duration::from_millis(2000));
        assert_eq!(config.sweep_interval(), Duration::from_millis(1000));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[device]
pipe_count = 2

[gc]
mode = "periodic"
sweep_interval_ms = 250
"#;
        let config: McMgrConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.device.pipe_count, 2);
        assert_eq!(config.gc.mode, GcMode::Periodic);
        assert_eq!(config.gc.sweep_interval_ms, 250);
        // Unspecified values should use defaults
        assert_eq!(config.device.ports_per_pipe, 72);
        assert_eq!(config.tables.max_nodes, 16384);
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = McMgrConfig::load_or_default("/nonexistent/mcmgrd.conf").unwrap();
        assert_eq!(config, McMgrConfig::default());
    }

    #[test]
    fn test_load_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[device\npipe_count = ").unwrap();
        let err = McMgrConfig::load_or_default(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcmgrd.conf");

        let mut config = McMgrConfig::default();
        config.rdm.cells_per_pipe = 1024;
        config.gc.mode = GcMode::Periodic;
        config.save(&path).unwrap();

        let loaded = McMgrConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded, config);
    }
}

//! World configuration.
//!
//! Everything here has a default, so an empty file (or no file) is valid.
//! Command-line flags override individual fields after loading.
//!
//! ```toml
//! data_dir = "data"
//! socket_dir = "/tmp"
//! socket_prefix = "socket_path_"
//! connect_timeout_ms = 10000
//! max_ticks = 100
//! seed = 42
//! ```

use crate::network::MeshConfig;
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Settings shared by the supervisor and every process of a world.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldConfig {
    /// Directory holding `process<rank>.log` files.
    pub data_dir: PathBuf,

    /// Directory holding the listening sockets.
    pub socket_dir: PathBuf,

    /// Socket file name prefix; the rank is appended.
    pub socket_prefix: String,

    /// How long a process keeps retrying to reach a lower rank's listener.
    pub connect_timeout_ms: u64,

    /// Stop after this many ticks. `None` runs until signalled.
    pub max_ticks: Option<u64>,

    /// Base seed for clock speeds and draws. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            socket_dir: PathBuf::from("."),
            socket_prefix: "socket_path_".to_string(),
            connect_timeout_ms: 10_000,
            max_ticks: None,
            seed: None,
        }
    }
}

impl WorldConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Socket settings for the mesh bootstrap.
    pub fn mesh(&self) -> MeshConfig {
        MeshConfig {
            socket_dir: self.socket_dir.clone(),
            socket_prefix: self.socket_prefix.clone(),
            connect_timeout: self.connect_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamport_types::Rank;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = WorldConfig::from_toml_str("").unwrap();
        assert_eq!(config, WorldConfig::default());
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(
            config.mesh().socket_path(Rank(0)),
            PathBuf::from("./socket_path_0")
        );
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_config() {
        let config = WorldConfig::from_toml_str(
            r#"
            socket_dir = "/tmp/world"
            max_ticks = 25
            seed = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.socket_dir, PathBuf::from("/tmp/world"));
        assert_eq!(config.max_ticks, Some(25));
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.socket_prefix, "socket_path_");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = WorldConfig::from_toml_str("ticks_per_second = 3");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = WorldConfig::load(&dir.path().join("world.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.toml");
        std::fs::write(&path, "data_dir = \"out\"\nconnect_timeout_ms = 500\n").unwrap();
        let config = WorldConfig::load(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("out"));
        assert_eq!(config.mesh().connect_timeout, Duration::from_millis(500));
    }
}

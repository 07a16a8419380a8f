use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::types::StorageBackend;
use crate::error_handling::types::ConfigError;

/// Application configuration.
///
/// Loaded from a TOML file when one is given on the command line;
/// otherwise every field falls back to its default, which is enough for
/// a local run.
///
/// # Fields Overview
///
/// - `bind_address`: IP address the HTTP server listens on
/// - `port`: TCP port for the HTTP server
/// - `storage`: which backend to run against (`sqlite` or `memory`)
/// - `database_path`: SQLite file location, used by the `sqlite` backend
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_address: String,
    pub port: u16,
    pub storage: StorageBackend,
    pub database_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            storage: StorageBackend::default(),
            database_path: PathBuf::from("checkride.sqlite3"),
        }
    }
}

impl Config {
    /// Reads and validates a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// The socket address the web server binds to.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|_| ConfigError::BadBindAddress(self.bind_address.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        if self.storage == StorageBackend::Sqlite && self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::BadStoragePath(
                "database_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        let addr = config.socket_addr().unwrap();
        assert_eq!(addr.port(), 8080);
        assert_eq!(config.storage, StorageBackend::Sqlite);
    }

    #[test]
    fn test_from_toml_overrides_defaults() {
        let config: Config = toml::from_str(
            r#"
            bind_address = "127.0.0.1"
            port = 9000
            storage = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.storage, StorageBackend::Memory);
        // Unset fields keep their defaults.
        assert_eq!(config.database_path, PathBuf::from("checkride.sqlite3"));
    }

    #[test]
    fn test_bad_bind_address_is_rejected() {
        let config = Config {
            bind_address: "not-an-ip".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.socket_addr(),
            Err(ConfigError::BadBindAddress(_))
        ));
    }
}

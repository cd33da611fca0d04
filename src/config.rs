//! Configuration for admissions-crm

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::StorageError;

/// Default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("admissions-crm")
}

/// Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the SQLite database and config file
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Database file name inside `data_dir`, or an absolute path
    #[serde(default = "default_database_file")]
    pub database_file: PathBuf,

    /// Interface the HTTP API binds to
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Maximum pooled SQLite connections
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// How long a request waits for a pooled connection before 503
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
}

fn default_database_file() -> PathBuf {
    PathBuf::from("crm.db")
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8000
}

fn default_pool_size() -> u32 {
    20
}

fn default_connection_timeout() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_file: default_database_file(),
            bind_host: default_bind_host(),
            http_port: default_http_port(),
            pool_size: default_pool_size(),
            connection_timeout_secs: default_connection_timeout(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| StorageError::Config(e.to_string()))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), StorageError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| StorageError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolved database path; absolute `database_file` values win
    pub fn database_path(&self) -> PathBuf {
        if self.database_file.is_absolute() {
            self.database_file.clone()
        } else {
            self.data_dir.join(&self.database_file)
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs.max(1))
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, StorageError> {
        format!("{}:{}", self.bind_host, self.http_port)
            .parse()
            .map_err(|e| StorageError::Config(format!("Invalid bind address: {}", e)))
    }
}

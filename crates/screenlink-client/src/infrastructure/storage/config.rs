//! TOML-based configuration for the client binary.
//!
//! ```toml
//! [client]
//! server_host = "192.168.1.10"
//! server_port = 5000
//! fps = 10
//! frame_width = 1920
//! frame_height = 1080
//! restart_delay_ms = 2000
//! max_restarts = 10
//! log_level = "info"
//!
//! [session]
//! connect_timeout_ms = 5000
//! ```
//!
//! A missing file means defaults.  `max_restarts` absent means the client
//! keeps reconnecting until interrupted.

use std::path::{Path, PathBuf};
use std::time::Duration;

use screenlink_core::{Address, AddressError, SessionConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::network::ClientConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid server address: {0}")]
    Address(#[from] AddressError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientSection {
    #[serde(default = "default_server_host")]
    pub server_host: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    /// Capture rate while streaming.
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Capture size until the server sends `resize`.
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,
    #[serde(default = "default_frame_height")]
    pub frame_height: u32,
    /// Pause between a session ending and the next connect.
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_restarts: Option<u32>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}
fn default_server_port() -> u16 {
    5000
}
fn default_fps() -> u32 {
    10
}
fn default_frame_width() -> u32 {
    1920
}
fn default_frame_height() -> u32 {
    1080
}
fn default_restart_delay_ms() -> u64 {
    2000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            server_host: default_server_host(),
            server_port: default_server_port(),
            fps: default_fps(),
            frame_width: default_frame_width(),
            frame_height: default_frame_height(),
            restart_delay_ms: default_restart_delay_ms(),
            max_restarts: None,
            log_level: default_log_level(),
        }
    }
}

impl ClientSection {
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

impl AppConfig {
    /// # Errors
    ///
    /// [`ConfigError::Address`] if the server host or port is invalid.
    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        Ok(ClientConfig {
            server: Address::new(self.client.server_host.clone(), self.client.server_port)?,
            session: self.session.clone(),
        })
    }
}

/// Loads `AppConfig` from `path`, returning defaults if the file is absent.
///
/// # Errors
///
/// [`ConfigError::Io`] for file-system errors other than "not found" and
/// [`ConfigError::Parse`] for malformed TOML.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

//! TOML-based configuration for the server binary.
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! port = 5000
//! preview_width = 320
//! preview_height = 180
//! max_frame_age_ms = 500
//! log_level = "info"
//!
//! [session]
//! max_payload_bytes = 16777216
//! ```
//!
//! Every field has a `#[serde(default = "...")]`, so an empty or missing
//! file yields [`AppConfig::default()`].  CLI flags override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use screenlink_core::{Address, AddressError, SessionConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::network::ServerConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The bind address is not usable.
    #[error("invalid bind address: {0}")]
    Address(#[from] AddressError),
}

// ── Config schema types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// Interface to listen on.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Resolution requested from each client on connect.  Both or neither.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_height: Option<u32>,
    /// Frames older than this on arrival are not shown.
    #[serde(default = "default_max_frame_age_ms")]
    pub max_frame_age_ms: u64,
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_max_frame_age_ms() -> u64 {
    500
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            preview_width: None,
            preview_height: None,
            max_frame_age_ms: default_max_frame_age_ms(),
            log_level: default_log_level(),
        }
    }
}

impl ServerSection {
    pub fn max_frame_age(&self) -> Duration {
        Duration::from_millis(self.max_frame_age_ms)
    }

    /// `Some` only when both preview dimensions are set.
    pub fn preview_size(&self) -> Option<(u32, u32)> {
        self.preview_width.zip(self.preview_height)
    }
}

impl AppConfig {
    /// Builds the role configuration from the file contents.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Address`] if the bind address or port is invalid.
    pub fn server_config(&self) -> Result<ServerConfig, ConfigError> {
        Ok(ServerConfig {
            bind: Address::new(self.server.bind_address.clone(), self.server.port)?,
            session: self.session.clone(),
            preview_size: self.server.preview_size(),
        })
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
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

// ── Tests ─────────────────────────────────────────────────────────────────────

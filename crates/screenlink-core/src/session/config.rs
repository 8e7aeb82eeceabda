//! Tunables for a single session, shared by both roles' config files.
//!
//! ```toml
//! [session]
//! max_payload_bytes = 16777216
//! read_buffer_bytes = 65536
//! connect_timeout_ms = 5000
//! close_linger_ms = 1000
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::messages::DEFAULT_MAX_PAYLOAD;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    /// Largest payload accepted for send or receive.
    #[serde(default = "default_max_payload")]
    pub max_payload_bytes: usize,
    /// Size of the scratch buffer for each socket read.
    #[serde(default = "default_read_buffer")]
    pub read_buffer_bytes: usize,
    /// Upper bound on the TCP connect handshake (client only).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// How long `close` keeps flushing already-queued sends.
    #[serde(default = "default_close_linger_ms")]
    pub close_linger_ms: u64,
}

fn default_max_payload() -> usize {
    DEFAULT_MAX_PAYLOAD
}
fn default_read_buffer() -> usize {
    64 * 1024
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_close_linger_ms() -> u64 {
    1000
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn close_linger(&self) -> Duration {
        Duration::from_millis(self.close_linger_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload(),
            read_buffer_bytes: default_read_buffer(),
            connect_timeout_ms: default_connect_timeout_ms(),
            close_linger_ms: default_close_linger_ms(),
        }
    }
}

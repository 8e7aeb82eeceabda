//! Why a session ended.

use std::fmt;

/// Terminal cause of a session, rendered as the human-readable reason string
/// handed to close/disconnect callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed its end (EOF).
    PeerClosed,
    /// The inbound byte stream could not be decoded.
    Malformed(String),
    /// A socket read failed.
    ReadError(String),
    /// A socket write failed.
    WriteError(String),
    /// The peer sent `kick`.
    Kicked,
    /// The presentation dropped the queue this session feeds.
    QueueClosed,
    /// Closed locally by `close(reason)` / `stop(reason)`.
    Local(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => f.write_str("peer closed"),
            CloseReason::Malformed(e) => write!(f, "malformed frame: {e}"),
            CloseReason::ReadError(e) => write!(f, "read error: {e}"),
            CloseReason::WriteError(e) => write!(f, "write error: {e}"),
            CloseReason::Kicked => f.write_str("kicked from session"),
            CloseReason::QueueClosed => f.write_str("presentation queue closed"),
            // Reasons are never empty.
            CloseReason::Local(text) if text.trim().is_empty() => f.write_str("session closed"),
            CloseReason::Local(text) => f.write_str(text),
        }
    }
}

impl From<&str> for CloseReason {
    fn from(text: &str) -> Self {
        CloseReason::Local(text.to_string())
    }
}

impl From<String> for CloseReason {
    fn from(text: String) -> Self {
        CloseReason::Local(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_strings() {
        assert_eq!(CloseReason::PeerClosed.to_string(), "peer closed");
        assert_eq!(
            CloseReason::ReadError("connection reset".into()).to_string(),
            "read error: connection reset"
        );
        assert_eq!(
            CloseReason::Malformed("unknown message type: 0x33".into()).to_string(),
            "malformed frame: unknown message type: 0x33"
        );
        assert_eq!(CloseReason::Kicked.to_string(), "kicked from session");
    }

    #[test]
    fn test_empty_local_reason_is_replaced() {
        assert_eq!(CloseReason::from("  ").to_string(), "session closed");
    }

    #[test]
    fn test_local_reason_is_passed_through() {
        assert_eq!(CloseReason::from("user quit").to_string(), "user quit");
    }
}

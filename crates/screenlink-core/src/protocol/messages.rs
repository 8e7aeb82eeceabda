//! Screenlink message model.
//!
//! Two flows share one connection: operator **commands** (server → client)
//! and captured **frames** (client → server).  Both travel as a [`Message`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol version byte.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Total size of the common message header in bytes.
pub const HEADER_SIZE: usize = 24;

/// Default upper bound for a single payload (16 MiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

// ── Message type codes ────────────────────────────────────────────────────────

/// Type tag carried in byte 1 of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    Command = 0x01,
    Frame = 0x02,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MessageType::Command),
            0x02 => Ok(MessageType::Frame),
            _ => Err(()),
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// An operator command.
///
/// On the wire a command is its textual form, e.g. `key_down:Shift_L`,
/// `button:1:640:360`, `resize:320:180` or `pause`.  Anything that does not
/// match a known keyword travels as [`Command::Text`].  Text that would read
/// as a command is sent as `text:<text>`, so `Text("kick")` stays text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Press a key, named by its keysym (`a`, `Shift_L`, `Return`).
    KeyDown(String),
    /// Release a key.
    KeyUp(String),
    /// Click `button` at the absolute position (`x`, `y`).
    Button { button: u8, x: i32, y: i32 },
    /// Change the capture resolution of the frame stream.
    Resize { width: u32, height: u32 },
    /// Suspend the frame stream.
    Pause,
    /// Resume the frame stream.
    Unpause,
    /// Suppress local user input on the client.
    Block,
    /// Re-enable local user input on the client.
    Unblock,
    /// Ask the client to leave the session.
    Kick,
    /// Free-form operator text.
    Text(String),
}

impl Command {
    /// Returns `true` for commands that inject input on the client.
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            Command::KeyDown(_) | Command::KeyUp(_) | Command::Button { .. }
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::KeyDown(key) => write!(f, "key_down:{key}"),
            Command::KeyUp(key) => write!(f, "key_up:{key}"),
            Command::Button { button, x, y } => write!(f, "button:{button}:{x}:{y}"),
            Command::Resize { width, height } => write!(f, "resize:{width}:{height}"),
            Command::Pause => f.write_str("pause"),
            Command::Unpause => f.write_str("unpause"),
            Command::Block => f.write_str("block"),
            Command::Unblock => f.write_str("unblock"),
            Command::Kick => f.write_str("kick"),
            Command::Text(text) if parse_command(text).is_some() => write!(f, "text:{text}"),
            Command::Text(text) => f.write_str(text),
        }
    }
}

impl FromStr for Command {
    type Err = std::convert::Infallible;

    /// Parses the textual form.  Never fails: text with a known prefix but
    /// unparsable fields falls back to [`Command::Text`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(parse_command(s).unwrap_or_else(|| Command::Text(s.to_string())))
    }
}

impl From<&str> for Command {
    fn from(s: &str) -> Self {
        parse_command(s).unwrap_or_else(|| Command::Text(s.to_string()))
    }
}

fn parse_command(s: &str) -> Option<Command> {
    match s {
        "pause" => return Some(Command::Pause),
        "unpause" => return Some(Command::Unpause),
        "block" => return Some(Command::Block),
        "unblock" => return Some(Command::Unblock),
        "kick" => return Some(Command::Kick),
        _ => {}
    }

    let (verb, rest) = s.split_once(':')?;
    match verb {
        "text" => Some(Command::Text(rest.to_string())),
        "key_down" if !rest.is_empty() => Some(Command::KeyDown(rest.to_string())),
        "key_up" if !rest.is_empty() => Some(Command::KeyUp(rest.to_string())),
        "button" => {
            let mut parts = rest.split(':');
            let button = parts.next()?.parse().ok()?;
            let x = parts.next()?.parse().ok()?;
            let y = parts.next()?.parse().ok()?;
            if parts.next().is_some() {
                return None;
            }
            Some(Command::Button { button, x, y })
        }
        "resize" => {
            let (w, h) = rest.split_once(':')?;
            Some(Command::Resize {
                width: w.parse().ok()?,
                height: h.parse().ok()?,
            })
        }
        _ => None,
    }
}

// ── Frames ────────────────────────────────────────────────────────────────────

/// One captured frame.  The payload is opaque to the network layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Per-sender monotonically increasing counter.
    pub sequence: u64,
    /// Microseconds since Unix epoch at time of capture.
    pub timestamp_us: u64,
    /// Encoded image bytes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Creates a frame stamped with the current wall-clock time.
    pub fn now(sequence: u64, payload: Vec<u8>) -> Self {
        Self {
            sequence,
            timestamp_us: current_timestamp_us(),
            payload,
        }
    }

    /// Age of the frame relative to `now_us`; zero if the frame is from the future.
    pub fn age_us(&self, now_us: u64) -> u64 {
        now_us.saturating_sub(self.timestamp_us)
    }
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// Unit of queue transfer and of wire transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Command(Command),
    Frame(Frame),
}

impl Message {
    /// Returns the wire type code for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Command(_) => MessageType::Command,
            Message::Frame(_) => MessageType::Frame,
        }
    }
}

impl From<Command> for Message {
    fn from(command: Command) -> Self {
        Message::Command(command)
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        Message::Frame(frame)
    }
}

/// Microseconds since the Unix epoch, or 0 if the clock is before it.
pub fn current_timestamp_us() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

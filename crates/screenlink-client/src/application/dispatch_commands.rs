//! DispatchCommandsUseCase: applies the operator's commands on the client.
//!
//! Stream controls retune the [`StreamControl`]; input commands are injected
//! through an [`InputSink`] implemented per platform in the infrastructure
//! layer.  While local input is blocked, each injected event lifts the block
//! for its own duration so the operator's input still lands.

use std::sync::Arc;

use screenlink_core::domain::{CommandReceiver, ShutdownSignal};
use screenlink_core::Command;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::stream_frames::StreamControl;

/// Error reported by an [`InputSink`] when the OS rejects an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("input injection failed: {0}")]
pub struct InputError(pub String);

/// Why a command could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("unknown key name {0:?}")]
    UnknownKey(String),
    #[error("unknown mouse button {0}")]
    UnknownButton(u8),
    #[error("invalid frame size {width}x{height}")]
    InvalidResize { width: u32, height: u32 },
    #[error(transparent)]
    Input(#[from] InputError),
}

/// A key resolved from its X11 keysym name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// A non-printing key, by canonical keysym name (`Return`, `Shift_L`, `F5`).
    Named(&'static str),
    Char(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl MouseButton {
    /// Maps the wire button id (1 = left, 2 = middle, 3 = right).
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(MouseButton::Left),
            2 => Some(MouseButton::Middle),
            3 => Some(MouseButton::Right),
            _ => None,
        }
    }
}

const NAMED_KEYS: &[&str] = &[
    "Shift_L", "Shift_R", "Control_L", "Control_R", "Alt_L", "Alt_R", "Super_L", "Super_R",
    "Caps_Lock", "Num_Lock", "Scroll_Lock", "Tab", "Return", "BackSpace", "Escape", "Delete",
    "Insert", "Home", "End", "Prior", "Next", "Up", "Down", "Left", "Right", "Print", "Pause",
    "Menu", "F1", "F2", "F3", "F4", "F5", "F6", "F7", "F8", "F9", "F10", "F11", "F12",
];

const PUNCTUATION: &[(&str, char)] = &[
    ("space", ' '),
    ("exclam", '!'),
    ("quotedbl", '"'),
    ("numbersign", '#'),
    ("dollar", '$'),
    ("percent", '%'),
    ("ampersand", '&'),
    ("apostrophe", '\''),
    ("parenleft", '('),
    ("parenright", ')'),
    ("asterisk", '*'),
    ("plus", '+'),
    ("comma", ','),
    ("minus", '-'),
    ("period", '.'),
    ("slash", '/'),
    ("colon", ':'),
    ("semicolon", ';'),
    ("less", '<'),
    ("equal", '='),
    ("greater", '>'),
    ("question", '?'),
    ("at", '@'),
    ("bracketleft", '['),
    ("backslash", '\\'),
    ("bracketright", ']'),
    ("asciicircum", '^'),
    ("underscore", '_'),
    ("grave", '`'),
    ("braceleft", '{'),
    ("bar", '|'),
    ("braceright", '}'),
    ("asciitilde", '~'),
];

/// Resolves a keysym name as sent by the server.
///
/// A single character stands for itself; anything else must be a known
/// named key or punctuation keysym.
pub fn resolve_key(name: &str) -> Option<Key> {
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Some(Key::Char(c));
    }
    if let Some(named) = NAMED_KEYS.iter().find(|k| **k == name) {
        return Some(Key::Named(named));
    }
    PUNCTUATION
        .iter()
        .find(|(keysym, _)| *keysym == name)
        .map(|(_, c)| Key::Char(*c))
}

/// OS seam for injecting input and blocking the local user.
pub trait InputSink: Send + Sync {
    fn key_down(&self, key: Key) -> Result<(), InputError>;
    fn key_up(&self, key: Key) -> Result<(), InputError>;
    /// Moves to `(x, y)` and presses then releases `button`.
    fn click(&self, button: MouseButton, x: i32, y: i32) -> Result<(), InputError>;
    fn set_local_input_blocked(&self, blocked: bool) -> Result<(), InputError>;
}

/// Counters reported when the dispatcher stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub applied: u64,
    /// Of `applied`, how many injected keyboard or mouse input.
    pub injected: u64,
    pub failed: u64,
}

pub struct CommandDispatcher {
    sink: Arc<dyn InputSink>,
    control: StreamControl,
    blocked: bool,
    stats: DispatchStats,
}

impl CommandDispatcher {
    pub fn new(sink: Arc<dyn InputSink>, control: StreamControl) -> Self {
        Self {
            sink,
            control,
            blocked: false,
            stats: DispatchStats::default(),
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.blocked
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Applies one command.
    ///
    /// # Errors
    ///
    /// [`DispatchError`] if the command names an unknown key or button, asks
    /// for an empty frame size, or the sink rejects the event.
    pub fn handle(&mut self, command: &Command) -> Result<(), DispatchError> {
        match command {
            Command::KeyDown(name) => {
                let key = resolve_key(name).ok_or_else(|| DispatchError::UnknownKey(name.clone()))?;
                self.inject(|sink| sink.key_down(key))
            }
            Command::KeyUp(name) => {
                let key = resolve_key(name).ok_or_else(|| DispatchError::UnknownKey(name.clone()))?;
                self.inject(|sink| sink.key_up(key))
            }
            Command::Button { button, x, y } => {
                let button = MouseButton::from_id(*button).ok_or(DispatchError::UnknownButton(*button))?;
                self.inject(|sink| sink.click(button, *x, *y))
            }
            Command::Resize { width, height } => {
                if *width == 0 || *height == 0 {
                    return Err(DispatchError::InvalidResize {
                        width: *width,
                        height: *height,
                    });
                }
                self.control.resize(*width, *height);
                Ok(())
            }
            Command::Pause => {
                self.control.pause();
                Ok(())
            }
            Command::Unpause => {
                self.control.resume();
                Ok(())
            }
            Command::Block => self.set_blocked(true),
            Command::Unblock => self.set_blocked(false),
            Command::Kick => {
                info!("kicked by the operator");
                Ok(())
            }
            Command::Text(text) => {
                info!("message from operator: {text}");
                Ok(())
            }
        }
    }

    fn set_blocked(&mut self, blocked: bool) -> Result<(), DispatchError> {
        self.sink.set_local_input_blocked(blocked)?;
        self.blocked = blocked;
        Ok(())
    }

    fn inject(
        &self,
        event: impl FnOnce(&dyn InputSink) -> Result<(), InputError>,
    ) -> Result<(), DispatchError> {
        if !self.blocked {
            return Ok(event(&*self.sink)?);
        }
        self.sink.set_local_input_blocked(false)?;
        let injected = event(&*self.sink);
        let reblocked = self.sink.set_local_input_blocked(true);
        injected.and(reblocked).map_err(DispatchError::from)
    }

    /// Drains `commands` until `shutdown` fires or the queue closes.
    ///
    /// Local input is unblocked on exit so an ended session never leaves the
    /// machine locked.
    pub async fn run(mut self, mut commands: CommandReceiver, shutdown: ShutdownSignal) -> DispatchStats {
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                next = commands.recv() => match next {
                    Some(command) => {
                        debug!("dispatching {command}");
                        match self.handle(&command) {
                            Ok(()) => {
                                self.stats.applied += 1;
                                if command.is_input() {
                                    self.stats.injected += 1;
                                }
                            }
                            Err(e) => {
                                self.stats.failed += 1;
                                warn!("could not apply {command}: {e}");
                            }
                        }
                    }
                    None => break,
                },
            }
        }
        if self.blocked {
            if let Err(e) = self.set_blocked(false) {
                warn!("failed to unblock local input: {e}");
            }
        }
        self.stats
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Input sink implementations.
//!
//! [`RecordingInputSink`] keeps every event in memory and logs it.  The
//! headless binary uses it in place of an OS injector, and tests use it to
//! assert on what was injected.

use std::sync::{Mutex, PoisonError};

use tracing::info;

use crate::application::dispatch_commands::{InputError, InputSink, Key, MouseButton};

/// One injected event, in the order it reached the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    KeyDown(Key),
    KeyUp(Key),
    Click { button: MouseButton, x: i32, y: i32 },
    LocalInputBlocked(bool),
}

#[derive(Debug, Default)]
pub struct RecordingInputSink {
    events: Mutex<Vec<InputEvent>>,
}

impl RecordingInputSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<InputEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, event: InputEvent) -> Result<(), InputError> {
        info!("input: {event:?}");
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }
}

impl InputSink for RecordingInputSink {
    fn key_down(&self, key: Key) -> Result<(), InputError> {
        self.record(InputEvent::KeyDown(key))
    }

    fn key_up(&self, key: Key) -> Result<(), InputError> {
        self.record(InputEvent::KeyUp(key))
    }

    fn click(&self, button: MouseButton, x: i32, y: i32) -> Result<(), InputError> {
        self.record(InputEvent::Click { button, x, y })
    }

    fn set_local_input_blocked(&self, blocked: bool) -> Result<(), InputError> {
        self.record(InputEvent::LocalInputBlocked(blocked))
    }
}

//! The two FIFO queues shared between the network roles and the presentation.
//!
//! Both are unbounded `tokio::sync::mpsc` channels: pushing never blocks and
//! works from any OS thread, popping is `recv().await` inside the runtime or
//! `blocking_recv()` from a plain presentation thread.

use tokio::sync::mpsc;

use crate::protocol::messages::{Command, Frame};

pub type CommandSender = mpsc::UnboundedSender<Command>;
pub type CommandReceiver = mpsc::UnboundedReceiver<Command>;
pub type FrameSender = mpsc::UnboundedSender<Frame>;
pub type FrameReceiver = mpsc::UnboundedReceiver<Frame>;

/// Creates a Command Queue.
pub fn command_queue() -> (CommandSender, CommandReceiver) {
    mpsc::unbounded_channel()
}

/// Creates a Frame Queue.
pub fn frame_queue() -> (FrameSender, FrameReceiver) {
    mpsc::unbounded_channel()
}

/// Where a session delivers inbound messages.
///
/// A flow without a route is not expected from the peer; such messages are
/// logged and discarded.
#[derive(Debug, Clone, Default)]
pub struct InboundRoutes {
    pub commands: Option<CommandSender>,
    pub frames: Option<FrameSender>,
}

impl InboundRoutes {
    /// Routes for a client: commands in, no frames expected.
    pub fn commands(tx: CommandSender) -> Self {
        Self {
            commands: Some(tx),
            frames: None,
        }
    }

    /// Routes for a server: frames in, no commands expected.
    pub fn frames(tx: FrameSender) -> Self {
        Self {
            commands: None,
            frames: Some(tx),
        }
    }
}

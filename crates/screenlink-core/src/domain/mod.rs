//! Domain types shared by both roles: addresses, queues, and the shutdown signal.
//!
//! Nothing here touches a socket.

pub mod address;
pub mod queue;
pub mod shutdown;

pub use address::{Address, AddressError};
pub use queue::{
    command_queue, frame_queue, CommandReceiver, CommandSender, FrameReceiver, FrameSender,
    InboundRoutes,
};
pub use shutdown::ShutdownSignal;

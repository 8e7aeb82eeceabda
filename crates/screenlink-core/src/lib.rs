//! # screenlink-core
//!
//! Shared library for Screenlink, a remote-desktop link between a *server*
//! role (the operator, who sends input commands and watches the stream) and a
//! *client* role (the remote machine, which obeys commands and streams frames).
//!
//! Both roles sit on the same building blocks:
//!
//! - **`protocol`** – How bytes travel over the network.  Every message is a
//!   24-byte header followed by a payload; the header's type tag says whether
//!   the payload is a UTF-8 command or an opaque image frame.
//!
//! - **`domain`** – Plain values with no socket in sight: peer addresses, the
//!   command and frame queues that connect the network layer to the
//!   presentation, and a shutdown signal.
//!
//! - **`session`** – One live TCP connection with its receive loop, its single
//!   send path, and an exactly-once close callback.

pub mod domain;
pub mod protocol;
pub mod session;

pub use domain::{Address, AddressError, InboundRoutes, ShutdownSignal};
pub use protocol::codec::{decode_message, encode_message, ProtocolError};
pub use protocol::messages::{Command, Frame, Message};
pub use session::{CloseCallback, CloseReason, Session, SessionConfig, SessionError, SessionState};

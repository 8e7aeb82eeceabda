//! Network infrastructure for the server role.
//!
//! # Sub-modules
//!
//! - **`server`** – Binds the listening socket, adopts at most one client
//!   Session at a time, and forwards the Command Queue to it.

pub mod server;

pub use server::{CloseHandler, Server, ServerConfig, ServerError};

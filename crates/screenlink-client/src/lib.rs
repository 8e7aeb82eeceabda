//! screenlink-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # Layers
//!
//! - **`application`** – What the client does with a session: apply the
//!   operator's commands and stream frames.  Depends only on traits.
//! - **`infrastructure`** – The Client role itself (connect, send, stop),
//!   the frame source and input sink adapters, and config loading.

pub mod application;
pub mod infrastructure;

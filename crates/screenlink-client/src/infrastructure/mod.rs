//! Infrastructure layer for the client role.
//!
//! Contains the TCP client, adapters for frame capture and input injection,
//! and config file loading.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `screenlink_core`, but MUST NOT be imported by the `application` layer.

pub mod capture;
pub mod input_emulation;
pub mod network;
pub mod storage;

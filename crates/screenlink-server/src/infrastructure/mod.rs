//! Infrastructure layer for the server role.
//!
//! Contains the TCP listener and session slot, and config file loading.
//!
//! **Dependency rule**: this layer may depend on `screenlink_core`, but MUST
//! NOT be imported by the `application` layer.

pub mod network;
pub mod storage;

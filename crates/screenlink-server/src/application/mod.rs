//! Application layer use cases for the server role.
//!
//! Both use cases sit on the presentation side of the queues: they never
//! touch a socket and only see [`Command`](screenlink_core::Command) and
//! [`Frame`](screenlink_core::Frame) values.
//!
//! # Sub-modules
//!
//! - **`consume_frames`** – Drains the Frame Queue, drops frames that are too
//!   old to be worth showing, and hands the rest to a [`FrameView`](consume_frames::FrameView).
//!
//! - **`operator_console`** – Turns operator input lines (`pause`,
//!   `key_down:a`, `resize:320:180`, …) into commands on the Command Queue.

pub mod consume_frames;
pub mod operator_console;

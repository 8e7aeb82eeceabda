//! Application layer use cases for the client role.
//!
//! # Sub-modules
//!
//! - **`dispatch_commands`** – Drains the Command Queue: stream controls
//!   (`pause`, `unpause`, `resize`) go to the [`StreamControl`](stream_frames::StreamControl),
//!   input commands go to an [`InputSink`](dispatch_commands::InputSink).
//!
//! - **`stream_frames`** – Captures frames from a [`FrameSource`](stream_frames::FrameSource)
//!   at a fixed rate and publishes them while streaming is not paused.

pub mod dispatch_commands;
pub mod stream_frames;

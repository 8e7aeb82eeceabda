//! ConsumeFramesUseCase: drains the Frame Queue for the operator's view.
//!
//! Frames that spent longer than `max_age` between capture and arrival are
//! dropped instead of shown, so a slow view catches up with the live stream
//! rather than replaying a backlog.

use std::time::Duration;

use screenlink_core::domain::{FrameReceiver, ShutdownSignal};
use screenlink_core::protocol::messages::current_timestamp_us;
use screenlink_core::Frame;
use tracing::{debug, info};

/// Renders frames.  The GUI implementation paints a widget; the headless
/// binary logs.
pub trait FrameView: Send {
    fn show(&mut self, frame: &Frame);
}

/// Headless view: logs each shown frame.
#[derive(Debug, Default)]
pub struct LoggingView;

impl FrameView for LoggingView {
    fn show(&mut self, frame: &Frame) {
        info!(
            "frame #{} ({} bytes)",
            frame.sequence,
            frame.payload.len()
        );
    }
}

/// Counters reported when the consumer stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    pub shown: u64,
    pub dropped_stale: u64,
}

pub struct FrameConsumer<V: FrameView> {
    view: V,
    max_age_us: u64,
    stats: ConsumerStats,
}

impl<V: FrameView> FrameConsumer<V> {
    pub fn new(view: V, max_age: Duration) -> Self {
        Self {
            view,
            max_age_us: u64::try_from(max_age.as_micros()).unwrap_or(u64::MAX),
            stats: ConsumerStats::default(),
        }
    }

    /// Shows `frame` unless it is older than `max_age` at `now_us`.
    ///
    /// Returns `true` if the frame was shown.
    pub fn handle(&mut self, frame: &Frame, now_us: u64) -> bool {
        let age = frame.age_us(now_us);
        if age > self.max_age_us {
            self.stats.dropped_stale += 1;
            debug!("dropping frame #{}: {age}us old", frame.sequence);
            return false;
        }
        self.view.show(frame);
        self.stats.shown += 1;
        true
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    /// Runs until `shutdown` fires or every producer of `frames` is gone.
    ///
    /// The queue outlives individual sessions, so a reconnecting client keeps
    /// feeding the same consumer.
    pub async fn run(mut self, mut frames: FrameReceiver, shutdown: ShutdownSignal) -> ConsumerStats {
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                next = frames.recv() => match next {
                    Some(frame) => {
                        self.handle(&frame, current_timestamp_us());
                    }
                    None => break,
                },
            }
        }
        info!(
            "frame consumer stopped: {} shown, {} stale",
            self.stats.shown, self.stats.dropped_stale
        );
        self.stats
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! StreamFramesUseCase: captures the screen at a fixed rate and publishes it.
//!
//! The operator controls the stream through [`StreamControl`] (pause,
//! unpause, capture size).  A paused streamer keeps ticking but captures
//! nothing, so unpausing takes effect on the next tick.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use screenlink_core::domain::ShutdownSignal;

/// Error returned by a [`FrameSource`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("capture failed: {0}")]
pub struct CaptureError(pub String);

/// Produces one encoded frame of the requested size.
#[cfg_attr(test, mockall::automock)]
pub trait FrameSource: Send {
    fn capture(&mut self, width: u32, height: u32) -> Result<Vec<u8>, CaptureError>;
}

/// Sends an encoded frame to the server.
///
/// Returns a description of the failure when the frame could not be queued.
pub trait FramePublisher: Send + Sync {
    fn publish(&self, payload: Vec<u8>) -> Result<(), String>;
}

/// What the streamer should be doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub paused: bool,
    pub width: u32,
    pub height: u32,
}

/// Shared, clonable handle to the stream settings.
#[derive(Debug, Clone)]
pub struct StreamControl {
    tx: Arc<watch::Sender<StreamSettings>>,
}

impl StreamControl {
    pub fn new(width: u32, height: u32) -> Self {
        let (tx, _rx) = watch::channel(StreamSettings {
            paused: false,
            width,
            height,
        });
        Self { tx: Arc::new(tx) }
    }

    pub fn pause(&self) {
        self.tx.send_modify(|s| s.paused = true);
    }

    pub fn resume(&self) {
        self.tx.send_modify(|s| s.paused = false);
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.tx.send_modify(|s| {
            s.width = width;
            s.height = height;
        });
    }

    pub fn settings(&self) -> StreamSettings {
        *self.tx.borrow()
    }
}

/// Result of a single streamer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Published,
    Paused,
    CaptureFailed,
    PublishFailed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamStats {
    pub published: u64,
    pub skipped: u64,
    pub failed: u64,
}

pub struct FrameStreamer<S: FrameSource> {
    source: S,
    control: StreamControl,
    period: Duration,
    stats: StreamStats,
}

impl<S: FrameSource> FrameStreamer<S> {
    /// `fps` of zero is treated as one frame per second.
    pub fn new(source: S, control: StreamControl, fps: u32) -> Self {
        Self {
            source,
            control,
            period: Duration::from_secs(1) / fps.max(1),
            stats: StreamStats::default(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Captures and publishes one frame unless the stream is paused.
    pub fn tick(&mut self, publisher: &dyn FramePublisher) -> TickOutcome {
        let settings = self.control.settings();
        if settings.paused {
            self.stats.skipped += 1;
            return TickOutcome::Paused;
        }
        let payload = match self.source.capture(settings.width, settings.height) {
            Ok(payload) => payload,
            Err(e) => {
                self.stats.failed += 1;
                warn!("{e}");
                return TickOutcome::CaptureFailed;
            }
        };
        match publisher.publish(payload) {
            Ok(()) => {
                self.stats.published += 1;
                TickOutcome::Published
            }
            Err(e) => {
                self.stats.failed += 1;
                debug!("frame not sent: {e}");
                TickOutcome::PublishFailed
            }
        }
    }

    /// Ticks every `1 / fps` seconds until `shutdown` fires.
    pub async fn run(mut self, publisher: Arc<dyn FramePublisher>, shutdown: ShutdownSignal) -> StreamStats {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                _ = interval.tick() => {
                    self.tick(publisher.as_ref());
                }
            }
        }
        info!(
            "frame streamer stopped: {} published, {} paused ticks, {} failed",
            self.stats.published, self.stats.skipped, self.stats.failed
        );
        self.stats
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingPublisher {
        sent: Mutex<Vec<Vec<u8>>>,
        reject: bool,
    }

    impl FramePublisher for CollectingPublisher {
        fn publish(&self, payload: Vec<u8>) -> Result<(), String> {
            if self.reject {
                return Err("not connected".into());
            }
            self.sent.lock().unwrap().push(payload);
            Ok(())
        }
    }

    #[test]
    fn test_fps_sets_period_and_zero_is_clamped() {
        let control = StreamControl::new(1, 1);
        assert_eq!(
            FrameStreamer::new(MockFrameSource::new(), control.clone(), 10).period(),
            Duration::from_millis(100)
        );
        assert_eq!(
            FrameStreamer::new(MockFrameSource::new(), control, 0).period(),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_tick_captures_at_current_size_and_publishes() {
        // Arrange
        let mut source = MockFrameSource::new();
        source
            .expect_capture()
            .with(eq(320), eq(180))
            .times(1)
            .returning(|_, _| Ok(vec![7; 3]));
        let control = StreamControl::new(1920, 1080);
        control.resize(320, 180);
        let mut streamer = FrameStreamer::new(source, control, 10);
        let publisher = CollectingPublisher::default();

        // Act
        let outcome = streamer.tick(&publisher);

        // Assert
        assert_eq!(outcome, TickOutcome::Published);
        assert_eq!(*publisher.sent.lock().unwrap(), vec![vec![7; 3]]);
        assert_eq!(streamer.stats().published, 1);
    }

    #[test]
    fn test_paused_tick_does_not_capture() {
        let mut source = MockFrameSource::new();
        source.expect_capture().times(0);
        let control = StreamControl::new(640, 480);
        control.pause();
        let mut streamer = FrameStreamer::new(source, control, 10);

        let outcome = streamer.tick(&CollectingPublisher::default());

        assert_eq!(outcome, TickOutcome::Paused);
        assert_eq!(streamer.stats().skipped, 1);
    }

    #[test]
    fn test_resume_restarts_capture() {
        // Arrange
        let mut source = MockFrameSource::new();
        source.expect_capture().times(1).returning(|_, _| Ok(vec![1]));
        let control = StreamControl::new(640, 480);
        let mut streamer = FrameStreamer::new(source, control.clone(), 10);
        let publisher = CollectingPublisher::default();
        control.pause();
        assert_eq!(streamer.tick(&publisher), TickOutcome::Paused);

        // Act
        control.resume();

        // Assert
        assert_eq!(streamer.tick(&publisher), TickOutcome::Published);
    }

    #[test]
    fn test_capture_and_publish_failures_are_counted() {
        let mut source = MockFrameSource::new();
        let mut calls = 0;
        source.expect_capture().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err(CaptureError("display gone".into()))
            } else {
                Ok(vec![2])
            }
        });
        let mut streamer = FrameStreamer::new(source, StreamControl::new(8, 8), 10);
        let rejecting = CollectingPublisher {
            reject: true,
            ..CollectingPublisher::default()
        };

        assert_eq!(streamer.tick(&rejecting), TickOutcome::CaptureFailed);
        assert_eq!(streamer.tick(&rejecting), TickOutcome::PublishFailed);
        assert_eq!(streamer.stats().failed, 2);
    }

    #[tokio::test]
    async fn test_run_publishes_until_shutdown() {
        // Arrange
        let mut source = MockFrameSource::new();
        source.expect_capture().returning(|w, h| Ok(vec![0; (w * h) as usize]));
        let streamer = FrameStreamer::new(source, StreamControl::new(2, 2), 100);
        let publisher = Arc::new(CollectingPublisher::default());
        let shutdown = ShutdownSignal::new();
        let task = tokio::spawn(streamer.run(
            Arc::clone(&publisher) as Arc<dyn FramePublisher>,
            shutdown.clone(),
        ));

        // Act
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.trigger();
        let stats = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("streamer must observe shutdown")
            .unwrap();

        // Assert
        assert!(stats.published >= 1);
        assert_eq!(publisher.sent.lock().unwrap().len() as u64, stats.published);
    }
}

//! One live TCP connection and its receive/send machinery.
//!
//! # Lifecycle
//!
//! ```text
//! Connecting ──► Open ──► Closing ──► Closed
//!  (client only)      close(reason) / EOF / read, write or decode error
//! ```
//!
//! A [`Session`] starts `Open` with exactly two background tasks:
//!
//! - **receive loop** – reads whatever bytes are available, feeds the
//!   [`MessageDecoder`], and routes each decoded message to the Command or
//!   Frame queue by its type tag.  Every message decoded before a failure is
//!   delivered before the session closes.
//! - **send path** – the single owner of the socket's write half.  `send()`
//!   encodes on the caller's thread and hands the bytes to this task through a
//!   queue, so writes from several producers never interleave.
//!
//! Whichever party first moves the session from `Open` to `Closing` wins: it
//! stops both tasks, marks the session `Closed` and fires the close callback
//! with its reason.  Every other close attempt is a no-op.  The callback runs
//! on a background task; marshal to a UI thread before touching widgets.
//!
//! # Close ordering
//!
//! Callers of [`Session::close`] race the two background tasks, which close
//! on EOF or on an I/O or decode error.  All of them go through a single
//! compare-and-swap of the state byte.  The loser returns at once, so exactly
//! one reason is ever recorded.
//!
//! The winner then works through a fixed sequence:
//!
//! 1. signal shutdown to both tasks,
//! 2. let the send path flush what was already queued, then shut down the
//!    write half so the peer sees EOF,
//! 3. wait for the tasks it does not run on,
//! 4. store `Closed` and run the callback,
//! 5. wake everyone parked in [`Session::closed`].
//!
//! Because the callback runs before step 5, code awaiting `closed()` can rely
//! on the presentation having already been told.
//!
//! # Sending
//!
//! [`Session::send`] never touches the socket.  It stamps the header with the
//! next `seq` and the current time, encodes, and enqueues.  Encoding errors
//! (an oversized frame) are returned to the caller and the session stays
//! `Open`.  Once the state is terminal every send fails with
//! [`SessionError::AlreadyClosed`], even if the writer has not exited yet.
//!
//! ```rust,no_run
//! # async fn demo() -> Result<(), screenlink_core::SessionError> {
//! use screenlink_core::domain::{command_queue, InboundRoutes};
//! use screenlink_core::{Address, Command, Session, SessionConfig};
//!
//! let (commands, mut inbox) = command_queue();
//! let addr = Address::new("127.0.0.1", 5000).unwrap();
//! let session = Session::connect(
//!     &addr,
//!     SessionConfig::default(),
//!     InboundRoutes::commands(commands),
//!     Box::new(|reason| println!("session ended: {reason}")),
//! )
//! .await?;
//!
//! session.send_command(Command::Pause)?;
//! let _next = inbox.recv().await;
//! session.close("done").await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod reason;

pub use config::SessionConfig;
pub use reason::CloseReason;

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{Address, InboundRoutes};
use crate::protocol::codec::{encode_message, MessageDecoder, ProtocolError};
use crate::protocol::messages::{current_timestamp_us, Command, Message};
use crate::protocol::SequenceCounter;

/// Invoked exactly once per session with the reason it ended.
pub type CloseCallback = Box<dyn FnOnce(String) + Send + 'static>;

/// Errors surfaced by session operations.
///
/// A closed peer is not an error of any call; it shows up as
/// [`CloseReason::PeerClosed`] through the callback.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The TCP connection to the peer could not be established.
    #[error("connection failed to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    /// A message could not be encoded (e.g. payload over the maximum).
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// Transport-level failure while setting up the socket.
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The session is `Closing` or `Closed`.
    #[error("session already closed")]
    AlreadyClosed,
}

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// The client's handshake is in flight.  No `Session` handle exists yet,
    /// so only the Client role reports this state.
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Connecting,
            1 => SessionState::Open,
            2 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }

    /// `Closing` or `Closed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closing | SessionState::Closed)
    }
}

/// Which party is running the close procedure; a task never joins itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closer {
    External,
    Reader,
    Writer,
}

struct Inner {
    id: Uuid,
    peer: SocketAddr,
    config: SessionConfig,
    state: AtomicU8,
    sequence: SequenceCounter,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    shutdown: watch::Sender<bool>,
    closed: watch::Sender<bool>,
    reason: Mutex<Option<String>>,
    on_close: Mutex<Option<CloseCallback>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a live session.  Cloning is cheap; all clones share one socket.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("peer", &self.inner.peer)
            .field("state", &self.state())
            .finish()
    }
}

impl Session {
    /// Connects to `addr` and starts the session.
    ///
    /// No session exists until the handshake succeeds, so a failed connect
    /// never fires `on_close`.
    ///
    /// # Errors
    ///
    /// [`SessionError::ConnectFailed`] if the peer is unreachable or the
    /// connect timeout elapses.
    pub async fn connect(
        addr: &Address,
        config: SessionConfig,
        routes: InboundRoutes,
        on_close: CloseCallback,
    ) -> Result<Self, SessionError> {
        let attempt = TcpStream::connect(addr.as_pair());
        let stream = match tokio::time::timeout(config.connect_timeout(), attempt).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(SessionError::ConnectFailed {
                    addr: addr.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(SessionError::ConnectFailed {
                    addr: addr.to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("no answer within {:?}", config.connect_timeout()),
                    ),
                })
            }
        };
        info!("connected to {addr}");
        Self::from_accepted(stream, config, routes, on_close)
    }

    /// Adopts an already-connected stream (server side, after `accept`).
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`SessionError::Io`] if the socket is already unusable.
    pub fn from_accepted(
        stream: TcpStream,
        config: SessionConfig,
        routes: InboundRoutes,
        on_close: CloseCallback,
    ) -> Result<Self, SessionError> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (closed_tx, _) = watch::channel(false);

        let inner = Arc::new(Inner {
            id: Uuid::new_v4(),
            peer,
            config,
            state: AtomicU8::new(SessionState::Open as u8),
            sequence: SequenceCounter::new(),
            outbound: outbound_tx,
            shutdown: shutdown_tx,
            closed: closed_tx,
            reason: Mutex::new(None),
            on_close: Mutex::new(Some(on_close)),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        });

        // Tasks wait until their handles are stored so a fast failure can join them.
        let (reader_go, reader_ready) = oneshot::channel();
        let (writer_go, writer_ready) = oneshot::channel();
        let reader = tokio::spawn(read_loop(
            Arc::clone(&inner),
            read_half,
            routes,
            shutdown_rx.clone(),
            reader_ready,
        ));
        let writer = tokio::spawn(write_loop(
            Arc::clone(&inner),
            write_half,
            outbound_rx,
            shutdown_rx,
            writer_ready,
        ));
        *lock(&inner.reader) = Some(reader);
        *lock(&inner.writer) = Some(writer);
        let _ = reader_go.send(());
        let _ = writer_go.send(());

        info!("session {} open with {peer}", inner.id);
        Ok(Self { inner })
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.inner.peer
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// The reason passed to the callback, once the session started closing.
    pub fn close_reason(&self) -> Option<String> {
        lock(&self.inner.reason).clone()
    }

    /// Serialises `message` and queues it for the send path.
    ///
    /// Never blocks and needs no runtime context, so a presentation thread can
    /// call it directly.  Frames carry their own sequence number and timestamp;
    /// commands are stamped here.
    ///
    /// # Errors
    ///
    /// [`SessionError::AlreadyClosed`] once `Closing` or `Closed`;
    /// [`SessionError::Protocol`] if the payload exceeds the maximum, in which
    /// case nothing is written and the session stays open.
    pub fn send(&self, message: &Message) -> Result<(), SessionError> {
        if self.state().is_terminal() {
            return Err(SessionError::AlreadyClosed);
        }
        let bytes = encode_message(
            message,
            self.inner.sequence.next(),
            current_timestamp_us(),
            self.inner.config.max_payload_bytes,
        )?;
        self.inner
            .outbound
            .send(bytes)
            .map_err(|_| SessionError::AlreadyClosed)
    }

    /// Shorthand for `send(&Message::Command(command))`.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub fn send_command(&self, command: Command) -> Result<(), SessionError> {
        self.send(&Message::Command(command))
    }

    /// Closes the session with `reason` and waits until it is `Closed`.
    ///
    /// Safe to call from any task and any number of times; only the first
    /// close (local or detected failure) reaches the callback.
    pub async fn close(&self, reason: impl Into<CloseReason>) {
        self.finish(reason.into(), Closer::External).await;
    }

    /// Resolves once the session is `Closed` and its callback has run.
    pub async fn closed(&self) {
        let mut rx = self.inner.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    fn begin_close(&self) -> bool {
        self.inner
            .state
            .compare_exchange(
                SessionState::Open as u8,
                SessionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    async fn finish(&self, reason: CloseReason, closer: Closer) {
        if !self.begin_close() {
            if closer == Closer::External {
                self.closed().await;
            }
            return;
        }

        let id = self.inner.id;
        let reason = reason.to_string();
        info!("session {id} closing: {reason}");
        *lock(&self.inner.reason) = Some(reason.clone());
        self.inner.shutdown.send_replace(true);

        if closer != Closer::Writer {
            let writer = lock(&self.inner.writer).take();
            if let Some(mut handle) = writer {
                let linger = self.inner.config.close_linger();
                if tokio::time::timeout(linger, &mut handle).await.is_err() {
                    warn!("session {id}: pending sends not flushed within {linger:?}; dropping them");
                    handle.abort();
                    let _ = handle.await;
                }
            }
        }
        if closer != Closer::Reader {
            let reader = lock(&self.inner.reader).take();
            if let Some(handle) = reader {
                let _ = handle.await;
            }
        }

        self.inner
            .state
            .store(SessionState::Closed as u8, Ordering::Release);
        let callback = lock(&self.inner.on_close).take();
        if let Some(callback) = callback {
            callback(reason);
        }
        self.inner.closed.send_replace(true);
        debug!("session {id} closed");
    }
}

// ── Background tasks ──────────────────────────────────────────────────────────

async fn read_loop(
    inner: Arc<Inner>,
    mut reader: OwnedReadHalf,
    routes: InboundRoutes,
    mut shutdown: watch::Receiver<bool>,
    ready: oneshot::Receiver<()>,
) {
    let _ = ready.await;
    let mut decoder = MessageDecoder::new(inner.config.max_payload_bytes);
    let mut buf = vec![0u8; inner.config.read_buffer_bytes.max(1)];

    let reason = loop {
        let n = tokio::select! {
            _ = stopped(&mut shutdown) => return,
            result = reader.read(&mut buf) => match result {
                Ok(0) => break CloseReason::PeerClosed,
                Ok(n) => n,
                Err(e) => break CloseReason::ReadError(e.to_string()),
            },
        };
        decoder.feed(&buf[..n]);
        if let Err(reason) = route_decoded(&inner, &mut decoder, &routes) {
            break reason;
        }
    };

    if decoder.buffered() > 0 {
        debug!(
            "session {}: discarding {} undecoded bytes",
            inner.id,
            decoder.buffered()
        );
    }
    Session { inner }.finish(reason, Closer::Reader).await;
}

/// Delivers every complete message in `decoder`; `Err` means the session must end.
fn route_decoded(
    inner: &Inner,
    decoder: &mut MessageDecoder,
    routes: &InboundRoutes,
) -> Result<(), CloseReason> {
    loop {
        let message = match decoder.next_message() {
            Ok(Some(message)) => message,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!("session {}: decode error: {e}", inner.id);
                return Err(CloseReason::Malformed(e.to_string()));
            }
        };

        match message {
            Message::Command(command) => {
                let Some(tx) = &routes.commands else {
                    warn!("session {}: discarding unexpected command {command}", inner.id);
                    continue;
                };
                debug!("session {}: received command {command}", inner.id);
                let kicked = command == Command::Kick;
                if tx.send(command).is_err() {
                    return Err(CloseReason::QueueClosed);
                }
                if kicked {
                    return Err(CloseReason::Kicked);
                }
            }
            Message::Frame(frame) => {
                let Some(tx) = &routes.frames else {
                    warn!(
                        "session {}: discarding unexpected frame #{}",
                        inner.id, frame.sequence
                    );
                    continue;
                };
                debug!(
                    "session {}: received frame #{} ({} bytes)",
                    inner.id,
                    frame.sequence,
                    frame.payload.len()
                );
                if tx.send(frame).is_err() {
                    return Err(CloseReason::QueueClosed);
                }
            }
        }
    }
}

async fn write_loop(
    inner: Arc<Inner>,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    mut shutdown: watch::Receiver<bool>,
    ready: oneshot::Receiver<()>,
) {
    let _ = ready.await;

    loop {
        tokio::select! {
            biased;
            _ = stopped(&mut shutdown) => break,
            next = outbound.recv() => {
                let Some(bytes) = next else { break };
                if let Err(e) = writer.write_all(&bytes).await {
                    warn!("session {}: write failed: {e}", inner.id);
                    Session { inner }
                        .finish(CloseReason::WriteError(e.to_string()), Closer::Writer)
                        .await;
                    return;
                }
            }
        }
    }

    // Flush what producers queued before the close started.
    while let Ok(bytes) = outbound.try_recv() {
        if writer.write_all(&bytes).await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    // The sender lives in `Inner`, which this task keeps alive.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{command_queue, frame_queue};
    use crate::protocol::messages::Frame;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc::UnboundedReceiver;

    const WAIT: Duration = Duration::from_secs(5);

    async fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (client.unwrap(), accepted.unwrap().0)
    }

    fn reason_channel() -> (CloseCallback, UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: CloseCallback = Box::new(move |reason| {
            let _ = tx.send(reason);
        });
        (callback, rx)
    }

    async fn next_reason(rx: &mut UnboundedReceiver<String>) -> String {
        tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("close callback must fire")
            .expect("callback sender dropped without firing")
    }

    #[test]
    fn test_only_closing_and_closed_are_terminal() {
        assert!(!SessionState::Connecting.is_terminal());
        assert!(!SessionState::Open.is_terminal());
        assert!(SessionState::Closing.is_terminal());
        assert!(SessionState::Closed.is_terminal());
    }

    #[tokio::test]
    async fn test_commands_arrive_in_submission_order() {
        // Arrange
        let (a, b) = tcp_pair().await;
        let (cmd_tx, mut cmd_rx) = command_queue();
        let (cb_a, _ra) = reason_channel();
        let (cb_b, _rb) = reason_channel();
        let sender =
            Session::from_accepted(a, SessionConfig::default(), InboundRoutes::default(), cb_a)
                .unwrap();
        let _receiver =
            Session::from_accepted(b, SessionConfig::default(), InboundRoutes::commands(cmd_tx), cb_b)
                .unwrap();

        // Act
        for i in 0..50 {
            sender.send_command(Command::Text(format!("cmd-{i}"))).unwrap();
        }

        // Assert
        for i in 0..50 {
            let cmd = tokio::time::timeout(WAIT, cmd_rx.recv()).await.unwrap().unwrap();
            assert_eq!(cmd, Command::Text(format!("cmd-{i}")));
        }
    }

    #[tokio::test]
    async fn test_frames_are_routed_to_frame_queue() {
        let (a, b) = tcp_pair().await;
        let (frame_tx, mut frame_rx) = frame_queue();
        let (cb_a, _ra) = reason_channel();
        let (cb_b, _rb) = reason_channel();
        let sender =
            Session::from_accepted(a, SessionConfig::default(), InboundRoutes::default(), cb_a)
                .unwrap();
        let _receiver =
            Session::from_accepted(b, SessionConfig::default(), InboundRoutes::frames(frame_tx), cb_b)
                .unwrap();

        let frame = Frame { sequence: 9, timestamp_us: 77, payload: vec![1, 2, 3, 4] };
        sender.send(&Message::Frame(frame.clone())).unwrap();

        let got = tokio::time::timeout(WAIT, frame_rx.recv()).await.unwrap().unwrap();
        assert_eq!(got, frame);
    }

    #[tokio::test]
    async fn test_send_after_close_fails_with_already_closed() {
        let (a, _b) = tcp_pair().await;
        let (cb, _rx) = reason_channel();
        let session =
            Session::from_accepted(a, SessionConfig::default(), InboundRoutes::default(), cb)
                .unwrap();

        session.close("done").await;

        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(
            session.send_command(Command::Pause),
            Err(SessionError::AlreadyClosed)
        ));
    }

    #[tokio::test]
    async fn test_racing_closes_fire_callback_once() {
        // Arrange
        let (a, _b) = tcp_pair().await;
        let (cb, mut rx) = reason_channel();
        let session =
            Session::from_accepted(a, SessionConfig::default(), InboundRoutes::default(), cb)
                .unwrap();
        let s1 = session.clone();
        let s2 = session.clone();

        // Act
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { s1.close("first").await }),
            tokio::spawn(async move { s2.close("second").await }),
        );
        r1.unwrap();
        r2.unwrap();

        // Assert
        let reason = next_reason(&mut rx).await;
        assert!(reason == "first" || reason == "second", "got {reason:?}");
        assert!(rx.try_recv().is_err(), "callback must fire exactly once");
        assert_eq!(session.close_reason(), Some(reason));
    }

    #[tokio::test]
    async fn test_peer_drop_closes_with_peer_closed() {
        let (a, b) = tcp_pair().await;
        let (cb, mut rx) = reason_channel();
        let session =
            Session::from_accepted(a, SessionConfig::default(), InboundRoutes::default(), cb)
                .unwrap();

        drop(b);

        let reason = next_reason(&mut rx).await;
        assert!(
            reason == "peer closed" || reason.starts_with("read error"),
            "got {reason:?}"
        );
        session.closed().await;
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_garbage_bytes_close_with_malformed_frame() {
        // Arrange
        let (a, mut b) = tcp_pair().await;
        let (cb, mut rx) = reason_channel();
        let _session =
            Session::from_accepted(a, SessionConfig::default(), InboundRoutes::default(), cb)
                .unwrap();

        // Act – 24 bytes that cannot be a valid header
        b.write_all(&[0xEE; 24]).await.unwrap();

        // Assert
        let reason = next_reason(&mut rx).await;
        assert!(reason.starts_with("malformed frame"), "got {reason:?}");
    }

    #[tokio::test]
    async fn test_oversized_send_is_rejected_and_session_stays_open() {
        let (a, _b) = tcp_pair().await;
        let (cb, _rx) = reason_channel();
        let config = SessionConfig {
            max_payload_bytes: 8,
            ..SessionConfig::default()
        };
        let session =
            Session::from_accepted(a, config, InboundRoutes::default(), cb).unwrap();

        let result = session.send(&Message::Frame(Frame::now(0, vec![0; 9])));

        assert!(matches!(
            result,
            Err(SessionError::Protocol(ProtocolError::PayloadTooLarge { len: 9, max: 8 }))
        ));
        assert!(session.is_open());
    }

    #[tokio::test]
    async fn test_kick_is_delivered_then_session_closes() {
        let (a, b) = tcp_pair().await;
        let (cmd_tx, mut cmd_rx) = command_queue();
        let (cb_a, _ra) = reason_channel();
        let (cb_b, mut rb) = reason_channel();
        let server =
            Session::from_accepted(a, SessionConfig::default(), InboundRoutes::default(), cb_a)
                .unwrap();
        let _client =
            Session::from_accepted(b, SessionConfig::default(), InboundRoutes::commands(cmd_tx), cb_b)
                .unwrap();

        server.send_command(Command::Kick).unwrap();

        assert_eq!(cmd_rx.recv().await, Some(Command::Kick));
        assert_eq!(next_reason(&mut rb).await, "kicked from session");
    }

    #[tokio::test]
    async fn test_dropped_queue_consumer_closes_session() {
        let (a, b) = tcp_pair().await;
        let (cmd_tx, cmd_rx) = command_queue();
        drop(cmd_rx);
        let (cb_a, _ra) = reason_channel();
        let (cb_b, mut rb) = reason_channel();
        let sender =
            Session::from_accepted(a, SessionConfig::default(), InboundRoutes::default(), cb_a)
                .unwrap();
        let _receiver =
            Session::from_accepted(b, SessionConfig::default(), InboundRoutes::commands(cmd_tx), cb_b)
                .unwrap();

        sender.send_command(Command::Pause).unwrap();

        assert_eq!(next_reason(&mut rb).await, "presentation queue closed");
    }

    #[tokio::test]
    async fn test_close_flushes_queued_commands() {
        // Arrange
        let (a, b) = tcp_pair().await;
        let (cmd_tx, mut cmd_rx) = command_queue();
        let (cb_a, _ra) = reason_channel();
        let (cb_b, _rb) = reason_channel();
        let sender =
            Session::from_accepted(a, SessionConfig::default(), InboundRoutes::default(), cb_a)
                .unwrap();
        let _receiver =
            Session::from_accepted(b, SessionConfig::default(), InboundRoutes::commands(cmd_tx), cb_b)
                .unwrap();

        // Act – queue then close immediately
        sender.send_command(Command::Text("last words".into())).unwrap();
        sender.close("bye").await;

        // Assert
        let got = tokio::time::timeout(WAIT, cmd_rx.recv()).await.unwrap();
        assert_eq!(got, Some(Command::Text("last words".into())));
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails_without_callback() {
        // Arrange – grab a free port, then release it so nothing listens there
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let addr = Address::new("127.0.0.1", port).unwrap();
        let (cb, mut rx) = reason_channel();

        // Act
        let result =
            Session::connect(&addr, SessionConfig::default(), InboundRoutes::default(), cb).await;

        // Assert
        assert!(matches!(result, Err(SessionError::ConnectFailed { .. })));
        assert_eq!(rx.recv().await, None, "callback is dropped, never invoked");
    }
}

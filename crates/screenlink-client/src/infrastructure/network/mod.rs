//! TCP client for the Client role.
//!
//! # Connection lifecycle
//!
//! ```text
//! Idle ──start()──► Connecting ──ok──► Open ──► Stopped
//!                        │                        ▲
//!                        └──── failure / stop() ──┘
//! ```
//!
//! `start()` returns immediately; the connect runs on the runtime handed to
//! [`Client::new`], so it may be called from a plain presentation thread.
//! Inbound commands are pushed onto the Command Queue.  The disconnect
//! handler fires exactly once with the reason the client stopped, whether
//! the connect failed, the session ended or `stop()` was called.  There is
//! no automatic reconnect; the bootstrap decides whether to start again.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use screenlink_core::domain::{CommandSender, InboundRoutes};
use screenlink_core::protocol::SequenceCounter;
use screenlink_core::{
    Address, CloseCallback, Frame, Message, Session, SessionConfig, SessionError, SessionState,
};

use crate::application::stream_frames::FramePublisher;

/// Invoked once with the reason the client stopped.
pub type DisconnectHandler = Arc<dyn Fn(String) + Send + Sync>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// `start()` may only be called once per client.
    #[error("client already started")]
    AlreadyStarted,
    /// No open session to send on.
    #[error("not connected to a server")]
    NotConnected,
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: Address,
    pub session: SessionConfig,
}

/// Observable client state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Connecting,
    Connected,
    Stopped,
}

enum Slot {
    Idle,
    Connecting {
        task: JoinHandle<()>,
        cancel: oneshot::Sender<()>,
    },
    Open(Session),
    Stopped,
}

struct Inner {
    config: ClientConfig,
    commands: CommandSender,
    on_disconnect: DisconnectHandler,
    runtime: Handle,
    sequence: SequenceCounter,
    fired: AtomicBool,
    slot: Mutex<Slot>,
}

impl Inner {
    /// Calls the disconnect handler unless it already ran.
    fn fire(&self, reason: String) {
        if self.fired.swap(true, Ordering::AcqRel) {
            debug!("ignoring second disconnect reason: {reason}");
            return;
        }
        info!("disconnected from {}: {reason}", self.config.server);
        (self.on_disconnect)(reason);
    }

    fn session_closed(&self, reason: String) {
        *lock(&self.slot) = Slot::Stopped;
        self.fire(reason);
    }
}

/// Handle to the Client role.  Clones share one connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("server", &self.inner.config.server)
            .field("state", &self.state())
            .finish()
    }
}

impl Client {
    pub fn new(
        config: ClientConfig,
        commands: CommandSender,
        on_disconnect: DisconnectHandler,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                commands,
                on_disconnect,
                runtime,
                sequence: SequenceCounter::new(),
                fired: AtomicBool::new(false),
                slot: Mutex::new(Slot::Idle),
            }),
        }
    }

    /// Begins connecting in the background.
    ///
    /// A failed connect is reported through the disconnect handler with a
    /// reason starting with `connection failed`.
    ///
    /// # Errors
    ///
    /// [`ClientError::AlreadyStarted`] unless the client is `Idle`.
    pub fn start(&self) -> Result<(), ClientError> {
        let mut slot = lock(&self.inner.slot);
        if !matches!(*slot, Slot::Idle) {
            return Err(ClientError::AlreadyStarted);
        }
        let (go_tx, go_rx) = oneshot::channel::<()>();
        let (cancel, cancelled) = oneshot::channel::<()>();
        let inner = Arc::clone(&self.inner);
        let task = self.inner.runtime.spawn(async move {
            if go_rx.await.is_ok() {
                connect(inner, cancelled).await;
            }
        });
        *slot = Slot::Connecting { task, cancel };
        drop(slot);
        // The task may only look at the slot once it holds `Connecting`.
        let _ = go_tx.send(());
        Ok(())
    }

    /// Stops the client with `reason`.
    ///
    /// Cancels a pending connect or closes the open session.  Returns once
    /// the disconnect handler has run.  A no-op if the client never started
    /// or already stopped.
    pub async fn stop(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let previous = std::mem::replace(&mut *lock(&self.inner.slot), Slot::Stopped);
        match previous {
            Slot::Connecting { task, cancel } => {
                self.inner.fire(reason);
                let _ = cancel.send(());
                let _ = task.await;
            }
            Slot::Open(session) => session.close(reason).await,
            Slot::Idle | Slot::Stopped => {}
        }
    }

    pub fn state(&self) -> ClientState {
        match *lock(&self.inner.slot) {
            Slot::Idle => ClientState::Idle,
            Slot::Connecting { .. } => ClientState::Connecting,
            Slot::Open(_) => ClientState::Connected,
            Slot::Stopped => ClientState::Stopped,
        }
    }

    /// State of the session slot: `Connecting` while the handshake is in
    /// flight, the live Session's state once adopted, `None` otherwise.
    pub fn session_state(&self) -> Option<SessionState> {
        match &*lock(&self.inner.slot) {
            Slot::Connecting { .. } => Some(SessionState::Connecting),
            Slot::Open(session) => Some(session.state()),
            Slot::Idle | Slot::Stopped => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session().is_some_and(|s| s.is_open())
    }

    /// Queues `message` on the open session.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotConnected`] without an open session, or
    /// [`ClientError::Session`] if it closed meanwhile or the message is too
    /// large to encode.
    pub fn send(&self, message: &Message) -> Result<(), ClientError> {
        let session = self.session().ok_or(ClientError::NotConnected)?;
        session.send(message)?;
        Ok(())
    }

    /// Stamps `payload` with the next frame sequence and sends it.
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send).
    pub fn send_frame(&self, payload: Vec<u8>) -> Result<(), ClientError> {
        let frame = Frame::now(self.inner.sequence.next(), payload);
        self.send(&Message::Frame(frame))
    }

    fn session(&self) -> Option<Session> {
        match &*lock(&self.inner.slot) {
            Slot::Open(session) => Some(session.clone()),
            _ => None,
        }
    }
}

impl FramePublisher for Client {
    fn publish(&self, payload: Vec<u8>) -> Result<(), String> {
        self.send_frame(payload).map_err(|e| e.to_string())
    }
}

async fn connect(inner: Arc<Inner>, cancelled: oneshot::Receiver<()>) {
    let weak: Weak<Inner> = Arc::downgrade(&inner);
    let on_close: CloseCallback = Box::new(move |reason| {
        if let Some(inner) = weak.upgrade() {
            inner.session_closed(reason);
        }
    });
    let routes = InboundRoutes::commands(inner.commands.clone());
    let attempt = Session::connect(&inner.config.server, inner.config.session.clone(), routes, on_close);
    let result = tokio::select! {
        result = attempt => result,
        _ = cancelled => {
            debug!("connect to {} cancelled", inner.config.server);
            return;
        }
    };

    match result {
        Ok(session) => {
            let adopted = {
                let mut slot = lock(&inner.slot);
                let connecting = matches!(*slot, Slot::Connecting { .. });
                if connecting {
                    *slot = Slot::Open(session.clone());
                }
                connecting
            };
            if adopted {
                info!("session {} open with {}", session.id(), inner.config.server);
            } else {
                // Stopped, or the session already ended, while connecting.
                session.close("client stopped").await;
            }
        }
        Err(e) => {
            let won = {
                let mut slot = lock(&inner.slot);
                let connecting = matches!(*slot, Slot::Connecting { .. });
                if connecting {
                    *slot = Slot::Stopped;
                }
                connecting
            };
            if won {
                warn!("{e}");
                // `ConnectFailed` renders as "connection failed to <addr>: <cause>".
                let reason = match e {
                    SessionError::ConnectFailed { .. } => e.to_string(),
                    other => format!("connection failed: {other}"),
                };
                inner.fire(reason);
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use screenlink_core::domain::command_queue;
    use tokio::sync::mpsc;

    fn client_for(port: u16) -> (Client, mpsc::UnboundedReceiver<String>) {
        let (cmd_tx, _cmd_rx) = command_queue();
        let (reason_tx, reason_rx) = mpsc::unbounded_channel();
        let client = Client::new(
            ClientConfig {
                server: Address::new("127.0.0.1", port).unwrap(),
                session: SessionConfig::default(),
            },
            cmd_tx,
            Arc::new(move |reason: String| {
                let _ = reason_tx.send(reason);
            }),
            Handle::current(),
        );
        (client, reason_rx)
    }

    #[tokio::test]
    async fn test_new_client_is_idle_and_cannot_send() {
        let (client, _reasons) = client_for(5000);

        assert_eq!(client.state(), ClientState::Idle);
        assert!(!client.is_connected());
        assert!(matches!(client.send_frame(vec![1]), Err(ClientError::NotConnected)));
        assert!(client.publish(vec![1]).is_err());
    }

    #[tokio::test]
    async fn test_session_state_reports_connecting_then_none() {
        // Arrange – a current-thread runtime: the connect task has not run yet
        let (client, _reasons) = client_for(5000);
        assert_eq!(client.session_state(), None);

        // Act
        client.start().unwrap();

        // Assert
        assert_eq!(client.session_state(), Some(SessionState::Connecting));
        assert_eq!(client.state(), ClientState::Connecting);
        client.stop("test over").await;
        assert_eq!(client.session_state(), None);
    }

    #[tokio::test]
    async fn test_stop_before_start_does_not_fire() {
        let (client, mut reasons) = client_for(5000);

        client.stop("never started").await;

        assert_eq!(client.state(), ClientState::Stopped);
        assert!(reasons.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        // Arrange
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (client, _reasons) = client_for(listener.local_addr().unwrap().port());
        client.start().unwrap();

        // Act
        let second = client.start();

        // Assert
        assert!(matches!(second, Err(ClientError::AlreadyStarted)));
        client.stop("test over").await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_fires_once() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (client, mut reasons) = client_for(listener.local_addr().unwrap().port());
        client.start().unwrap();

        client.stop("first").await;
        client.stop("second").await;

        let first = tokio::time::timeout(Duration::from_secs(2), reasons.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, "first");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(reasons.try_recv().is_err());
        assert_eq!(client.state(), ClientState::Stopped);
    }
}

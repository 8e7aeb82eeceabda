//! Server role: accept loop, session slot, and command forwarding.
//!
//! ```text
//! presentation ──Command Queue──► forwarding task ──► Session.send()
//! presentation ◄──Frame Queue──── Session receive loop
//!                                 ▲
//!                 accept loop ────┘ adopts one Session at a time
//! ```
//!
//! # Session policy
//!
//! At most one client is served.  A connection that arrives while a Session
//! is `Open` is closed immediately.  This is a deliberate simplification; a
//! multi-client server needs a session map and per-session forwarding.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use screenlink_core::domain::{CommandReceiver, FrameSender, InboundRoutes};
use screenlink_core::{Address, CloseCallback, Command, Session, SessionConfig};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Pause after a failed `accept()` so a persistent error (e.g. EMFILE) does
/// not spin the accept loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Called once per adopted Session with the reason it ended.
pub type CloseHandler = Arc<dyn Fn(String) + Send + Sync + 'static>;

/// Error type for server lifecycle operations.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server already started")]
    AlreadyStarted,
}

/// Everything the server needs besides its queues.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: Address,
    pub session: SessionConfig,
    /// Resolution requested from each newly adopted client, if any.
    pub preview_size: Option<(u32, u32)>,
}

/// State shared by the accept loop and the forwarding task.
struct Shared {
    session_config: SessionConfig,
    preview_size: Option<(u32, u32)>,
    frames: FrameSender,
    on_close: CloseHandler,
    slot: Mutex<Option<Session>>,
    /// Last Pause/Unpause forwarded, replayed to the next adopted client.
    paused: AtomicBool,
}

/// The server role.
///
/// Construct with [`Server::new`], then [`start`](Server::start).  The server
/// only pops from the Command Queue and pushes to the Frame Queue; it never
/// calls into the presentation except through the close handler.
pub struct Server {
    bind: Address,
    shared: Arc<Shared>,
    commands: Mutex<Option<CommandReceiver>>,
    started: AtomicBool,
    stop_tx: watch::Sender<bool>,
    local_addr: Mutex<Option<SocketAddr>>,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Server {
    pub fn new(
        config: ServerConfig,
        commands: CommandReceiver,
        frames: FrameSender,
        on_close: CloseHandler,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            bind: config.bind,
            shared: Arc::new(Shared {
                session_config: config.session,
                preview_size: config.preview_size,
                frames,
                on_close,
                slot: Mutex::new(None),
                paused: AtomicBool::new(false),
            }),
            commands: Mutex::new(Some(commands)),
            started: AtomicBool::new(false),
            stop_tx,
            local_addr: Mutex::new(None),
            tasks: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// Binds the listener and spawns the accept loop and the forwarding task.
    ///
    /// # Errors
    ///
    /// - [`ServerError::AlreadyStarted`] on a second call.
    /// - [`ServerError::BindFailed`] if the address is in use or not local;
    ///   `start` may then be retried.
    pub async fn start(&self) -> Result<(), ServerError> {
        if self.started.load(Ordering::Acquire) {
            return Err(ServerError::AlreadyStarted);
        }
        let listener = TcpListener::bind(self.bind.as_pair())
            .await
            .map_err(|source| ServerError::BindFailed {
                addr: self.bind.to_string(),
                source,
            })?;
        self.start_with_listener(listener).await
    }

    /// Like [`start`](Self::start) but serves an already-bound listener,
    /// e.g. one bound to port 0.
    ///
    /// # Errors
    ///
    /// [`ServerError::AlreadyStarted`] if the server is already running.
    pub async fn start_with_listener(&self, listener: TcpListener) -> Result<(), ServerError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ServerError::AlreadyStarted);
        }

        let bound = listener.local_addr().ok();
        *lock(&self.local_addr) = bound;
        let commands = lock(&self.commands)
            .take()
            .ok_or(ServerError::AlreadyStarted)?;

        info!(
            "server listening on {}",
            bound.map_or_else(|| self.bind.to_string(), |a| a.to_string())
        );

        let accept = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.shared),
            self.stop_tx.subscribe(),
        ));
        let forward = tokio::spawn(forward_commands(
            Arc::clone(&self.shared),
            commands,
            self.stop_tx.subscribe(),
        ));
        self.tasks.lock().await.extend([accept, forward]);
        Ok(())
    }

    /// The bound address, once started.  Reports the real port when bound to 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.local_addr)
    }

    /// `true` while an adopted Session is `Open`.
    pub fn has_session(&self) -> bool {
        lock(&self.shared.slot)
            .as_ref()
            .is_some_and(Session::is_open)
    }

    /// Stops accepting and forwarding, closes the live Session with `reason`,
    /// and returns once both background tasks have exited.
    ///
    /// Commands still queued are not forwarded.  Idempotent.
    pub async fn stop(&self, reason: impl Into<String>) {
        self.stop_tx.send_replace(true);
        self.join().await;
        let session = lock(&self.shared.slot).take();
        if let Some(session) = session {
            session.close(reason.into()).await;
        }
        info!("server stopped");
    }

    /// Waits until the accept loop and the forwarding task have terminated.
    ///
    /// Returns immediately if the server was never started.
    pub async fn join(&self) {
        let mut tasks = self.tasks.lock().await;
        for handle in tasks.drain(..) {
            if let Err(e) = handle.await {
                error!("server task ended abnormally: {e}");
            }
        }
    }
}

impl Drop for Server {
    /// Stops both background tasks and closes the adopted Session, if any.
    ///
    /// The close runs on the current runtime.  Dropped outside a runtime, the
    /// Session keeps running until its peer leaves; call
    /// [`stop`](Server::stop) for an orderly shutdown.
    fn drop(&mut self) {
        self.stop_tx.send_replace(true);
        let Some(session) = lock(&self.shared.slot).take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { session.close("server dropped").await });
            }
            Err(_) => warn!("server dropped outside a runtime; session {} left open", session.id()),
        }
    }
}

impl Shared {
    /// Installs `stream` as the live Session unless one is already open.
    fn adopt(&self, stream: TcpStream, peer: SocketAddr) {
        let mut slot = lock(&self.slot);
        if slot.as_ref().is_some_and(Session::is_open) {
            warn!("rejecting connection from {peer}: a session is already open");
            return;
        }

        let on_close = Arc::clone(&self.on_close);
        let callback: CloseCallback = Box::new(move |reason| on_close(reason));
        let session = match Session::from_accepted(
            stream,
            self.session_config.clone(),
            InboundRoutes::frames(self.frames.clone()),
            callback,
        ) {
            Ok(session) => session,
            Err(e) => {
                warn!("could not adopt connection from {peer}: {e}");
                return;
            }
        };

        info!("client {peer} connected (session {})", session.id());
        if let Some((width, height)) = self.preview_size {
            if let Err(e) = session.send_command(Command::Resize { width, height }) {
                warn!("could not send preview size to {peer}: {e}");
            }
        }
        if self.paused.load(Ordering::Acquire) {
            if let Err(e) = session.send_command(Command::Pause) {
                warn!("could not replay pause to {peer}: {e}");
            }
        }
        *slot = Some(session);
    }

    async fn forward(&self, command: Command) {
        match command {
            Command::Pause => self.paused.store(true, Ordering::Release),
            Command::Unpause => self.paused.store(false, Ordering::Release),
            _ => {}
        }

        let session = lock(&self.slot).clone().filter(Session::is_open);
        let Some(session) = session else {
            warn!("no client connected; dropping command {command}");
            return;
        };
        if let Err(e) = session.send_command(command.clone()) {
            warn!("dropping command {command}: {e}");
            return;
        }
        debug!("forwarded {command} to session {}", session.id());

        if command == Command::Kick {
            session.close("client kicked").await;
        }
    }
}

// ── Background tasks ──────────────────────────────────────────────────────────

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>, mut stop: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = stopped(&mut stop) => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => shared.adopt(stream, peer),
                Err(e) => {
                    error!("accept error: {e}");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }
    debug!("accept loop stopped");
}

async fn forward_commands(
    shared: Arc<Shared>,
    mut commands: CommandReceiver,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let command = tokio::select! {
            biased;
            _ = stopped(&mut stop) => break,
            next = commands.recv() => match next {
                Some(command) => command,
                None => {
                    info!("command queue closed; forwarding stopped");
                    break;
                }
            },
        };
        shared.forward(command).await;
    }
    debug!("forwarding task stopped");
}

async fn stopped(stop: &mut watch::Receiver<bool>) {
    // A dropped sender means the Server is gone; treat it as a stop.
    let _ = stop.wait_for(|stop| *stop).await;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

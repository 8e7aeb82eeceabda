//! Screenlink client entry point.
//!
//! ```text
//! main()
//!  └─ load config (TOML file, then CLI flags / env overrides)
//!  └─ loop
//!      └─ Client::start()          -- connect in the background
//!      └─ CommandDispatcher::run() -- Command Queue → input sink / stream control
//!      └─ FrameStreamer::run()     -- capture → Client::send_frame()
//!      └─ wait for the disconnect reason or Ctrl-C
//!      └─ sleep restart_delay, then start over with a fresh client
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use screenlink_client::application::dispatch_commands::CommandDispatcher;
use screenlink_client::application::stream_frames::{FramePublisher, FrameStreamer, StreamControl};
use screenlink_client::infrastructure::capture::SyntheticSource;
use screenlink_client::infrastructure::input_emulation::RecordingInputSink;
use screenlink_client::infrastructure::network::{Client, ClientConfig};
use screenlink_client::infrastructure::storage::config::{load_config, AppConfig, ClientSection};
use screenlink_core::domain::{command_queue, ShutdownSignal};

/// Screenlink client: streams this machine's screen to a server and obeys
/// its commands.
#[derive(Debug, Parser)]
#[command(name = "screenlink-client", version)]
struct Cli {
    /// Path to the TOML config file.  A missing file means all defaults.
    #[arg(long, short, default_value = "screenlink-client.toml", env = "SCREENLINK_CLIENT_CONFIG")]
    config: PathBuf,

    /// Server host (overrides `[client] server_host`).
    #[arg(long, env = "SCREENLINK_SERVER_HOST")]
    host: Option<String>,

    /// Server port (overrides `[client] server_port`).
    #[arg(long, env = "SCREENLINK_SERVER_PORT")]
    port: Option<u16>,

    /// Frames captured per second.
    #[arg(long)]
    fps: Option<u32>,

    /// Give up after this many reconnects.
    #[arg(long)]
    max_restarts: Option<u32>,
}

impl Cli {
    fn apply(&self, cfg: &mut AppConfig) {
        if let Some(host) = &self.host {
            cfg.client.server_host = host.clone();
        }
        if let Some(port) = self.port {
            cfg.client.server_port = port;
        }
        if let Some(fps) = self.fps {
            cfg.client.fps = fps;
        }
        if self.max_restarts.is_some() {
            cfg.client.max_restarts = self.max_restarts;
        }
    }
}

/// Whether another session may be attempted after `restarts` reconnects.
fn may_restart(section: &ClientSection, restarts: u32) -> bool {
    section.max_restarts.map_or(true, |max| restarts < max)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cfg = load_config(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    cli.apply(&mut cfg);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.client.log_level)),
        )
        .init();

    let client_config = cfg
        .client_config()
        .context("invalid client configuration")?;
    info!("Screenlink client starting, server {}", client_config.server);

    let shutdown = ShutdownSignal::new();
    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                ctrl_c_shutdown.trigger();
            }
            Err(e) => error!("failed to listen for Ctrl-C: {e}"),
        }
    });

    let mut restarts = 0u32;
    loop {
        let reason = run_session(&cfg.client, client_config.clone(), &shutdown).await?;
        info!("session ended: {reason}");

        if shutdown.is_triggered() {
            break;
        }
        if !may_restart(&cfg.client, restarts) {
            warn!("giving up after {restarts} restart(s)");
            break;
        }
        restarts += 1;
        tokio::select! {
            _ = shutdown.wait() => break,
            _ = tokio::time::sleep(cfg.client.restart_delay()) => {}
        }
        info!("reconnecting (attempt {restarts})");
    }

    info!("Screenlink client stopped");
    Ok(())
}

/// Runs one client lifetime with fresh queues and returns why it ended.
async fn run_session(
    section: &ClientSection,
    config: ClientConfig,
    shutdown: &ShutdownSignal,
) -> anyhow::Result<String> {
    let (cmd_tx, cmd_rx) = command_queue();
    let (reason_tx, mut reason_rx) = mpsc::unbounded_channel();
    let client = Client::new(
        config,
        cmd_tx,
        Arc::new(move |reason: String| {
            let _ = reason_tx.send(reason);
        }),
        Handle::current(),
    );

    let control = StreamControl::new(section.frame_width, section.frame_height);
    let session_over = ShutdownSignal::new();
    let dispatcher = tokio::spawn(
        CommandDispatcher::new(Arc::new(RecordingInputSink::new()), control.clone())
            .run(cmd_rx, session_over.clone()),
    );
    let publisher: Arc<dyn FramePublisher> = Arc::new(client.clone());
    let streamer = tokio::spawn(
        FrameStreamer::new(SyntheticSource::new(), control, section.fps)
            .run(publisher, session_over.clone()),
    );

    client.start().context("failed to start client")?;

    let reason = tokio::select! {
        reason = reason_rx.recv() => reason,
        _ = shutdown.wait() => {
            client.stop("client shutting down").await;
            reason_rx.recv().await
        }
    }
    .unwrap_or_else(|| "client dropped".to_string());

    session_over.trigger();
    let dispatched = dispatcher.await.context("command dispatcher task failed")?;
    let streamed = streamer.await.context("frame streamer task failed")?;
    info!(
        "{} command(s) applied, {} frame(s) sent",
        dispatched.applied, streamed.published
    );
    Ok(reason)
}

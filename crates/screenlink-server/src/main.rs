//! Screenlink server entry point.
//!
//! Wires the Server role to a headless presentation:
//!
//! ```text
//! main()
//!  └─ load config (TOML file, then CLI flags / env overrides)
//!  └─ Server::start()           -- accept loop + forwarding task
//!  └─ FrameConsumer::run()      -- Tokio task draining the Frame Queue
//!  └─ operator console          -- OS thread reading stdin into the Command Queue
//!  └─ wait for Ctrl-C or `quit`, then stop("server shutting down") + join()
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use screenlink_core::domain::{command_queue, frame_queue, ShutdownSignal};
use screenlink_server::application::consume_frames::{FrameConsumer, LoggingView};
use screenlink_server::application::operator_console::run_console;
use screenlink_server::infrastructure::network::Server;
use screenlink_server::infrastructure::storage::config::{load_config, AppConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Screenlink server: accepts one client, forwards operator commands to it,
/// and shows the frames it streams back.
#[derive(Debug, Parser)]
#[command(name = "screenlink-server", version)]
struct Cli {
    /// Path to the TOML config file.  A missing file means all defaults.
    #[arg(long, short, default_value = "screenlink-server.toml", env = "SCREENLINK_SERVER_CONFIG")]
    config: PathBuf,

    /// Interface to listen on (overrides `[server] bind_address`).
    #[arg(long, env = "SCREENLINK_BIND")]
    bind: Option<String>,

    /// TCP port to listen on (overrides `[server] port`).
    #[arg(long, env = "SCREENLINK_PORT")]
    port: Option<u16>,

    /// Resolution requested from each client, as `WIDTHxHEIGHT`.
    #[arg(long, value_parser = parse_size)]
    preview: Option<(u32, u32)>,

    /// Frames older than this many milliseconds are dropped.
    #[arg(long, env = "SCREENLINK_MAX_FRAME_AGE_MS")]
    max_frame_age_ms: Option<u64>,

    /// Do not read operator commands from stdin.
    #[arg(long)]
    no_console: bool,
}

impl Cli {
    /// Applies CLI overrides on top of the file configuration.
    fn apply(&self, cfg: &mut AppConfig) {
        if let Some(bind) = &self.bind {
            cfg.server.bind_address = bind.clone();
        }
        if let Some(port) = self.port {
            cfg.server.port = port;
        }
        if let Some((width, height)) = self.preview {
            cfg.server.preview_width = Some(width);
            cfg.server.preview_height = Some(height);
        }
        if let Some(age) = self.max_frame_age_ms {
            cfg.server.max_frame_age_ms = age;
        }
    }
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
    let width = w.parse().map_err(|_| format!("invalid width {w:?}"))?;
    let height = h.parse().map_err(|_| format!("invalid height {h:?}"))?;
    Ok((width, height))
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cfg = load_config(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    cli.apply(&mut cfg);

    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.server.log_level)),
        )
        .init();

    let server_config = cfg
        .server_config()
        .context("invalid server configuration")?;
    info!("Screenlink server starting on {}", server_config.bind);

    let (cmd_tx, cmd_rx) = command_queue();
    let (frame_tx, frame_rx) = frame_queue();
    let server = Server::new(
        server_config,
        cmd_rx,
        frame_tx,
        Arc::new(|reason: String| info!("client disconnected: {reason}")),
    );
    server.start().await.context("failed to start server")?;

    let shutdown = ShutdownSignal::new();

    // ── Frame consumer ────────────────────────────────────────────────────────
    let consumer = tokio::spawn(
        FrameConsumer::new(LoggingView, cfg.server.max_frame_age()).run(frame_rx, shutdown.clone()),
    );

    // ── Operator console ──────────────────────────────────────────────────────
    // Plain thread: a blocked stdin read must not hold up runtime shutdown.
    if !cli.no_console {
        let console_shutdown = shutdown.clone();
        std::thread::Builder::new()
            .name("operator-console".into())
            .spawn(move || {
                let stdin = std::io::stdin();
                let queued = run_console(stdin.lock(), &cmd_tx, &console_shutdown);
                info!("operator console closed after {queued} command(s)");
            })
            .context("failed to spawn operator console thread")?;
    }

    // ── Ctrl-C / SIGTERM handler ──────────────────────────────────────────────
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

    info!("Screenlink server ready.  Type commands, `quit` or Ctrl-C to exit.");
    shutdown.wait().await;

    server.stop("server shutting down").await;
    server.join().await;
    let stats = consumer.await.context("frame consumer task failed")?;
    info!(
        "Screenlink server stopped ({} frames shown, {} stale)",
        stats.shown, stats.dropped_stale
    );
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["screenlink-server"]);
        assert_eq!(cli.config, PathBuf::from("screenlink-server.toml"));
        assert!(cli.port.is_none());
        assert!(!cli.no_console);
    }

    #[test]
    fn test_cli_overrides_file_values() {
        // Arrange
        let cli = Cli::parse_from([
            "screenlink-server",
            "--port",
            "6100",
            "--bind",
            "127.0.0.1",
            "--preview",
            "320x180",
        ]);
        let mut cfg = AppConfig::default();

        // Act
        cli.apply(&mut cfg);

        // Assert
        assert_eq!(cfg.server.port, 6100);
        assert_eq!(cfg.server.bind_address, "127.0.0.1");
        assert_eq!(cfg.server.preview_size(), Some((320, 180)));
        assert_eq!(cfg.server.max_frame_age_ms, 500);
    }

    #[test]
    fn test_parse_size_rejects_garbage() {
        assert_eq!(parse_size("1920x1080"), Ok((1920, 1080)));
        assert!(parse_size("1920").is_err());
        assert!(parse_size("wide x tall").is_err());
    }
}

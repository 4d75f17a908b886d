//! LanSync node: entry point.
//!
//! Starts a passcode-gated HTTP file-exchange server on the LAN, keeps the
//! node registered with an optional rendezvous service, and drives a JSON
//! lines console on stdin/stdout.
//!
//! # Usage
//!
//! ```text
//! lansync-node [OPTIONS]
//!
//! Options:
//!   --config      <PATH>  Config file [default: platform config dir]
//!   --port        <PORT>  Transfer server port (0 = OS-assigned)
//!   --bind        <IP>    Bind address
//!   --tracker-url <URL>   Rendezvous WebSocket URL
//!   --public-url  <URL>   Public URL handed out by an external tunnel
//!   --static-dir  <DIR>   Browser client bundle
//!   --scratch-dir <DIR>   Where uploads are stored until saved
//!   --passcode    <CODE>  Fixed 4-digit passcode instead of a random one
//!   --headless            Do not read commands from stdin
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable             | Flag            |
//! |----------------------|-----------------|
//! | `LANSYNC_PORT`       | `--port`        |
//! | `LANSYNC_BIND`       | `--bind`        |
//! | `TRACKER_URL`        | `--tracker-url` |
//! | `LANSYNC_PUBLIC_URL` | `--public-url`  |
//! | `LANSYNC_PASSCODE`   | `--passcode`    |
//!
//! CLI flags and environment variables override the config file, which
//! overrides built-in defaults.
//!
//! # Architecture overview
//!
//! ```text
//! lansync-node
//!   application/     ServerContext, routes, API errors, UI commands
//!   infrastructure/
//!     http_server/     TransferServer (login, list, upload, download, static)
//!     tracker_sync/    Rendezvous WebSocket client with backoff
//!     presence_sweep/  Periodic eviction of silent clients
//!     ui_bridge/       stdin/stdout console
//! lansync-core       Pure domain state and wire codecs
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lansync_core::{AdapterPolicy, AuthState, Passcode};
use lansync_node::application::context::{ContextSettings, ServerContext};
use lansync_node::infrastructure::{
    http_server::HttpServer,
    network_identity::{resolve_local_address, run_address_refresh},
    presence_sweep::run_presence_sweep,
    storage::config::{
        load_config, load_config_from, save_config, save_config_to, ConfigError, NodeConfig,
    },
    tracker_sync::{run_tracker_sync, TrackerConfig},
    tunnel::{resolve_public_address, StaticTunnel},
    ui_bridge::{run_command_reader, run_snapshot_printer},
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// LanSync peer file-exchange node.
#[derive(Debug, Parser)]
#[command(
    name = "lansync-node",
    about = "Passcode-gated LAN file exchange with rendezvous peer sync",
    version
)]
struct Cli {
    /// Path to a TOML config file.  A missing file means "all defaults".
    #[arg(long)]
    config: Option<PathBuf>,

    /// Transfer server port.  `0` lets the OS choose.
    #[arg(long, env = "LANSYNC_PORT")]
    port: Option<u16>,

    /// IP address to bind the transfer server to.
    #[arg(long, env = "LANSYNC_BIND")]
    bind: Option<String>,

    /// WebSocket URL of the rendezvous service.
    #[arg(long, env = "TRACKER_URL")]
    tracker_url: Option<String>,

    /// Public URL of this node, when an external tunnel provides one.
    #[arg(long, env = "LANSYNC_PUBLIC_URL")]
    public_url: Option<String>,

    /// Directory with the browser client (index.html and assets).
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Directory where uploads wait until saved.
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// Fixed 4-digit passcode.
    #[arg(long, env = "LANSYNC_PASSCODE")]
    passcode: Option<String>,

    /// Print state to stdout but do not read commands from stdin.
    #[arg(long)]
    headless: bool,

    /// Write the merged configuration back to the config file before
    /// starting, so the overrides given here become the new defaults.
    #[arg(long)]
    save_config: bool,
}

impl Cli {
    /// Loads the config file and applies the command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// merged configuration fails validation.
    fn into_config(self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => match load_config() {
                Ok(config) => config,
                Err(ConfigError::NoPlatformConfigDir) => NodeConfig::default(),
                Err(e) => return Err(e).context("failed to load config"),
            },
        };

        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind) = self.bind {
            config.server.bind_address = bind;
        }
        if let Some(url) = self.tracker_url {
            config.rendezvous.url = Some(url);
        }
        if let Some(url) = self.public_url {
            config.rendezvous.public_url = Some(url);
        }
        if let Some(dir) = self.static_dir {
            config.server.static_dir = Some(dir);
        }
        if let Some(dir) = self.scratch_dir {
            config.server.scratch_dir = dir;
        }
        if let Some(code) = self.passcode {
            config.auth.fixed_passcode = Some(code);
        }

        config.validate().context("invalid configuration")?;
        bind_addr(&config)?;
        Ok(config)
    }
}

/// Writes `config` to `path`, or to the platform location when no path was
/// given on the command line.
fn persist_config(config: &NodeConfig, path: Option<&Path>) -> anyhow::Result<()> {
    match path {
        Some(path) => save_config_to(config, path)
            .with_context(|| format!("failed to save config to {}", path.display())),
        None => save_config(config).context("failed to save config"),
    }
}

fn bind_addr(config: &NodeConfig) -> anyhow::Result<SocketAddr> {
    let raw = format!("{}:{}", config.server.bind_address, config.server.port);
    raw.parse()
        .with_context(|| format!("invalid bind address: '{raw}'"))
}

fn context_settings(config: &NodeConfig) -> ContextSettings {
    ContextSettings {
        upload_requires_auth: config.server.upload_requires_auth,
        revoke_sessions_on_rotate: config.auth.revoke_sessions_on_rotate,
        scratch_dir: config.server.scratch_dir.clone(),
        static_dir: config.server.static_dir.clone(),
        max_upload_bytes: config.server.max_upload_bytes,
        stale_after: config.presence.stale_after(),
    }
}

fn tracker_config(config: &NodeConfig) -> Option<TrackerConfig> {
    let url = config.rendezvous.url.clone()?;
    let mut tracker = TrackerConfig::new(url, config.rendezvous.node_name.clone());
    tracker.backoff_base = Duration::from_millis(config.rendezvous.backoff_base_ms);
    tracker.backoff_max = Duration::from_secs(config.rendezvous.backoff_max_secs);
    Some(tracker)
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// # What happens at startup
///
/// 1. CLI and config file are merged into a [`NodeConfig`].
/// 2. `tracing_subscriber` is initialised; `RUST_LOG` wins over the config.
/// 3. The LAN address is resolved and the passcode chosen.
/// 4. The transfer server binds; the actual port goes into the context.
/// 5. Background tasks start: presence sweep, address refresh, tracker sync
///    (if configured), snapshot printer, and the stdin command reader
///    (unless `--headless`).
/// 6. The accept loop runs until Ctrl+C or the `quit` command.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let headless = cli.headless;
    let save_requested = cli.save_config;
    let config_path = cli.config.clone();
    let config = cli.into_config()?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // Logs go to stderr so stdout carries only console JSON lines.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    if save_requested {
        persist_config(&config, config_path.as_deref())?;
        info!("configuration saved");
    }

    // ── Node state ────────────────────────────────────────────────────────────
    let policy = AdapterPolicy::new(&config.network.adapter_denylist);
    let local_address = resolve_local_address(&policy);

    let auth = match &config.auth.fixed_passcode {
        Some(code) => AuthState::with_passcode(Passcode::parse(code).context("invalid passcode")?),
        None => AuthState::new(),
    }
    .with_session_limit(config.auth.max_sessions);
    let ctx = ServerContext::new(context_settings(&config), auth, local_address.clone());

    let server = HttpServer::bind(bind_addr(&config)?, Arc::clone(&ctx)).await?;
    let port = server.local_addr()?.port();

    let tunnel = StaticTunnel::new(config.rendezvous.public_url.clone());
    let public_address = resolve_public_address(&tunnel, port).await;
    ctx.set_public_address(public_address).await;

    info!("LanSync node ready on http://{local_address}:{port}");

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Background tasks ──────────────────────────────────────────────────────
    tokio::spawn(run_presence_sweep(
        Arc::clone(&ctx),
        config.presence.sweep_interval(),
        Arc::clone(&running),
    ));

    tokio::spawn(run_address_refresh(
        Arc::clone(&ctx),
        move || resolve_local_address(&policy),
        config.network.address_refresh(),
        Arc::clone(&running),
    ));

    match tracker_config(&config) {
        Some(tracker) => {
            tokio::spawn(run_tracker_sync(
                Arc::clone(&ctx),
                tracker,
                Arc::clone(&running),
            ));
        }
        None => info!("no rendezvous URL configured; tracker sync disabled"),
    }

    tokio::spawn(run_snapshot_printer(Arc::clone(&ctx), Arc::clone(&running)));
    if !headless {
        tokio::spawn(run_command_reader(Arc::clone(&ctx), Arc::clone(&running)));
    }

    // ── Main server loop ──────────────────────────────────────────────────────
    server.run(running).await?;

    info!("LanSync node stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_config() -> String {
        std::env::temp_dir()
            .join(format!("lansync-missing-{}.toml", uuid::Uuid::new_v4()))
            .display()
            .to_string()
    }

    #[test]
    fn test_cli_defaults_leave_everything_unset() {
        let cli = Cli::parse_from(["lansync-node"]);
        assert_eq!(cli.config, None);
        assert!(!cli.headless);
        assert_eq!(cli.static_dir, None);
    }

    #[test]
    fn test_cli_port_override() {
        let cli = Cli::parse_from(["lansync-node", "--port", "8080"]);
        assert_eq!(cli.port, Some(8080));
    }

    #[test]
    fn test_into_config_missing_file_yields_defaults() {
        // Arrange
        let path = missing_config();
        let cli = Cli::parse_from(["lansync-node", "--config", path.as_str()]);

        // Act
        let config = cli.into_config().unwrap();

        // Assert
        assert_eq!(config.server.port, 5000);
        assert!(config.server.upload_requires_auth);
        assert_eq!(config.rendezvous.url, None);
    }

    #[test]
    fn test_into_config_applies_overrides() {
        let path = missing_config();
        let cli = Cli::parse_from([
            "lansync-node",
            "--config",
            path.as_str(),
            "--port",
            "0",
            "--bind",
            "127.0.0.1",
            "--tracker-url",
            "ws://tracker.local:9000/ws",
            "--passcode",
            "0042",
        ]);

        let config = cli.into_config().unwrap();

        assert_eq!(bind_addr(&config).unwrap().to_string(), "127.0.0.1:0");
        assert_eq!(
            config.rendezvous.url.as_deref(),
            Some("ws://tracker.local:9000/ws")
        );
        assert_eq!(config.auth.fixed_passcode.as_deref(), Some("0042"));
    }

    #[test]
    fn test_into_config_rejects_bad_passcode() {
        let path = missing_config();
        let cli = Cli::parse_from(["lansync-node", "--config", path.as_str(), "--passcode", "12a4"]);
        assert!(cli.into_config().is_err());
    }

    #[test]
    fn test_into_config_rejects_bad_bind_address() {
        let path = missing_config();
        let cli = Cli::parse_from(["lansync-node", "--config", path.as_str(), "--bind", "not.an.ip"]);
        assert!(cli.into_config().is_err());
    }

    #[test]
    fn test_tracker_config_only_when_url_set() {
        let mut config = NodeConfig::default();
        assert!(tracker_config(&config).is_none());

        config.rendezvous.url = Some("ws://127.0.0.1:9000".into());
        config.rendezvous.backoff_base_ms = 250;
        let tracker = tracker_config(&config).unwrap();

        assert_eq!(tracker.backoff_base, Duration::from_millis(250));
        assert_eq!(tracker.url, "ws://127.0.0.1:9000");
    }

    #[test]
    fn test_context_settings_follow_config() {
        let mut config = NodeConfig::default();
        config.server.upload_requires_auth = false;
        config.server.max_upload_bytes = Some(1024);

        let settings = context_settings(&config);

        assert!(!settings.upload_requires_auth);
        assert_eq!(settings.max_upload_bytes, Some(1024));
        assert_eq!(settings.stale_after, Duration::from_secs(10));
    }

    #[test]
    fn test_save_config_persists_overrides_to_given_path() {
        // Arrange
        let path = missing_config();
        let cli = Cli::parse_from([
            "lansync-node",
            "--config",
            path.as_str(),
            "--port",
            "6123",
            "--save-config",
        ]);
        assert!(cli.save_config);
        let config = cli.into_config().unwrap();

        // Act
        persist_config(&config, Some(Path::new(&path))).unwrap();

        // Assert
        let reloaded = load_config_from(Path::new(&path)).unwrap();
        assert_eq!(reloaded.server.port, 6123);
        std::fs::remove_file(&path).ok();
    }
}

//! Rendezvous client: keeps this node registered with the tracker and caches
//! the peer table it pushes back.
//!
//! # State machine
//!
//! ```text
//!            ┌──────────── backoff sleep ◄───────────┐
//!            ▼                                       │
//!  Disconnected ──► Connecting{attempt} ──► Connected ──(error/close)──┘
//! ```
//!
//! Every transition is written to the [`ServerContext`] as a
//! [`TrackerStatus`], which is the degraded-mode indicator the UI shows.
//! Local transfers never depend on this task; when the tracker is down the
//! node simply has no public peer list.
//!
//! While connected the task multiplexes three things with `tokio::select!`:
//!
//! 1. Inbound frames.  A `peer-update` replaces the cached table wholesale.
//! 2. Snapshot changes.  When the shared names (or our address/port) change,
//!    a fresh `register` frame is sent.
//! 3. A 200 ms tick that checks the shutdown flag.
//!
//! Reconnects use bounded exponential backoff ([`Backoff`]).  The delay
//! starts over only after a session proves stable, so a service that accepts
//! and immediately drops connections is redialled ever more slowly.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use thiserror::Error;
use tokio::time::{interval, sleep, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use lansync_core::{InboundMessage, OutboundMessage, StateSnapshot, TrackerStatus};

use crate::application::context::ServerContext;

const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

// ── Backoff ───────────────────────────────────────────────────────────────────

/// Exponential backoff: `base * 2^attempt`, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    /// Delay before the next attempt; advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u32 << self.attempt.min(16);
        let delay = self.base.saturating_mul(factor).min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Called after a successful connect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of consecutive failures so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

// ── Config & errors ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// `ws://` or `wss://` URL of the rendezvous service.
    pub url: String,
    /// Fresh per process; identifies this node in the peer table.
    pub node_id: Uuid,
    pub node_name: String,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub connect_timeout: Duration,
}

impl TrackerConfig {
    pub fn new(url: impl Into<String>, node_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            node_id: Uuid::new_v4(),
            node_name: node_name.into(),
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Why the rendezvous channel is unavailable.  Never fatal to the node.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("timed out connecting to {url}")]
    ConnectTimeout { url: String },

    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    #[error("could not encode register frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("rendezvous service closed the connection")]
    Closed,
}

// ── Task ──────────────────────────────────────────────────────────────────────

/// Runs until `running` is cleared, reconnecting with backoff on failure.
pub async fn run_tracker_sync(
    ctx: Arc<ServerContext>,
    config: TrackerConfig,
    running: Arc<AtomicBool>,
) {
    let mut backoff = Backoff::new(config.backoff_base, config.backoff_max);
    info!(url = %config.url, node_id = %config.node_id, "tracker sync started");

    while running.load(Ordering::Relaxed) {
        ctx.set_tracker_status(TrackerStatus::Connecting {
            attempt: backoff.attempt() + 1,
        })
        .await;

        match run_session(&ctx, &config, &running, &mut backoff).await {
            Ok(()) => break,
            Err(e) => {
                warn!("rendezvous unavailable: {e}");
                ctx.set_tracker_status(TrackerStatus::Disconnected {
                    reason: e.to_string(),
                })
                .await;
            }
        }

        let delay = backoff.next_delay();
        debug!("reconnecting to rendezvous in {delay:?}");
        sleep_while_running(delay, &running).await;
    }

    info!("tracker sync stopped");
}

/// One connection's lifetime.  `Ok` means an orderly shutdown.
async fn run_session(
    ctx: &ServerContext,
    config: &TrackerConfig,
    running: &AtomicBool,
    backoff: &mut Backoff,
) -> Result<(), TrackerError> {
    let (ws, _response) = timeout(config.connect_timeout, connect_async(config.url.as_str()))
        .await
        .map_err(|_| TrackerError::ConnectTimeout {
            url: config.url.clone(),
        })??;
    // The backoff restarts only once the service has proven it keeps the
    // connection: a first inbound frame, or `backoff_max` of uptime.
    let connected_at = Instant::now();
    let mut stable = false;

    let (mut tx, mut rx) = ws.split();
    let mut snapshots = ctx.subscribe();
    let mut announced = register_frame(config, &snapshots.borrow_and_update());
    send_register(&mut tx, &announced).await?;
    ctx.set_tracker_status(TrackerStatus::Connected).await;
    info!(url = %config.url, "registered with rendezvous service");

    let mut tick = interval(SHUTDOWN_POLL);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = rx.next() => match frame {
                Some(Ok(WsMessage::Close(_))) | None => return Err(TrackerError::Closed),
                Some(Ok(message)) => {
                    if !stable {
                        stable = true;
                        backoff.reset();
                    }
                    // Pings are answered by tungstenite itself.
                    if let WsMessage::Text(text) = message {
                        apply_inbound(ctx, &text).await;
                    }
                }
                Some(Err(e)) => return Err(e.into()),
            },
            changed = snapshots.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let next = register_frame(config, &snapshots.borrow_and_update());
                if next != announced {
                    send_register(&mut tx, &next).await?;
                    announced = next;
                    debug!("re-announced to rendezvous service");
                }
            },
            _ = tick.tick() => {
                if !running.load(Ordering::Relaxed) {
                    let _ = tx.send(WsMessage::Close(None)).await;
                    return Ok(());
                }
                if !stable && connected_at.elapsed() >= config.backoff_max {
                    stable = true;
                    backoff.reset();
                }
            },
        }
    }
}

fn register_frame(config: &TrackerConfig, snapshot: &StateSnapshot) -> OutboundMessage {
    OutboundMessage::Register {
        id: config.node_id.to_string(),
        name: config.node_name.clone(),
        ip: snapshot.local_address.clone(),
        port: snapshot.port,
        files: snapshot.shared_names.clone(),
    }
}

async fn send_register<S>(sink: &mut S, frame: &OutboundMessage) -> Result<(), TrackerError>
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    let json = frame.to_json()?;
    sink.send(WsMessage::Text(json)).await?;
    Ok(())
}

async fn apply_inbound(ctx: &ServerContext, text: &str) {
    match InboundMessage::from_json(text) {
        Ok(InboundMessage::PeerUpdate { peers }) => {
            debug!(count = peers.len(), "peer table update");
            ctx.replace_peers(peers).await;
        }
        Ok(InboundMessage::Unknown) => debug!("ignoring unknown rendezvous frame"),
        Err(e) => warn!("undecodable rendezvous frame: {e}"),
    }
}

async fn sleep_while_running(total: Duration, running: &AtomicBool) {
    let deadline = Instant::now() + total;
    while running.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        sleep((deadline - now).min(SHUTDOWN_POLL)).await;
    }
}

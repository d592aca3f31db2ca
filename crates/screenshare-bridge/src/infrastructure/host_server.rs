//! Host-facing WebSocket server: accept loop and per-session event loop.
//!
//! The native host connects over a local WebSocket and exchanges JSON text
//! frames with the bridge.  Each connection gets:
//!
//! 1. Its own [`ScreenshareSignalingBridge`] (one screen share per host).
//! 2. A writer task draining the bridge's host-bound messages into the socket.
//! 3. An event loop that `select!`s over host frames, signaling channel
//!    deliveries and the bridge's pending timer, feeding each into the bridge
//!    in arrival order.
//!
//! When the host disconnects the bridge is torn down, closing any open
//! signaling channel.
//!
//! Shutdown is driven by the shared `running` flag set from the Ctrl+C
//! handler in `main.rs`.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::{HostTransport, ScreenshareSignalingBridge, TransportError};
use crate::domain::config::BridgeConfig;
use crate::infrastructure::failure_log::TracingFailureSink;
use crate::infrastructure::signal_conn::WsSignalConnector;

const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.host_bind_addr` and serves host connections until `running`
/// is cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn run_server(config: BridgeConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.host_bind_addr)
        .await
        .with_context(|| {
            format!(
                "failed to bind host WebSocket listener on {}",
                config.host_bind_addr
            )
        })?;

    info!("screenshare bridge listening on {}", config.host_bind_addr);
    serve(listener, Arc::new(config), running).await
}

/// Accept loop over an already-bound listener.
///
/// Each accepted connection is handled on its own task so one slow host never
/// blocks another.
pub async fn serve(
    listener: TcpListener,
    config: Arc<BridgeConfig>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Bounded wait so the `running` flag is re-checked regularly.
        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                info!("new host connection from {peer_addr}");
                let cfg = Arc::clone(&config);
                tokio::spawn(async move {
                    handle_host_session(stream, peer_addr, cfg).await;
                });
            }
            Ok(Err(e)) => {
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Host transport ────────────────────────────────────────────────────────────

/// [`HostTransport`] feeding the session's writer task.
struct ChannelHostTransport {
    tx: mpsc::UnboundedSender<String>,
}

impl HostTransport for ChannelHostTransport {
    fn post_message(&self, json: String) -> Result<(), TransportError> {
        self.tx.send(json).map_err(|_| TransportError::Closed)
    }
}

// ── Per-session handler ───────────────────────────────────────────────────────

async fn handle_host_session(stream: TcpStream, peer_addr: SocketAddr, config: Arc<BridgeConfig>) {
    let session_id = Uuid::new_v4();
    match run_session(stream, peer_addr, session_id, config).await {
        Ok(()) => info!("session {session_id} ({peer_addr}) closed normally"),
        Err(e) => warn!("session {session_id} ({peer_addr}) closed with error: {e:#}"),
    }
}

async fn run_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    session_id: Uuid,
    config: Arc<BridgeConfig>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(raw_stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;
    info!("session {session_id}: host connected from {peer_addr}");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // ── Writer task: bridge → host ─────────────────────────────────────────────
    let (host_tx, mut host_rx) = mpsc::unbounded_channel::<String>();
    let mut writer_task = tokio::spawn(async move {
        while let Some(json) = host_rx.recv().await {
            if let Err(e) = ws_tx.send(WsMessage::Text(json)).await {
                debug!("session {session_id}: host send failed: {e}");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    // ── Bridge wiring ──────────────────────────────────────────────────────────
    let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();
    let mut bridge = ScreenshareSignalingBridge::new(
        Arc::clone(&config),
        Arc::new(WsSignalConnector::new(signal_tx, config.ping_interval)),
        Arc::new(ChannelHostTransport { tx: host_tx }),
        Arc::new(TracingFailureSink::new(session_id)),
    );

    if config.request_share_on_connect {
        bridge.request_share();
    }

    // ── Event loop ─────────────────────────────────────────────────────────────
    loop {
        let deadline = bridge.next_deadline();
        let timer = async move {
            match deadline {
                Some(at) => sleep_until(Instant::from_std(at)).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            frame = ws_rx.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => bridge.handle_host_command(&text),
                Some(Ok(WsMessage::Close(_))) | None => {
                    debug!("session {session_id}: host closed the connection");
                    break;
                }
                Some(Ok(WsMessage::Binary(data))) => {
                    warn!(
                        "session {session_id}: unexpected binary frame ({} bytes, ignored)",
                        data.len()
                    );
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                    debug!("session {session_id}: host WebSocket closed");
                    break;
                }
                Some(Err(e)) => {
                    warn!("session {session_id}: host WebSocket error: {e}");
                    break;
                }
            },

            Some(delivery) = signal_rx.recv() => {
                bridge.handle_signal_delivery(delivery, std::time::Instant::now());
            }

            _ = timer => bridge.on_timer(std::time::Instant::now()),

            _ = &mut writer_task => {
                debug!("session {session_id}: host writer ended");
                break;
            }
        }
    }

    bridge.teardown();
    writer_task.abort();
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

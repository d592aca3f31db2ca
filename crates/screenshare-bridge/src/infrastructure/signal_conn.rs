//! WebSocket connection to the media-signaling server.
//!
//! [`WsSignalConnector::connect`] returns immediately with a
//! [`WsSignalChannel`] handle; the actual connection is driven by a
//! background task:
//!
//! ```text
//! bridge ──send()──▶ outbound queue ──▶ [channel task] ──Text──▶ server
//! bridge ◀── SignalDelivery{id, ..} ◀── [channel task] ◀──Text── server
//! ```
//!
//! Messages sent while the socket is still opening wait in the queue and are
//! written, in order, once the handshake completes.  The task also sends a
//! WebSocket ping every `ping_interval` so idle proxies keep the connection
//! open while the media flows elsewhere.
//!
//! A connection that fails to open is reported as
//! [`SignalInbound::Failed`] with `SIGNALLING_TRANSPORT_CONNECTION_FAILED`; a
//! socket that breaks later is reported with
//! `SIGNALLING_TRANSPORT_DISCONNECTED`; a clean server close is
//! [`SignalInbound::Closed`].  Nothing is reported after
//! [`SignalChannel::disconnect`].

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, info, warn};

use crate::application::{
    ChannelError, ChannelId, SignalChannel, SignalConnector, SignalDelivery, SignalInbound,
};
use crate::domain::errors::{ErrorReport, ScreenshareErrorCode};

// ── Connector ─────────────────────────────────────────────────────────────────

/// Opens signaling channels whose traffic is delivered to one session queue.
///
/// Must be used from within a Tokio runtime: every `connect` spawns a task.
pub struct WsSignalConnector {
    deliveries: mpsc::UnboundedSender<SignalDelivery>,
    ping_interval: Duration,
}

impl WsSignalConnector {
    pub fn new(deliveries: mpsc::UnboundedSender<SignalDelivery>, ping_interval: Duration) -> Self {
        Self {
            deliveries,
            ping_interval,
        }
    }
}

impl SignalConnector for WsSignalConnector {
    fn connect(&self, id: ChannelId, endpoint: &str) -> Box<dyn SignalChannel> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        tokio::spawn(run_channel(
            id,
            endpoint.to_string(),
            outbound_rx,
            stop_rx,
            self.deliveries.clone(),
            self.ping_interval,
        ));

        Box::new(WsSignalChannel {
            id,
            outbound: outbound_tx,
            stop: Some(stop_tx),
        })
    }
}

// ── Channel handle ────────────────────────────────────────────────────────────

/// Handle to one channel task. Dropping it has the same effect as
/// [`disconnect`](SignalChannel::disconnect).
pub struct WsSignalChannel {
    id: ChannelId,
    outbound: mpsc::UnboundedSender<String>,
    stop: Option<oneshot::Sender<()>>,
}

impl SignalChannel for WsSignalChannel {
    fn send(&self, message: String) -> Result<(), ChannelError> {
        if self.stop.is_none() {
            return Err(ChannelError::Closed(self.id));
        }
        self.outbound
            .send(message)
            .map_err(|_| ChannelError::Closed(self.id))
    }

    fn disconnect(&mut self) {
        if let Some(stop) = self.stop.take() {
            // The task may already be gone; nothing to do then.
            let _ = stop.send(());
        }
    }
}

// ── Channel task ──────────────────────────────────────────────────────────────

async fn run_channel(
    id: ChannelId,
    endpoint: String,
    mut outbound: mpsc::UnboundedReceiver<String>,
    mut stop: oneshot::Receiver<()>,
    deliveries: mpsc::UnboundedSender<SignalDelivery>,
    ping_interval: Duration,
) {
    let report = |inbound: SignalInbound| {
        // Receiver gone means the session is over.
        let _ = deliveries.send(SignalDelivery {
            channel: id,
            inbound,
        });
    };

    let connected = tokio::select! {
        biased;
        _ = &mut stop => {
            debug!("channel {id}: disconnected before open");
            return;
        }
        result = connect_async(endpoint.as_str()) => result,
    };

    let ws_stream = match connected {
        Ok((ws_stream, _response)) => ws_stream,
        Err(e) => {
            warn!("channel {id}: connection failed: {e}");
            report(SignalInbound::Failed(ErrorReport::new(
                ScreenshareErrorCode::SignallingTransportConnectionFailed.code(),
                e.to_string(),
            )));
            return;
        }
    };
    info!("channel {id}: open");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let mut ticker = interval(ping_interval);
    ticker.tick().await; // First tick completes immediately.

    loop {
        tokio::select! {
            biased;

            _ = &mut stop => {
                let _ = ws_tx.send(WsMessage::Close(None)).await;
                debug!("channel {id}: closed on request");
                return;
            }

            queued = outbound.recv() => {
                let Some(text) = queued else {
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    debug!("channel {id}: handle dropped");
                    return;
                };
                if let Err(e) = ws_tx.send(WsMessage::Text(text)).await {
                    warn!("channel {id}: send failed: {e}");
                    report(SignalInbound::Failed(disconnected(e.to_string())));
                    return;
                }
            }

            frame = ws_rx.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => report(SignalInbound::Message(text)),
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!("channel {id}: closed by server");
                    report(SignalInbound::Closed);
                    return;
                }
                Some(Ok(WsMessage::Binary(data))) => {
                    debug!("channel {id}: ignoring binary frame ({} bytes)", data.len());
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                    debug!("channel {id}: connection closed");
                    report(SignalInbound::Closed);
                    return;
                }
                Some(Err(e)) => {
                    warn!("channel {id}: socket error: {e}");
                    report(SignalInbound::Failed(disconnected(e.to_string())));
                    return;
                }
            },

            _ = ticker.tick() => {
                if let Err(e) = ws_tx.send(WsMessage::Ping(Vec::new())).await {
                    debug!("channel {id}: keepalive ping failed: {e}");
                    report(SignalInbound::Failed(disconnected(e.to_string())));
                    return;
                }
            }
        }
    }
}

fn disconnected(reason: String) -> ErrorReport {
    ErrorReport::new(
        ScreenshareErrorCode::SignallingTransportDisconnected.code(),
        reason,
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

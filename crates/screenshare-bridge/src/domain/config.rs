//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is built from defaults, then an optional TOML file, then CLI flags (see
//! `main.rs`), and finally wrapped in an `Arc` shared by every host session.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Identity of the local participant, forwarded to the host in the share
/// request and used to authenticate against the signaling server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredentials {
    /// Internal user id of the presenter (`callerName` on the wire).
    pub caller_name: String,
    /// Internal meeting id.
    pub meeting_id: String,
    /// Session token appended to the signaling endpoint.
    pub session_token: String,
    /// Conference voice bridge number.
    pub voice_bridge: String,
    /// Display name of the presenter.
    pub user_name: String,
}

/// A single STUN/TURN server advertised to the native capture pipeline.
///
/// Serialized as `{"urls": "..."}`, the shape `RTCIceServer` expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: String,
}

impl IceServer {
    pub fn new(urls: impl Into<String>) -> Self {
        Self { urls: urls.into() }
    }
}

/// All runtime configuration for the screen-share bridge.
///
/// # Example
///
/// ```rust
/// use screenshare_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.host_bind_addr.port(), 24810);
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Address the host-facing WebSocket server binds to.
    ///
    /// Defaults to loopback: the native host and the bridge normally share a
    /// device.
    pub host_bind_addr: SocketAddr,

    /// Base WebSocket URL of the media-signaling server, without the session
    /// token query parameter.
    pub signaling_url: String,

    /// Presenter identity and session token.
    pub credentials: SessionCredentials,

    /// ICE servers listed in the share request sent to the host.
    pub ice_servers: Vec<IceServer>,

    /// Delay between the server's `playStart` and clearing the loading flag.
    pub playback_settle_delay: Duration,

    /// Interval between WebSocket-level pings on the signaling channel.
    pub ping_interval: Duration,

    /// When `true`, the share request is posted as soon as a host connects.
    pub request_share_on_connect: bool,
}

impl BridgeConfig {
    /// Builds the signaling endpoint for `session_token`.
    ///
    /// The token is URL-encoded and appended as the `sessionToken` query
    /// parameter, joined with `&` when the base URL already carries a query.
    ///
    /// ```rust
    /// use screenshare_bridge::domain::BridgeConfig;
    ///
    /// let cfg = BridgeConfig {
    ///     signaling_url: "wss://sfu.example/ws".to_string(),
    ///     ..BridgeConfig::default()
    /// };
    /// assert_eq!(cfg.signaling_endpoint("a b"), "wss://sfu.example/ws?sessionToken=a%20b");
    /// ```
    pub fn signaling_endpoint(&self, session_token: &str) -> String {
        let separator = if self.signaling_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}sessionToken={}",
            self.signaling_url,
            separator,
            urlencoding::encode(session_token)
        )
    }
}

impl Default for BridgeConfig {
    /// | Field                    | Default                           |
    /// |--------------------------|-----------------------------------|
    /// | host_bind_addr           | `127.0.0.1:24810`                 |
    /// | signaling_url            | `wss://localhost/bbb-webrtc-sfu`  |
    /// | ice_servers              | Google STUN + `72.52.251.119`     |
    /// | playback_settle_delay    | 1 second                          |
    /// | ping_interval            | 15 seconds                        |
    /// | request_share_on_connect | `false`                           |
    fn default() -> Self {
        Self {
            host_bind_addr: SocketAddr::from(([127, 0, 0, 1], 24810)),
            signaling_url: "wss://localhost/bbb-webrtc-sfu".to_string(),
            credentials: SessionCredentials::default(),
            ice_servers: vec![
                IceServer::new("stun:stun.l.google.com:19302"),
                IceServer::new("stun:72.52.251.119:3478"),
            ],
            playback_settle_delay: Duration::from_millis(1000),
            ping_interval: Duration::from_secs(15),
            request_share_on_connect: false,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

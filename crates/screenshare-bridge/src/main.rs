//! Screen-share signaling bridge: entry point.
//!
//! Listens for the native host's WebSocket connection and relays the
//! screen-share negotiation between it and the media-signaling server.
//!
//! # Usage
//!
//! ```text
//! screenshare-bridge [OPTIONS]
//!
//! Options:
//!   --config <PATH>              TOML config file
//!   --bind <ADDR>                Host listener address [default: 127.0.0.1:24810]
//!   --signaling-url <URL>        Signaling WebSocket URL
//!   --session-token <TOKEN>      Session token appended to the signaling URL
//!   --caller-name <ID>           Presenter's internal user id
//!   --meeting-id <ID>            Internal meeting id
//!   --voice-bridge <NUM>         Conference voice bridge
//!   --user-name <NAME>           Presenter display name
//!   --ice-server <URL>           STUN/TURN server (repeatable)
//!   --playback-settle-ms <MS>    Delay before clearing the loading flag [default: 1000]
//!   --ping-interval <SECS>       Signaling keepalive interval [default: 15]
//!   --request-share-on-connect   Ask the host to start capture when it connects
//! ```
//!
//! # Configuration precedence
//!
//! Built-in defaults, then the `--config` file, then flags. Every flag can
//! also be set through the `SS_*` environment variable shown in `--help`.
//!
//! | Variable              | Flag                |
//! |-----------------------|---------------------|
//! | `SS_CONFIG`           | `--config`          |
//! | `SS_BIND`             | `--bind`            |
//! | `SS_SIGNALING_URL`    | `--signaling-url`   |
//! | `SS_SESSION_TOKEN`    | `--session-token`   |
//! | `SS_ICE_SERVERS`      | `--ice-server` (comma separated) |
//! | `SS_PING_INTERVAL`    | `--ping-interval`   |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use screenshare_bridge::domain::{BridgeConfig, IceServer};
use screenshare_bridge::infrastructure::config_file::{validate, FileConfig};
use screenshare_bridge::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Screen-share signaling bridge.
///
/// Unset options fall back to the config file, then to built-in defaults.
#[derive(Debug, Default, Parser)]
#[command(
    name = "screenshare-bridge",
    about = "Signaling bridge between a native screen-capture host and a media server",
    version
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, env = "SS_CONFIG")]
    config: Option<PathBuf>,

    /// Address the host-facing WebSocket server binds to (`ip:port`).
    #[arg(long, env = "SS_BIND")]
    bind: Option<String>,

    /// Base WebSocket URL of the media-signaling server.
    #[arg(long, env = "SS_SIGNALING_URL")]
    signaling_url: Option<String>,

    /// Session token used to authenticate the signaling channel.
    #[arg(long, env = "SS_SESSION_TOKEN")]
    session_token: Option<String>,

    #[arg(long, env = "SS_CALLER_NAME")]
    caller_name: Option<String>,

    #[arg(long, env = "SS_MEETING_ID")]
    meeting_id: Option<String>,

    #[arg(long, env = "SS_VOICE_BRIDGE")]
    voice_bridge: Option<String>,

    #[arg(long, env = "SS_USER_NAME")]
    user_name: Option<String>,

    /// STUN/TURN server URL; repeat to list several. Replaces the defaults.
    #[arg(long = "ice-server", env = "SS_ICE_SERVERS", value_delimiter = ',')]
    ice_servers: Vec<String>,

    /// Milliseconds between the server's `playStart` and clearing the
    /// loading flag.
    #[arg(long, env = "SS_PLAYBACK_SETTLE_MS")]
    playback_settle_ms: Option<u64>,

    /// Seconds between keepalive pings on the signaling channel.
    #[arg(long, env = "SS_PING_INTERVAL")]
    ping_interval: Option<u64>,

    /// Post the share request to the host as soon as it connects.
    #[arg(long, env = "SS_REQUEST_SHARE_ON_CONNECT")]
    request_share_on_connect: bool,
}

impl Cli {
    /// Layers defaults, the config file and the CLI arguments into a
    /// [`BridgeConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded, `--bind` is not a
    /// socket address, or the merged configuration fails validation.
    fn into_bridge_config(self) -> anyhow::Result<BridgeConfig> {
        let mut config = BridgeConfig::default();

        if let Some(path) = &self.config {
            FileConfig::load(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?
                .apply(&mut config);
        }

        if let Some(bind) = &self.bind {
            config.host_bind_addr = bind
                .parse::<SocketAddr>()
                .with_context(|| format!("invalid bind address: '{bind}'"))?;
        }
        if let Some(url) = self.signaling_url {
            config.signaling_url = url;
        }

        let creds = &mut config.credentials;
        for (value, slot) in [
            (self.session_token, &mut creds.session_token),
            (self.caller_name, &mut creds.caller_name),
            (self.meeting_id, &mut creds.meeting_id),
            (self.voice_bridge, &mut creds.voice_bridge),
            (self.user_name, &mut creds.user_name),
        ] {
            if let Some(value) = value {
                *slot = value;
            }
        }

        if !self.ice_servers.is_empty() {
            config.ice_servers = self.ice_servers.into_iter().map(IceServer::new).collect();
        }
        if let Some(ms) = self.playback_settle_ms {
            config.playback_settle_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = self.ping_interval {
            config.ping_interval = Duration::from_secs(secs);
        }
        if self.request_share_on_connect {
            config.request_share_on_connect = true;
        }

        validate(&config)?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `RUST_LOG` wins; otherwise `info`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Needed before the first wss:// connection.
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }

    let config = Cli::parse().into_bridge_config()?;

    info!(
        "screenshare bridge starting: host={}, signaling={}",
        config.host_bind_addr, config.signaling_url
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    // The accept loop polls `running` every 200 ms.
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

    run_server(config, running).await?;

    info!("screenshare bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

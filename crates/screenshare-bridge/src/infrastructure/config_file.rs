//! Optional TOML configuration file.
//!
//! Every field is optional; whatever is present overrides the built-in
//! defaults, and CLI flags override the file in turn (see `main.rs`).
//!
//! ```toml
//! [signaling]
//! url = "wss://meet.example.com/bbb-webrtc-sfu"
//! ping_interval_secs = 15
//!
//! [session]
//! caller_name = "w_abc123"
//! meeting_id = "183f0bf3a0982a127bdb8161e0c44eb696b3e75c-1531240585189"
//! session_token = "zx9yq3"
//! voice_bridge = "72013"
//! user_name = "Presenter"
//!
//! [bridge]
//! bind_addr = "127.0.0.1:24810"
//! playback_settle_delay_ms = 1000
//! request_share_on_connect = false
//! ice_servers = ["stun:stun.l.google.com:19302"]
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::config::{BridgeConfig, IceServer};

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The merged configuration is unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── File schema ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub signaling: SignalingSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub bridge: BridgeSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignalingSection {
    pub url: Option<String>,
    pub ping_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionSection {
    pub caller_name: Option<String>,
    pub meeting_id: Option<String>,
    pub session_token: Option<String>,
    pub voice_bridge: Option<String>,
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeSection {
    pub bind_addr: Option<SocketAddr>,
    pub playback_settle_delay_ms: Option<u64>,
    pub request_share_on_connect: Option<bool>,
    pub ice_servers: Option<Vec<String>>,
}

impl FileConfig {
    /// Reads and parses `path`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read (including when it does
    /// not exist: an explicitly named file is required), [`ConfigError::Parse`]
    /// if it is not valid TOML for this schema.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Overwrites the fields of `config` that this file sets.
    pub fn apply(self, config: &mut BridgeConfig) {
        let FileConfig {
            signaling,
            session,
            bridge,
        } = self;

        if let Some(url) = signaling.url {
            config.signaling_url = url;
        }
        if let Some(secs) = signaling.ping_interval_secs {
            config.ping_interval = Duration::from_secs(secs);
        }

        let creds = &mut config.credentials;
        let overrides = [
            (session.caller_name, &mut creds.caller_name),
            (session.meeting_id, &mut creds.meeting_id),
            (session.session_token, &mut creds.session_token),
            (session.voice_bridge, &mut creds.voice_bridge),
            (session.user_name, &mut creds.user_name),
        ];
        for (value, slot) in overrides {
            if let Some(value) = value {
                *slot = value;
            }
        }

        if let Some(addr) = bridge.bind_addr {
            config.host_bind_addr = addr;
        }
        if let Some(ms) = bridge.playback_settle_delay_ms {
            config.playback_settle_delay = Duration::from_millis(ms);
        }
        if let Some(flag) = bridge.request_share_on_connect {
            config.request_share_on_connect = flag;
        }
        if let Some(urls) = bridge.ice_servers {
            config.ice_servers = urls.into_iter().map(IceServer::new).collect();
        }
    }
}

/// Checks a fully merged configuration.
///
/// # Errors
///
/// [`ConfigError::Invalid`] when the signaling URL is not a WebSocket URL or
/// the ping interval is zero.
pub fn validate(config: &BridgeConfig) -> Result<(), ConfigError> {
    let url = config.signaling_url.as_str();
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        return Err(ConfigError::Invalid(format!(
            "signaling url must start with ws:// or wss://, got `{url}`"
        )));
    }
    if config.ping_interval.is_zero() {
        return Err(ConfigError::Invalid(
            "ping interval must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! screenshare-bridge library crate.
//!
//! Relays a screen-share negotiation between a native screen-capture host and
//! a WebRTC media-signaling server.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Native host (JSON {"key": ...} over local WebSocket)
//!         ↕
//! [screenshare-bridge]
//!   ├── domain/           Config, wire messages, error codes and categories
//!   ├── application/      ScreenshareSignalingBridge + collaborator traits
//!   └── infrastructure/
//!         ├── host_server/  Host accept loop and session event loop
//!         ├── signal_conn/  Signaling WebSocket channels (tokio-tungstenite)
//!         ├── failure_log/  tracing-backed failure sink
//!         └── config_file/  TOML config file
//!         ↕
//! Media-signaling server (JSON {"id": ...} over WebSocket)
//! ```
//!
//! # Layer rules
//!
//! - `domain` does no I/O and is not async.
//! - `application` depends on `domain` only; its collaborators are traits.
//! - `infrastructure` implements those traits on top of `tokio`.

/// Domain layer: pure types (no I/O).
pub mod domain;

/// Application layer: negotiation state machine.
pub mod application;

/// Infrastructure layer: WebSocket server, signaling channels, logging sink.
pub mod infrastructure;

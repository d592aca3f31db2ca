//! Infrastructure layer for screenshare-bridge.
//!
//! Everything that touches I/O lives here:
//!
//! - `host_server`: the host-facing WebSocket listener and per-session loop
//! - `signal_conn`: WebSocket channels to the media-signaling server
//! - `failure_log`: the `tracing`-backed failure sink
//! - `config_file`: TOML configuration loading and validation
//!
//! The negotiation rules themselves live in the application layer.

pub mod config_file;
pub mod failure_log;
pub mod host_server;
pub mod signal_conn;

pub use host_server::{run_server, serve};

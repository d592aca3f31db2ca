//! Domain layer for screenshare-bridge.
//!
//! Pure types with no I/O, networking, or async runtime dependencies:
//!
//! - Message types (host commands, host-bound messages, signaling events)
//! - Configuration structures
//! - Failure codes and the recovery-category classification
//!
//! No `tokio`, socket, or file-system types belong here.

pub mod config;
pub mod errors;
pub mod messages;

pub use config::{BridgeConfig, IceServer, SessionCredentials};
pub use errors::{classify, ErrorReport, RecoveryCategory, ScreenshareErrorCode};
pub use messages::{HostCommand, HostOutbound, MessageError, ShareRequestParams, SignalEvent, StartMsg};

//! Screen-share failure codes and their recovery categories.
//!
//! Failures reach the bridge as an [`ErrorReport`] carrying a numeric code.
//! [`classify`] maps every code, known or not, to exactly one
//! [`RecoveryCategory`]; the category decides which message the user sees and
//! whether the failure is logged at all.
//!
//! # Code ranges
//!
//! | Range     | Origin                                        |
//! |-----------|-----------------------------------------------|
//! | 1101-1121 | signaling transport and peer connection       |
//! | 1130-1138 | screen capture (`getDisplayMedia` semantics)  |
//! | 1310      | client-side broker                            |
//! | 2000-2300 | media server                                  |

use std::fmt;

use serde::{Deserialize, Serialize};

/// Every failure code the bridge knows by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScreenshareErrorCode {
    SignallingTransportDisconnected,
    SignallingTransportConnectionFailed,
    ScreensharePlayFailed,
    PeerNegotiationFailed,
    IceStateFailed,
    MediaTimeout,
    UnknownError,
    GetDisplayMediaGenericError,
    AbortError,
    InvalidStateError,
    OverconstrainedError,
    TypeError,
    NotFoundError,
    NotAllowedError,
    NotSupportedError,
    NotReadableError,
    EndedWhileStarting,
    MediaServerConnectionError,
    MediaServerOffline,
    MediaInvalidSdp,
    MediaNoAvailableCodec,
    SfuInvalidRequest,
}

impl ScreenshareErrorCode {
    /// All known codes, in code order.
    pub const ALL: [ScreenshareErrorCode; 22] = [
        Self::SignallingTransportDisconnected,
        Self::SignallingTransportConnectionFailed,
        Self::ScreensharePlayFailed,
        Self::PeerNegotiationFailed,
        Self::IceStateFailed,
        Self::MediaTimeout,
        Self::UnknownError,
        Self::GetDisplayMediaGenericError,
        Self::AbortError,
        Self::InvalidStateError,
        Self::OverconstrainedError,
        Self::TypeError,
        Self::NotFoundError,
        Self::NotAllowedError,
        Self::NotSupportedError,
        Self::NotReadableError,
        Self::EndedWhileStarting,
        Self::MediaServerConnectionError,
        Self::MediaServerOffline,
        Self::MediaInvalidSdp,
        Self::MediaNoAvailableCodec,
        Self::SfuInvalidRequest,
    ];

    /// Numeric wire code.
    pub fn code(self) -> u32 {
        match self {
            Self::SignallingTransportDisconnected => 1101,
            Self::SignallingTransportConnectionFailed => 1102,
            Self::ScreensharePlayFailed => 1104,
            Self::PeerNegotiationFailed => 1105,
            Self::IceStateFailed => 1107,
            Self::MediaTimeout => 1120,
            Self::UnknownError => 1121,
            Self::GetDisplayMediaGenericError => 1130,
            Self::AbortError => 1131,
            Self::InvalidStateError => 1132,
            Self::OverconstrainedError => 1133,
            Self::TypeError => 1134,
            Self::NotFoundError => 1135,
            Self::NotAllowedError => 1136,
            Self::NotSupportedError => 1137,
            Self::NotReadableError => 1138,
            Self::EndedWhileStarting => 1310,
            Self::MediaServerConnectionError => 2000,
            Self::MediaServerOffline => 2001,
            Self::MediaInvalidSdp => 2202,
            Self::MediaNoAvailableCodec => 2203,
            Self::SfuInvalidRequest => 2300,
        }
    }

    /// Looks up a known code; `None` for anything else.
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    /// Canonical name, used as the error message when a report has none.
    pub fn name(self) -> &'static str {
        match self {
            Self::SignallingTransportDisconnected => "SIGNALLING_TRANSPORT_DISCONNECTED",
            Self::SignallingTransportConnectionFailed => "SIGNALLING_TRANSPORT_CONNECTION_FAILED",
            Self::ScreensharePlayFailed => "SCREENSHARE_PLAY_FAILED",
            Self::PeerNegotiationFailed => "PEER_NEGOTIATION_FAILED",
            Self::IceStateFailed => "ICE_STATE_FAILED",
            Self::MediaTimeout => "MEDIA_TIMEOUT",
            Self::UnknownError => "UNKNOWN_ERROR",
            Self::GetDisplayMediaGenericError => "GetDisplayMediaGenericError",
            Self::AbortError => "AbortError",
            Self::InvalidStateError => "InvalidStateError",
            Self::OverconstrainedError => "OverconstrainedError",
            Self::TypeError => "TypeError",
            Self::NotFoundError => "NotFoundError",
            Self::NotAllowedError => "NotAllowedError",
            Self::NotSupportedError => "NotSupportedError",
            Self::NotReadableError => "NotReadableError",
            Self::EndedWhileStarting => "ENDED_WHILE_STARTING",
            Self::MediaServerConnectionError => "MEDIA_SERVER_CONNECTION_ERROR",
            Self::MediaServerOffline => "MEDIA_SERVER_OFFLINE",
            Self::MediaInvalidSdp => "MEDIA_INVALID_SDP",
            Self::MediaNoAvailableCodec => "MEDIA_NO_AVAILABLE_CODEC",
            Self::SfuInvalidRequest => "SFU_INVALID_REQUEST",
        }
    }
}

impl fmt::Display for ScreenshareErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// What the system should suggest after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecoveryCategory {
    /// No notification, no log.
    Silent,
    RetrySameEnvironment,
    RetryOtherEnvironment,
    Unsupported,
    PermissionDenied,
    /// Server-side or configuration problem; retrying will not help.
    Fatal,
}

impl RecoveryCategory {
    /// Localization key of the user notification, `None` for [`Silent`].
    ///
    /// [`Silent`]: RecoveryCategory::Silent
    pub fn message_key(self) -> Option<&'static str> {
        match self {
            RecoveryCategory::Silent => None,
            RecoveryCategory::RetrySameEnvironment => Some("app.screenshare.screenshareRetryError"),
            RecoveryCategory::RetryOtherEnvironment => {
                Some("app.screenshare.screenshareRetryOtherEnvError")
            }
            RecoveryCategory::Unsupported => Some("app.screenshare.screenshareUnsupportedEnv"),
            RecoveryCategory::PermissionDenied => Some("app.screenshare.screensharePermissionError"),
            RecoveryCategory::Fatal => Some("app.screenshare.screenshareFinalError"),
        }
    }
}

/// Maps a failure code to its recovery category.
///
/// Total: unknown codes fall back to [`RecoveryCategory::RetrySameEnvironment`].
///
/// ```rust
/// use screenshare_bridge::domain::{classify, RecoveryCategory, ScreenshareErrorCode};
///
/// assert_eq!(
///     classify(ScreenshareErrorCode::NotAllowedError.code()),
///     RecoveryCategory::PermissionDenied
/// );
/// assert_eq!(classify(424242), RecoveryCategory::RetrySameEnvironment);
/// ```
pub fn classify(error_code: u32) -> RecoveryCategory {
    use ScreenshareErrorCode as C;

    match ScreenshareErrorCode::from_code(error_code) {
        Some(C::NotAllowedError) => RecoveryCategory::PermissionDenied,

        // The environment claims support but misbehaves.
        Some(
            C::AbortError
            | C::InvalidStateError
            | C::OverconstrainedError
            | C::TypeError
            | C::NotFoundError
            | C::NotReadableError
            | C::PeerNegotiationFailed
            | C::ScreensharePlayFailed
            | C::MediaNoAvailableCodec
            | C::MediaInvalidSdp,
        ) => RecoveryCategory::RetryOtherEnvironment,

        Some(
            C::SignallingTransportConnectionFailed
            | C::MediaServerConnectionError
            | C::SfuInvalidRequest,
        ) => RecoveryCategory::Fatal,

        Some(C::NotSupportedError) => RecoveryCategory::Unsupported,

        Some(C::EndedWhileStarting) => RecoveryCategory::Silent,

        Some(
            C::SignallingTransportDisconnected
            | C::IceStateFailed
            | C::MediaTimeout
            | C::UnknownError
            | C::GetDisplayMediaGenericError
            | C::MediaServerOffline,
        )
        | None => RecoveryCategory::RetrySameEnvironment,
    }
}

/// A failure produced by the media or signaling path.
///
/// Both fields are optional on the wire: a missing code means
/// `UNKNOWN_ERROR`, a missing message falls back to the code's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    #[serde(default = "unknown_error_code")]
    pub error_code: u32,
    #[serde(default)]
    pub error_message: Option<String>,
}

fn unknown_error_code() -> u32 {
    ScreenshareErrorCode::UnknownError.code()
}

impl ErrorReport {
    pub fn new(error_code: u32, error_message: impl Into<String>) -> Self {
        Self {
            error_code,
            error_message: Some(error_message.into()),
        }
    }

    /// A report for a known code with no extra detail.
    pub fn from_code(code: ScreenshareErrorCode) -> Self {
        Self {
            error_code: code.code(),
            error_message: None,
        }
    }

    /// The message to log: the explicit one, else the code's name, else
    /// `"unknown error"`.
    pub fn message(&self) -> String {
        match &self.error_message {
            Some(m) => m.clone(),
            None => ScreenshareErrorCode::from_code(self.error_code)
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| "unknown error".to_string()),
        }
    }

    pub fn category(&self) -> RecoveryCategory {
        classify(self.error_code)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

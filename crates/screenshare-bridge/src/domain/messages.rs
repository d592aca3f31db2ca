//! JSON message types for both sides of the bridge.
//!
//! # Message flow
//!
//! ```text
//! Host      → Bridge:  {"key": ...}     → HostCommand
//! Bridge    → Host:    HostOutbound     → {"method": ...}
//! Bridge    → Server:  startMsg / iceMsg payloads, verbatim
//! Server    → Bridge:  {"id": ...}      → SignalEvent
//! ```
//!
//! The host side is internally tagged by `key` (inbound) and `method`
//! (outbound), so serde's `#[serde(tag = ...)]` handles dispatch and an
//! unrecognised `key` is a deserialization error rather than a silent
//! fall-through.  Signaling messages are parsed by hand from a
//! [`serde_json::Value`] because unknown `id`s are expected and must not fail,
//! and because ICE candidates are relayed to the host as the whole message.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::config::IceServer;

// ── Host → Bridge ─────────────────────────────────────────────────────────────

/// A command sent by the embedding host.
///
/// # Serde representation
///
/// ```json
/// {"key":"StartWsForScreenShare"}
/// {"key":"sdpStartMsgForScreenShare","startMsg":{"id":"start","sdpOffer":"v%3D0..."}}
/// {"key":"onIceCandidateForScreenShare","iceMsg":{"id":"onIceCandidate","candidate":{}}}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "key")]
pub enum HostCommand {
    /// Open the signaling channel.
    ///
    /// `sessionToken`, when present, replaces the configured token in the
    /// endpoint's query string.
    #[serde(rename = "StartWsForScreenShare")]
    StartSignaling {
        #[serde(default, rename = "sessionToken")]
        session_token: Option<String>,
    },

    /// Close the signaling channel.
    #[serde(rename = "StopWsForScreenShare")]
    StopSignaling {},

    /// Begin the SDP offer/answer exchange.
    ///
    /// The host omits `startMsg` when its capture pipeline failed to produce
    /// an offer; that case is a no-op.
    #[serde(rename = "sdpStartMsgForScreenShare")]
    NegotiationStart {
        #[serde(default, rename = "startMsg")]
        start_msg: Option<StartMsg>,
    },

    /// A local ICE candidate to relay to the signaling server unchanged.
    #[serde(rename = "onIceCandidateForScreenShare")]
    IceCandidate {
        #[serde(rename = "iceMsg")]
        ice_msg: Value,
    },

    /// The host ended its share. Parsed but not relayed.
    #[serde(rename = "stopMsgForScreenShare")]
    StopSession {
        #[serde(default)]
        msg: Value,
    },

    /// Clear the loading indicator.
    #[serde(rename = "enableScreenShareBtn")]
    EnableControl {},
}

impl HostCommand {
    /// Parses a raw host message.
    ///
    /// # Errors
    ///
    /// Returns the serde error for invalid JSON, a missing `key`, an unknown
    /// `key`, or a missing required field.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Wire `key` of this command.
    ///
    /// Used in log lines instead of `Debug` so SDP bodies and tokens stay out
    /// of the logs.
    pub fn key(&self) -> &'static str {
        match self {
            HostCommand::StartSignaling { .. } => "StartWsForScreenShare",
            HostCommand::StopSignaling {} => "StopWsForScreenShare",
            HostCommand::NegotiationStart { .. } => "sdpStartMsgForScreenShare",
            HostCommand::IceCandidate { .. } => "onIceCandidateForScreenShare",
            HostCommand::StopSession { .. } => "stopMsgForScreenShare",
            HostCommand::EnableControl {} => "enableScreenShareBtn",
        }
    }
}

/// The `startMsg` object carried by [`HostCommand::NegotiationStart`].
///
/// Only `sdpOffer` is interpreted; every other field (`id`, `type`, `role`,
/// `internalMeetingId`, ...) is kept in `extra` and relayed as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartMsg {
    /// URL-encoded SDP offer as sent by the host.
    #[serde(rename = "sdpOffer")]
    pub sdp_offer: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StartMsg {
    /// Returns a copy with `sdp_offer` URL-decoded.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::InvalidEncoding`] when the percent-decoded bytes
    /// are not valid UTF-8.
    pub fn decoded(&self) -> Result<StartMsg, MessageError> {
        let sdp_offer = urlencoding::decode(&self.sdp_offer)
            .map_err(|e| MessageError::InvalidEncoding {
                field: "sdpOffer",
                reason: e.to_string(),
            })?
            .into_owned();
        Ok(StartMsg {
            sdp_offer,
            extra: self.extra.clone(),
        })
    }
}

// ── Bridge → Host ─────────────────────────────────────────────────────────────

/// Messages posted to the host, tagged by `method`.
///
/// ```json
/// {"method":"sdpAnswerForScreenShare","sdpAnswer":"v%3D0%0D%0A..."}
/// {"method":"iceCandidateForScreenShare","iceCandidate":"{\"id\":\"iceCandidate\",...}"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum HostOutbound {
    /// The server's SDP answer, URL-encoded.
    #[serde(rename = "sdpAnswerForScreenShare")]
    SdpAnswer {
        #[serde(rename = "sdpAnswer")]
        sdp_answer: String,
    },

    /// A remote ICE candidate: the whole signaling message, stringified.
    #[serde(rename = "iceCandidateForScreenShare")]
    IceCandidate {
        #[serde(rename = "iceCandidate")]
        ice_candidate: String,
    },

    /// Ask the host to start its native capture pipeline.
    #[serde(rename = "initializeScreenShareAndroid")]
    InitializeScreenShare { params: ShareRequestParams },
}

/// Parameters of [`HostOutbound::InitializeScreenShare`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRequestParams {
    pub caller_name: String,
    pub internal_meeting_id: String,
    pub session_token: String,
    pub ws_url: String,
    pub voice_bridge: String,
    pub user_name: String,
    pub ice_server_urls: Vec<IceServer>,
}

// ── Server → Bridge ───────────────────────────────────────────────────────────

/// An inbound signaling message, discriminated by its `id` field.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalEvent {
    /// `startResponse`: the server's SDP answer (plain text).
    NegotiationAnswer { sdp_answer: String },
    /// `iceCandidate`: a remote candidate; `message` is the full object.
    IceCandidate { message: Value },
    /// `playStart`: the server started receiving media.
    PlaybackStarted,
    /// Any other `id`; ignored by the bridge.
    Other { id: String },
}

impl SignalEvent {
    /// Parses a signaling text frame.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError`] for invalid JSON, a non-object message, a
    /// missing or non-string `id`, or a `startResponse` without `sdpAnswer`.
    pub fn parse(text: &str) -> Result<Self, MessageError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Classifies an already-parsed signaling message.
    pub fn from_value(value: Value) -> Result<Self, MessageError> {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .ok_or(MessageError::MissingId)?
            .to_string();

        match id.as_str() {
            "startResponse" => {
                let sdp_answer = value
                    .get("sdpAnswer")
                    .and_then(Value::as_str)
                    .ok_or(MessageError::MissingField {
                        id: "startResponse",
                        field: "sdpAnswer",
                    })?
                    .to_string();
                Ok(SignalEvent::NegotiationAnswer { sdp_answer })
            }
            "iceCandidate" => Ok(SignalEvent::IceCandidate { message: value }),
            "playStart" => Ok(SignalEvent::PlaybackStarted),
            _ => Ok(SignalEvent::Other { id }),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Failures while reading a host or signaling message.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("signaling message has no string `id`")]
    MissingId,

    #[error("`{id}` message is missing `{field}`")]
    MissingField {
        id: &'static str,
        field: &'static str,
    },

    #[error("`{field}` is not valid URL-encoded UTF-8: {reason}")]
    InvalidEncoding { field: &'static str, reason: String },
}

// ── Tests ─────────────────────────────────────────────────────────────────────

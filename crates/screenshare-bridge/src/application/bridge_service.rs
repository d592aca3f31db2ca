//! The screen-share signaling bridge.
//!
//! [`ScreenshareSignalingBridge`] sits between two transports:
//!
//! ```text
//! Host (JSON {"key": ...})  ──handle_host_command──▶  bridge  ──send──▶  SignalChannel
//! Host ◀──post_message── {"method": ...}  ◀──translate──  handle_signal_delivery ◀── server
//! ```
//!
//! The bridge is synchronous and single-owner: the infrastructure layer feeds
//! it host frames, channel deliveries and timer ticks from one task, so no
//! locking is needed around the [`Session`].  Every collaborator sits behind a
//! trait so the whole protocol is testable without sockets.
//!
//! # Stale deliveries
//!
//! Each channel the bridge opens gets a fresh [`ChannelId`].  Deliveries carry
//! the id of the channel that produced them and are dropped unless that id is
//! the live channel's and negotiation has started on it.  A `startResponse`
//! arriving after `StopWsForScreenShare` therefore never reaches the host.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::config::BridgeConfig;
use crate::domain::errors::{ErrorReport, RecoveryCategory, ScreenshareErrorCode};
use crate::domain::messages::{
    HostCommand, HostOutbound, MessageError, ShareRequestParams, SignalEvent, StartMsg,
};

/// `logCode` of the structured failure record.
pub const SCREENSHARE_FAILED_LOG_CODE: &str = "screenshare_failed";

// ── Error types ───────────────────────────────────────────────────────────────

/// Failures while processing one host command or signaling delivery.
///
/// None of these escape the bridge: the public entry points log them and
/// carry on.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The host sent something that is not a known command.
    #[error("malformed host command: {0}")]
    MalformedCommand(#[source] serde_json::Error),

    /// A command that needs the signaling channel arrived before
    /// `StartWsForScreenShare` (or after `StopWsForScreenShare`).
    #[error("{command} received with no signaling channel open")]
    NoChannel { command: &'static str },

    /// The SDP offer could not be URL-decoded.
    #[error("invalid SDP offer: {0}")]
    InvalidOffer(#[source] MessageError),

    /// A signaling frame could not be interpreted.
    #[error("malformed signaling message: {0}")]
    MalformedSignal(#[source] MessageError),

    #[error("failed to serialize message: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl BridgeError {
    /// `true` for input the host or server is expected to produce under
    /// jitter or replay; these are logged at debug level only.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            BridgeError::MalformedCommand(_)
                | BridgeError::NoChannel { .. }
                | BridgeError::MalformedSignal(_)
        )
    }
}

/// Errors from a [`SignalChannel`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("signaling channel {0} is closed")]
    Closed(ChannelId),
}

/// Errors from a [`HostTransport`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("host transport is closed")]
    Closed,
}

// ── Collaborator traits ───────────────────────────────────────────────────────

/// Identifies one signaling channel instance within a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An open (or opening) duplex connection to the signaling server.
///
/// `send` must not block: implementations queue the message for a writer
/// task so that all sends derived from one command keep their order.
pub trait SignalChannel: Send {
    fn send(&self, message: String) -> Result<(), ChannelError>;

    /// Closes the connection. Must be safe to call more than once.
    fn disconnect(&mut self);
}

/// Creates signaling channels.
///
/// The connector owns the route back into the bridge: everything the channel
/// receives is delivered as a [`SignalDelivery`] tagged with `id`.
pub trait SignalConnector: Send + Sync {
    fn connect(&self, id: ChannelId, endpoint: &str) -> Box<dyn SignalChannel>;
}

/// The outbound half of the host message channel.
pub trait HostTransport: Send + Sync {
    /// Posts one JSON-encoded message to the host.
    fn post_message(&self, json: String) -> Result<(), TransportError>;
}

/// A user-facing failure notification (rendered and localized by the UI).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserNotice {
    pub message_key: &'static str,
    pub error_code: u32,
}

/// The structured failure log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureLogRecord {
    pub log_code: &'static str,
    pub error_code: u32,
    pub error_message: String,
}

/// Where failure notifications and failure log records go.
#[cfg_attr(test, mockall::automock)]
pub trait FailureSink: Send + Sync {
    fn notify(&self, notice: &UserNotice);
    fn log_failure(&self, record: &FailureLogRecord);
}

/// Traffic reported by a signaling channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalInbound {
    /// A text frame from the server.
    Message(String),
    /// The channel could not be established or broke.
    Failed(ErrorReport),
    /// The server closed the channel.
    Closed,
}

/// A [`SignalInbound`] tagged with the channel that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDelivery {
    pub channel: ChannelId,
    pub inbound: SignalInbound,
}

// ── Session state ─────────────────────────────────────────────────────────────

struct LiveChannel {
    id: ChannelId,
    handle: Box<dyn SignalChannel>,
    /// Set by the first negotiation start; events are ignored until then.
    subscribed: bool,
}

/// State of one screen share, owned by exactly one bridge.
#[derive(Default)]
pub struct Session {
    /// At most one live channel.
    channel: Option<LiveChannel>,
    /// `true` while waiting for the native capture pipeline.
    loading: bool,
    /// Pending delayed clear of `loading`.
    loading_clear_at: Option<Instant>,
}

// ── Bridge ────────────────────────────────────────────────────────────────────

/// Drives the negotiation between the host and the signaling server.
pub struct ScreenshareSignalingBridge {
    config: Arc<BridgeConfig>,
    connector: Arc<dyn SignalConnector>,
    host: Arc<dyn HostTransport>,
    failures: Arc<dyn FailureSink>,
    session: Session,
    last_channel_id: u64,
}

impl ScreenshareSignalingBridge {
    pub fn new(
        config: Arc<BridgeConfig>,
        connector: Arc<dyn SignalConnector>,
        host: Arc<dyn HostTransport>,
        failures: Arc<dyn FailureSink>,
    ) -> Self {
        Self {
            config,
            connector,
            host,
            failures,
            session: Session::default(),
            last_channel_id: 0,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.session.loading
    }

    pub fn has_channel(&self) -> bool {
        self.session.channel.is_some()
    }

    /// Id of the live channel, if any.
    pub fn active_channel(&self) -> Option<ChannelId> {
        self.session.channel.as_ref().map(|c| c.id)
    }

    /// When [`on_timer`](Self::on_timer) next needs to run.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.session.loading_clear_at
    }

    /// Asks the host to start its native capture pipeline and marks the
    /// session as loading.
    pub fn request_share(&mut self) {
        let creds = &self.config.credentials;
        let request = HostOutbound::InitializeScreenShare {
            params: ShareRequestParams {
                caller_name: creds.caller_name.clone(),
                internal_meeting_id: creds.meeting_id.clone(),
                session_token: creds.session_token.clone(),
                ws_url: self.config.signaling_url.clone(),
                voice_bridge: creds.voice_bridge.clone(),
                user_name: creds.user_name.clone(),
                ice_server_urls: self.config.ice_servers.clone(),
            },
        };

        self.session.loading = true;
        self.session.loading_clear_at = None;
        info!("posting screen share request to host");
        if let Err(e) = self.post(&request) {
            warn!("share request not delivered: {e}");
        }
    }

    /// Processes one raw host message. Never fails: malformed input and
    /// out-of-order commands are logged and dropped.
    pub fn handle_host_command(&mut self, raw: &str) {
        let result = HostCommand::parse(raw)
            .map_err(BridgeError::MalformedCommand)
            .and_then(|cmd| self.apply_command(cmd));

        if let Err(e) = result {
            if e.is_expected() {
                debug!("host command dropped: {e}");
            } else {
                warn!("host command failed: {e}");
            }
        }
    }

    /// Processes one parsed host command.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NoChannel`] for channel commands with no open
    /// channel, and decode/send errors from negotiation and ICE relay.
    pub fn apply_command(&mut self, cmd: HostCommand) -> Result<(), BridgeError> {
        debug!("host → bridge: {}", cmd.key());
        match cmd {
            HostCommand::StartSignaling { session_token } => {
                self.start_signaling(session_token.as_deref());
                Ok(())
            }
            HostCommand::StopSignaling {} => {
                self.stop_signaling();
                Ok(())
            }
            HostCommand::NegotiationStart { start_msg } => self.start_negotiation(start_msg),
            HostCommand::IceCandidate { ice_msg } => {
                let live = self
                    .session
                    .channel
                    .as_ref()
                    .ok_or(BridgeError::NoChannel {
                        command: "onIceCandidateForScreenShare",
                    })?;
                live.handle.send(ice_msg.to_string())?;
                Ok(())
            }
            HostCommand::StopSession { .. } => {
                // TODO: relay to the signaling channel once the server-side
                // stop semantics for host-initiated ends are confirmed.
                debug!("stopMsgForScreenShare accepted; not relayed");
                Ok(())
            }
            HostCommand::EnableControl {} => {
                self.clear_loading();
                Ok(())
            }
        }
    }

    /// Routes one channel delivery. Deliveries from channels other than the
    /// live one are dropped.
    pub fn handle_signal_delivery(&mut self, delivery: SignalDelivery, now: Instant) {
        let SignalDelivery { channel, inbound } = delivery;
        if self.active_channel() != Some(channel) {
            debug!("dropping delivery from stale channel {channel}");
            return;
        }

        match inbound {
            SignalInbound::Message(text) => match SignalEvent::parse(&text) {
                Ok(event) => self.handle_signal_event(channel, event, now),
                Err(e) => debug!("channel {channel}: {}", BridgeError::MalformedSignal(e)),
            },
            SignalInbound::Failed(report) => {
                self.handle_failure(report);
            }
            SignalInbound::Closed => {
                warn!("channel {channel}: closed by signaling server");
                self.handle_failure(ErrorReport::from_code(
                    ScreenshareErrorCode::SignallingTransportDisconnected,
                ));
            }
        }
    }

    /// Acts on one signaling event from `channel`.
    ///
    /// Ignored unless `channel` is live and negotiation has started on it.
    pub fn handle_signal_event(&mut self, channel: ChannelId, event: SignalEvent, now: Instant) {
        let subscribed = match &self.session.channel {
            Some(live) if live.id == channel => live.subscribed,
            _ => {
                debug!("ignoring event from stale channel {channel}");
                return;
            }
        };
        if !subscribed {
            debug!("channel {channel}: event before negotiation start ignored");
            return;
        }

        match &event {
            SignalEvent::PlaybackStarted => {
                debug!("channel {channel}: playStart");
                self.session.loading_clear_at = Some(now + self.config.playback_settle_delay);
            }
            SignalEvent::Other { id } => {
                debug!("channel {channel}: ignoring `{id}`");
            }
            SignalEvent::NegotiationAnswer { .. } | SignalEvent::IceCandidate { .. } => {
                if let Some(outbound) = translate_signal_to_host(&event) {
                    if let Err(e) = self.post(&outbound) {
                        warn!("channel {channel}: forwarding to host failed: {e}");
                    }
                }
            }
        }
    }

    /// Classifies a failure, notifies and logs unless it is silent, then
    /// tears the session down in every case.
    ///
    /// Returns the category the failure was assigned.
    pub fn handle_failure(&mut self, report: ErrorReport) -> RecoveryCategory {
        let category = report.category();
        let error_message = report.message();

        match category.message_key() {
            Some(message_key) => {
                self.failures.notify(&UserNotice {
                    message_key,
                    error_code: report.error_code,
                });
                self.failures.log_failure(&FailureLogRecord {
                    log_code: SCREENSHARE_FAILED_LOG_CODE,
                    error_code: report.error_code,
                    error_message,
                });
            }
            None => {
                debug!(
                    "screenshare ended silently: {error_message} (code={})",
                    report.error_code
                );
            }
        }

        self.teardown();
        category
    }

    /// Fires the delayed loading clear if its deadline has passed.
    pub fn on_timer(&mut self, now: Instant) {
        if matches!(self.session.loading_clear_at, Some(at) if at <= now) {
            debug!("playback settled; clearing loading flag");
            self.clear_loading();
        }
    }

    /// Closes and discards the channel, clears the loading flag and cancels
    /// the pending timer. Idempotent.
    pub fn teardown(&mut self) {
        self.stop_signaling();
        self.clear_loading();
    }

    // ── Command handlers ──────────────────────────────────────────────────────

    fn start_signaling(&mut self, token_override: Option<&str>) {
        if let Some(live) = &self.session.channel {
            debug!("channel {} already open; ignoring start", live.id);
            return;
        }

        let token = token_override.unwrap_or(&self.config.credentials.session_token);
        let endpoint = self.config.signaling_endpoint(token);

        self.last_channel_id += 1;
        let id = ChannelId(self.last_channel_id);
        let handle = self.connector.connect(id, &endpoint);
        info!("signaling channel {id} opening");

        self.session.channel = Some(LiveChannel {
            id,
            handle,
            subscribed: false,
        });
    }

    fn stop_signaling(&mut self) {
        match self.session.channel.take() {
            Some(mut live) => {
                live.handle.disconnect();
                info!("signaling channel {} closed", live.id);
            }
            None => debug!("no signaling channel to close"),
        }
    }

    fn start_negotiation(&mut self, start_msg: Option<StartMsg>) -> Result<(), BridgeError> {
        let Some(start_msg) = start_msg else {
            debug!("sdpStartMsgForScreenShare without startMsg; ignoring");
            return Ok(());
        };
        let live = self
            .session
            .channel
            .as_mut()
            .ok_or(BridgeError::NoChannel {
                command: "sdpStartMsgForScreenShare",
            })?;

        let decoded = start_msg.decoded().map_err(BridgeError::InvalidOffer)?;
        let payload = serde_json::to_string(&decoded).map_err(BridgeError::Serialize)?;

        if live.subscribed {
            debug!("channel {}: renegotiating on existing subscription", live.id);
        }
        live.subscribed = true;
        live.handle.send(payload)?;
        Ok(())
    }

    fn clear_loading(&mut self) {
        self.session.loading = false;
        self.session.loading_clear_at = None;
    }

    fn post(&self, message: &HostOutbound) -> Result<(), BridgeError> {
        let json = serde_json::to_string(message).map_err(BridgeError::Serialize)?;
        self.host.post_message(json)?;
        Ok(())
    }
}

// ── Signal → Host translation ─────────────────────────────────────────────────

/// Translates a signaling event into the message the host should receive.
///
/// - `NegotiationAnswer` → `sdpAnswerForScreenShare` with the answer
///   URL-encoded.
/// - `IceCandidate` → `iceCandidateForScreenShare` with the whole signaling
///   message stringified.
/// - Everything else → `None`.
pub fn translate_signal_to_host(event: &SignalEvent) -> Option<HostOutbound> {
    match event {
        SignalEvent::NegotiationAnswer { sdp_answer } => Some(HostOutbound::SdpAnswer {
            sdp_answer: urlencoding::encode(sdp_answer).into_owned(),
        }),
        SignalEvent::IceCandidate { message } => Some(HostOutbound::IceCandidate {
            ice_candidate: message.to_string(),
        }),
        SignalEvent::PlaybackStarted | SignalEvent::Other { .. } => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;

    // ── Test doubles ──────────────────────────────────────────────────────────

    #[derive(Default)]
    struct ChannelLog {
        sent: Vec<String>,
        disconnects: u32,
    }

    struct RecordingChannel {
        log: Arc<Mutex<ChannelLog>>,
    }

    impl SignalChannel for RecordingChannel {
        fn send(&self, message: String) -> Result<(), ChannelError> {
            self.log.lock().unwrap().sent.push(message);
            Ok(())
        }

        fn disconnect(&mut self) {
            self.log.lock().unwrap().disconnects += 1;
        }
    }

    #[derive(Default)]
    struct RecordingConnector {
        opened: Mutex<Vec<(ChannelId, String, Arc<Mutex<ChannelLog>>)>>,
    }

    impl RecordingConnector {
        fn count(&self) -> usize {
            self.opened.lock().unwrap().len()
        }

        fn endpoint(&self, idx: usize) -> String {
            self.opened.lock().unwrap()[idx].1.clone()
        }

        fn log(&self, idx: usize) -> Arc<Mutex<ChannelLog>> {
            Arc::clone(&self.opened.lock().unwrap()[idx].2)
        }
    }

    impl SignalConnector for RecordingConnector {
        fn connect(&self, id: ChannelId, endpoint: &str) -> Box<dyn SignalChannel> {
            let log = Arc::new(Mutex::new(ChannelLog::default()));
            self.opened
                .lock()
                .unwrap()
                .push((id, endpoint.to_string(), Arc::clone(&log)));
            Box::new(RecordingChannel { log })
        }
    }

    #[derive(Default)]
    struct RecordingHost {
        posted: Mutex<Vec<String>>,
    }

    impl RecordingHost {
        fn values(&self) -> Vec<Value> {
            self.posted
                .lock()
                .unwrap()
                .iter()
                .map(|s| serde_json::from_str(s).unwrap())
                .collect()
        }
    }

    impl HostTransport for RecordingHost {
        fn post_message(&self, json: String) -> Result<(), TransportError> {
            self.posted.lock().unwrap().push(json);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingFailures {
        notices: Mutex<Vec<UserNotice>>,
        records: Mutex<Vec<FailureLogRecord>>,
    }

    impl FailureSink for RecordingFailures {
        fn notify(&self, notice: &UserNotice) {
            self.notices.lock().unwrap().push(notice.clone());
        }

        fn log_failure(&self, record: &FailureLogRecord) {
            self.records.lock().unwrap().push(record.clone());
        }
    }

    struct Harness {
        bridge: ScreenshareSignalingBridge,
        connector: Arc<RecordingConnector>,
        host: Arc<RecordingHost>,
        failures: Arc<RecordingFailures>,
    }

    fn harness() -> Harness {
        let mut config = BridgeConfig {
            signaling_url: "wss://sfu.test/ws".to_string(),
            ..BridgeConfig::default()
        };
        config.credentials.session_token = "tok".to_string();
        config.credentials.caller_name = "w_abc".to_string();

        let connector = Arc::new(RecordingConnector::default());
        let host = Arc::new(RecordingHost::default());
        let failures = Arc::new(RecordingFailures::default());
        let bridge = ScreenshareSignalingBridge::new(
            Arc::new(config),
            Arc::clone(&connector) as Arc<dyn SignalConnector>,
            Arc::clone(&host) as Arc<dyn HostTransport>,
            Arc::clone(&failures) as Arc<dyn FailureSink>,
        );
        Harness {
            bridge,
            connector,
            host,
            failures,
        }
    }

    const START: &str = r#"{"key":"StartWsForScreenShare"}"#;
    const STOP: &str = r#"{"key":"StopWsForScreenShare"}"#;
    const NEGOTIATE: &str =
        r#"{"key":"sdpStartMsgForScreenShare","startMsg":{"id":"start","sdpOffer":"a%20b"}}"#;

    fn message(channel: ChannelId, text: &str) -> SignalDelivery {
        SignalDelivery {
            channel,
            inbound: SignalInbound::Message(text.to_string()),
        }
    }

    // ── StartSignaling / StopSignaling ────────────────────────────────────────

    #[test]
    fn test_start_opens_channel_with_token_endpoint() {
        // Arrange
        let mut h = harness();

        // Act
        h.bridge.handle_host_command(START);

        // Assert
        assert!(h.bridge.has_channel());
        assert_eq!(h.connector.count(), 1);
        assert_eq!(h.connector.endpoint(0), "wss://sfu.test/ws?sessionToken=tok");
    }

    #[test]
    fn test_start_twice_opens_exactly_one_channel() {
        let mut h = harness();
        h.bridge.handle_host_command(START);
        let first = h.bridge.active_channel();

        h.bridge.handle_host_command(START);

        assert_eq!(h.connector.count(), 1, "replayed start must be a no-op");
        assert_eq!(h.bridge.active_channel(), first);
    }

    #[test]
    fn test_start_uses_token_override() {
        let mut h = harness();
        h.bridge
            .handle_host_command(r#"{"key":"StartWsForScreenShare","sessionToken":"other"}"#);
        assert_eq!(h.connector.endpoint(0), "wss://sfu.test/ws?sessionToken=other");
    }

    #[test]
    fn test_stop_disconnects_and_discards_channel() {
        let mut h = harness();
        h.bridge.handle_host_command(START);

        h.bridge.handle_host_command(STOP);

        assert!(!h.bridge.has_channel());
        assert_eq!(h.connector.log(0).lock().unwrap().disconnects, 1);
    }

    #[test]
    fn test_stop_and_teardown_without_channel_are_noops() {
        let mut h = harness();

        h.bridge.handle_host_command(STOP);
        h.bridge.teardown();
        h.bridge.teardown();

        assert!(!h.bridge.has_channel());
        assert_eq!(h.connector.count(), 0);
        assert!(h.host.posted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_restart_after_stop_gets_a_new_channel_id() {
        let mut h = harness();
        h.bridge.handle_host_command(START);
        let first = h.bridge.active_channel().unwrap();
        h.bridge.handle_host_command(STOP);

        h.bridge.handle_host_command(START);

        let second = h.bridge.active_channel().unwrap();
        assert_ne!(first, second);
        assert_eq!(h.connector.count(), 2);
    }

    // ── NegotiationStart ──────────────────────────────────────────────────────

    #[test]
    fn test_negotiation_sends_decoded_offer_with_other_fields() {
        // Arrange
        let mut h = harness();
        h.bridge.handle_host_command(START);

        // Act
        h.bridge.handle_host_command(NEGOTIATE);

        // Assert
        let log = h.connector.log(0);
        let log = log.lock().unwrap();
        assert_eq!(log.sent.len(), 1);
        let payload: Value = serde_json::from_str(&log.sent[0]).unwrap();
        assert_eq!(payload, json!({"id": "start", "sdpOffer": "a b"}));
    }

    #[test]
    fn test_negotiation_before_start_sends_nothing() {
        let mut h = harness();
        h.bridge.handle_host_command(NEGOTIATE);
        assert_eq!(h.connector.count(), 0);
        assert!(!h.bridge.has_channel());
    }

    #[test]
    fn test_negotiation_without_start_msg_sends_nothing() {
        let mut h = harness();
        h.bridge.handle_host_command(START);
        h.bridge
            .handle_host_command(r#"{"key":"sdpStartMsgForScreenShare"}"#);
        assert!(h.connector.log(0).lock().unwrap().sent.is_empty());
    }

    #[test]
    fn test_negotiation_with_undecodable_offer_sends_nothing() {
        let mut h = harness();
        h.bridge.handle_host_command(START);

        let result = h.bridge.apply_command(HostCommand::NegotiationStart {
            start_msg: Some(StartMsg {
                sdp_offer: "%C3%28".to_string(),
                extra: Default::default(),
            }),
        });

        assert!(matches!(result, Err(BridgeError::InvalidOffer(_))));
        assert!(h.connector.log(0).lock().unwrap().sent.is_empty());
    }

    #[test]
    fn test_answer_is_forwarded_url_encoded() {
        // Arrange
        let mut h = harness();
        h.bridge.handle_host_command(START);
        h.bridge.handle_host_command(NEGOTIATE);
        let ch = h.bridge.active_channel().unwrap();

        // Act
        h.bridge.handle_signal_delivery(
            message(ch, r#"{"id":"startResponse","sdpAnswer":"c d"}"#),
            Instant::now(),
        );

        // Assert
        assert_eq!(
            h.host.values(),
            vec![json!({"method": "sdpAnswerForScreenShare", "sdpAnswer": "c%20d"})]
        );
    }

    #[test]
    fn test_events_before_negotiation_start_are_ignored() {
        let mut h = harness();
        h.bridge.handle_host_command(START);
        let ch = h.bridge.active_channel().unwrap();

        h.bridge.handle_signal_delivery(
            message(ch, r#"{"id":"startResponse","sdpAnswer":"x"}"#),
            Instant::now(),
        );

        assert!(h.host.posted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_repeated_negotiation_does_not_duplicate_forwarding() {
        let mut h = harness();
        h.bridge.handle_host_command(START);
        h.bridge.handle_host_command(NEGOTIATE);
        h.bridge.handle_host_command(NEGOTIATE);
        let ch = h.bridge.active_channel().unwrap();

        h.bridge.handle_signal_delivery(
            message(ch, r#"{"id":"startResponse","sdpAnswer":"x"}"#),
            Instant::now(),
        );

        assert_eq!(h.host.posted.lock().unwrap().len(), 1);
        assert_eq!(h.connector.log(0).lock().unwrap().sent.len(), 2);
    }

    // ── ICE ───────────────────────────────────────────────────────────────────

    #[test]
    fn test_host_ice_candidate_is_relayed_unmodified() {
        let mut h = harness();
        h.bridge.handle_host_command(START);

        h.bridge.handle_host_command(
            r#"{"key":"onIceCandidateForScreenShare","iceMsg":{"id":"onIceCandidate","candidate":{"candidate":"c1","sdpMLineIndex":0}}}"#,
        );

        let log = h.connector.log(0);
        let sent: Value = serde_json::from_str(&log.lock().unwrap().sent[0]).unwrap();
        assert_eq!(
            sent,
            json!({"id": "onIceCandidate", "candidate": {"candidate": "c1", "sdpMLineIndex": 0}})
        );
    }

    #[test]
    fn test_host_ice_candidate_before_start_is_noop() {
        let mut h = harness();

        let result = h.bridge.apply_command(HostCommand::IceCandidate {
            ice_msg: json!({"id": "onIceCandidate"}),
        });

        assert!(matches!(result, Err(BridgeError::NoChannel { .. })));
        assert!(result.unwrap_err().is_expected());
        assert_eq!(h.connector.count(), 0);
    }

    #[test]
    fn test_server_ice_candidates_forwarded_in_order() {
        // Arrange
        let mut h = harness();
        h.bridge.handle_host_command(START);
        h.bridge.handle_host_command(NEGOTIATE);
        let ch = h.bridge.active_channel().unwrap();
        let now = Instant::now();

        // Act
        h.bridge.handle_signal_delivery(
            message(ch, r#"{"id":"iceCandidate","candidate":{"candidate":"X"}}"#),
            now,
        );
        h.bridge.handle_signal_delivery(
            message(ch, r#"{"id":"iceCandidate","candidate":{"candidate":"Y"}}"#),
            now,
        );

        // Assert
        let posted = h.host.values();
        assert_eq!(posted.len(), 2);
        for (msg, expected) in posted.iter().zip(["X", "Y"]) {
            assert_eq!(msg["method"], "iceCandidateForScreenShare");
            let inner: Value = serde_json::from_str(msg["iceCandidate"].as_str().unwrap()).unwrap();
            assert_eq!(inner["id"], "iceCandidate");
            assert_eq!(inner["candidate"]["candidate"], expected);
        }
    }

    // ── Stale channels ────────────────────────────────────────────────────────

    #[test]
    fn test_answer_after_stop_is_ignored() {
        let mut h = harness();
        h.bridge.handle_host_command(START);
        h.bridge.handle_host_command(NEGOTIATE);
        let ch = h.bridge.active_channel().unwrap();
        h.bridge.handle_host_command(STOP);

        h.bridge.handle_signal_delivery(
            message(ch, r#"{"id":"startResponse","sdpAnswer":"late"}"#),
            Instant::now(),
        );

        assert!(h.host.posted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_event_from_replaced_channel_is_ignored() {
        // Arrange: channel #1 negotiated, stopped, channel #2 negotiated
        let mut h = harness();
        h.bridge.handle_host_command(START);
        h.bridge.handle_host_command(NEGOTIATE);
        let old = h.bridge.active_channel().unwrap();
        h.bridge.handle_host_command(STOP);
        h.bridge.handle_host_command(START);
        h.bridge.handle_host_command(NEGOTIATE);
        h.bridge.request_share();
        let posted_before = h.host.posted.lock().unwrap().len();

        // Act: late traffic from the old channel
        let now = Instant::now();
        h.bridge
            .handle_signal_delivery(message(old, r#"{"id":"playStart"}"#), now);
        h.bridge.handle_signal_delivery(
            SignalDelivery {
                channel: old,
                inbound: SignalInbound::Closed,
            },
            now,
        );

        // Assert: no timer, no failure, no output, new channel untouched
        assert_eq!(h.bridge.next_deadline(), None);
        assert!(h.bridge.is_loading());
        assert!(h.bridge.has_channel());
        assert!(h.failures.notices.lock().unwrap().is_empty());
        assert_eq!(h.host.posted.lock().unwrap().len(), posted_before);
    }

    #[test]
    fn test_malformed_signal_message_is_dropped() {
        let mut h = harness();
        h.bridge.handle_host_command(START);
        h.bridge.handle_host_command(NEGOTIATE);
        let ch = h.bridge.active_channel().unwrap();

        h.bridge.handle_signal_delivery(message(ch, "not json"), Instant::now());
        h.bridge
            .handle_signal_delivery(message(ch, r#"{"id":"pong"}"#), Instant::now());

        assert!(h.host.posted.lock().unwrap().is_empty());
        assert!(h.bridge.has_channel());
    }

    // ── Loading flag ──────────────────────────────────────────────────────────

    #[test]
    fn test_request_share_posts_init_and_sets_loading() {
        let mut h = harness();

        h.bridge.request_share();

        assert!(h.bridge.is_loading());
        let posted = h.host.values();
        assert_eq!(posted[0]["method"], "initializeScreenShareAndroid");
        assert_eq!(posted[0]["params"]["callerName"], "w_abc");
        assert_eq!(posted[0]["params"]["sessionToken"], "tok");
        assert_eq!(posted[0]["params"]["wsUrl"], "wss://sfu.test/ws");
        assert_eq!(posted[0]["params"]["iceServerUrls"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_play_start_clears_loading_after_settle_delay() {
        // Arrange
        let mut h = harness();
        h.bridge.request_share();
        h.bridge.handle_host_command(START);
        h.bridge.handle_host_command(NEGOTIATE);
        let ch = h.bridge.active_channel().unwrap();
        let t0 = Instant::now();

        // Act
        h.bridge
            .handle_signal_delivery(message(ch, r#"{"id":"playStart"}"#), t0);

        // Assert: still loading until the deadline
        assert_eq!(h.bridge.next_deadline(), Some(t0 + Duration::from_secs(1)));
        h.bridge.on_timer(t0 + Duration::from_millis(999));
        assert!(h.bridge.is_loading());
        h.bridge.on_timer(t0 + Duration::from_secs(1));
        assert!(!h.bridge.is_loading());
        assert_eq!(h.bridge.next_deadline(), None);
    }

    #[test]
    fn test_enable_control_clears_loading_and_cancels_timer() {
        let mut h = harness();
        h.bridge.request_share();
        h.bridge.handle_host_command(START);
        h.bridge.handle_host_command(NEGOTIATE);
        let ch = h.bridge.active_channel().unwrap();
        h.bridge
            .handle_signal_delivery(message(ch, r#"{"id":"playStart"}"#), Instant::now());

        h.bridge
            .handle_host_command(r#"{"key":"enableScreenShareBtn"}"#);

        assert!(!h.bridge.is_loading());
        assert_eq!(h.bridge.next_deadline(), None);
    }

    #[test]
    fn test_enable_control_works_without_channel() {
        let mut h = harness();
        h.bridge.request_share();
        h.bridge
            .handle_host_command(r#"{"key":"enableScreenShareBtn"}"#);
        assert!(!h.bridge.is_loading());
    }

    #[test]
    fn test_teardown_cancels_pending_timer() {
        let mut h = harness();
        h.bridge.handle_host_command(START);
        h.bridge.handle_host_command(NEGOTIATE);
        let ch = h.bridge.active_channel().unwrap();
        let t0 = Instant::now();
        h.bridge
            .handle_signal_delivery(message(ch, r#"{"id":"playStart"}"#), t0);

        h.bridge.teardown();
        h.bridge.request_share();
        h.bridge.on_timer(t0 + Duration::from_secs(5));

        assert!(h.bridge.is_loading(), "old timer must not clear a new session");
    }

    // ── StopSession / malformed ───────────────────────────────────────────────

    #[test]
    fn test_stop_session_is_not_relayed() {
        let mut h = harness();
        h.bridge.handle_host_command(START);

        h.bridge
            .handle_host_command(r#"{"key":"stopMsgForScreenShare","msg":{"id":"stop"}}"#);

        assert!(h.connector.log(0).lock().unwrap().sent.is_empty());
        assert!(h.bridge.has_channel());
    }

    #[test]
    fn test_malformed_host_command_changes_nothing() {
        let mut h = harness();
        h.bridge.handle_host_command("{{{");
        h.bridge.handle_host_command(r#"{"key":"somethingElse"}"#);
        assert!(!h.bridge.has_channel());
        assert!(h.host.posted.lock().unwrap().is_empty());
    }

    // ── Failures ──────────────────────────────────────────────────────────────

    #[test]
    fn test_permission_denied_notifies_logs_and_tears_down() {
        // Arrange
        let mut h = harness();
        h.bridge.handle_host_command(START);

        // Act
        let category = h.bridge.handle_failure(ErrorReport::new(
            ScreenshareErrorCode::NotAllowedError.code(),
            "Permission denied",
        ));

        // Assert
        assert_eq!(category, RecoveryCategory::PermissionDenied);
        assert_eq!(
            *h.failures.notices.lock().unwrap(),
            vec![UserNotice {
                message_key: "app.screenshare.screensharePermissionError",
                error_code: 1136,
            }]
        );
        assert_eq!(
            *h.failures.records.lock().unwrap(),
            vec![FailureLogRecord {
                log_code: "screenshare_failed",
                error_code: 1136,
                error_message: "Permission denied".to_string(),
            }]
        );
        assert!(!h.bridge.has_channel());
        assert_eq!(h.connector.log(0).lock().unwrap().disconnects, 1);
    }

    #[test]
    fn test_ended_while_starting_is_silent_but_still_tears_down() {
        let mut h = harness();
        h.bridge.handle_host_command(START);
        h.bridge.request_share();

        let category = h
            .bridge
            .handle_failure(ErrorReport::from_code(ScreenshareErrorCode::EndedWhileStarting));

        assert_eq!(category, RecoveryCategory::Silent);
        assert!(h.failures.notices.lock().unwrap().is_empty());
        assert!(h.failures.records.lock().unwrap().is_empty());
        assert!(!h.bridge.has_channel());
        assert!(!h.bridge.is_loading());
    }

    #[test]
    fn test_each_non_silent_category_produces_one_notice_and_one_record() {
        use mockall::predicate::always;

        for code in [1136, 1131, 1102, 1137, 555] {
            // Arrange
            let mut sink = MockFailureSink::new();
            sink.expect_notify().with(always()).times(1).return_const(());
            sink.expect_log_failure()
                .withf(move |r| r.error_code == code && r.log_code == "screenshare_failed")
                .times(1)
                .return_const(());
            let mut bridge = ScreenshareSignalingBridge::new(
                Arc::new(BridgeConfig::default()),
                Arc::new(RecordingConnector::default()),
                Arc::new(RecordingHost::default()),
                Arc::new(sink),
            );

            // Act / Assert: mock verifies call counts on drop
            let category = bridge.handle_failure(ErrorReport::new(code, "x"));
            assert_ne!(category, RecoveryCategory::Silent);
        }
    }

    #[test]
    fn test_channel_failure_from_live_channel_is_handled() {
        let mut h = harness();
        h.bridge.handle_host_command(START);
        let ch = h.bridge.active_channel().unwrap();

        h.bridge.handle_signal_delivery(
            SignalDelivery {
                channel: ch,
                inbound: SignalInbound::Failed(ErrorReport::from_code(
                    ScreenshareErrorCode::SignallingTransportConnectionFailed,
                )),
            },
            Instant::now(),
        );

        let notices = h.failures.notices.lock().unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].message_key, "app.screenshare.screenshareFinalError");
        assert!(!h.bridge.has_channel());
    }

    #[test]
    fn test_remote_close_of_live_channel_is_a_disconnect_failure() {
        let mut h = harness();
        h.bridge.handle_host_command(START);
        let ch = h.bridge.active_channel().unwrap();

        h.bridge.handle_signal_delivery(
            SignalDelivery {
                channel: ch,
                inbound: SignalInbound::Closed,
            },
            Instant::now(),
        );

        let records = h.failures.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].error_code, 1101);
        assert_eq!(records[0].error_message, "SIGNALLING_TRANSPORT_DISCONNECTED");
        assert!(!h.bridge.has_channel());
    }

    // ── translate_signal_to_host ──────────────────────────────────────────────

    #[test]
    fn test_translate_answer_encodes_crlf() {
        let out = translate_signal_to_host(&SignalEvent::NegotiationAnswer {
            sdp_answer: "v=0\r\n".to_string(),
        });
        assert_eq!(
            out,
            Some(HostOutbound::SdpAnswer {
                sdp_answer: "v%3D0%0D%0A".to_string()
            })
        );
    }

    #[test]
    fn test_translate_ignores_playback_and_unknown() {
        assert_eq!(translate_signal_to_host(&SignalEvent::PlaybackStarted), None);
        assert_eq!(
            translate_signal_to_host(&SignalEvent::Other {
                id: "x".to_string()
            }),
            None
        );
    }
}

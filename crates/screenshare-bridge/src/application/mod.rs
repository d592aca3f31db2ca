//! Application layer: the signaling bridge and its collaborator traits.

pub mod bridge_service;

pub use bridge_service::{
    translate_signal_to_host, BridgeError, ChannelError, ChannelId, FailureLogRecord, FailureSink,
    HostTransport, ScreenshareSignalingBridge, SignalChannel, SignalConnector, SignalDelivery,
    SignalInbound, TransportError, UserNotice, SCREENSHARE_FAILED_LOG_CODE,
};

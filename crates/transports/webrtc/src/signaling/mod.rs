//! Relay signaling: wire protocol, channel contract and WebSocket client

pub mod channel;
pub mod client;
pub mod protocol;

pub use channel::{InboundReceiver, SignalingChannel};
pub use client::SignalingClient;
pub use protocol::{
    CandidatePayload, DescriptionPayload, IceCandidate, InboundMessage, OutboundMessage, PeerId,
    RoomId, SdpKind, SessionDescription,
};

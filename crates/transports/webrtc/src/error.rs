//! Error types for mesh signaling and peer session management

/// Result type alias using the mesh Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while joining a room or negotiating peer sessions
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required local capability is missing (WebRTC support, camera,
    /// microphone, permission). Fatal for the join flow.
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// An inbound relay message could not be understood
    #[error("Malformed signaling message: {0}")]
    MalformedMessage(String),

    /// No session exists for the given participant
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The relay channel is gone
    #[error("Signaling channel lost: {0}")]
    ChannelLost(String),

    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Signaling send/receive error
    #[error("Signaling error: {0}")]
    SignalingError(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// SDP negotiation error
    #[error("SDP negotiation error: {0}")]
    SdpError(String),

    /// ICE candidate error
    #[error("ICE candidate error: {0}")]
    IceCandidateError(String),

    /// Media track error
    #[error("Media track error: {0}")]
    MediaTrackError(String),

    /// Peer connection error
    #[error("Peer connection error: {0}")]
    PeerConnectionError(String),

    /// WebRTC library error
    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Internal error (actor gone, reply dropped)
    #[error("Internal error: {0}")]
    InternalError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Fatal errors abort the join flow; nothing is negotiated after them.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::CapabilityUnavailable(_))
    }
}

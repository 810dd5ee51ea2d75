//! Messages processed by the lifecycle manager actor

use super::registry::PeerState;
use super::session::ConnectionState;
use crate::media::{LocalStream, RemoteStream, RemoteTrack};
use crate::signaling::{IceCandidate, PeerId, SessionDescription};
use crate::Result;
use tokio::sync::oneshot;

/// Session callback or negotiation result, tagged with its origin
#[derive(Debug)]
pub(crate) struct SessionEnvelope {
    pub peer_id: PeerId,
    pub generation: u64,
    pub event: SessionEvent,
}

#[derive(Debug)]
pub(crate) enum SessionEvent {
    IceCandidate(IceCandidate),
    Track(RemoteTrack),
    StateChanged(ConnectionState),
    Negotiated(NegotiationOutcome),
}

/// Result of one negotiation step run by a session worker
#[derive(Debug)]
pub(crate) enum NegotiationOutcome {
    /// A local offer or answer was created and set; it must be relayed
    LocalDescription(SessionDescription),

    /// The remote answer was applied
    RemoteApplied,

    Failed { step: &'static str, error: String },
}

/// Local commands sent through [`MeshHandle`](super::MeshHandle)
#[derive(Debug)]
pub(crate) enum MeshCommand {
    Join {
        respond_to: oneshot::Sender<Result<()>>,
    },
    Leave {
        respond_to: oneshot::Sender<()>,
    },
    ReplaceLocalStream {
        stream: LocalStream,
        respond_to: oneshot::Sender<Result<()>>,
    },
    PeerIds {
        respond_to: oneshot::Sender<Vec<PeerId>>,
    },
    PeerState {
        peer_id: PeerId,
        respond_to: oneshot::Sender<Option<PeerState>>,
    },
    RemoteStreams {
        respond_to: oneshot::Sender<Vec<RemoteStream>>,
    },
    LocalId {
        respond_to: oneshot::Sender<Option<PeerId>>,
    },
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}

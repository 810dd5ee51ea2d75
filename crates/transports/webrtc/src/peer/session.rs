//! Peer session capability
//!
//! The lifecycle manager never touches webrtc-rs directly. It drives sessions
//! through [`PeerSession`] and receives their callbacks through the
//! [`SessionObserver`] handed to the [`SessionFactory`] at creation.

use super::events::{NegotiationOutcome, SessionEnvelope, SessionEvent};
use crate::media::{MediaTrack, RemoteTrack};
use crate::signaling::{IceCandidate, PeerId, SessionDescription};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

/// Transport-level connection state reported by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl From<RTCPeerConnectionState> for ConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
            RTCPeerConnectionState::Connected => ConnectionState::Connected,
            RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
            RTCPeerConnectionState::Failed => ConnectionState::Failed,
            RTCPeerConnectionState::Closed => ConnectionState::Closed,
            _ => ConnectionState::New,
        }
    }
}

/// One point-to-point media session with a remote participant
#[async_trait]
pub trait PeerSession: Send + Sync {
    /// Remote participant this session talks to
    fn peer_id(&self) -> &str;

    /// Attach a local track. Must happen before any description is set.
    async fn add_track(&self, track: &MediaTrack) -> Result<()>;

    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    /// Apply the remote description, then any candidates buffered before it
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    /// Add a remote candidate. Candidates that arrive before the remote
    /// description are buffered until it is set.
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Release transport resources
    async fn close(&self) -> Result<()>;
}

/// Builds sessions with their callbacks wired to an observer
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(
        &self,
        peer_id: &str,
        observer: SessionObserver,
    ) -> Result<Arc<dyn PeerSession>>;
}

/// Callback sink for one session
///
/// Every event is tagged with the peer id and the registry generation the
/// session was created under, so events from a discarded session can be
/// recognised and ignored.
#[derive(Clone)]
pub struct SessionObserver {
    peer_id: PeerId,
    generation: u64,
    events: mpsc::Sender<SessionEnvelope>,
}

impl SessionObserver {
    pub(crate) fn new(
        peer_id: impl Into<PeerId>,
        generation: u64,
        events: mpsc::Sender<SessionEnvelope>,
    ) -> Self {
        Self {
            peer_id: peer_id.into(),
            generation,
            events,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// A local candidate was discovered
    pub async fn ice_candidate(&self, candidate: IceCandidate) {
        self.emit(SessionEvent::IceCandidate(candidate)).await;
    }

    /// A remote track arrived
    pub async fn track(&self, track: RemoteTrack) {
        self.emit(SessionEvent::Track(track)).await;
    }

    /// The transport connection state changed
    pub async fn state_changed(&self, state: ConnectionState) {
        self.emit(SessionEvent::StateChanged(state)).await;
    }

    pub(crate) async fn negotiated(&self, outcome: NegotiationOutcome) {
        self.emit(SessionEvent::Negotiated(outcome)).await;
    }

    async fn emit(&self, event: SessionEvent) {
        let envelope = SessionEnvelope {
            peer_id: self.peer_id.clone(),
            generation: self.generation,
            event,
        };

        if self.events.send(envelope).await.is_err() {
            debug!(
                "Manager gone, dropping session event for peer {}",
                self.peer_id
            );
        }
    }
}

impl std::fmt::Debug for SessionObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionObserver")
            .field("peer_id", &self.peer_id)
            .field("generation", &self.generation)
            .finish()
    }
}

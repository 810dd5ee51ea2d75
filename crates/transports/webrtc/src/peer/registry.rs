//! Peer session and remote stream registry
//!
//! Single source of truth for which remote participants exist. Sessions and
//! the streams assembled from their tracks live in one type so that every
//! removal path evicts both.

use super::events::SessionEnvelope;
use super::session::{PeerSession, SessionFactory, SessionObserver};
use super::worker::{self, NegotiationCommand};
use crate::media::{MediaTrack, RemoteStream, RemoteTrack};
use crate::signaling::PeerId;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle state of a registered session
///
/// A session that is not registered is absent; closing a session removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Negotiating,
    Connected,
    Failed,
}

/// Which side started the negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

struct PeerEntry {
    session: Arc<dyn PeerSession>,
    generation: u64,
    role: Role,
    state: PeerState,
    commands: mpsc::Sender<NegotiationCommand>,
    worker: JoinHandle<()>,
}

/// Result of [`PeerRegistry::get_or_create`]
pub(crate) struct Obtained {
    pub generation: u64,
    pub session: Arc<dyn PeerSession>,
    pub created: bool,
}

pub(crate) struct PeerRegistry {
    factory: Arc<dyn SessionFactory>,
    events: mpsc::Sender<SessionEnvelope>,
    sessions: HashMap<PeerId, PeerEntry>,
    streams: HashMap<PeerId, RemoteStream>,
    next_generation: u64,
    max_peers: usize,
    queue_capacity: usize,
}

impl PeerRegistry {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        events: mpsc::Sender<SessionEnvelope>,
        max_peers: usize,
        queue_capacity: usize,
    ) -> Self {
        Self {
            factory,
            events,
            sessions: HashMap::new(),
            streams: HashMap::new(),
            next_generation: 1,
            max_peers,
            queue_capacity,
        }
    }

    /// Return the session for `peer_id`, creating it if needed.
    ///
    /// A new session gets its observer wired and its worker started, and has
    /// `tracks` queued for attachment before anything else can be queued.
    /// An existing session is returned as is; `role` and `tracks` are ignored.
    pub async fn get_or_create(
        &mut self,
        peer_id: &str,
        role: Role,
        tracks: &[MediaTrack],
    ) -> Result<Obtained> {
        if let Some(entry) = self.sessions.get(peer_id) {
            return Ok(Obtained {
                generation: entry.generation,
                session: Arc::clone(&entry.session),
                created: false,
            });
        }

        if self.sessions.len() >= self.max_peers {
            return Err(Error::PeerConnectionError(format!(
                "Maximum peer limit reached ({}), not creating session for {}",
                self.max_peers, peer_id
            )));
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        let observer = SessionObserver::new(peer_id, generation, self.events.clone());
        let session = self.factory.create(peer_id, observer.clone()).await?;

        let (commands, rx) = mpsc::channel(self.queue_capacity.max(1));
        commands
            .try_send(NegotiationCommand::AttachTracks(tracks.to_vec()))
            .map_err(|e| Error::InternalError(format!("Failed to queue tracks: {}", e)))?;
        let worker = worker::spawn(Arc::clone(&session), observer, rx);

        info!(
            "Created session for peer {} ({:?}, generation {})",
            peer_id, role, generation
        );

        self.sessions.insert(
            peer_id.to_string(),
            PeerEntry {
                session: Arc::clone(&session),
                generation,
                role,
                state: PeerState::Negotiating,
                commands,
                worker,
            },
        );

        Ok(Obtained {
            generation,
            session,
            created: true,
        })
    }

    /// Queue a negotiation step on a session's worker
    pub fn enqueue(&self, peer_id: &str, command: NegotiationCommand) -> Result<()> {
        let entry = self
            .sessions
            .get(peer_id)
            .ok_or_else(|| Error::SessionNotFound(peer_id.to_string()))?;

        entry.commands.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => {
                Error::InternalError(format!("Negotiation queue full for peer {}", peer_id))
            }
            TrySendError::Closed(_) => Error::SessionNotFound(peer_id.to_string()),
        })
    }

    /// Close and evict a session and its remote stream.
    ///
    /// Returns `false` when nothing was registered for `peer_id`.
    pub fn remove(&mut self, peer_id: &str) -> bool {
        self.streams.remove(peer_id);

        let Some(entry) = self.sessions.remove(peer_id) else {
            debug!("No session to remove for peer {}", peer_id);
            return false;
        };

        entry.worker.abort();

        // Closing can fire state callbacks back into the manager's queue,
        // so it runs off the event loop.
        let session = entry.session;
        let peer_id = peer_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = session.close().await {
                warn!("Failed to close session for peer {}: {}", peer_id, e);
            }
        });

        true
    }

    /// Close and evict everything, returning the ids that were removed
    pub fn remove_all(&mut self) -> Vec<PeerId> {
        let ids = self.keys();
        for id in &ids {
            self.remove(id);
        }
        self.streams.clear();
        ids
    }

    /// Registered peer ids, sorted
    pub fn keys(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self.sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Whether `generation` is the live session for `peer_id`
    pub fn is_current(&self, peer_id: &str, generation: u64) -> bool {
        self.sessions
            .get(peer_id)
            .is_some_and(|entry| entry.generation == generation)
    }

    pub fn state(&self, peer_id: &str) -> Option<PeerState> {
        self.sessions.get(peer_id).map(|entry| entry.state)
    }

    pub fn role(&self, peer_id: &str) -> Option<Role> {
        self.sessions.get(peer_id).map(|entry| entry.role)
    }

    /// Update the state of the live session; stale generations are ignored
    pub fn set_state(&mut self, peer_id: &str, generation: u64, state: PeerState) -> bool {
        match self.sessions.get_mut(peer_id) {
            Some(entry) if entry.generation == generation => {
                if entry.state != state {
                    debug!(
                        "Peer {} state transition: {:?} -> {:?}",
                        peer_id, entry.state, state
                    );
                    entry.state = state;
                }
                true
            }
            _ => false,
        }
    }

    /// Record a track received on the live session for `peer_id`.
    ///
    /// Ignored when the session is gone or was recreated, so a stream never
    /// exists without its session.
    pub fn on_track_arrived(&mut self, peer_id: &str, generation: u64, track: RemoteTrack) -> bool {
        if !self.is_current(peer_id, generation) {
            debug!(
                "Ignoring track {} from stale session for peer {}",
                track.id, peer_id
            );
            return false;
        }

        self.streams
            .entry(peer_id.to_string())
            .or_insert_with(|| RemoteStream::new(peer_id))
            .add_track(track)
    }

    #[cfg(test)]
    pub fn remote_stream(&self, peer_id: &str) -> Option<&RemoteStream> {
        self.streams.get(peer_id)
    }

    /// Snapshot of every remote stream, sorted by peer id
    pub fn remote_streams(&self) -> Vec<RemoteStream> {
        let mut streams: Vec<RemoteStream> = self.streams.values().cloned().collect();
        streams.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        streams
    }
}

impl Drop for PeerRegistry {
    fn drop(&mut self) {
        for entry in self.sessions.values() {
            entry.worker.abort();
        }
    }
}

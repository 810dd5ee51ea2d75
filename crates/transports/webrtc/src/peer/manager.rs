//! Peer session lifecycle manager
//!
//! A single actor task owns the registry, the local stream and the local
//! participant id. It reacts to three sources, one event at a time:
//!
//! - relay messages from the signaling channel
//! - session callbacks and negotiation results, tagged `(peer_id, generation)`
//! - local commands from [`MeshHandle`]
//!
//! Negotiation steps themselves run on per-session workers (see
//! `peer::worker`), so a slow description step for one peer never blocks
//! events for another. Results that come back for a session that has since
//! been torn down carry a stale generation and are dropped.

use super::connection::RtcSessionFactory;
use super::events::{MeshCommand, NegotiationOutcome, SessionEnvelope, SessionEvent};
use super::registry::{PeerRegistry, PeerState, Role};
use super::session::{ConnectionState, SessionFactory};
use super::worker::NegotiationCommand;
use crate::config::MeshConfig;
use crate::media::{self, LocalMedia, LocalStream, RemoteStream, SampleTrackSource};
use crate::signaling::{
    CandidatePayload, DescriptionPayload, InboundMessage, InboundReceiver, OutboundMessage,
    PeerId, SdpKind, SignalingChannel, SignalingClient,
};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Capacity of the local command mailbox
const COMMAND_CHANNEL_BUFFER: usize = 32;

/// Handle to a running [`MeshManager`]
#[derive(Clone)]
pub struct MeshHandle {
    sender: mpsc::Sender<MeshCommand>,
}

impl MeshHandle {
    /// Acquire local media and join the configured room.
    ///
    /// Fails with [`Error::CapabilityUnavailable`] when local media cannot
    /// be captured; in that case nothing is sent and no session is created.
    pub async fn join(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(MeshCommand::Join { respond_to: tx }).await?;
        rx.await.map_err(response_failed)?
    }

    /// Leave the room: notify every peer, close every session and release
    /// the local stream. The manager keeps running and can join again.
    pub async fn leave(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(MeshCommand::Leave { respond_to: tx }).await?;
        rx.await.map_err(response_failed)
    }

    /// Swap the local stream and renegotiate every existing session with it
    pub async fn replace_local_stream(&self, stream: LocalStream) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(MeshCommand::ReplaceLocalStream {
            stream,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(response_failed)?
    }

    /// Ids of every registered peer, sorted
    pub async fn peer_ids(&self) -> Result<Vec<PeerId>> {
        let (tx, rx) = oneshot::channel();
        self.send(MeshCommand::PeerIds { respond_to: tx }).await?;
        rx.await.map_err(response_failed)
    }

    /// State of one peer's session, `None` when absent
    pub async fn peer_state(&self, peer_id: &str) -> Result<Option<PeerState>> {
        let (tx, rx) = oneshot::channel();
        self.send(MeshCommand::PeerState {
            peer_id: peer_id.to_string(),
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(response_failed)
    }

    /// Snapshot of the remote streams received so far
    pub async fn remote_streams(&self) -> Result<Vec<RemoteStream>> {
        let (tx, rx) = oneshot::channel();
        self.send(MeshCommand::RemoteStreams { respond_to: tx })
            .await?;
        rx.await.map_err(response_failed)
    }

    /// Local participant id, once the relay has revealed it
    pub async fn local_id(&self) -> Result<Option<PeerId>> {
        let (tx, rx) = oneshot::channel();
        self.send(MeshCommand::LocalId { respond_to: tx }).await?;
        rx.await.map_err(response_failed)
    }

    /// Tear everything down and stop the manager task
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(MeshCommand::Shutdown { respond_to: tx }).await?;
        rx.await.map_err(response_failed)
    }

    async fn send(&self, command: MeshCommand) -> Result<()> {
        self.sender
            .send(command)
            .await
            .map_err(|e| Error::InternalError(format!("channel send failed: {}", e)))
    }
}

fn response_failed(e: oneshot::error::RecvError) -> Error {
    Error::InternalError(format!("response receive failed: {}", e))
}

/// The lifecycle manager actor
pub struct MeshManager {
    config: MeshConfig,
    channel: Arc<dyn SignalingChannel>,

    /// `None` once the relay is gone
    inbound: Option<InboundReceiver>,

    media: Arc<dyn LocalMedia>,
    registry: PeerRegistry,
    session_events: mpsc::Receiver<SessionEnvelope>,
    commands: mpsc::Receiver<MeshCommand>,

    /// Set by a successful join, cleared by leave
    local_stream: Option<LocalStream>,

    local_id: Option<PeerId>,
}

impl MeshManager {
    /// Start the manager task.
    ///
    /// `inbound` is the receiving half of `channel`; when it ends the relay
    /// is considered lost and every session is torn down.
    pub fn spawn(
        config: MeshConfig,
        channel: Arc<dyn SignalingChannel>,
        inbound: InboundReceiver,
        media: Arc<dyn LocalMedia>,
        factory: Arc<dyn SessionFactory>,
    ) -> Result<(MeshHandle, JoinHandle<()>)> {
        config.validate()?;

        let (sender, commands) = mpsc::channel(COMMAND_CHANNEL_BUFFER);
        let (events_tx, session_events) = mpsc::channel(config.event_queue_capacity);

        let registry = PeerRegistry::new(
            factory,
            events_tx,
            config.max_peers as usize,
            config.session_queue_capacity,
        );

        let manager = Self {
            config,
            channel,
            inbound: Some(inbound),
            media,
            registry,
            session_events,
            commands,
            local_stream: None,
            local_id: None,
        };

        let task_handle = tokio::spawn(manager.run());

        Ok((MeshHandle { sender }, task_handle))
    }

    /// Connect to the configured relay and start a manager backed by
    /// webrtc-rs sessions and sample-fed local tracks
    pub async fn connect(config: MeshConfig) -> Result<(MeshHandle, JoinHandle<()>)> {
        config.validate()?;

        let (client, inbound) =
            SignalingClient::connect(&config.signaling_url, config.event_queue_capacity).await?;
        let factory = RtcSessionFactory::new(&config);

        Self::spawn(
            config,
            Arc::new(client),
            inbound,
            Arc::new(SampleTrackSource::new()),
            Arc::new(factory),
        )
    }

    #[instrument(skip_all, name = "mesh.manager")]
    async fn run(mut self) {
        info!("Mesh manager started");

        loop {
            tokio::select! {
                // Relay and session traffic already queued is handled before
                // local commands issued after it.
                biased;

                inbound = next_inbound(&mut self.inbound) => match inbound {
                    Some(message) => self.handle_inbound(message).await,
                    None => {
                        info!("Signaling channel closed");
                        self.inbound = None;
                        self.channel_lost("signaling channel closed");
                    }
                },

                Some(envelope) = self.session_events.recv() => {
                    self.handle_session_event(envelope).await;
                }

                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        info!("All mesh handles dropped, exiting");
                        self.teardown_all("manager stopped");
                        break;
                    }
                },
            }
        }

        info!("Mesh manager stopped");
    }

    /// Returns `false` when the manager should stop
    async fn handle_command(&mut self, command: MeshCommand) -> bool {
        match command {
            MeshCommand::Join { respond_to } => {
                let result = self.join().await;
                let _ = respond_to.send(result);
            }
            MeshCommand::Leave { respond_to } => {
                self.leave().await;
                let _ = respond_to.send(());
            }
            MeshCommand::ReplaceLocalStream { stream, respond_to } => {
                let result = self.replace_local_stream(stream).await;
                let _ = respond_to.send(result);
            }
            MeshCommand::PeerIds { respond_to } => {
                let _ = respond_to.send(self.registry.keys());
            }
            MeshCommand::PeerState {
                peer_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.registry.state(&peer_id));
            }
            MeshCommand::RemoteStreams { respond_to } => {
                let _ = respond_to.send(self.registry.remote_streams());
            }
            MeshCommand::LocalId { respond_to } => {
                let _ = respond_to.send(self.local_id.clone());
            }
            MeshCommand::Shutdown { respond_to } => {
                self.teardown_all("shutdown requested");
                let _ = respond_to.send(());
                return false;
            }
        }
        true
    }

    async fn join(&mut self) -> Result<()> {
        if self.inbound.is_none() {
            return Err(Error::ChannelLost(
                "cannot join, signaling channel is closed".to_string(),
            ));
        }

        if self.local_stream.is_some() {
            debug!("Already joined, ignoring join request");
            return Ok(());
        }

        let constraints = self.config.media;
        let stream = match self.media.acquire(constraints).await.and_then(|stream| {
            media::ensure_available(&stream, constraints)?;
            Ok(stream)
        }) {
            Ok(stream) => stream,
            Err(e) => {
                if e.is_fatal() {
                    warn!("Local media unavailable, not joining: {}", e);
                }
                return Err(e);
            }
        };

        info!(
            "Local media ready ({} track(s)), joining room {}",
            stream.tracks.len(),
            self.config.join_room_id
        );
        self.local_stream = Some(stream);

        let result = self
            .channel
            .send(OutboundMessage::JoinRoom(self.config.join_room_id))
            .await;
        if result.is_err() {
            self.local_stream = None;
        }
        result
    }

    async fn leave(&mut self) {
        let ids = self.registry.keys();
        info!("Leaving room, closing {} session(s)", ids.len());

        for id in &ids {
            self.send(OutboundMessage::RemoveConnection(id.clone())).await;
        }

        self.registry.remove_all();
        self.local_stream = None;
    }

    async fn replace_local_stream(&mut self, stream: LocalStream) -> Result<()> {
        if self.local_stream.is_none() {
            return Err(Error::SignalingError(
                "cannot replace local stream before joining a room".to_string(),
            ));
        }

        if let Err(e) = media::ensure_available(&stream, self.config.media) {
            warn!("Keeping local stream, replacement {} rejected: {}", stream.id, e);
            return Err(e);
        }

        let ids = self.registry.keys();
        info!(
            "Replacing local stream {}, renegotiating {} session(s)",
            stream.id,
            ids.len()
        );
        self.local_stream = Some(stream);

        for id in &ids {
            self.send(OutboundMessage::RemoveConnection(id.clone())).await;
            self.registry.remove(id);
        }

        for id in &ids {
            self.initiate(id).await;
        }

        Ok(())
    }

    #[instrument(skip_all, fields(kind = message.type_name()))]
    async fn handle_inbound(&mut self, message: InboundMessage) {
        if let Err(e) = message.validate() {
            warn!("Dropping relay message: {}", e);
            return;
        }

        if let Some((sender, receiver)) = message.addressing() {
            if !self.accept_addressing(sender, receiver) {
                return;
            }
        }

        match message {
            InboundMessage::Connected(id) => {
                info!("Local participant id is {}", id);
                self.local_id = Some(id);
            }
            InboundMessage::RoomCreated(room) => {
                info!("Room {} created", room);
            }
            InboundMessage::Joined(ids) => {
                let mut others: Vec<PeerId> = Vec::new();
                for id in ids.unwrap_or_default() {
                    if self.local_id.as_deref() == Some(id.as_str()) {
                        debug!("Skipping own id {} in room listing", id);
                    } else if !others.contains(&id) {
                        others.push(id);
                    }
                }

                if others.is_empty() {
                    info!(
                        "Room is empty, requesting room {}",
                        self.config.create_room_id
                    );
                    self.send(OutboundMessage::CreateRoom(self.config.create_room_id))
                        .await;
                    return;
                }

                info!("Joined room with {} peer(s)", others.len());
                for id in others {
                    self.initiate(&id).await;
                }
            }
            InboundMessage::Offer(payload) => {
                let peer_id = payload.sender_id;
                if self.obtain(&peer_id, Role::Responder).await.is_some() {
                    self.enqueue(&peer_id, NegotiationCommand::Answer(payload.description));
                }
            }
            InboundMessage::Answer(payload) => {
                let peer_id = payload.sender_id;
                if self.obtain(&peer_id, Role::Initiator).await.is_some() {
                    self.enqueue(
                        &peer_id,
                        NegotiationCommand::ApplyAnswer(payload.description),
                    );
                }
            }
            InboundMessage::Candidate(payload) => {
                let peer_id = payload.sender_id;
                if self.obtain(&peer_id, Role::Responder).await.is_some() {
                    self.enqueue(&peer_id, NegotiationCommand::AddCandidate(payload.candidate));
                }
            }
            InboundMessage::UserDisconnected(peer_id) => {
                if self.registry.remove(&peer_id) {
                    info!("Peer {} left, session closed", peer_id);
                } else {
                    debug!("Peer {} left without a session", peer_id);
                }
            }
            InboundMessage::Disconnect => {
                self.channel_lost("relay disconnected");
            }
        }
    }

    /// Check the sender/receiver pair of an addressed message, learning the
    /// local id from it when the relay never announced one
    fn accept_addressing(&mut self, sender: &str, receiver: &str) -> bool {
        if sender.is_empty() {
            warn!("Dropping relay message without sender");
            return false;
        }

        if receiver.is_empty() {
            return true;
        }

        match &self.local_id {
            Some(local) if local != receiver => {
                warn!(
                    "Dropping message from {} addressed to {} (local id is {})",
                    sender, receiver, local
                );
                false
            }
            Some(_) => true,
            None => {
                info!("Local participant id is {}", receiver);
                self.local_id = Some(receiver.to_string());
                true
            }
        }
    }

    /// Create a session for `peer_id` and queue a local offer. A session
    /// that already exists is negotiating on its own and gets no second offer.
    async fn initiate(&mut self, peer_id: &str) {
        match self.obtain(peer_id, Role::Initiator).await {
            Some(true) => self.enqueue(peer_id, NegotiationCommand::Offer),
            Some(false) => debug!("Session for peer {} already exists, not offering", peer_id),
            None => {}
        }
    }

    /// Make sure a session exists for `peer_id`.
    ///
    /// Returns whether it was just created, or `None` when it cannot exist.
    async fn obtain(&mut self, peer_id: &str, role: Role) -> Option<bool> {
        let Some(stream) = &self.local_stream else {
            warn!(
                "No local stream, not creating session for peer {} (join first)",
                peer_id
            );
            return None;
        };

        match self
            .registry
            .get_or_create(peer_id, role, &stream.tracks)
            .await
        {
            Ok(obtained) => {
                if !obtained.created {
                    debug!(
                        "Reusing session for peer {} (generation {}, {:?})",
                        obtained.session.peer_id(),
                        obtained.generation,
                        self.registry.role(peer_id)
                    );
                }
                Some(obtained.created)
            }
            Err(e) => {
                warn!("Cannot create session for peer {}: {}", peer_id, e);
                None
            }
        }
    }

    fn enqueue(&self, peer_id: &str, command: NegotiationCommand) {
        if let Err(e) = self.registry.enqueue(peer_id, command) {
            warn!("Dropping negotiation step for peer {}: {}", peer_id, e);
        }
    }

    #[instrument(skip_all, fields(peer_id = %envelope.peer_id, generation = envelope.generation))]
    async fn handle_session_event(&mut self, envelope: SessionEnvelope) {
        let SessionEnvelope {
            peer_id,
            generation,
            event,
        } = envelope;

        if !self.registry.is_current(&peer_id, generation) {
            debug!("Ignoring event from discarded session: {:?}", event);
            return;
        }

        match event {
            SessionEvent::IceCandidate(candidate) => {
                self.send(OutboundMessage::TransferCandidate(CandidatePayload {
                    candidate,
                    sender_id: self.sender_id(),
                    receiver_id: peer_id,
                }))
                .await;
            }
            SessionEvent::Track(track) => {
                debug!("Remote {:?} track {} arrived", track.kind, track.id);
                self.registry.on_track_arrived(&peer_id, generation, track);
            }
            SessionEvent::StateChanged(state) => match state {
                ConnectionState::Connected => {
                    info!("Peer {} connected", peer_id);
                    self.registry
                        .set_state(&peer_id, generation, PeerState::Connected);
                }
                ConnectionState::Failed => {
                    warn!("Connection to peer {} failed", peer_id);
                    self.registry
                        .set_state(&peer_id, generation, PeerState::Failed);
                }
                ConnectionState::Disconnected | ConnectionState::Closed => {
                    info!(
                        "Transport for peer {} reported {:?}, waiting for signaling",
                        peer_id, state
                    );
                }
                ConnectionState::New | ConnectionState::Connecting => {
                    debug!("Transport for peer {} is {:?}", peer_id, state);
                }
            },
            SessionEvent::Negotiated(outcome) => self.handle_outcome(peer_id, outcome).await,
        }
    }

    async fn handle_outcome(&mut self, peer_id: PeerId, outcome: NegotiationOutcome) {
        match outcome {
            NegotiationOutcome::LocalDescription(description) => {
                let payload = DescriptionPayload {
                    description,
                    sender_id: self.sender_id(),
                    receiver_id: peer_id,
                };
                let message = match payload.description.kind {
                    SdpKind::Offer => OutboundMessage::TransferOffer(payload),
                    SdpKind::Answer => OutboundMessage::TransferAnswer(payload),
                };
                self.send(message).await;
            }
            NegotiationOutcome::RemoteApplied => {
                debug!("Remote answer applied for peer {}", peer_id);
            }
            NegotiationOutcome::Failed { step, error } => {
                warn!(
                    "Negotiation step {} failed for peer {}: {}",
                    step, peer_id, error
                );
            }
        }
    }

    fn teardown_all(&mut self, reason: &str) {
        if self.registry.is_empty() {
            return;
        }

        let removed = self.registry.remove_all();
        info!("Closed {} session(s): {}", removed.len(), reason);
    }

    /// Bulk teardown after losing the relay. The room membership is gone
    /// with it, so a later join starts from scratch.
    fn channel_lost(&mut self, reason: &str) {
        self.teardown_all(reason);
        self.local_stream = None;
    }

    fn sender_id(&self) -> PeerId {
        self.local_id.clone().unwrap_or_default()
    }

    /// Send to the relay, logging failures
    async fn send(&self, message: OutboundMessage) {
        let kind = message.type_name();
        if let Err(e) = self.channel.send(message).await {
            warn!("Failed to send {}: {}", kind, e);
        }
    }
}

async fn next_inbound(inbound: &mut Option<InboundReceiver>) -> Option<InboundMessage> {
    match inbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

//! webrtc-rs peer session
//!
//! Wraps an `RTCPeerConnection` behind the [`PeerSession`] capability and
//! forwards its callbacks to the [`SessionObserver`] injected at creation.

use super::session::{ConnectionState, PeerSession, SessionFactory, SessionObserver};
use crate::config::MeshConfig;
use crate::media::{MediaTrack, RemoteTrack};
use crate::signaling::{IceCandidate, SdpKind, SessionDescription};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Builds [`RtcPeerSession`]s using the configured ICE servers
#[derive(Debug, Clone)]
pub struct RtcSessionFactory {
    ice_servers: Vec<RTCIceServer>,
}

impl RtcSessionFactory {
    pub fn new(config: &MeshConfig) -> Self {
        let ice_servers = config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .chain(config.turn_servers.iter().map(|turn| {
                #[allow(clippy::needless_update)]
                RTCIceServer {
                    urls: vec![turn.url.clone()],
                    username: turn.username.clone(),
                    credential: turn.credential.clone(),
                    ..Default::default()
                }
            }))
            .collect();

        Self { ice_servers }
    }

    /// Create a session with its callbacks wired to `observer`
    #[instrument(skip(self, observer), fields(peer_id = %peer_id))]
    pub async fn connect(
        &self,
        peer_id: &str,
        observer: SessionObserver,
    ) -> Result<Arc<RtcPeerSession>> {
        let mut media_engine = MediaEngine::default();

        // Opus for audio, VP8/VP9/H.264 for video
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::WebRtcError(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine).map_err(|e| {
                Error::WebRtcError(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        };

        let peer_connection =
            Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
                Error::WebRtcError(format!("Failed to create peer connection: {}", e))
            })?);

        let connection_id = uuid::Uuid::new_v4().to_string();
        info!(
            "Created peer connection: peer_id={}, connection_id={}",
            peer_id, connection_id
        );

        wire_callbacks(&peer_connection, observer);

        Ok(Arc::new(RtcPeerSession {
            peer_id: peer_id.to_string(),
            connection_id,
            peer_connection,
            pending_candidates: Mutex::new(Vec::new()),
            senders: Mutex::new(Vec::new()),
        }))
    }
}

#[async_trait]
impl SessionFactory for RtcSessionFactory {
    async fn create(
        &self,
        peer_id: &str,
        observer: SessionObserver,
    ) -> Result<Arc<dyn PeerSession>> {
        let session = self.connect(peer_id, observer).await?;
        Ok(session)
    }
}

fn wire_callbacks(peer_connection: &RTCPeerConnection, observer: SessionObserver) {
    let on_candidate = observer.clone();
    peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let observer = on_candidate.clone();

        Box::pin(async move {
            // `None` marks the end of gathering
            let Some(candidate) = candidate else {
                debug!("ICE gathering complete for peer {}", observer.peer_id());
                return;
            };

            match candidate.to_json() {
                Ok(init) => {
                    observer
                        .ice_candidate(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                            username_fragment: init.username_fragment,
                        })
                        .await
                }
                Err(e) => warn!(
                    "Failed to serialize local candidate for peer {}: {}",
                    observer.peer_id(),
                    e
                ),
            }
        })
    }));

    let on_track = observer.clone();
    peer_connection.on_track(Box::new(
        move |track: Arc<TrackRemote>,
              _receiver: Arc<RTCRtpReceiver>,
              _transceiver: Arc<RTCRtpTransceiver>| {
            let observer = on_track.clone();

            Box::pin(async move {
                info!(
                    "Remote track added for peer {}: kind={}",
                    observer.peer_id(),
                    track.kind()
                );
                observer.track(RemoteTrack::from_remote(track)).await;
            })
        },
    ));

    peer_connection.on_peer_connection_state_change(Box::new(
        move |state: RTCPeerConnectionState| {
            let observer = observer.clone();

            Box::pin(async move {
                observer.state_changed(ConnectionState::from(state)).await;
            })
        },
    ));
}

/// [`PeerSession`] backed by an `RTCPeerConnection`
pub struct RtcPeerSession {
    /// Remote participant id
    peer_id: String,

    /// Unique identifier for this connection instance
    connection_id: String,

    peer_connection: Arc<RTCPeerConnection>,

    /// Remote candidates received before the remote description.
    /// Also serialises description application with candidate flushing.
    pending_candidates: Mutex<Vec<RTCIceCandidateInit>>,

    /// RTP senders for attached tracks (retained to keep them alive)
    senders: Mutex<Vec<Arc<RTCRtpSender>>>,
}

impl RtcPeerSession {
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Underlying webrtc-rs connection
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.peer_connection
    }

    /// Number of remote candidates waiting for the remote description
    pub async fn pending_candidate_count(&self) -> usize {
        self.pending_candidates.lock().await.len()
    }
}

fn to_rtc_description(description: SessionDescription) -> Result<RTCSessionDescription> {
    match description.kind {
        SdpKind::Offer => RTCSessionDescription::offer(description.sdp),
        SdpKind::Answer => RTCSessionDescription::answer(description.sdp),
    }
    .map_err(|e| Error::SdpError(format!("Failed to parse session description: {}", e)))
}

fn to_candidate_init(candidate: IceCandidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.candidate,
        sdp_mid: candidate.sdp_mid,
        sdp_mline_index: candidate.sdp_mline_index,
        username_fragment: candidate.username_fragment,
    }
}

#[async_trait]
impl PeerSession for RtcPeerSession {
    fn peer_id(&self) -> &str {
        &self.peer_id
    }

    async fn add_track(&self, track: &MediaTrack) -> Result<()> {
        if self.peer_connection.local_description().await.is_some() {
            warn!(
                "Not attaching track {} to peer {}: local description already set",
                track.id(),
                self.peer_id
            );
            return Ok(());
        }

        let sink = track.sink().ok_or_else(|| {
            Error::MediaTrackError(format!("Track {} has no sample sink", track.id()))
        })?;

        let sender = self
            .peer_connection
            .add_track(Arc::clone(sink) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to add track: {}", e)))?;

        self.senders.lock().await.push(sender);
        debug!("Track {} attached to peer {}", track.id(), self.peer_id);

        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create offer: {}", e)))?;

        debug!("Created SDP offer for peer {}", self.peer_id);
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create answer: {}", e)))?;

        debug!("Created SDP answer for peer {}", self.peer_id);
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.peer_connection
            .set_local_description(to_rtc_description(description)?)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let mut pending = self.pending_candidates.lock().await;

        self.peer_connection
            .set_remote_description(to_rtc_description(description)?)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))?;

        if !pending.is_empty() {
            debug!(
                "Applying {} buffered candidate(s) for peer {}",
                pending.len(),
                self.peer_id
            );
        }

        for candidate in pending.drain(..) {
            if let Err(e) = self.peer_connection.add_ice_candidate(candidate).await {
                warn!(
                    "Failed to apply buffered candidate for peer {}: {}",
                    self.peer_id, e
                );
            }
        }

        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = to_candidate_init(candidate);
        let mut pending = self.pending_candidates.lock().await;

        if self.peer_connection.remote_description().await.is_none() {
            debug!("Buffering candidate for peer {}", self.peer_id);
            pending.push(init);
            return Ok(());
        }

        self.peer_connection
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::IceCandidateError(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        info!("Closing peer connection for peer {}", self.peer_id);

        self.pending_candidates.lock().await.clear();
        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::PeerConnectionError(format!("Failed to close connection: {}", e)))
    }
}

//! Local and remote media tracks
//!
//! The local stream is captured once and shared read-only by every peer
//! session. Remote tracks are collected per participant as they arrive.

pub mod tracks;

pub use tracks::{write_frame, SampleTrackSource};

use crate::config::MediaConstraints;
use crate::signaling::PeerId;
use crate::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl From<RTPCodecType> for MediaKind {
    fn from(kind: RTPCodecType) -> Self {
        match kind {
            RTPCodecType::Audio => MediaKind::Audio,
            _ => MediaKind::Video,
        }
    }
}

/// One locally captured track
#[derive(Clone)]
pub struct MediaTrack {
    id: String,
    kind: MediaKind,
    enabled: bool,

    /// Sample sink the capture pipeline writes into (webrtc-rs sessions only)
    sink: Option<Arc<TrackLocalStaticSample>>,
}

impl MediaTrack {
    /// Create a track without a sample sink
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            kind,
            enabled: true,
            sink: None,
        }
    }

    /// Create a track backed by a webrtc-rs sample sink
    pub fn with_sink(kind: MediaKind, sink: Arc<TrackLocalStaticSample>) -> Self {
        use webrtc::track::track_local::TrackLocal;

        Self {
            id: sink.id().to_string(),
            kind,
            enabled: true,
            sink: Some(sink),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn sink(&self) -> Option<&Arc<TrackLocalStaticSample>> {
        self.sink.as_ref()
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("enabled", &self.enabled)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

/// The locally captured stream
#[derive(Debug, Clone)]
pub struct LocalStream {
    pub id: String,
    pub tracks: Vec<MediaTrack>,
}

impl LocalStream {
    pub fn new(id: impl Into<String>, tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    /// Tracks of one kind that are currently enabled
    pub fn enabled_tracks(&self, kind: MediaKind) -> impl Iterator<Item = &MediaTrack> {
        self.tracks
            .iter()
            .filter(move |t| t.kind == kind && t.enabled)
    }
}

/// Source of the local capture stream
#[async_trait]
pub trait LocalMedia: Send + Sync {
    /// Acquire the local stream.
    ///
    /// Fails with [`Error::CapabilityUnavailable`] when the requested
    /// devices cannot be opened.
    async fn acquire(&self, constraints: MediaConstraints) -> Result<LocalStream>;
}

/// Check that every requested kind has at least one enabled track.
///
/// A stream passes only when an *enabled* track of each requested kind is
/// present; disabled tracks do not count.
pub fn ensure_available(stream: &LocalStream, constraints: MediaConstraints) -> Result<()> {
    if constraints.audio && stream.enabled_tracks(MediaKind::Audio).next().is_none() {
        return Err(Error::CapabilityUnavailable(
            "no enabled audio track (microphone unavailable)".to_string(),
        ));
    }

    if constraints.video && stream.enabled_tracks(MediaKind::Video).next().is_none() {
        return Err(Error::CapabilityUnavailable(
            "no enabled video track (camera unavailable)".to_string(),
        ));
    }

    Ok(())
}

/// A track received from a remote participant
#[derive(Clone)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: MediaKind,
    pub stream_id: String,

    /// Underlying webrtc-rs track for the renderer to read RTP from
    pub handle: Option<Arc<TrackRemote>>,
}

impl RemoteTrack {
    pub fn new(id: impl Into<String>, kind: MediaKind, stream_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            stream_id: stream_id.into(),
            handle: None,
        }
    }

    pub fn from_remote(track: Arc<TrackRemote>) -> Self {
        Self {
            id: track.id(),
            kind: track.kind().into(),
            stream_id: track.stream_id(),
            handle: Some(track),
        }
    }
}

impl fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("stream_id", &self.stream_id)
            .finish()
    }
}

/// Incoming media assembled from one participant's tracks
#[derive(Debug, Clone)]
pub struct RemoteStream {
    pub peer_id: PeerId,
    pub tracks: Vec<RemoteTrack>,
}

impl RemoteStream {
    pub fn new(peer_id: impl Into<PeerId>) -> Self {
        Self {
            peer_id: peer_id.into(),
            tracks: Vec::new(),
        }
    }

    /// Append a track unless one with the same id is already present
    pub fn add_track(&mut self, track: RemoteTrack) -> bool {
        if self.tracks.iter().any(|t| t.id == track.id) {
            return false;
        }
        self.tracks.push(track);
        true
    }
}

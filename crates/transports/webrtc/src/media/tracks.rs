//! Sample-fed local tracks backed by webrtc-rs
//!
//! The capture pipeline itself lives outside this crate; it pushes encoded
//! frames into the sinks created here.

use super::{LocalMedia, LocalStream, MediaKind, MediaTrack};
use crate::config::MediaConstraints;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Opus RTP clock rate
const AUDIO_CLOCK_RATE: u32 = 48000;

/// Standard 90kHz clock for video
const VIDEO_CLOCK_RATE: u32 = 90000;

/// Local media source producing one sample-fed track per requested kind
///
/// ```
/// use meshcall_webrtc::{LocalMedia, MediaConstraints, SampleTrackSource};
///
/// # tokio_test::block_on(async {
/// let source = SampleTrackSource::new();
/// let stream = source
///     .acquire(MediaConstraints { audio: true, video: false })
///     .await
///     .unwrap();
/// assert_eq!(stream.tracks.len(), 1);
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct SampleTrackSource {
    /// Kinds that cannot be captured on this host
    unavailable: Vec<MediaKind>,
}

impl SampleTrackSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a kind as unavailable (no device present)
    pub fn without(mut self, kind: MediaKind) -> Self {
        if !self.unavailable.contains(&kind) {
            self.unavailable.push(kind);
        }
        self
    }

    fn create_track(kind: MediaKind, stream_id: &str) -> MediaTrack {
        let capability = match kind {
            MediaKind::Audio => RTCRtpCodecCapability {
                mime_type: "audio/opus".to_string(),
                clock_rate: AUDIO_CLOCK_RATE,
                channels: 2,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            MediaKind::Video => RTCRtpCodecCapability {
                mime_type: "video/VP8".to_string(),
                clock_rate: VIDEO_CLOCK_RATE,
                channels: 0,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
        };

        let prefix = match kind {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        };

        let sink = Arc::new(TrackLocalStaticSample::new(
            capability,
            format!("{}-{}", prefix, uuid::Uuid::new_v4()),
            stream_id.to_string(),
        ));

        MediaTrack::with_sink(kind, sink)
    }
}

#[async_trait]
impl LocalMedia for SampleTrackSource {
    async fn acquire(&self, constraints: MediaConstraints) -> Result<LocalStream> {
        let mut kinds = Vec::new();
        if constraints.audio {
            kinds.push(MediaKind::Audio);
        }
        if constraints.video {
            kinds.push(MediaKind::Video);
        }

        if let Some(missing) = kinds.iter().find(|k| self.unavailable.contains(k)) {
            return Err(Error::CapabilityUnavailable(format!(
                "no {:?} capture device",
                missing
            )));
        }

        let stream_id = format!("stream-{}", uuid::Uuid::new_v4());
        let tracks: Vec<MediaTrack> = kinds
            .into_iter()
            .map(|kind| Self::create_track(kind, &stream_id))
            .collect();

        info!(
            "Acquired local stream {} with {} track(s)",
            stream_id,
            tracks.len()
        );

        Ok(LocalStream::new(stream_id, tracks))
    }
}

/// Push one encoded frame into a local track's sink
pub async fn write_frame(track: &MediaTrack, data: Vec<u8>, duration: Duration) -> Result<()> {
    let sink = track.sink().ok_or_else(|| {
        Error::MediaTrackError(format!("Track {} has no sample sink", track.id()))
    })?;

    if !track.is_enabled() {
        debug!("Dropping frame for disabled track {}", track.id());
        return Ok(());
    }

    sink.write_sample(&Sample {
        data: Bytes::from(data),
        duration,
        ..Default::default()
    })
    .await
    .map_err(|e| Error::MediaTrackError(format!("Failed to write sample: {}", e)))
}

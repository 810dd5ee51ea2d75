//! Local media doubles

use async_trait::async_trait;
use meshcall_webrtc::{
    Error, LocalMedia, LocalStream, MediaConstraints, MediaKind, MediaTrack, Result,
};
use std::sync::atomic::{AtomicUsize, Ordering};

enum Behaviour {
    Available,
    /// Camera present but its track is disabled
    DisabledCamera,
    Denied,
}

/// Media source handing out fixed track ids
pub struct FakeMedia {
    behaviour: Behaviour,
    acquired: AtomicUsize,
}

impl FakeMedia {
    pub fn available() -> Self {
        Self::with(Behaviour::Available)
    }

    pub fn disabled_camera() -> Self {
        Self::with(Behaviour::DisabledCamera)
    }

    pub fn denied() -> Self {
        Self::with(Behaviour::Denied)
    }

    fn with(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            acquired: AtomicUsize::new(0),
        }
    }

    pub fn acquire_count(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Stream with one audio and one video track, ids suffixed by `tag`
    pub fn stream(tag: &str) -> LocalStream {
        LocalStream::new(
            format!("stream-{}", tag),
            vec![
                MediaTrack::new(format!("mic-{}", tag), MediaKind::Audio),
                MediaTrack::new(format!("cam-{}", tag), MediaKind::Video),
            ],
        )
    }
}

#[async_trait]
impl LocalMedia for FakeMedia {
    async fn acquire(&self, _constraints: MediaConstraints) -> Result<LocalStream> {
        self.acquired.fetch_add(1, Ordering::SeqCst);

        match self.behaviour {
            Behaviour::Available => Ok(Self::stream("1")),
            Behaviour::DisabledCamera => {
                let mut stream = Self::stream("1");
                for track in &mut stream.tracks {
                    if track.kind() == MediaKind::Video {
                        track.set_enabled(false);
                    }
                }
                Ok(stream)
            }
            Behaviour::Denied => Err(Error::CapabilityUnavailable(
                "permission denied".to_string(),
            )),
        }
    }
}

//! Session doubles shared by the unit tests of this module

use super::session::{PeerSession, SessionFactory, SessionObserver};
use crate::media::MediaTrack;
use crate::signaling::{IceCandidate, SessionDescription};
use crate::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Session that accepts every step and counts closes
pub(crate) struct NullSession {
    peer_id: String,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl PeerSession for NullSession {
    fn peer_id(&self) -> &str {
        &self.peer_id
    }

    async fn add_track(&self, _track: &MediaTrack) -> Result<()> {
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription::offer("v=0"))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription::answer("v=0"))
    }

    async fn set_local_description(&self, _description: SessionDescription) -> Result<()> {
        Ok(())
    }

    async fn set_remote_description(&self, _description: SessionDescription) -> Result<()> {
        Ok(())
    }

    async fn add_ice_candidate(&self, _candidate: IceCandidate) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct CountingFactory {
    pub created: AtomicUsize,
    pub closed: Arc<AtomicUsize>,
}

#[async_trait]
impl SessionFactory for CountingFactory {
    async fn create(
        &self,
        peer_id: &str,
        _observer: SessionObserver,
    ) -> Result<Arc<dyn PeerSession>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(NullSession {
            peer_id: peer_id.to_string(),
            closed: Arc::clone(&self.closed),
        }))
    }
}

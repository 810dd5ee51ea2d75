//! Scripted peer session double
//!
//! Sessions log every call in order. Attaching a track after a local
//! description is set is rejected and counted as a violation, which lets
//! tests prove the manager never does it.

use async_trait::async_trait;
use meshcall_webrtc::{
    Error, IceCandidate, MediaTrack, PeerSession, Result, SdpKind, SessionDescription,
    SessionFactory, SessionObserver,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    AddTrack(String),
    CreateOffer,
    CreateAnswer,
    SetLocal(SdpKind),
    SetRemote(SdpKind),
    AddCandidate(String),
    Close,
}

impl Op {
    pub fn is_description_step(&self) -> bool {
        matches!(
            self,
            Op::CreateOffer | Op::CreateAnswer | Op::SetLocal(_) | Op::SetRemote(_)
        )
    }
}

#[derive(Default)]
struct SessionState {
    ops: Vec<Op>,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    pending: Vec<IceCandidate>,
    applied: Vec<IceCandidate>,
}

pub struct FakeSession {
    peer_id: String,
    state: Mutex<SessionState>,
    violations: AtomicUsize,
    closed: AtomicBool,
    offers: AtomicUsize,
}

impl FakeSession {
    fn new(peer_id: &str) -> Self {
        Self {
            peer_id: peer_id.to_string(),
            state: Mutex::new(SessionState::default()),
            violations: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            offers: AtomicUsize::new(0),
        }
    }

    fn record(&self, op: Op) {
        self.state.lock().unwrap().ops.push(op);
    }

    pub fn ops(&self) -> Vec<Op> {
        self.state.lock().unwrap().ops.clone()
    }

    /// Ids of attached tracks, in attach order
    pub fn attached_tracks(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::AddTrack(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Every track attachment precedes every description step
    pub fn tracks_attached_first(&self) -> bool {
        let ops = self.ops();
        let first_description = ops.iter().position(Op::is_description_step);
        let last_track = ops.iter().rposition(|op| matches!(op, Op::AddTrack(_)));

        match (last_track, first_description) {
            (Some(track), Some(description)) => track < description,
            _ => true,
        }
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.state.lock().unwrap().local.clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.state.lock().unwrap().remote.clone()
    }

    pub fn pending_candidates(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    pub fn applied_candidates(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .applied
            .iter()
            .map(|c| c.candidate.clone())
            .collect()
    }

    pub fn violations(&self) -> usize {
        self.violations.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerSession for FakeSession {
    fn peer_id(&self) -> &str {
        &self.peer_id
    }

    async fn add_track(&self, track: &MediaTrack) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.local.is_some() {
            self.violations.fetch_add(1, Ordering::SeqCst);
            return Err(Error::MediaTrackError(format!(
                "track {} attached after local description",
                track.id()
            )));
        }
        state.ops.push(Op::AddTrack(track.id().to_string()));
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        self.record(Op::CreateOffer);
        let n = self.offers.fetch_add(1, Ordering::SeqCst);
        Ok(SessionDescription::offer(format!(
            "v=0 offer for {} #{}",
            self.peer_id, n
        )))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.record(Op::CreateAnswer);
        let state = self.state.lock().unwrap();
        match &state.remote {
            Some(remote) if remote.kind == SdpKind::Offer => Ok(SessionDescription::answer(
                format!("v=0 answer to {}", remote.sdp),
            )),
            _ => Err(Error::SdpError("no remote offer to answer".to_string())),
        }
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(Op::SetLocal(description.kind));
        state.local = Some(description);
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(Op::SetRemote(description.kind));
        state.remote = Some(description);

        let pending: Vec<IceCandidate> = state.pending.drain(..).collect();
        state.applied.extend(pending);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(Op::AddCandidate(candidate.candidate.clone()));
        if state.remote.is_none() {
            state.pending.push(candidate);
        } else {
            state.applied.push(candidate);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record(Op::Close);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory keeping every session and observer it created
#[derive(Default)]
pub struct FakeSessionFactory {
    created: Mutex<Vec<(Arc<FakeSession>, SessionObserver)>>,
    refuse: Mutex<HashSet<String>>,
}

impl FakeSessionFactory {
    /// Make session creation fail for `peer_id`
    pub fn refuse(&self, peer_id: &str) {
        self.refuse.lock().unwrap().insert(peer_id.to_string());
    }

    /// Most recent session created for `peer_id`
    pub fn session(&self, peer_id: &str) -> Option<Arc<FakeSession>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(session, _)| session.peer_id == peer_id)
            .map(|(session, _)| Arc::clone(session))
    }

    /// Observer of the most recent session for `peer_id`
    pub fn observer(&self, peer_id: &str) -> Option<SessionObserver> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(session, _)| session.peer_id == peer_id)
            .map(|(_, observer)| observer.clone())
    }

    pub fn created_for(&self, peer_id: &str) -> usize {
        self.created
            .lock()
            .unwrap()
            .iter()
            .filter(|(session, _)| session.peer_id == peer_id)
            .count()
    }

    pub fn sessions(&self) -> Vec<Arc<FakeSession>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .map(|(session, _)| Arc::clone(session))
            .collect()
    }
}

#[async_trait]
impl SessionFactory for FakeSessionFactory {
    async fn create(
        &self,
        peer_id: &str,
        observer: SessionObserver,
    ) -> Result<Arc<dyn PeerSession>> {
        if self.refuse.lock().unwrap().contains(peer_id) {
            return Err(Error::PeerConnectionError(format!(
                "refusing session for {}",
                peer_id
            )));
        }

        let session = Arc::new(FakeSession::new(peer_id));
        self.created
            .lock()
            .unwrap()
            .push((Arc::clone(&session), observer));
        Ok(session)
    }
}

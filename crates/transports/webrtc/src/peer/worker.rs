//! Per-session negotiation worker
//!
//! Each session owns one worker task that runs negotiation steps strictly in
//! the order they were queued. Track attachment is queued when the session is
//! created, so it always runs before any description step.

use super::events::NegotiationOutcome;
use super::session::{PeerSession, SessionObserver};
use crate::media::MediaTrack;
use crate::signaling::{IceCandidate, SessionDescription};
use crate::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

/// One queued negotiation step
#[derive(Debug)]
pub(crate) enum NegotiationCommand {
    AttachTracks(Vec<MediaTrack>),

    /// Create a local offer and set it as local description
    Offer,

    /// Apply a remote offer, then create and set the local answer
    Answer(SessionDescription),

    /// Apply a remote answer
    ApplyAnswer(SessionDescription),

    AddCandidate(IceCandidate),
}

impl NegotiationCommand {
    fn step(&self) -> &'static str {
        match self {
            NegotiationCommand::AttachTracks(_) => "attach-tracks",
            NegotiationCommand::Offer => "offer",
            NegotiationCommand::Answer(_) => "answer",
            NegotiationCommand::ApplyAnswer(_) => "apply-answer",
            NegotiationCommand::AddCandidate(_) => "add-candidate",
        }
    }
}

/// Spawn the worker for a freshly created session
pub(crate) fn spawn(
    session: Arc<dyn PeerSession>,
    observer: SessionObserver,
    commands: mpsc::Receiver<NegotiationCommand>,
) -> JoinHandle<()> {
    tokio::spawn(run(session, observer, commands))
}

#[instrument(skip_all, fields(peer_id = %observer.peer_id(), generation = observer.generation()))]
async fn run(
    session: Arc<dyn PeerSession>,
    observer: SessionObserver,
    mut commands: mpsc::Receiver<NegotiationCommand>,
) {
    while let Some(command) = commands.recv().await {
        let step = command.step();

        let outcome = match execute(session.as_ref(), command).await {
            Ok(Some(outcome)) => outcome,
            Ok(None) => continue,
            Err(e) => NegotiationOutcome::Failed {
                step,
                error: e.to_string(),
            },
        };

        observer.negotiated(outcome).await;
    }

    debug!("Negotiation worker terminated");
}

async fn execute(
    session: &dyn PeerSession,
    command: NegotiationCommand,
) -> Result<Option<NegotiationOutcome>> {
    match command {
        NegotiationCommand::AttachTracks(tracks) => {
            for track in &tracks {
                session.add_track(track).await?;
            }
            debug!("Attached {} local track(s)", tracks.len());
            Ok(None)
        }
        NegotiationCommand::Offer => {
            let offer = session.create_offer().await?;
            session.set_local_description(offer.clone()).await?;
            Ok(Some(NegotiationOutcome::LocalDescription(offer)))
        }
        NegotiationCommand::Answer(remote) => {
            session.set_remote_description(remote).await?;
            let answer = session.create_answer().await?;
            session.set_local_description(answer.clone()).await?;
            Ok(Some(NegotiationOutcome::LocalDescription(answer)))
        }
        NegotiationCommand::ApplyAnswer(remote) => {
            session.set_remote_description(remote).await?;
            Ok(Some(NegotiationOutcome::RemoteApplied))
        }
        NegotiationCommand::AddCandidate(candidate) => {
            session.add_ice_candidate(candidate).await?;
            Ok(None)
        }
    }
}

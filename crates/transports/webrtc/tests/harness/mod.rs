//! Mesh manager test harness
//!
//! Runs a real [`MeshManager`] against in-memory doubles:
//! - a relay that records every outbound message and lets tests inject
//!   inbound ones
//! - a session factory whose sessions log every call and enforce that tracks
//!   are attached before any description is set
//! - a local media source that can be told to fail
//!
//! Basic usage pattern:
//!
//! 1. `MeshTestHarness::joined()` to get a manager that already joined
//! 2. `inject()` relay messages
//! 3. `next_outbound()` / `wait_until()` to observe the reaction
//! 4. inspect sessions through `harness.factory`

#![allow(dead_code)]

pub mod media;
pub mod relay;
pub mod session;

use meshcall_webrtc::{
    CandidatePayload, DescriptionPayload, IceCandidate, InboundMessage, MeshConfig, MeshHandle,
    MeshManager, OutboundMessage, PeerId, SessionDescription,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use media::FakeMedia;
pub use relay::FakeRelay;
pub use session::{FakeSession, FakeSessionFactory, Op};

/// Default wait for anything asynchronous
pub const STEP_TIMEOUT: Duration = Duration::from_secs(2);

/// Result type for test harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Error type for test harness operations
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Mesh error: {0}")]
    Mesh(#[from] meshcall_webrtc::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Relay error: {0}")]
    RelayError(String),

    #[error("Unexpected message: {0}")]
    Unexpected(String),
}

/// Initialize tracing for tests (safe to call from every test)
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug,webrtc=warn")
        .with_test_writer()
        .try_init();
}

/// A manager wired to fakes
pub struct MeshTestHarness {
    pub handle: MeshHandle,
    pub task: JoinHandle<()>,
    pub factory: Arc<FakeSessionFactory>,
    pub relay: Arc<FakeRelay>,
    pub media: Arc<FakeMedia>,
    inbound: Option<mpsc::Sender<InboundMessage>>,
    outbound: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl MeshTestHarness {
    /// Manager with default config and working media, not yet joined
    pub fn new() -> HarnessResult<Self> {
        Self::with(MeshConfig::default(), FakeMedia::available())
    }

    pub fn with(config: MeshConfig, media: FakeMedia) -> HarnessResult<Self> {
        init_test_tracing();

        let (relay, outbound) = FakeRelay::new();
        let relay = Arc::new(relay);
        let factory = Arc::new(FakeSessionFactory::default());
        let media = Arc::new(media);
        let (inbound_tx, inbound_rx) = mpsc::channel(64);

        let (handle, task) = MeshManager::spawn(
            config,
            relay.clone(),
            inbound_rx,
            media.clone(),
            factory.clone(),
        )?;

        Ok(Self {
            handle,
            task,
            factory,
            relay,
            media,
            inbound: Some(inbound_tx),
            outbound,
        })
    }

    /// Manager that has joined room 0 with local id `"A"`
    pub async fn joined() -> HarnessResult<Self> {
        let mut harness = Self::new()?;
        harness.inject(InboundMessage::Connected("A".to_string())).await?;
        harness.join().await?;
        Ok(harness)
    }

    /// Join and consume the resulting `join-room`
    pub async fn join(&mut self) -> HarnessResult<()> {
        self.handle.join().await?;
        match self.next_outbound().await? {
            OutboundMessage::JoinRoom(_) => Ok(()),
            other => Err(HarnessError::Unexpected(format!("{:?}", other))),
        }
    }

    /// Deliver a message as if it came from the relay
    pub async fn inject(&self, message: InboundMessage) -> HarnessResult<()> {
        let inbound = self
            .inbound
            .as_ref()
            .ok_or_else(|| HarnessError::RelayError("relay already closed".to_string()))?;

        inbound
            .send(message)
            .await
            .map_err(|e| HarnessError::RelayError(e.to_string()))
    }

    /// Drop the inbound half, as a lost WebSocket would
    pub fn close_relay(&mut self) {
        self.inbound = None;
    }

    /// Next message the manager sent to the relay
    pub async fn next_outbound(&mut self) -> HarnessResult<OutboundMessage> {
        tokio::time::timeout(STEP_TIMEOUT, self.outbound.recv())
            .await
            .map_err(|_| HarnessError::Timeout("no outbound message".to_string()))?
            .ok_or_else(|| HarnessError::RelayError("relay dropped".to_string()))
    }

    /// Collect the next `count` outbound messages
    pub async fn collect_outbound(&mut self, count: usize) -> HarnessResult<Vec<OutboundMessage>> {
        let mut messages = Vec::with_capacity(count);
        for _ in 0..count {
            messages.push(self.next_outbound().await?);
        }
        Ok(messages)
    }

    /// Assert nothing is sent for a short while
    pub async fn expect_silence(&mut self, window: Duration) -> HarnessResult<()> {
        match tokio::time::timeout(window, self.outbound.recv()).await {
            Err(_) => Ok(()),
            Ok(None) => Ok(()),
            Ok(Some(message)) => Err(HarnessError::Unexpected(format!("{:?}", message))),
        }
    }

    /// Inject `on-join` and wait for one offer per listed peer
    pub async fn join_peers(&mut self, peers: &[&str]) -> HarnessResult<Vec<DescriptionPayload>> {
        self.inject(InboundMessage::Joined(Some(
            peers.iter().map(|p| p.to_string()).collect(),
        )))
        .await?;

        let mut offers = Vec::new();
        for message in self.collect_outbound(peers.len()).await? {
            match message {
                OutboundMessage::TransferOffer(payload) => offers.push(payload),
                other => return Err(HarnessError::Unexpected(format!("{:?}", other))),
            }
        }
        offers.sort_by(|a, b| a.receiver_id.cmp(&b.receiver_id));
        Ok(offers)
    }

    pub async fn peer_ids(&self) -> HarnessResult<Vec<PeerId>> {
        Ok(self.handle.peer_ids().await?)
    }

    /// Poll `check` until it returns true
    pub async fn wait_until<F, Fut>(&self, what: &str, mut check: F) -> HarnessResult<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        tokio::time::timeout(STEP_TIMEOUT, async {
            while !check().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .map_err(|_| HarnessError::Timeout(what.to_string()))
    }

    pub async fn shutdown(self) {
        let _ = self.handle.shutdown().await;
        let _ = self.task.await;
    }
}

/// Inbound offer from `sender` to `receiver`
pub fn offer_from(sender: &str, receiver: &str, sdp: &str) -> InboundMessage {
    InboundMessage::Offer(DescriptionPayload {
        description: SessionDescription::offer(sdp),
        sender_id: sender.to_string(),
        receiver_id: receiver.to_string(),
    })
}

/// Inbound answer from `sender` to `receiver`
pub fn answer_from(sender: &str, receiver: &str, sdp: &str) -> InboundMessage {
    InboundMessage::Answer(DescriptionPayload {
        description: SessionDescription::answer(sdp),
        sender_id: sender.to_string(),
        receiver_id: receiver.to_string(),
    })
}

/// Inbound candidate from `sender` to `receiver`
pub fn candidate_from(sender: &str, receiver: &str, candidate: &str) -> InboundMessage {
    InboundMessage::Candidate(CandidatePayload {
        candidate: IceCandidate {
            candidate: candidate.to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        },
        sender_id: sender.to_string(),
        receiver_id: receiver.to_string(),
    })
}

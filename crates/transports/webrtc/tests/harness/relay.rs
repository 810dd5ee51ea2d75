//! In-memory relay recording outbound traffic

use async_trait::async_trait;
use meshcall_webrtc::{Error, OutboundMessage, Result, SignalingChannel};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// Relay double: every sent message is forwarded to the test
pub struct FakeRelay {
    outbound: mpsc::UnboundedSender<OutboundMessage>,

    /// When set, sends fail as if the socket were gone
    broken: AtomicBool,
}

impl FakeRelay {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound,
                broken: AtomicBool::new(false),
            },
            rx,
        )
    }

    pub fn break_sends(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SignalingChannel for FakeRelay {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(Error::ChannelLost("relay unreachable".to_string()));
        }

        self.outbound
            .send(message)
            .map_err(|e| Error::ChannelLost(format!("test dropped relay: {}", e)))
    }
}

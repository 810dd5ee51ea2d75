//! Signaling channel contract consumed by the lifecycle manager

use super::protocol::{InboundMessage, OutboundMessage};
use crate::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Stream of relay messages delivered to the manager.
///
/// The sending half lives in the channel adapter; when it is dropped the
/// manager treats the relay as lost.
pub type InboundReceiver = mpsc::Receiver<InboundMessage>;

/// Outbound half of the relay connection.
///
/// Implementations only need to deliver messages in order; they never
/// interpret them.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Send one message to the relay
    async fn send(&self, message: OutboundMessage) -> Result<()>;
}

//! WebSocket relay client

use super::channel::{InboundReceiver, SignalingChannel};
use super::protocol::{InboundMessage, OutboundMessage};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// WebSocket client speaking the relay's envelope protocol
pub struct SignalingClient {
    /// Outgoing frame sender
    tx: mpsc::UnboundedSender<Message>,
}

impl SignalingClient {
    /// Connect to the relay
    ///
    /// Spawns a sender and a receiver task. Parsed inbound messages are
    /// delivered on the returned receiver; malformed frames are logged and
    /// dropped. When the socket closes or errors, a single
    /// [`InboundMessage::Disconnect`] is delivered and the receiver ends.
    pub async fn connect(url: &str, inbound_capacity: usize) -> Result<(Self, InboundReceiver)> {
        info!("Connecting to signaling relay: {}", url);

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::WebSocketError(format!("Failed to connect: {}", e)))?;

        info!("Connected to signaling relay");

        let (write, read) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(inbound_capacity.max(1));

        tokio::spawn(Self::sender_task(write, rx));
        tokio::spawn(Self::receiver_task(read, inbound_tx));

        Ok((Self { tx }, inbound_rx))
    }

    /// Sender task: sends frames from channel to WebSocket
    async fn sender_task(
        mut write: futures::stream::SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = write.send(msg).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }

        let _ = write.close().await;
        debug!("Sender task terminated");
    }

    /// Receiver task: parses frames and forwards them to the manager
    async fn receiver_task(
        mut read: futures::stream::SplitStream<WsStream>,
        inbound: mpsc::Sender<InboundMessage>,
    ) {
        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(Message::Text(text)) => match parse_frame(&text) {
                    Some(InboundMessage::Disconnect) => {
                        info!("Relay requested disconnect");
                        break;
                    }
                    Some(message) => {
                        if inbound.send(message).await.is_err() {
                            debug!("Inbound receiver dropped, stopping relay reader");
                            return;
                        }
                    }
                    None => {}
                },
                Ok(Message::Close(_)) => {
                    info!("WebSocket connection closed");
                    break;
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }

        let _ = inbound.send(InboundMessage::Disconnect).await;
        debug!("Receiver task terminated");
    }
}

/// Parse one text frame, logging and dropping anything malformed
fn parse_frame(text: &str) -> Option<InboundMessage> {
    debug!("Received signaling message: {}", text);

    match InboundMessage::from_json(text) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!("Dropping signaling message: {}", e);
            None
        }
    }
}

#[async_trait]
impl SignalingChannel for SignalingClient {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        let json = message.to_json()?;
        debug!("Sending signaling message: {}", json);

        self.tx
            .send(Message::Text(json))
            .map_err(|e| Error::ChannelLost(format!("Failed to send message: {}", e)))?;

        Ok(())
    }
}

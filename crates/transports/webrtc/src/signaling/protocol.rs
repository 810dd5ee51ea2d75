//! Relay wire protocol: named message types carried in JSON envelopes
//!
//! Every frame is `{"type": "<name>", "payload": <json>}`. Payload shapes
//! follow the browser `RTCSessionDescriptionInit` / `RTCIceCandidateInit`
//! conventions so relays written for web clients can forward them untouched.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Participant identifier assigned by the relay
pub type PeerId = String;

/// Room identifier
pub type RoomId = u64;

/// Outbound message type names
pub mod outbound {
    pub const JOIN_ROOM: &str = "join-room";
    pub const CREATE_ROOM: &str = "create-room";
    pub const TRANSFER_OFFER: &str = "transfer-offer";
    pub const TRANSFER_ANSWER: &str = "transfer-answer";
    pub const TRANSFER_CANDIDATE: &str = "transfer-candidate";
    pub const REMOVE_CONNECTION: &str = "remove-connection";
}

/// Inbound message type names
pub mod inbound {
    pub const ON_CONNECT: &str = "on-connect";
    pub const ON_CREATE: &str = "on-create";
    pub const ON_JOIN: &str = "on-join";
    pub const ON_RECEIVED_OFFER: &str = "on-received-offer";
    pub const ON_RECEIVED_ANSWER: &str = "on-received-answer";
    pub const ON_RECEIVED_CANDIDATE: &str = "on-received-candidate";
    pub const ON_USER_DISCONNECT: &str = "on-user-disconnect";
    pub const DISCONNECT: &str = "disconnect";
}

/// Offer or answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// A session description exchanged during negotiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// A connectivity candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,

    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,

    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }
}

/// Payload of `transfer-offer` / `transfer-answer` and their inbound twins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptionPayload {
    pub description: SessionDescription,
    pub sender_id: PeerId,
    #[serde(default)]
    pub receiver_id: PeerId,
}

/// Payload of `transfer-candidate` / `on-received-candidate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePayload {
    pub candidate: IceCandidate,
    pub sender_id: PeerId,
    #[serde(default)]
    pub receiver_id: PeerId,
}

/// Payload of the optional `on-connect` handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ConnectPayload {
    id: PeerId,
}

/// Raw envelope as it travels over the relay
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    payload: serde_json::Value,
}

/// Messages the client sends to the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    JoinRoom(RoomId),
    CreateRoom(RoomId),
    TransferOffer(DescriptionPayload),
    TransferAnswer(DescriptionPayload),
    TransferCandidate(CandidatePayload),
    RemoveConnection(PeerId),
}

/// Messages the relay delivers to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Relay announces the local participant id
    Connected(PeerId),
    /// Room creation acknowledged
    RoomCreated(RoomId),
    /// Join result; `None` or an empty list means the room was empty
    Joined(Option<Vec<PeerId>>),
    Offer(DescriptionPayload),
    Answer(DescriptionPayload),
    Candidate(CandidatePayload),
    UserDisconnected(PeerId),
    /// Channel-level loss
    Disconnect,
}

impl OutboundMessage {
    /// Get the wire type name
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundMessage::JoinRoom(_) => outbound::JOIN_ROOM,
            OutboundMessage::CreateRoom(_) => outbound::CREATE_ROOM,
            OutboundMessage::TransferOffer(_) => outbound::TRANSFER_OFFER,
            OutboundMessage::TransferAnswer(_) => outbound::TRANSFER_ANSWER,
            OutboundMessage::TransferCandidate(_) => outbound::TRANSFER_CANDIDATE,
            OutboundMessage::RemoveConnection(_) => outbound::REMOVE_CONNECTION,
        }
    }

    /// Convert message to a JSON envelope string
    pub fn to_json(&self) -> Result<String> {
        let payload = match self {
            OutboundMessage::JoinRoom(room) | OutboundMessage::CreateRoom(room) => {
                serde_json::to_value(room)
            }
            OutboundMessage::TransferOffer(p) | OutboundMessage::TransferAnswer(p) => {
                serde_json::to_value(p)
            }
            OutboundMessage::TransferCandidate(p) => serde_json::to_value(p),
            OutboundMessage::RemoveConnection(peer_id) => serde_json::to_value(peer_id),
        }
        .map_err(|e| Error::SerializationError(format!("Failed to encode payload: {}", e)))?;

        let envelope = Envelope {
            kind: self.type_name().to_string(),
            payload,
        };

        serde_json::to_string(&envelope).map_err(|e| {
            Error::SerializationError(format!("Failed to serialize signaling message: {}", e))
        })
    }
}

impl InboundMessage {
    /// Get the wire type name
    pub fn type_name(&self) -> &'static str {
        match self {
            InboundMessage::Connected(_) => inbound::ON_CONNECT,
            InboundMessage::RoomCreated(_) => inbound::ON_CREATE,
            InboundMessage::Joined(_) => inbound::ON_JOIN,
            InboundMessage::Offer(_) => inbound::ON_RECEIVED_OFFER,
            InboundMessage::Answer(_) => inbound::ON_RECEIVED_ANSWER,
            InboundMessage::Candidate(_) => inbound::ON_RECEIVED_CANDIDATE,
            InboundMessage::UserDisconnected(_) => inbound::ON_USER_DISCONNECT,
            InboundMessage::Disconnect => inbound::DISCONNECT,
        }
    }

    /// Parse and validate a relay frame.
    ///
    /// Unknown types and payloads that do not match their type's shape are
    /// reported as [`Error::MalformedMessage`]; the caller drops them.
    pub fn from_json(json: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(json)
            .map_err(|e| Error::MalformedMessage(format!("Invalid envelope: {}", e)))?;

        let payload = envelope.payload;
        let message = match envelope.kind.as_str() {
            inbound::ON_CONNECT => {
                let p: ConnectPayload = decode(&envelope.kind, payload)?;
                InboundMessage::Connected(p.id)
            }
            inbound::ON_CREATE => InboundMessage::RoomCreated(decode(&envelope.kind, payload)?),
            inbound::ON_JOIN => InboundMessage::Joined(decode(&envelope.kind, payload)?),
            inbound::ON_RECEIVED_OFFER => InboundMessage::Offer(decode(&envelope.kind, payload)?),
            inbound::ON_RECEIVED_ANSWER => {
                InboundMessage::Answer(decode(&envelope.kind, payload)?)
            }
            inbound::ON_RECEIVED_CANDIDATE => {
                InboundMessage::Candidate(decode(&envelope.kind, payload)?)
            }
            inbound::ON_USER_DISCONNECT => {
                InboundMessage::UserDisconnected(decode(&envelope.kind, payload)?)
            }
            inbound::DISCONNECT => InboundMessage::Disconnect,
            other => {
                return Err(Error::MalformedMessage(format!(
                    "Unknown message type: {}",
                    other
                )))
            }
        };

        message.validate()?;
        Ok(message)
    }

    /// Reject messages whose fields parse but make no sense
    pub fn validate(&self) -> Result<()> {
        match self {
            InboundMessage::Connected(id) | InboundMessage::UserDisconnected(id) => {
                require_id(self.type_name(), "participant id", id)
            }
            InboundMessage::Joined(Some(ids)) => ids
                .iter()
                .try_for_each(|id| require_id(self.type_name(), "participant id", id)),
            InboundMessage::Offer(p) => validate_description(self.type_name(), p, SdpKind::Offer),
            InboundMessage::Answer(p) => {
                validate_description(self.type_name(), p, SdpKind::Answer)
            }
            InboundMessage::Candidate(p) => {
                require_id(self.type_name(), "senderId", &p.sender_id)?;
                if p.candidate.candidate.is_empty() {
                    return Err(Error::MalformedMessage(format!(
                        "{}: empty candidate",
                        self.type_name()
                    )));
                }
                Ok(())
            }
            InboundMessage::RoomCreated(_)
            | InboundMessage::Joined(None)
            | InboundMessage::Disconnect => Ok(()),
        }
    }

    /// Sender/receiver pair for addressed messages
    pub fn addressing(&self) -> Option<(&str, &str)> {
        match self {
            InboundMessage::Offer(p) | InboundMessage::Answer(p) => {
                Some((p.sender_id.as_str(), p.receiver_id.as_str()))
            }
            InboundMessage::Candidate(p) => Some((p.sender_id.as_str(), p.receiver_id.as_str())),
            _ => None,
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(kind: &str, payload: serde_json::Value) -> Result<T> {
    serde_json::from_value(payload)
        .map_err(|e| Error::MalformedMessage(format!("Invalid {} payload: {}", kind, e)))
}

fn require_id(kind: &str, field: &str, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::MalformedMessage(format!("{}: missing {}", kind, field)));
    }
    Ok(())
}

fn validate_description(kind: &str, payload: &DescriptionPayload, expected: SdpKind) -> Result<()> {
    require_id(kind, "senderId", &payload.sender_id)?;

    if payload.description.kind != expected {
        return Err(Error::MalformedMessage(format!(
            "{}: expected {:?} description, got {:?}",
            kind, expected, payload.description.kind
        )));
    }

    if payload.description.sdp.trim().is_empty() {
        return Err(Error::MalformedMessage(format!("{}: empty sdp", kind)));
    }

    Ok(())
}

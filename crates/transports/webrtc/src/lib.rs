//! Mesh room signaling and peer session lifecycle
//!
//! Every participant in a room keeps one WebRTC session per other
//! participant. A central relay only forwards descriptions and candidates;
//! this crate decides when sessions are created, negotiated and torn down.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  Relay (WebSocket, JSON envelopes)                   │
//! │  ↕                                                   │
//! │  SignalingClient ── InboundReceiver ──┐              │
//! │                                       ↓              │
//! │  MeshHandle ── commands ──→ MeshManager (actor)      │
//! │                              ├─ PeerRegistry         │
//! │                              │   ├─ sessions         │
//! │                              │   └─ remote streams   │
//! │                              └─ per-peer workers     │
//! │                                  ↓                   │
//! │                          PeerSession (webrtc-rs)     │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use meshcall_webrtc::MeshConfig;
//!
//! let config = MeshConfig::default()
//!     .with_signaling_url("wss://relay.example.com")
//!     .with_rooms(0, 1);
//!
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Async Usage
//!
//! ```no_run
//! use meshcall_webrtc::{MeshConfig, MeshManager};
//!
//! # async fn example() -> meshcall_webrtc::Result<()> {
//! meshcall_webrtc::init_tracing();
//!
//! let (mesh, task) = MeshManager::connect(MeshConfig::default()).await?;
//! mesh.join().await?;
//!
//! // ... later
//! mesh.leave().await?;
//! mesh.shutdown().await?;
//! let _ = task.await;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod media;
pub mod peer;
pub mod signaling;

pub use config::{MediaConstraints, MeshConfig, TurnServerConfig};
pub use error::{Error, Result};
pub use media::{
    LocalMedia, LocalStream, MediaKind, MediaTrack, RemoteStream, RemoteTrack, SampleTrackSource,
};
pub use peer::{
    ConnectionState, MeshHandle, MeshManager, PeerSession, PeerState, Role, RtcPeerSession,
    RtcSessionFactory, SessionFactory, SessionObserver,
};
pub use signaling::{
    CandidatePayload, DescriptionPayload, IceCandidate, InboundMessage, InboundReceiver,
    OutboundMessage, PeerId, RoomId, SdpKind, SessionDescription, SignalingChannel,
    SignalingClient,
};

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

//! Per-peer session lifecycle
//!
//! Handles session creation, negotiation ordering and teardown for every
//! remote participant in the room.

pub mod connection;
mod events;
pub mod manager;
mod registry;
pub mod session;
#[cfg(test)]
mod testing;
mod worker;

pub use connection::{RtcPeerSession, RtcSessionFactory};
pub use manager::{MeshHandle, MeshManager};
pub use registry::{PeerState, Role};
pub use session::{ConnectionState, PeerSession, SessionFactory, SessionObserver};

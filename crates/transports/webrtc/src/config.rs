//! Configuration types for the mesh client

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for a mesh room client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// WebSocket relay URL (ws:// or wss://)
    pub signaling_url: String,

    /// STUN server URLs
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// Room to join on startup (default: 0)
    pub join_room_id: u64,

    /// Room to request when the joined room turns out empty (default: 1)
    pub create_room_id: u64,

    /// Which local tracks to capture
    pub media: MediaConstraints,

    /// Maximum simultaneous peer sessions (default: 16, range: 1-64)
    pub max_peers: u32,

    /// Capacity of the manager's event queue (default: 256)
    pub event_queue_capacity: usize,

    /// Capacity of each session's negotiation queue (default: 64)
    pub session_queue_capacity: usize,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnServerConfig {
    /// TURN server URL (turn: or turns:)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

/// Local capture constraints passed to the media source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    /// Capture a microphone track
    pub audio: bool,

    /// Capture a camera track
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            signaling_url: "ws://localhost:8080".to_string(),
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: Vec::new(),
            join_room_id: 0,
            create_room_id: 1,
            media: MediaConstraints::default(),
            max_peers: 16,
            event_queue_capacity: 256,
            session_queue_capacity: 64,
        }
    }
}

impl MeshConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `signaling_url` is not a WebSocket URL
    /// - a STUN or TURN URL has the wrong scheme
    /// - neither audio nor video is requested
    /// - `max_peers` is not in range 1-64
    /// - a queue capacity is zero
    pub fn validate(&self) -> Result<()> {
        if !self.signaling_url.starts_with("ws://") && !self.signaling_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "signaling_url must start with ws:// or wss://, got {}",
                self.signaling_url
            )));
        }

        if let Some(bad) = self
            .stun_servers
            .iter()
            .find(|url| !url.starts_with("stun:") && !url.starts_with("stuns:"))
        {
            return Err(Error::InvalidConfig(format!(
                "STUN server URL must start with stun: or stuns:, got {}",
                bad
            )));
        }

        if let Some(bad) = self
            .turn_servers
            .iter()
            .find(|turn| !turn.url.starts_with("turn:") && !turn.url.starts_with("turns:"))
        {
            return Err(Error::InvalidConfig(format!(
                "TURN server URL must start with turn: or turns:, got {}",
                bad.url
            )));
        }

        if !self.media.audio && !self.media.video {
            return Err(Error::InvalidConfig(
                "At least one of media.audio or media.video must be enabled".to_string(),
            ));
        }

        if self.max_peers == 0 || self.max_peers > 64 {
            return Err(Error::InvalidConfig(format!(
                "max_peers must be in range 1-64, got {}",
                self.max_peers
            )));
        }

        if self.event_queue_capacity == 0 || self.session_queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "queue capacities must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Parse a configuration from JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfig(format!("Failed to parse JSON config: {}", e)))
    }

    /// Parse a configuration from YAML
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::InvalidConfig(format!("Failed to parse YAML config: {}", e)))
    }

    /// Load a configuration file, picking the format from its extension
    /// (`.yaml`/`.yml`, anything else is read as JSON) and validating it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&contents)?,
            _ => Self::from_json_str(&contents)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Set the relay URL
    pub fn with_signaling_url(mut self, url: &str) -> Self {
        self.signaling_url = url.to_string();
        self
    }

    /// Add TURN servers to this configuration
    pub fn with_turn_servers(mut self, turn_servers: Vec<TurnServerConfig>) -> Self {
        self.turn_servers = turn_servers;
        self
    }

    /// Set the capture constraints
    pub fn with_media(mut self, audio: bool, video: bool) -> Self {
        self.media = MediaConstraints { audio, video };
        self
    }

    /// Set the maximum number of peers
    pub fn with_max_peers(mut self, max_peers: u32) -> Self {
        self.max_peers = max_peers;
        self
    }

    /// Set the join / create room identifiers
    pub fn with_rooms(mut self, join_room_id: u64, create_room_id: u64) -> Self {
        self.join_room_id = join_room_id;
        self.create_room_id = create_room_id;
        self
    }
}

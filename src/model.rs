//! Payloads sent over and received from a node's control connection.
//!
//! Outgoing payloads are tagged by their `op` field when serialized. Incoming
//! frames are classified from the raw JSON first, since unknown operations
//! are dropped rather than treated as malformed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;
use crate::Error;

/// A command sent to a node.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "op")]
pub enum OutgoingMessage {
    #[serde(rename = "destroy")]
    Destroy(Destroy),
    #[serde(rename = "equalizer")]
    Equalizer(EqualizerUpdate),
    #[serde(rename = "pause")]
    Pause(Pause),
    #[serde(rename = "play")]
    Play(Play),
    #[serde(rename = "seek")]
    Seek(Seek),
    #[serde(rename = "stop")]
    Stop(Stop),
    #[serde(rename = "voiceUpdate")]
    VoiceUpdate(VoiceUpdate),
    #[serde(rename = "volume")]
    Volume(Volume),
}

impl OutgoingMessage {
    /// The guild the command targets.
    pub fn guild_id(&self) -> &str {
        match self {
            OutgoingMessage::Destroy(msg) => &msg.guild_id,
            OutgoingMessage::Equalizer(msg) => &msg.guild_id,
            OutgoingMessage::Pause(msg) => &msg.guild_id,
            OutgoingMessage::Play(msg) => &msg.guild_id,
            OutgoingMessage::Seek(msg) => &msg.guild_id,
            OutgoingMessage::Stop(msg) => &msg.guild_id,
            OutgoingMessage::VoiceUpdate(msg) => &msg.guild_id,
            OutgoingMessage::Volume(msg) => &msg.guild_id,
        }
    }

    /// Serializes the command into a WebSocket text frame.
    pub fn into_ws_message(&self) -> Result<Message, Error> {
        serde_json::to_string(self).map(Message::text).map_err(From::from)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Destroy {
    pub guild_id: String,
}

impl Destroy {
    pub fn new(guild_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Band {
    pub band: u8,
    pub gain: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EqualizerUpdate {
    pub guild_id: String,
    pub bands: Vec<Band>,
}

impl EqualizerUpdate {
    pub fn new(guild_id: impl Into<String>, bands: Vec<Band>) -> Self {
        Self {
            guild_id: guild_id.into(),
            bands,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pause {
    pub guild_id: String,
    pub pause: bool,
}

impl Pause {
    pub fn new(guild_id: impl Into<String>, pause: bool) -> Self {
        Self {
            guild_id: guild_id.into(),
            pause,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Play {
    pub guild_id: String,
    pub track: String,
    pub no_replace: bool,
    pub start_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u16>,
}

impl Play {
    pub fn new(
        guild_id: impl Into<String>,
        track: impl Into<String>,
        start_time: u64,
        end_time: Option<u64>,
    ) -> Self {
        Self {
            guild_id: guild_id.into(),
            track: track.into(),
            no_replace: false,
            start_time,
            end_time,
            pause: None,
            volume: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Seek {
    pub guild_id: String,
    pub position: u64,
}

impl Seek {
    pub fn new(guild_id: impl Into<String>, position: u64) -> Self {
        Self {
            guild_id: guild_id.into(),
            position,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    pub guild_id: String,
}

impl Stop {
    pub fn new(guild_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
        }
    }
}

/// Voice credentials forwarded verbatim from the host's voice gateway.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceUpdate {
    pub guild_id: String,
    pub session_id: String,
    pub event: Value,
}

impl VoiceUpdate {
    pub fn new(guild_id: impl Into<String>, session_id: impl Into<String>, event: Value) -> Self {
        Self {
            guild_id: guild_id.into(),
            session_id: session_id.into(),
            event,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub guild_id: String,
    pub volume: u16,
}

impl Volume {
    pub fn new(guild_id: impl Into<String>, volume: u16) -> Self {
        Self {
            guild_id: guild_id.into(),
            volume,
        }
    }
}

/// Position heartbeat for a player.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
    pub guild_id: String,
    pub state: PlayerUpdateState,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PlayerUpdateState {
    #[serde(default)]
    pub time: u64,
    #[serde(default)]
    pub position: u64,
    #[serde(default)]
    pub connected: Option<bool>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStartEvent {
    pub guild_id: String,
    #[serde(default)]
    pub track: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEndEvent {
    pub guild_id: String,
    #[serde(default)]
    pub track: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TrackExceptionInfo {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub cause: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackExceptionEvent {
    pub guild_id: String,
    #[serde(default)]
    pub track: String,
    /// Older servers send a bare error string.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub exception: Option<TrackExceptionInfo>,
}

impl TrackExceptionEvent {
    pub fn description(&self) -> String {
        self.exception
            .as_ref()
            .and_then(|exception| exception.message.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "unknown error".to_owned())
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStuckEvent {
    pub guild_id: String,
    #[serde(default)]
    pub track: String,
    #[serde(default)]
    pub threshold_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketClosedEvent {
    pub guild_id: String,
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub by_remote: bool,
}

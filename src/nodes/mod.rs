mod node;
mod node_manager;

pub use self::node::Node;
pub use self::node_manager::NodeManager;

use serde::Deserialize;
use std::time::Duration;

/// Connection details for a single node.
#[derive(Clone, Debug, Deserialize)]
pub struct NodeConfig {
    /// A unique name for the node.
    pub identifier: String,
    pub host: String,
    pub port: u16,
    /// The password sent as the `Authorization` header.
    pub password: String,
    /// The ID of the bot user the node plays audio for.
    pub user_id: String,
    #[serde(default = "default_num_shards")]
    pub num_shards: u64,
    #[serde(default)]
    pub region: Option<String>,
    /// Overrides the query endpoint address, `http://{host}:{port}` by
    /// default.
    #[serde(default)]
    pub http_host: Option<String>,
    /// Overrides the control connection address, `ws://{host}:{port}` by
    /// default.
    #[serde(default)]
    pub websocket_host: Option<String>,
}

fn default_num_shards() -> u64 {
    1
}

impl NodeConfig {
    pub fn new(
        identifier: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        password: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            host: host.into(),
            port,
            password: password.into(),
            user_id: user_id.into(),
            num_shards: default_num_shards(),
            region: None,
            http_host: None,
            websocket_host: None,
        }
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());

        self
    }

    /// The base address of the node's query endpoint, without a trailing
    /// slash.
    pub fn http_url(&self) -> String {
        match self.http_host {
            Some(ref host) => host.trim_end_matches('/').to_owned(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }

    pub fn websocket_url(&self) -> String {
        match self.websocket_host {
            Some(ref host) => host.clone(),
            None => format!("ws://{}:{}", self.host, self.port),
        }
    }
}

/// The connection state of a [`Node`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeState {
    Disconnected,
    Connecting,
    Connected,
    /// The node was removed and will not reconnect.
    Closed,
}

/// Load statistics periodically pushed by a node.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    #[serde(default)]
    pub players: u32,
    #[serde(default)]
    pub playing_players: u32,
    #[serde(default)]
    pub uptime: u64,
    #[serde(default)]
    pub memory: Memory,
    #[serde(default)]
    pub cpu: Cpu,
    #[serde(default)]
    pub frame_stats: Option<FrameStats>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Memory {
    #[serde(default)]
    pub free: u64,
    #[serde(default)]
    pub used: u64,
    #[serde(default)]
    pub allocated: u64,
    #[serde(default)]
    pub reservable: u64,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cpu {
    #[serde(default)]
    pub cores: u32,
    /// System-wide load, from `0.0` to `1.0`.
    #[serde(default)]
    pub system_load: f64,
    #[serde(default)]
    pub lavalink_load: f64,
}

/// Audio frame statistics, averaged per player over the last minute.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct FrameStats {
    #[serde(default)]
    pub sent: i64,
    #[serde(default)]
    pub nulled: i64,
    #[serde(default)]
    pub deficit: i64,
}

/// Multipliers for each component of a node's load penalty.
///
/// Setting a weight to `0.0` removes that component from node selection.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PenaltyWeights {
    pub players: f64,
    pub cpu: f64,
    pub memory: f64,
    pub frames: f64,
}

impl Default for PenaltyWeights {
    fn default() -> Self {
        Self {
            players: 1.0,
            cpu: 1.0,
            memory: 0.5,
            frames: 1.0,
        }
    }
}

impl Stats {
    /// Computes the load penalty of the node. Lower is better.
    ///
    /// CPU and frame penalties grow exponentially, so a node close to
    /// saturation is avoided well before it is full.
    pub fn penalty(&self, weights: &PenaltyWeights) -> f64 {
        let players = f64::from(self.playing_players);
        let cpu = 1.05f64.powf(100.0 * self.cpu.system_load) * 10.0 - 10.0;
        let memory = if self.memory.reservable > 0 {
            self.memory.used as f64 / self.memory.reservable as f64 * 100.0
        } else {
            0.0
        };
        let frames = match self.frame_stats {
            Some(ref frames) => {
                let deficit = 1.03f64.powf(500.0 * (frames.deficit as f64 / 3000.0)) * 600.0 - 600.0;
                let nulled = (1.03f64.powf(500.0 * (frames.nulled as f64 / 3000.0)) * 300.0 - 300.0) * 2.0;

                deficit + nulled
            },
            None => 0.0,
        };

        players * weights.players
            + cpu * weights.cpu
            + memory * weights.memory
            + frames * weights.frames
    }
}

/// Exponential reconnection delays, doubling up to a cap.
#[derive(Clone, Debug)]
pub(crate) struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Returns the delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.max);
        self.current = self.current.saturating_mul(2).min(self.max);

        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

//! Client-wide configuration, optionally loaded from TOML.
//!
//! ```toml
//! migrate_on_disconnect = true
//! command_timeout_ms = 3000
//!
//! [penalty]
//! memory = 0.0
//!
//! [[nodes]]
//! identifier = "main"
//! host = "localhost"
//! port = 2333
//! password = "youshallnotpass"
//! user_id = "1234"
//! region = "eu"
//! ```

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use crate::nodes::{NodeConfig, PenaltyWeights};
use crate::Error;

/// Timeouts, reconnection and load-balancing settings shared by every node.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub connect_timeout_ms: u64,
    pub command_timeout_ms: u64,
    pub query_timeout_ms: u64,
    /// The first reconnection delay. Doubles after every failed attempt.
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    /// Whether players on a lost node are moved to another node instead of
    /// being destroyed.
    pub migrate_on_disconnect: bool,
    pub penalty: PenaltyWeights,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            command_timeout_ms: 5_000,
            query_timeout_ms: 10_000,
            reconnect_initial_ms: 1_000,
            reconnect_max_ms: 60_000,
            migrate_on_disconnect: false,
            penalty: PenaltyWeights::default(),
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }
}

/// A client configuration together with the nodes to register.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub client: ClientConfig,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

impl Config {
    pub fn from_toml_str(toml: &str) -> Result<Self, Error> {
        toml::from_str(toml).map_err(From::from)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;

        Self::from_toml_str(&contents)
    }
}

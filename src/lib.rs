//! Client-side management of Lavalink audio nodes.
//!
//! A [`NodeManager`] keeps a control connection to each registered node,
//! reconnecting with backoff, and picks the least loaded node for each new
//! [`AudioPlayer`]. Frames from nodes update players and are delivered to
//! registered [`EventHandler`]s as typed [`Event`]s.
//!
//! [`NodeManager`]: nodes::NodeManager
//! [`AudioPlayer`]: player::AudioPlayer

#[macro_use] extern crate log;

pub mod config;
pub mod equalizer;
pub mod events;
pub mod model;
pub mod nodes;
pub mod player;
pub mod resolver;
pub mod track;

mod dispatcher;
mod error;
mod event_handler;

pub use self::config::{ClientConfig, Config};
pub use self::equalizer::Equalizer;
pub use self::error::Error;
pub use self::event_handler::{EventHandler, Listeners};
pub use self::events::{Event, EventKind, TrackEndReason};
pub use self::nodes::{Node, NodeConfig, NodeManager, NodeState};
pub use self::player::{AudioPlayer, PlayOptions, PlayerStatus};
pub use self::resolver::{SearchSource, TrackResolver};
pub use self::track::{LoadResult, Track, TrackPlaylist};

//! Classification and routing of frames received from nodes.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{Arc, Weak};
use crate::event_handler::Listeners;
use crate::events::Event;
use crate::model::{
    PlayerUpdate,
    TrackEndEvent,
    TrackExceptionEvent,
    TrackStartEvent,
    TrackStuckEvent,
    WebSocketClosedEvent,
};
use crate::nodes::{Node, Stats};
use crate::player::{AudioPlayer, AudioPlayerManager};

/// Routes frames from every node's read loop to players, node statistics and
/// event handlers.
///
/// Handling never waits on a player command or an event handler, so a busy
/// player or a slow handler can't stall a node's read loop. Malformed and
/// unknown frames are logged and dropped.
pub struct Dispatcher {
    players: Weak<AudioPlayerManager>,
    listeners: Arc<Listeners>,
}

impl Dispatcher {
    /// The player map is held weakly, since players own the nodes that own
    /// the dispatcher.
    pub fn new(players: Weak<AudioPlayerManager>, listeners: Arc<Listeners>) -> Self {
        Self {
            players,
            listeners,
        }
    }

    pub fn handle_message(&self, node: &Node, text: &str) {
        let json = match serde_json::from_str::<Value>(text) {
            Ok(json) => json,
            Err(why) => {
                warn!("[{}] Error parsing received JSON: {:?}", node.identifier(), why);

                return;
            },
        };

        let op = match json.get("op").and_then(Value::as_str) {
            Some(op) => op.to_owned(),
            None => {
                warn!("[{}] No opcode present in payload: {:?}", node.identifier(), json);

                return;
            },
        };

        match op.as_str() {
            "playerUpdate" => self.handle_player_update(node, json),
            "stats" => self.handle_stats(node, json),
            "event" => self.handle_event(node, json),
            other => {
                warn!("[{}] Unknown opcode {:?}, dropping", node.identifier(), other);
            },
        }
    }

    fn handle_player_update(&self, node: &Node, json: Value) {
        let update = match parse::<PlayerUpdate>(node, json) {
            Some(update) => update,
            None => return,
        };

        if let Some(player) = self.bound_player(node, &update.guild_id) {
            player.update_state(&update.state);
        }
    }

    fn handle_stats(&self, node: &Node, json: Value) {
        if let Some(stats) = parse::<Stats>(node, json) {
            trace!(
                "[{}] Stats: {} playing, {:.2} system load",
                node.identifier(),
                stats.playing_players,
                stats.cpu.system_load,
            );

            node.set_stats(stats);
        }
    }

    fn handle_event(&self, node: &Node, json: Value) {
        let kind = match json.get("type").and_then(Value::as_str) {
            Some(kind) => kind.to_owned(),
            None => {
                warn!("[{}] No type present in event: {:?}", node.identifier(), json);

                return;
            },
        };

        let event = match kind.as_str() {
            "TrackStartEvent" => parse::<TrackStartEvent>(node, json).map(|event| Event::TrackStart {
                guild_id: event.guild_id,
                track: event.track,
            }),
            "TrackEndEvent" => parse::<TrackEndEvent>(node, json).map(|event| Event::TrackEnd {
                reason: event.reason.as_str().into(),
                guild_id: event.guild_id,
                track: event.track,
            }),
            "TrackExceptionEvent" => parse::<TrackExceptionEvent>(node, json).map(|event| {
                Event::TrackException {
                    error: event.description(),
                    guild_id: event.guild_id,
                    track: event.track,
                }
            }),
            "TrackStuckEvent" => parse::<TrackStuckEvent>(node, json).map(|event| Event::TrackStuck {
                guild_id: event.guild_id,
                track: event.track,
                threshold_ms: event.threshold_ms,
            }),
            "WebSocketClosedEvent" => parse::<WebSocketClosedEvent>(node, json).map(|event| {
                Event::ConnectionClosed {
                    guild_id: event.guild_id,
                    code: event.code,
                    reason: event.reason,
                    by_remote: event.by_remote,
                }
            }),
            other => {
                warn!("[{}] Unknown event type {:?}, dropping", node.identifier(), other);

                None
            },
        };

        let event = match event {
            Some(event) => event,
            None => return,
        };

        let player = match self.bound_player(node, event.guild_id()) {
            Some(player) => player,
            None => return,
        };

        debug!("[{}] {:?}", node.identifier(), event);

        player.apply_event(&event);
        self.listeners.dispatch(event);
    }

    /// The player for the guild, if it is bound to the node the frame came
    /// from.
    fn bound_player(&self, node: &Node, guild_id: &str) -> Option<AudioPlayer> {
        let player = match self.players.upgrade().and_then(|players| players.get(guild_id)) {
            Some(player) => player,
            None => {
                debug!("[{}] No player for guild {}", node.identifier(), guild_id);

                return None;
            },
        };

        if player.node_id() != node.identifier() {
            debug!(
                "[{}] Dropping stale frame for guild {}, now on {}",
                node.identifier(),
                guild_id,
                player.node_id(),
            );

            return None;
        }

        Some(player)
    }
}

fn parse<T: DeserializeOwned>(node: &Node, json: Value) -> Option<T> {
    match serde_json::from_value(json) {
        Ok(value) => Some(value),
        Err(why) => {
            warn!("[{}] Malformed payload: {:?}", node.identifier(), why);

            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::events::EventKind;
    use crate::nodes::NodeConfig;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Fixture {
        dispatcher: Arc<Dispatcher>,
        players: Arc<AudioPlayerManager>,
        listeners: Arc<Listeners>,
        node: Arc<Node>,
        other: Arc<Node>,
    }

    fn fixture() -> Fixture {
        let players = Arc::new(AudioPlayerManager::new());
        let listeners = Arc::new(Listeners::new());
        let dispatcher = Arc::new(Dispatcher::new(Arc::downgrade(&players), Arc::clone(&listeners)));
        let (lost, _) = mpsc::unbounded_channel();
        let client = ClientConfig::default();
        let node = |identifier: &str, seq| {
            Arc::new(Node::new(
                NodeConfig::new(identifier, "127.0.0.1", 1, "pass", "1"),
                seq,
                &client,
                Arc::clone(&dispatcher),
                lost.clone(),
            ))
        };

        let (node, other) = (node("A", 0), node("B", 1));

        Fixture {
            node,
            other,
            dispatcher,
            players,
            listeners,
        }
    }

    #[tokio::test]
    async fn test_stats_update_node() {
        let fx = fixture();
        assert!(fx.node.stats().is_none());

        fx.dispatcher.handle_message(&fx.node, &json!({
            "op": "stats",
            "players": 4,
            "playingPlayers": 3,
            "uptime": 10,
            "memory": {"free": 0, "used": 0, "allocated": 0, "reservable": 0},
            "cpu": {"cores": 2, "systemLoad": 0.0, "lavalinkLoad": 0.0},
        }).to_string());

        assert_eq!(fx.node.stats().map(|stats| stats.playing_players), Some(3));
        assert_eq!(fx.node.penalty(), 3.0);
        assert!(fx.other.stats().is_none());
    }

    #[tokio::test]
    async fn test_player_update_and_stale_frames() {
        let fx = fixture();
        let player = fx.players.create("1", Arc::clone(&fx.node), None).unwrap();

        fx.dispatcher.handle_message(&fx.node, &json!({
            "op": "playerUpdate",
            "guildId": "1",
            "state": {"time": 1234, "position": 5000, "connected": true},
        }).to_string());

        assert_eq!(player.last_update_time(), 1234);
        assert!(player.is_voice_connected());

        // The same guild reported by a node the player isn't bound to.
        fx.dispatcher.handle_message(&fx.other, &json!({
            "op": "playerUpdate",
            "guildId": "1",
            "state": {"time": 9999, "position": 0, "connected": false},
        }).to_string());

        assert_eq!(player.last_update_time(), 1234);
        assert!(player.is_voice_connected());
    }

    #[tokio::test]
    async fn test_events_are_forwarded() {
        let fx = fixture();
        let _player = fx.players.create("1", Arc::clone(&fx.node), None).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        fx.listeners.register(EventKind::TrackStuck, move |event: &Event| {
            let _ = tx.send(event.clone());
        });

        fx.dispatcher.handle_message(&fx.node, &json!({
            "op": "event",
            "type": "TrackStuckEvent",
            "guildId": "1",
            "track": "QAAA",
            "thresholdMs": 10000,
        }).to_string());

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert_eq!(event, Some(Event::TrackStuck {
            guild_id: "1".to_owned(),
            track: "QAAA".to_owned(),
            threshold_ms: 10000,
        }));
    }

    #[tokio::test]
    async fn test_voice_close_marks_disconnected() {
        let fx = fixture();
        let player = fx.players.create("1", Arc::clone(&fx.node), None).unwrap();

        fx.dispatcher.handle_message(&fx.node, &json!({
            "op": "playerUpdate",
            "guildId": "1",
            "state": {"time": 1, "position": 0, "connected": true},
        }).to_string());
        fx.dispatcher.handle_message(&fx.node, &json!({
            "op": "event",
            "type": "WebSocketClosedEvent",
            "guildId": "1",
            "code": 4006,
            "reason": "Session is no longer valid.",
            "byRemote": true,
        }).to_string());

        assert!(!player.is_voice_connected());
    }

    #[tokio::test]
    async fn test_bad_frames_are_dropped() {
        let fx = fixture();
        let player = fx.players.create("1", Arc::clone(&fx.node), None).unwrap();

        fx.dispatcher.handle_message(&fx.node, "not json");
        fx.dispatcher.handle_message(&fx.node, r#"{"guildId": "1"}"#);
        fx.dispatcher.handle_message(&fx.node, r#"{"op": "somethingNew", "guildId": "1"}"#);
        fx.dispatcher.handle_message(&fx.node, r#"{"op": "event", "type": "Mystery", "guildId": "1"}"#);
        fx.dispatcher.handle_message(&fx.node, r#"{"op": "playerUpdate", "guildId": 5}"#);
        fx.dispatcher.handle_message(&fx.node, r#"{"op": "stats", "players": "many"}"#);

        assert!(fx.node.stats().is_none());
        assert_eq!(player.last_update_time(), 0);
        assert!(fx.players.has("1"));
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use super::node::{CloseInfo, NodeLost};
use super::{Node, NodeConfig, NodeState};
use crate::config::{ClientConfig, Config};
use crate::dispatcher::Dispatcher;
use crate::event_handler::{EventHandler, Listeners};
use crate::events::{Event, EventKind};
use crate::player::{AudioPlayer, AudioPlayerManager};
use crate::resolver::{SearchSource, TrackResolver};
use crate::track::{LoadResult, Track};
use crate::Error;

struct Shared {
    config: ClientConfig,
    nodes: Mutex<HashMap<String, Arc<Node>>>,
    players: Arc<AudioPlayerManager>,
    listeners: Arc<Listeners>,
    dispatcher: Arc<Dispatcher>,
    resolver: TrackResolver,
    lost: UnboundedSender<NodeLost>,
    next_seq: AtomicU64,
}

/// The set of all nodes, and the players playing on them.
///
/// The manager is an explicit value: hold it (or an `Arc` of it) wherever
/// nodes need to be selected. Dropping it closes every node.
///
/// Must be created from within a Tokio runtime.
pub struct NodeManager {
    shared: Arc<Shared>,
}

impl NodeManager {
    pub fn new(config: ClientConfig) -> Self {
        let players = Arc::new(AudioPlayerManager::new());
        let listeners = Arc::new(Listeners::new());
        let dispatcher = Arc::new(Dispatcher::new(Arc::downgrade(&players), Arc::clone(&listeners)));
        let (lost, lost_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            resolver: TrackResolver::new(config.query_timeout()),
            nodes: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            config,
            players,
            listeners,
            dispatcher,
            lost,
        });

        tokio::spawn(watch_nodes(Arc::downgrade(&shared), lost_rx));

        Self {
            shared,
        }
    }

    /// Creates a manager and adds every configured node.
    pub fn from_config(config: Config) -> Result<Self, Error> {
        let manager = Self::new(config.client);

        for node in config.nodes {
            manager.add_node(node)?;
        }

        Ok(manager)
    }

    /// Adds a new node to be managed, and starts connecting to it in the
    /// background.
    ///
    /// Returns [`Error::NodeOccupied`] if a node with the same identifier is
    /// already managed.
    pub fn add_node(&self, config: NodeConfig) -> Result<Arc<Node>, Error> {
        let node = {
            let mut nodes = self.shared.lock_nodes();

            if nodes.contains_key(&config.identifier) {
                return Err(Error::NodeOccupied(config.identifier));
            }

            let seq = self.shared.next_seq.fetch_add(1, Ordering::SeqCst);
            let node = Arc::new(Node::new(
                config,
                seq,
                &self.shared.config,
                Arc::clone(&self.shared.dispatcher),
                self.shared.lost.clone(),
            ));
            nodes.insert(node.identifier().to_owned(), Arc::clone(&node));

            node
        };

        info!("[{}] Added node", node.identifier());
        node.start();

        Ok(node)
    }

    /// Determines the best connected node.
    ///
    /// The node with the lowest load penalty wins. Ties go to a node in the
    /// hinted region, then to the earliest registered node.
    pub fn select_node(&self, region: Option<&str>) -> Result<Arc<Node>, Error> {
        self.shared.select_node(region)
    }

    /// Removes a node, closing its connection.
    ///
    /// Its players are moved to other nodes or destroyed, per
    /// [`ClientConfig::migrate_on_disconnect`].
    pub async fn remove_node(&self, identifier: &str) -> Result<(), Error> {
        let node = self
            .shared
            .lock_nodes()
            .remove(identifier)
            .ok_or_else(|| Error::InvalidIDProvided(identifier.to_owned()))?;

        node.close();
        info!("[{}] Removed node", identifier);

        let close = CloseInfo {
            code: 1001,
            reason: "node removed".to_owned(),
        };
        self.shared.handle_node_loss(&node, &close).await;

        Ok(())
    }

    pub fn get_node(&self, identifier: &str) -> Option<Arc<Node>> {
        self.shared.lock_nodes().get(identifier).cloned()
    }

    /// All managed nodes, in registration order.
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        let mut nodes = self.shared.lock_nodes().values().cloned().collect::<Vec<_>>();
        nodes.sort_by_key(|node| node.seq());

        nodes
    }

    /// Closes all of the nodes owned by the manager.
    ///
    /// This is also automatically called when the instance is dropped.
    pub fn close_all(&self) {
        self.shared.lock_nodes().values().for_each(|node| node.close());
    }

    /// Creates a player for the guild on the best connected node.
    pub fn create_player(&self, guild_id: &str, region: Option<&str>) -> Result<AudioPlayer, Error> {
        if self.shared.players.has(guild_id) {
            return Err(Error::PlayerAlreadyExists(guild_id.to_owned()));
        }

        let node = self.select_node(region)?;

        self.shared.players.create(guild_id, node, region.map(ToOwned::to_owned))
    }

    /// Creates a player for the guild on a specific node.
    pub fn create_player_on(&self, guild_id: &str, identifier: &str) -> Result<AudioPlayer, Error> {
        let node = self
            .get_node(identifier)
            .ok_or_else(|| Error::InvalidIDProvided(identifier.to_owned()))?;

        if !node.is_connected() {
            return Err(Error::NodeNotConnected(identifier.to_owned()));
        }

        let region = node.region().map(ToOwned::to_owned);

        self.shared.players.create(guild_id, node, region)
    }

    /// Retrieves the player for the guild, if it exists.
    pub fn player(&self, guild_id: &str) -> Option<AudioPlayer> {
        self.shared.players.get(guild_id)
    }

    pub fn players(&self) -> &AudioPlayerManager {
        &self.shared.players
    }

    /// Moves a guild's player to another node.
    ///
    /// With no identifier, the best connected node other than the current
    /// one is used.
    pub async fn change_node(&self, guild_id: &str, identifier: Option<&str>) -> Result<(), Error> {
        let player = self
            .player(guild_id)
            .ok_or_else(|| Error::InvalidIDProvided(guild_id.to_owned()))?;

        let target = match identifier {
            Some(identifier) => {
                let node = self
                    .get_node(identifier)
                    .ok_or_else(|| Error::InvalidIDProvided(identifier.to_owned()))?;

                if !node.is_connected() {
                    return Err(Error::NodeNotConnected(identifier.to_owned()));
                }

                node
            },
            None => {
                let current = player.node_id();
                let region = player.region();

                self.shared.select_node_where(region.as_deref(), |node| node.identifier() != current)?
            },
        };

        player.move_to(target).await
    }

    /// Registers a handler for a kind of event.
    pub fn add_listener(&self, kind: EventKind, handler: impl EventHandler) {
        self.shared.listeners.register(kind, handler);
    }

    pub fn listeners(&self) -> &Listeners {
        &self.shared.listeners
    }

    pub fn resolver(&self) -> &TrackResolver {
        &self.shared.resolver
    }

    /// Looks up an identifier or search query on the best connected node.
    pub async fn search(&self, query: &str) -> Result<LoadResult, Error> {
        let node = self.select_node(None)?;

        self.shared.resolver.search(&node, query).await
    }

    /// Searches a source for the given terms on the best connected node.
    pub async fn search_with(&self, source: SearchSource, terms: &str) -> Result<LoadResult, Error> {
        self.search(&source.query(terms)).await
    }

    /// Decodes a track ID on the best connected node.
    pub async fn decode(&self, id: &str) -> Result<Track, Error> {
        let node = self.select_node(None)?;

        self.shared.resolver.decode(&node, id).await
    }
}

impl Drop for NodeManager {
    /// Drops the manager, closing all nodes.
    fn drop(&mut self) {
        self.close_all();
    }
}

impl Shared {
    fn lock_nodes(&self) -> MutexGuard<'_, HashMap<String, Arc<Node>>> {
        match self.nodes.lock() {
            Ok(nodes) => nodes,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn select_node(&self, region: Option<&str>) -> Result<Arc<Node>, Error> {
        self.select_node_where(region, |_| true)
    }

    fn select_node_where(
        &self,
        region: Option<&str>,
        filter: impl Fn(&Node) -> bool,
    ) -> Result<Arc<Node>, Error> {
        let nodes = self.lock_nodes();

        nodes
            .values()
            .filter(|node| node.state() == NodeState::Connected && filter(node))
            .map(|node| {
                let off_region = region.map_or(false, |region| node.region() != Some(region));

                (node.penalty(), off_region, node.seq(), node)
            })
            .min_by(|a, b| {
                a.0.total_cmp(&b.0)
                    .then(a.1.cmp(&b.1))
                    .then(a.2.cmp(&b.2))
            })
            .map(|(_, _, _, node)| Arc::clone(node))
            .ok_or(Error::ZeroConnectedNodes)
    }

    /// Moves or destroys every player bound to a node that went away.
    async fn handle_node_loss(&self, node: &Arc<Node>, close: &CloseInfo) {
        for guild_id in node.take_players() {
            let player = match self.players.get(&guild_id) {
                Some(player) => player,
                None => continue,
            };

            if !Arc::ptr_eq(&player.node(), node) {
                continue;
            }

            if self.config.migrate_on_disconnect {
                let region = player.region();
                let moved = match self.select_node(region.as_deref()) {
                    Ok(target) => player.move_to(target).await,
                    Err(why) => Err(why),
                };

                match moved {
                    Ok(()) => continue,
                    Err(why) => warn!(
                        "[{}] Failed to move player for guild {}: {}",
                        node.identifier(),
                        guild_id,
                        why,
                    ),
                }
            }

            player.teardown();
            info!("[{}] Destroyed player for guild {}", node.identifier(), guild_id);

            self.listeners.dispatch(Event::ConnectionClosed {
                guild_id,
                code: close.code,
                reason: close.reason.clone(),
                by_remote: true,
            });
        }
    }
}

/// Handles nodes losing their connection for as long as the manager lives.
async fn watch_nodes(shared: Weak<Shared>, mut lost: UnboundedReceiver<NodeLost>) {
    while let Some(NodeLost { node, close }) = lost.recv().await {
        let shared = match shared.upgrade() {
            Some(shared) => shared,
            None => break,
        };

        shared.handle_node_loss(&node, &close).await;
    }

    debug!("Node watcher shutting down");
}

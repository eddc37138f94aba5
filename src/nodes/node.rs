use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::futures::Notified;
use tokio::sync::{watch, Mutex as AsyncMutex, Notify};
use tokio::time;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WebSocketError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use super::{Backoff, NodeConfig, NodeState, PenaltyWeights, Stats};
use crate::config::ClientConfig;
use crate::dispatcher::Dispatcher;
use crate::model::OutgoingMessage;
use crate::Error;

const CLIENT_NAME: &str = concat!("lavalink-nodes/", env!("CARGO_PKG_VERSION"));

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How a control connection ended.
#[derive(Clone, Debug, PartialEq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: u16::from(CloseCode::Abnormal),
            reason: reason.into(),
        }
    }
}

/// Sent to the node manager when a connected node loses its connection.
pub(crate) struct NodeLost {
    pub node: Arc<Node>,
    pub close: CloseInfo,
}

/// A single audio node and its control connection.
///
/// A node is created by [`NodeManager::add_node`], which starts a background
/// task that connects, reads frames and reconnects with exponential backoff
/// until the node is removed.
///
/// [`NodeManager::add_node`]: super::NodeManager::add_node
pub struct Node {
    config: NodeConfig,
    seq: u64,
    weights: PenaltyWeights,
    connect_timeout: Duration,
    command_timeout: Duration,
    reconnect_initial: Duration,
    reconnect_max: Duration,
    state: watch::Sender<NodeState>,
    stats: RwLock<Option<Stats>>,
    players: Mutex<HashSet<String>>,
    sink: AsyncMutex<Option<SplitSink<WsStream, Message>>>,
    running: AtomicBool,
    disconnect: Notify,
    shutdown: CancellationToken,
    dispatcher: Arc<Dispatcher>,
    lost: UnboundedSender<NodeLost>,
}

impl Node {
    pub(crate) fn new(
        config: NodeConfig,
        seq: u64,
        client: &ClientConfig,
        dispatcher: Arc<Dispatcher>,
        lost: UnboundedSender<NodeLost>,
    ) -> Self {
        let (state, _) = watch::channel(NodeState::Disconnected);

        Self {
            config,
            seq,
            weights: client.penalty.clone(),
            connect_timeout: client.connect_timeout(),
            command_timeout: client.command_timeout(),
            reconnect_initial: client.reconnect_initial(),
            reconnect_max: client.reconnect_max(),
            state,
            stats: RwLock::new(None),
            players: Mutex::new(HashSet::new()),
            sink: AsyncMutex::new(None),
            running: AtomicBool::new(false),
            disconnect: Notify::new(),
            shutdown: CancellationToken::new(),
            dispatcher,
            lost,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.config.identifier
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn region(&self) -> Option<&str> {
        self.config.region.as_deref()
    }

    /// The order in which the node was registered.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn state(&self) -> NodeState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == NodeState::Connected
    }

    /// A receiver notified of every connection state change.
    pub fn subscribe_state(&self) -> watch::Receiver<NodeState> {
        self.state.subscribe()
    }

    /// Waits until the node is connected, or the timeout passes.
    pub async fn wait_until_connected(&self, timeout: Duration) -> Result<(), Error> {
        let mut rx = self.state.subscribe();

        let connected = time::timeout(timeout, rx.wait_for(|state| *state == NodeState::Connected))
            .await
            .map(|state| state.map(|_| ()));

        match connected {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Error::NodeNotConnected(self.identifier().to_owned())),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// The most recent statistics pushed by the node, if any.
    pub fn stats(&self) -> Option<Stats> {
        match self.stats.read() {
            Ok(stats) => stats.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// The load penalty of the node. Nodes that haven't sent statistics yet
    /// have no penalty.
    pub fn penalty(&self) -> f64 {
        self.stats()
            .map(|stats| stats.penalty(&self.weights))
            .unwrap_or(0.0)
    }

    /// The guilds whose players are currently bound to the node.
    pub fn players(&self) -> Vec<String> {
        self.lock_players().iter().cloned().collect()
    }

    pub(crate) fn set_stats(&self, stats: Stats) {
        match self.stats.write() {
            Ok(mut current) => *current = Some(stats),
            Err(poisoned) => *poisoned.into_inner() = Some(stats),
        }
    }

    pub(crate) fn bind(&self, guild_id: &str) {
        self.lock_players().insert(guild_id.to_owned());
    }

    pub(crate) fn unbind(&self, guild_id: &str) {
        self.lock_players().remove(guild_id);
    }

    pub(crate) fn take_players(&self) -> Vec<String> {
        self.lock_players().drain().collect()
    }

    fn lock_players(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        match self.players.lock() {
            Ok(players) => players,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Sends a command over the control connection.
    ///
    /// Fails immediately if the node isn't connected; failures are not
    /// retried.
    pub async fn send(&self, message: &OutgoingMessage) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::NodeNotConnected(self.identifier().to_owned()));
        }

        let frame = message.into_ws_message()?;
        trace!("[{}] Sending {:?}", self.identifier(), frame);

        let send = async {
            let mut sink = self.sink.lock().await;

            match sink.as_mut() {
                Some(sink) => sink.send(frame).await.map_err(Error::from),
                None => Err(Error::NodeNotConnected(self.identifier().to_owned())),
            }
        };

        match time::timeout(self.command_timeout, send).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "[{}] Timed out sending a command for guild {}",
                    self.identifier(),
                    message.guild_id(),
                );

                Err(Error::Timeout)
            },
        }
    }

    /// Closes the current connection.
    ///
    /// Players bound to the node are migrated or destroyed, and the node
    /// reconnects after the usual backoff.
    pub fn disconnect(&self) {
        info!("[{}] Disconnect requested", self.identifier());

        self.disconnect.notify_waiters();
    }

    /// Closes the connection for good. The node will not reconnect.
    pub fn close(&self) {
        if !self.shutdown.is_cancelled() {
            info!("[{}] Closing node", self.identifier());
        }

        self.shutdown.cancel();

        if !self.running.load(Ordering::SeqCst) {
            self.state.send_replace(NodeState::Closed);
        }
    }

    /// Starts the connection task. Does nothing if it is already running.
    pub(crate) fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let node = Arc::clone(self);

        tokio::spawn(async move {
            node.run().await;
        });
    }

    async fn run(self: Arc<Self>) {
        let mut backoff = Backoff::new(self.reconnect_initial, self.reconnect_max);

        while !self.shutdown.is_cancelled() {
            self.state.send_replace(NodeState::Connecting);

            let connected = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                connected = self.connect() => connected,
            };

            match connected {
                Ok(stream) => {
                    backoff.reset();

                    // Listen for disconnect requests before anyone can see
                    // the node as connected.
                    let disconnect = self.disconnect.notified();
                    tokio::pin!(disconnect);
                    disconnect.as_mut().enable();

                    self.state.send_replace(NodeState::Connected);
                    info!("[{}] Connected", self.identifier());

                    let close = self.read_loop(stream, disconnect.as_mut()).await;

                    if self.shutdown.is_cancelled() {
                        break;
                    }

                    self.sink.lock().await.take();

                    warn!(
                        "[{}] Connection closed ({}: {}), reconnecting",
                        self.identifier(),
                        close.code,
                        close.reason,
                    );
                    self.state.send_replace(NodeState::Disconnected);

                    let lost = NodeLost {
                        node: Arc::clone(&self),
                        close,
                    };

                    if self.lost.send(lost).is_err() {
                        debug!("[{}] Node manager is gone", self.identifier());
                    }
                },
                Err(Error::AuthorizationFailure) => {
                    error!(
                        "[{}] Node rejected the password; not reconnecting",
                        self.identifier(),
                    );
                    self.state.send_replace(NodeState::Disconnected);
                    self.running.store(false, Ordering::SeqCst);

                    return;
                },
                Err(why) => {
                    warn!("[{}] Failed to connect: {}", self.identifier(), why);
                    self.state.send_replace(NodeState::Disconnected);
                },
            }

            let delay = backoff.next_delay();
            debug!("[{}] Reconnecting in {:?}", self.identifier(), delay);

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = time::sleep(delay) => {},
            }
        }

        self.close_socket().await;
        self.state.send_replace(NodeState::Closed);
        debug!("[{}] Connection task finished", self.identifier());
    }

    async fn connect(&self) -> Result<SplitStream<WsStream>, Error> {
        let mut request = self.config.websocket_url().as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert("Authorization", HeaderValue::from_str(&self.config.password)?);
        headers.insert("Num-Shards", HeaderValue::from(self.config.num_shards));
        headers.insert("User-Id", HeaderValue::from_str(&self.config.user_id)?);
        headers.insert("Client-Name", HeaderValue::from_static(CLIENT_NAME));

        debug!("[{}] Connecting to {}", self.identifier(), self.config.websocket_url());

        let connected = time::timeout(
            self.connect_timeout,
            tokio_tungstenite::connect_async(request),
        ).await.map_err(|_| Error::Timeout)?;

        let (duplex, _) = match connected {
            Ok(connected) => connected,
            Err(WebSocketError::Http(response)) => {
                let status = response.status();

                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                    return Err(Error::AuthorizationFailure);
                }

                return Err(Error::Status(status));
            },
            Err(why) => return Err(why.into()),
        };

        let (sink, stream) = duplex.split();
        *self.sink.lock().await = Some(sink);

        Ok(stream)
    }

    async fn read_loop(
        &self,
        mut stream: SplitStream<WsStream>,
        mut disconnect: Pin<&mut Notified<'_>>,
    ) -> CloseInfo {

        loop {
            let msg = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return CloseInfo {
                        code: u16::from(CloseCode::Away),
                        reason: "node closed".to_owned(),
                    };
                },
                _ = disconnect.as_mut() => {
                    self.close_socket().await;

                    return CloseInfo {
                        code: u16::from(CloseCode::Normal),
                        reason: "disconnected by client".to_owned(),
                    };
                },
                msg = stream.next() => msg,
            };

            match msg {
                Some(Ok(Message::Text(text))) => {
                    trace!("[{}] Received text: {:?}", self.identifier(), text);

                    self.dispatcher.handle_message(self, &text);
                },
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => self.dispatcher.handle_message(self, text),
                    Err(why) => warn!("[{}] Received non-UTF-8 binary: {:?}", self.identifier(), why),
                },
                Some(Ok(Message::Close(frame))) => {
                    info!("[{}] Received a close: {:?}", self.identifier(), frame);

                    return match frame {
                        Some(frame) => CloseInfo {
                            code: u16::from(frame.code),
                            reason: frame.reason.to_string(),
                        },
                        None => CloseInfo {
                            code: u16::from(CloseCode::Status),
                            reason: String::new(),
                        },
                    };
                },
                Some(Ok(Message::Ping(data))) => {
                    debug!("[{}] Received a ping: {:?}", self.identifier(), data);
                },
                Some(Ok(other)) => {
                    trace!("[{}] Ignoring frame: {:?}", self.identifier(), other);
                },
                Some(Err(why)) => {
                    warn!("[{}] Error reading from connection: {}", self.identifier(), why);

                    return CloseInfo::abnormal(why.to_string());
                },
                None => return CloseInfo::abnormal("connection ended"),
            }
        }
    }

    /// Sends a close frame over the current connection, if there is one.
    async fn close_socket(&self) {
        let mut sink = self.sink.lock().await;

        if let Some(mut sink) = sink.take() {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: "".into(),
            };

            if let Err(why) = sink.send(Message::Close(Some(frame))).await {
                debug!("[{}] Failed to send close: {}", self.identifier(), why);
            }
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("identifier", &self.config.identifier)
            .field("state", &self.state())
            .field("seq", &self.seq)
            .finish()
    }
}

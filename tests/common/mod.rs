//! A scripted stand-in for an audio node, for driving the client in tests.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use lavalink_nodes::{ClientConfig, NodeConfig};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

pub const PASSWORD: &str = "youshallnotpass";
pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Short timeouts and backoff, so tests don't wait on real-world defaults.
pub fn client_config() -> ClientConfig {
    ClientConfig {
        connect_timeout_ms: 2_000,
        command_timeout_ms: 2_000,
        query_timeout_ms: 2_000,
        reconnect_initial_ms: 50,
        reconnect_max_ms: 200,
        ..ClientConfig::default()
    }
}

enum Command {
    Send(String),
    Close(u16, String),
}

pub struct MockNode {
    pub addr: SocketAddr,
    /// Connection attempts, including rejected ones.
    pub connections: Arc<AtomicUsize>,
    /// Close frames received from the client.
    pub close_frames: Arc<AtomicUsize>,
    commands: UnboundedSender<Command>,
    received: Mutex<UnboundedReceiver<Value>>,
}

impl MockNode {
    pub async fn start() -> Self {
        Self::with_password(PASSWORD).await
    }

    /// Starts a node that only accepts the given password. Connections are
    /// served one at a time.
    pub async fn with_password(password: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let close_frames = Arc::new(AtomicUsize::new(0));
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (received_tx, received) = mpsc::unbounded_channel();

        let counter = Arc::clone(&connections);
        let closes = Arc::clone(&close_frames);
        tokio::spawn(async move {
            let commands = Arc::new(Mutex::new(commands_rx));

            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);

                let check = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                    let authorized = request
                        .headers()
                        .get("Authorization")
                        .map_or(false, |value| value.as_bytes() == password.as_bytes());

                    if authorized {
                        Ok(response)
                    } else {
                        let mut rejection = ErrorResponse::new(Some("bad password".to_owned()));
                        *rejection.status_mut() = StatusCode::UNAUTHORIZED;

                        Err(rejection)
                    }
                };

                if let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, check).await {
                    serve(ws, Arc::clone(&commands), received_tx.clone(), Arc::clone(&closes)).await;
                }
            }
        });

        Self {
            addr,
            connections,
            close_frames,
            commands,
            received: Mutex::new(received),
        }
    }

    pub fn config(&self, identifier: &str) -> NodeConfig {
        NodeConfig::new(identifier, "127.0.0.1", self.addr.port(), PASSWORD, "1234")
    }

    /// Sends a frame to the connected client.
    pub fn send(&self, frame: Value) {
        let _ = self.commands.send(Command::Send(frame.to_string()));
    }

    /// Closes the current connection with a close frame.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.commands.send(Command::Close(code, reason.to_owned()));
    }

    /// Waits for the next frame with the given op, skipping any others.
    pub async fn recv_op(&self, op: &str) -> Value {
        let mut received = self.received.lock().await;

        loop {
            let frame = tokio::time::timeout(WAIT, received.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for {:?}", op))
                .expect("mock node stopped");

            if frame["op"] == op {
                return frame;
            }
        }
    }

    /// Waits for the next frame of any kind.
    pub async fn recv(&self) -> Value {
        let mut received = self.received.lock().await;

        tokio::time::timeout(WAIT, received.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("mock node stopped")
    }

    /// Whether a frame arrives within a short window.
    pub async fn is_quiet(&self) -> bool {
        let mut received = self.received.lock().await;

        tokio::time::timeout(Duration::from_millis(200), received.recv()).await.is_err()
    }
}

async fn serve(
    ws: WebSocketStream<TcpStream>,
    commands: Arc<Mutex<UnboundedReceiver<Command>>>,
    received: UnboundedSender<Value>,
    close_frames: Arc<AtomicUsize>,
) {
    let (mut sink, mut stream) = ws.split();
    let mut commands = commands.lock().await;

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(text)) => {
                    if sink.send(Message::text(text)).await.is_err() {
                        break;
                    }
                },
                Some(Command::Close(code, reason)) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;

                    break;
                },
                None => break,
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(frame) = serde_json::from_str::<Value>(&text) {
                        let _ = received.send(frame);
                    }
                },
                Some(Ok(Message::Close(_))) => {
                    close_frames.fetch_add(1, Ordering::SeqCst);

                    break;
                },
                Some(Err(_)) | None => break,
                Some(Ok(_)) => {},
            },
        }
    }
}

/// Serves a fixed JSON body to every HTTP request, reporting each request's
/// head.
pub async fn serve_http(body: String) -> (SocketAddr, UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (heads_tx, heads) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];

            while !head.windows(4).any(|window| window == b"\r\n\r\n") {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(read) => head.extend_from_slice(&buf[..read]),
                }
            }

            let _ = heads_tx.send(String::from_utf8_lossy(&head).into_owned());

            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body,
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    (addr, heads)
}

/// A listener that accepts connections and never says anything on them.
pub struct SilentServer {
    pub addr: SocketAddr,
    pub connections: Arc<AtomicUsize>,
}

pub async fn serve_silent() -> SilentServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&connections);
    tokio::spawn(async move {
        let mut held = Vec::new();

        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            held.push(stream);
        }
    });

    SilentServer {
        addr,
        connections,
    }
}

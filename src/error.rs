use hyper::http::header::InvalidHeaderValue;
use hyper::http::uri::InvalidUri;
use hyper::http::Error as HttpRequestError;
use hyper::{Error as HyperError, StatusCode};
use hyper_util::client::legacy::Error as HttpClientError;
use serde_json::Error as JsonError;
use std::error::Error as StdError;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io::Error as IoError;
use tokio_tungstenite::tungstenite::Error as WebSocketError;
use toml::de::Error as TomlError;

#[derive(Debug)]
pub enum Error {
    /// The node rejected the credentials during the handshake.
    AuthorizationFailure,
    /// A configuration file could not be parsed.
    Config(TomlError),
    /// The query endpoint responded with a non-JSON or unexpected body.
    Json(JsonError),
    /// An error from the HTTP client while reading a response body.
    Http(HyperError),
    /// An error from the HTTP client while performing a request.
    HttpClient(HttpClientError),
    /// A query request could not be built.
    HttpRequest(HttpRequestError),
    /// A credential could not be used as a header value.
    InvalidHeader(InvalidHeaderValue),
    /// No node or player is known by the given identifier.
    InvalidIDProvided(String),
    /// The operation is not valid for the player's current state.
    InvalidOperation(&'static str),
    /// A node address could not be parsed as a URI.
    InvalidUri(InvalidUri),
    Io(IoError),
    /// The node could not load the requested identifier.
    LoadFailed(String),
    /// The node is not currently connected.
    NodeNotConnected(String),
    /// A node with the same identifier is already registered.
    NodeOccupied(String),
    /// A live player already exists for the guild.
    PlayerAlreadyExists(String),
    /// The player was destroyed and can no longer be used.
    PlayerDestroyed(String),
    /// The query endpoint responded with an unsuccessful status.
    Status(StatusCode),
    /// A connection, command or query did not complete in time.
    Timeout,
    WebSocket(WebSocketError),
    /// There are no connected nodes to select from.
    ZeroConnectedNodes,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Error::AuthorizationFailure => f.write_str("node rejected the authorization"),
            Error::Config(why) => write!(f, "invalid configuration: {}", why),
            Error::Json(why) => write!(f, "malformed json: {}", why),
            Error::Http(why) => write!(f, "http error: {}", why),
            Error::HttpClient(why) => write!(f, "http client error: {}", why),
            Error::HttpRequest(why) => write!(f, "invalid http request: {}", why),
            Error::InvalidHeader(why) => write!(f, "invalid header value: {}", why),
            Error::InvalidIDProvided(id) => write!(f, "no node or player with id {:?}", id),
            Error::InvalidOperation(reason) => write!(f, "invalid operation: {}", reason),
            Error::InvalidUri(why) => write!(f, "invalid uri: {}", why),
            Error::Io(why) => write!(f, "io error: {}", why),
            Error::LoadFailed(message) => write!(f, "track loading failed: {}", message),
            Error::NodeNotConnected(id) => write!(f, "node {:?} is not connected", id),
            Error::NodeOccupied(id) => write!(f, "a node with id {:?} already exists", id),
            Error::PlayerAlreadyExists(guild_id) => {
                write!(f, "a player already exists for guild {}", guild_id)
            },
            Error::PlayerDestroyed(guild_id) => {
                write!(f, "the player for guild {} was destroyed", guild_id)
            },
            Error::Status(status) => write!(f, "query endpoint responded with {}", status),
            Error::Timeout => f.write_str("operation timed out"),
            Error::WebSocket(why) => write!(f, "websocket error: {}", why),
            Error::ZeroConnectedNodes => f.write_str("there are no connected nodes"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Config(why) => Some(why),
            Error::Json(why) => Some(why),
            Error::Http(why) => Some(why),
            Error::HttpClient(why) => Some(why),
            Error::HttpRequest(why) => Some(why),
            Error::InvalidHeader(why) => Some(why),
            Error::InvalidUri(why) => Some(why),
            Error::Io(why) => Some(why),
            Error::WebSocket(why) => Some(why),
            _ => None,
        }
    }
}

impl From<TomlError> for Error {
    fn from(err: TomlError) -> Self {
        Error::Config(err)
    }
}

impl From<JsonError> for Error {
    fn from(err: JsonError) -> Self {
        Error::Json(err)
    }
}

impl From<HyperError> for Error {
    fn from(err: HyperError) -> Self {
        Error::Http(err)
    }
}

impl From<HttpClientError> for Error {
    fn from(err: HttpClientError) -> Self {
        Error::HttpClient(err)
    }
}

impl From<HttpRequestError> for Error {
    fn from(err: HttpRequestError) -> Self {
        Error::HttpRequest(err)
    }
}

impl From<InvalidHeaderValue> for Error {
    fn from(err: InvalidHeaderValue) -> Self {
        Error::InvalidHeader(err)
    }
}

impl From<InvalidUri> for Error {
    fn from(err: InvalidUri) -> Self {
        Error::InvalidUri(err)
    }
}

impl From<IoError> for Error {
    fn from(err: IoError) -> Self {
        Error::Io(err)
    }
}

impl From<WebSocketError> for Error {
    fn from(err: WebSocketError) -> Self {
        Error::WebSocket(err)
    }
}

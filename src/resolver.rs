//! Track lookups against a node's query endpoint.

use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::header::{ACCEPT, AUTHORIZATION};
use hyper::{Request, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use std::time::Duration;
use tokio::time;
use crate::nodes::Node;
use crate::track::{self, LoadResult, RawTrackInfo, Track};
use crate::Error;

/// A source to search with a query prefix, rather than loading a URI.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SearchSource {
    YouTube,
    YouTubeMusic,
    SoundCloud,
}

impl SearchSource {
    pub fn prefix(self) -> &'static str {
        match self {
            SearchSource::YouTube => "ytsearch:",
            SearchSource::YouTubeMusic => "ytmsearch:",
            SearchSource::SoundCloud => "scsearch:",
        }
    }

    /// Builds the identifier that searches this source for the terms.
    pub fn query(self, terms: &str) -> String {
        format!("{}{}", self.prefix(), terms)
    }
}

/// Issues lookups to a node's query endpoint.
///
/// The resolver holds no state besides a pooled HTTP client, and can be used
/// concurrently against any connected node.
#[derive(Clone, Debug)]
pub struct TrackResolver {
    client: Client<HttpConnector, Empty<Bytes>>,
    timeout: Duration,
}

impl TrackResolver {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
            timeout,
        }
    }

    /// Loads an identifier: a URI, or a search query such as
    /// `ytsearch:never gonna give you up`.
    ///
    /// A lookup that matches nothing resolves to [`LoadResult::Empty`].
    pub async fn search(&self, node: &Node, query: &str) -> Result<LoadResult, Error> {
        let identifier = utf8_percent_encode(query, NON_ALPHANUMERIC);
        let body = self.get(node, &format!("/loadtracks?identifier={}", identifier)).await?;

        track::parse_load_result(&body)
    }

    /// Decodes a track ID back into its track.
    pub async fn decode(&self, node: &Node, id: &str) -> Result<Track, Error> {
        let encoded = utf8_percent_encode(id, NON_ALPHANUMERIC);
        let body = self.get(node, &format!("/decodetrack?track={}", encoded)).await?;
        let info = serde_json::from_slice::<RawTrackInfo>(&body)?;

        Ok(Track::from_raw(track::RawTrack {
            track: id.to_owned(),
            info,
        }))
    }

    async fn get(&self, node: &Node, path_and_query: &str) -> Result<Bytes, Error> {
        if !node.is_connected() {
            return Err(Error::NodeNotConnected(node.identifier().to_owned()));
        }

        let uri = format!("{}{}", node.config().http_url(), path_and_query).parse::<Uri>()?;
        debug!("[{}] GET {}", node.identifier(), uri);

        let request = Request::get(uri)
            .header(AUTHORIZATION, node.config().password.as_str())
            .header(ACCEPT, "application/json")
            .body(Empty::<Bytes>::new())?;

        let exchange = async {
            let response = self.client.request(request).await?;
            let status = response.status();
            let body = response.into_body().collect().await?.to_bytes();

            Ok::<_, Error>((status, body))
        };

        let (status, body) = time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| Error::Timeout)??;

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::AuthorizationFailure),
            status if !status.is_success() => Err(Error::Status(status)),
            _ => Ok(body),
        }
    }
}

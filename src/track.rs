//! Tracks and playlists resolved from a node's query endpoint.

use serde::Deserialize;
use crate::Error;

/// A resolved track.
///
/// The [`id`] is the opaque, server-issued encoding of the track and is what
/// is sent back to a node to play it.
///
/// [`id`]: #structfield.id
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub id: String,
    pub identifier: String,
    pub title: String,
    pub author: String,
    /// The duration of the track, in milliseconds.
    pub duration: u64,
    pub uri: Option<String>,
    /// Whether the track is a live stream. Streams can't be seeked.
    pub is_stream: bool,
    pub is_seekable: bool,
    pub artwork: Option<String>,
    pub source: Option<String>,
}

impl Track {
    /// The YouTube video ID of the track, if the identifier looks like one.
    pub fn youtube_id(&self) -> Option<&str> {
        let id = self.identifier.as_str();
        let valid = id.len() == 11 && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        if valid {
            Some(id)
        } else {
            None
        }
    }

    /// Whether a seek is possible on this track.
    pub fn can_seek(&self) -> bool {
        !self.is_stream && self.is_seekable
    }

    pub(crate) fn from_raw(raw: RawTrack) -> Self {
        let RawTrack { track, info } = raw;

        let mut track = Self {
            id: track,
            identifier: info.identifier,
            title: info.title,
            author: info.author,
            duration: info.length,
            uri: info.uri,
            is_stream: info.is_stream,
            is_seekable: info.is_seekable,
            artwork: info.artwork_url,
            source: info.source_name,
        };

        if track.artwork.is_none() {
            track.artwork = track
                .youtube_id()
                .map(|id| format!("https://img.youtube.com/vi/{}/maxresdefault.jpg", id));
        }

        track
    }
}

/// An ordered collection of tracks loaded from a playlist URI.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackPlaylist {
    pub name: Option<String>,
    /// The index of the track the URI pointed at, if any.
    pub selected: Option<usize>,
    pub tracks: Vec<Track>,
}

impl TrackPlaylist {
    pub fn selected_track(&self) -> Option<&Track> {
        self.selected.and_then(|idx| self.tracks.get(idx))
    }
}

/// The outcome of a successful lookup.
///
/// An empty result means the node found nothing; it is not an error.
#[derive(Clone, Debug, PartialEq)]
pub enum LoadResult {
    Empty,
    Track(Track),
    Tracks(Vec<Track>),
    Playlist(TrackPlaylist),
}

impl LoadResult {
    pub fn is_empty(&self) -> bool {
        matches!(self, LoadResult::Empty)
    }

    /// All of the tracks in the result, in order.
    pub fn tracks(&self) -> &[Track] {
        match self {
            LoadResult::Empty => &[],
            LoadResult::Track(track) => std::slice::from_ref(track),
            LoadResult::Tracks(tracks) => tracks,
            LoadResult::Playlist(playlist) => &playlist.tracks,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct RawTrack {
    #[serde(alias = "encoded")]
    pub track: String,
    pub info: RawTrackInfo,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawTrackInfo {
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub is_seekable: bool,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub length: u64,
    #[serde(default)]
    pub is_stream: bool,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub artwork_url: Option<String>,
    #[serde(default)]
    pub source_name: Option<String>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum LoadType {
    TrackLoaded,
    PlaylistLoaded,
    SearchResult,
    NoMatches,
    LoadFailed,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistInfo {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    selected_track: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct LoadException {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadTracksResponse {
    load_type: LoadType,
    #[serde(default)]
    playlist_info: Option<PlaylistInfo>,
    #[serde(default)]
    tracks: Vec<RawTrack>,
    #[serde(default)]
    exception: Option<LoadException>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawLoadResult {
    Envelope(LoadTracksResponse),
    /// Servers predating load types respond with a bare array.
    Legacy(Vec<RawTrack>),
}

/// Parses the body of a `loadtracks` response.
pub(crate) fn parse_load_result(body: &[u8]) -> Result<LoadResult, Error> {
    let response = match serde_json::from_slice::<RawLoadResult>(body)? {
        RawLoadResult::Legacy(tracks) => {
            let mut tracks = tracks.into_iter().map(Track::from_raw).collect::<Vec<_>>();

            return Ok(match tracks.len() {
                0 => LoadResult::Empty,
                1 => LoadResult::Track(tracks.remove(0)),
                _ => LoadResult::Tracks(tracks),
            });
        },
        RawLoadResult::Envelope(response) => response,
    };

    let mut tracks = response.tracks.into_iter().map(Track::from_raw).collect::<Vec<_>>();

    Ok(match response.load_type {
        LoadType::NoMatches => LoadResult::Empty,
        LoadType::LoadFailed => {
            let message = response
                .exception
                .and_then(|exception| exception.message)
                .unwrap_or_else(|| "unknown reason".to_owned());

            return Err(Error::LoadFailed(message));
        },
        _ if tracks.is_empty() => LoadResult::Empty,
        LoadType::TrackLoaded => LoadResult::Track(tracks.remove(0)),
        LoadType::SearchResult => LoadResult::Tracks(tracks),
        LoadType::PlaylistLoaded => {
            let info = response.playlist_info.unwrap_or_default();
            let selected = info
                .selected_track
                .filter(|idx| *idx >= 0)
                .map(|idx| idx as usize)
                .filter(|idx| *idx < tracks.len());

            LoadResult::Playlist(TrackPlaylist {
                name: info.name,
                selected,
                tracks,
            })
        },
    })
}

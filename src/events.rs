//! Typed playback lifecycle events delivered to registered handlers.

/// Why a track stopped playing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    /// Another track was played over this one.
    Replaced,
    Cleanup,
    Unknown(String),
}

impl TrackEndReason {
    /// Whether the node may continue with another track.
    pub fn may_start_next(&self) -> bool {
        matches!(self, TrackEndReason::Finished | TrackEndReason::LoadFailed)
    }
}

impl From<&str> for TrackEndReason {
    fn from(reason: &str) -> Self {
        match reason {
            "FINISHED" => TrackEndReason::Finished,
            "LOAD_FAILED" => TrackEndReason::LoadFailed,
            "STOPPED" => TrackEndReason::Stopped,
            "REPLACED" => TrackEndReason::Replaced,
            "CLEANUP" => TrackEndReason::Cleanup,
            other => TrackEndReason::Unknown(other.to_owned()),
        }
    }
}

/// An event for a guild's player.
///
/// Tracks are referred to by their encoded ID.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    TrackStart {
        guild_id: String,
        track: String,
    },
    TrackEnd {
        guild_id: String,
        track: String,
        reason: TrackEndReason,
    },
    TrackException {
        guild_id: String,
        track: String,
        error: String,
    },
    TrackStuck {
        guild_id: String,
        track: String,
        threshold_ms: u64,
    },
    /// The player lost its connection: either the node's voice connection
    /// for the guild closed, or the node itself went away and the player
    /// was destroyed.
    ConnectionClosed {
        guild_id: String,
        code: u16,
        reason: String,
        by_remote: bool,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::TrackStart { .. } => EventKind::TrackStart,
            Event::TrackEnd { .. } => EventKind::TrackEnd,
            Event::TrackException { .. } => EventKind::TrackException,
            Event::TrackStuck { .. } => EventKind::TrackStuck,
            Event::ConnectionClosed { .. } => EventKind::ConnectionClosed,
        }
    }

    pub fn guild_id(&self) -> &str {
        match self {
            Event::TrackStart { guild_id, .. }
            | Event::TrackEnd { guild_id, .. }
            | Event::TrackException { guild_id, .. }
            | Event::TrackStuck { guild_id, .. }
            | Event::ConnectionClosed { guild_id, .. } => guild_id,
        }
    }
}

/// The kinds of [`Event`] a handler can be registered for.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EventKind {
    TrackStart,
    TrackEnd,
    TrackException,
    TrackStuck,
    ConnectionClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_reason_parsing() {
        assert_eq!(TrackEndReason::from("FINISHED"), TrackEndReason::Finished);
        assert_eq!(TrackEndReason::from("REPLACED"), TrackEndReason::Replaced);
        assert_eq!(
            TrackEndReason::from("SOMETHING_NEW"),
            TrackEndReason::Unknown("SOMETHING_NEW".to_owned()),
        );
        assert!(TrackEndReason::Finished.may_start_next());
        assert!(!TrackEndReason::Replaced.may_start_next());
    }

    #[test]
    fn test_kind_and_guild() {
        let event = Event::TrackStuck {
            guild_id: "9".to_owned(),
            track: "QAAA".to_owned(),
            threshold_ms: 10_000,
        };

        assert_eq!(event.kind(), EventKind::TrackStuck);
        assert_eq!(event.guild_id(), "9");
    }
}

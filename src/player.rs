//! Module containing structs for controlling the audio player of each guild.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;
use crate::equalizer::Equalizer;
use crate::events::{Event, TrackEndReason};
use crate::model::{
    Destroy,
    EqualizerUpdate,
    OutgoingMessage,
    Pause,
    Play,
    PlayerUpdateState,
    Seek,
    Stop,
    VoiceUpdate,
    Volume,
};
use crate::nodes::Node;
use crate::track::Track;
use crate::Error;

/// The lowest volume a player accepts.
pub const MIN_VOLUME: u16 = 0;
/// The highest volume a player accepts.
pub const MAX_VOLUME: u16 = 1000;
/// The volume of a new player.
pub const DEFAULT_VOLUME: u16 = 100;

/// A map of guild IDs to their live audio players.
///
/// There is at most one live player per guild. A destroyed player is removed
/// from the map, releasing the guild for a new player.
#[derive(Debug, Default)]
pub struct AudioPlayerManager {
    players: Mutex<HashMap<String, AudioPlayer>>,
}

impl AudioPlayerManager {
    /// Creates a new default `AudioPlayerManager`.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an audio player for the guild, bound to the given node.
    ///
    /// It may be preferable to use [`NodeManager::create_player`], which
    /// selects the node.
    ///
    /// [`NodeManager::create_player`]: crate::nodes::NodeManager::create_player
    pub fn create(
        self: &Arc<Self>,
        guild_id: &str,
        node: Arc<Node>,
        region: Option<String>,
    ) -> Result<AudioPlayer, Error> {
        let mut players = self.lock();

        if players.contains_key(guild_id) {
            return Err(Error::PlayerAlreadyExists(guild_id.to_owned()));
        }

        node.bind(guild_id);
        let player = AudioPlayer::new(guild_id, node, region, Arc::downgrade(self));
        players.insert(guild_id.to_owned(), player.clone());

        Ok(player)
    }

    /// Retrieves the audio player for the guild, if it exists.
    pub fn get(&self, guild_id: &str) -> Option<AudioPlayer> {
        self.lock().get(guild_id).cloned()
    }

    /// Whether the manager contains a player for the given guild.
    pub fn has(&self, guild_id: &str) -> bool {
        self.lock().contains_key(guild_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes the guild's entry if it is still the given player.
    fn release(&self, player: &AudioPlayer) {
        let mut players = self.lock();

        let current = players
            .get(player.guild_id())
            .map_or(false, |current| Arc::ptr_eq(&current.inner, &player.inner));

        if current {
            players.remove(player.guild_id());
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, AudioPlayer>> {
        match self.players.lock() {
            Ok(players) => players,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// The playback state of a player.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlayerStatus {
    /// No track is loaded.
    Idle,
    Playing,
    Paused,
    /// The player was torn down and can't be used anymore.
    Destroyed,
}

/// Options for [`AudioPlayer::play_with`].
#[derive(Clone, Copy, Debug)]
pub struct PlayOptions {
    /// The position to start at, in milliseconds.
    pub start: u64,
    /// The position to stop at, in milliseconds.
    pub end: Option<u64>,
    /// Whether to replace a track that is already playing. If `false` and a
    /// track is playing, the play is ignored.
    pub replace: bool,
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self {
            start: 0,
            end: None,
            replace: true,
        }
    }
}

#[derive(Debug)]
struct PlayerState {
    node: Arc<Node>,
    region: Option<String>,
    track: Option<Track>,
    paused: bool,
    /// The last position reported by the node, or set by a command.
    position: u64,
    /// The node's timestamp of the last position update.
    time: u64,
    last_update: Option<Instant>,
    volume: u16,
    equalizer: Equalizer,
    channel_id: Option<String>,
    session_id: Option<String>,
    voice_event: Option<Value>,
    voice_connected: bool,
    destroyed: bool,
}

impl PlayerState {
    fn estimated_position(&self) -> u64 {
        let track = match self.track {
            Some(ref track) => track,
            None => return 0,
        };

        let position = match self.last_update {
            Some(at) if !self.paused => {
                let elapsed = u64::try_from(at.elapsed().as_millis()).unwrap_or(u64::MAX);

                self.position.saturating_add(elapsed)
            },
            _ => self.position,
        };

        if track.is_stream {
            position
        } else {
            position.min(track.duration)
        }
    }
}

#[derive(Debug)]
struct PlayerInner {
    guild_id: String,
    state: Mutex<PlayerState>,
    /// Serializes commands, so that state is only committed in send order.
    commands: AsyncMutex<()>,
    manager: Weak<AudioPlayerManager>,
}

/// A handle to a guild's audio player.
///
/// Handles are cheap to clone and all refer to the same player. Commands are
/// sent through the node the player is bound to, and the player's state is
/// only updated once the node accepted the command.
#[derive(Clone, Debug)]
pub struct AudioPlayer {
    inner: Arc<PlayerInner>,
}

impl AudioPlayer {
    fn new(
        guild_id: &str,
        node: Arc<Node>,
        region: Option<String>,
        manager: Weak<AudioPlayerManager>,
    ) -> Self {
        let state = PlayerState {
            node,
            region,
            track: None,
            paused: false,
            position: 0,
            time: 0,
            last_update: None,
            volume: DEFAULT_VOLUME,
            equalizer: Equalizer::flat(),
            channel_id: None,
            session_id: None,
            voice_event: None,
            voice_connected: false,
            destroyed: false,
        };

        Self {
            inner: Arc::new(PlayerInner {
                guild_id: guild_id.to_owned(),
                state: Mutex::new(state),
                commands: AsyncMutex::new(()),
                manager,
            }),
        }
    }

    /// The ID of the guild that the player represents.
    pub fn guild_id(&self) -> &str {
        &self.inner.guild_id
    }

    /// The node the player is currently bound to.
    pub fn node(&self) -> Arc<Node> {
        Arc::clone(&self.lock().node)
    }

    pub fn node_id(&self) -> String {
        self.lock().node.identifier().to_owned()
    }

    pub fn status(&self) -> PlayerStatus {
        let state = self.lock();

        if state.destroyed {
            PlayerStatus::Destroyed
        } else if state.track.is_none() {
            PlayerStatus::Idle
        } else if state.paused {
            PlayerStatus::Paused
        } else {
            PlayerStatus::Playing
        }
    }

    /// The track that the player is playing.
    pub fn track(&self) -> Option<Track> {
        self.lock().track.clone()
    }

    /// Whether the player is paused.
    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    /// The volume setting, on a scale of 0 to 1000.
    pub fn volume(&self) -> u16 {
        self.lock().volume
    }

    pub fn equalizer(&self) -> Equalizer {
        self.lock().equalizer.clone()
    }

    /// The voice channel the player was last told it is in.
    pub fn channel_id(&self) -> Option<String> {
        self.lock().channel_id.clone()
    }

    /// Whether the node reports a voice connection for the guild.
    pub fn is_voice_connected(&self) -> bool {
        self.lock().voice_connected
    }

    /// The estimated position in the current track, in milliseconds.
    ///
    /// Interpolated from the node's last position update while playing.
    pub fn position(&self) -> u64 {
        self.lock().estimated_position()
    }

    /// The node's timestamp of its last position update.
    pub fn last_update_time(&self) -> u64 {
        self.lock().time
    }

    pub(crate) fn region(&self) -> Option<String> {
        self.lock().region.clone()
    }

    /// Plays a track from the beginning, or from a start position in
    /// milliseconds, replacing any current track.
    pub async fn play(&self, track: &Track, start: Option<u64>) -> Result<(), Error> {
        let options = PlayOptions {
            start: start.unwrap_or(0),
            ..PlayOptions::default()
        };

        self.play_with(track, options).await
    }

    pub async fn play_with(&self, track: &Track, options: PlayOptions) -> Result<(), Error> {
        let _guard = self.inner.commands.lock().await;

        let node = {
            let state = self.lock();
            self.check_alive(&state)?;

            if !options.replace && state.track.is_some() {
                debug!("[{}] Already playing, not replacing", self.guild_id());

                return Ok(());
            }

            Arc::clone(&state.node)
        };

        let mut play = Play::new(
            self.guild_id(),
            track.id.as_str(),
            options.start,
            options.end.filter(|end| *end > 0),
        );
        play.no_replace = !options.replace;

        node.send(&OutgoingMessage::Play(play)).await?;

        let mut state = self.lock();
        state.track = Some(track.clone());
        state.paused = false;
        state.position = options.start;
        state.time = 0;
        state.last_update = Some(Instant::now());

        debug!("[{}] Started playing track: {}", self.guild_id(), track.title);

        Ok(())
    }

    /// Sets the paused state. Does nothing if the player is already in the
    /// requested state.
    pub async fn set_pause(&self, pause: bool) -> Result<(), Error> {
        let _guard = self.inner.commands.lock().await;

        let node = {
            let state = self.lock();
            self.check_alive(&state)?;

            if state.paused == pause {
                return Ok(());
            }

            Arc::clone(&state.node)
        };

        node.send(&OutgoingMessage::Pause(Pause::new(self.guild_id(), pause))).await?;

        let mut state = self.lock();
        // Freeze or restart the position interpolation at the switch.
        state.position = state.estimated_position();
        state.last_update = Some(Instant::now());
        state.paused = pause;

        info!("[{}] Set pause: {}", self.guild_id(), pause);

        Ok(())
    }

    pub async fn pause(&self) -> Result<(), Error> {
        self.set_pause(true).await
    }

    pub async fn resume(&self) -> Result<(), Error> {
        self.set_pause(false).await
    }

    /// Seeks the current track to a position, in milliseconds.
    ///
    /// Returns [`Error::InvalidOperation`] if there is no track or the track
    /// is a stream.
    pub async fn seek(&self, position: u64) -> Result<(), Error> {
        let _guard = self.inner.commands.lock().await;

        let (node, position) = {
            let state = self.lock();
            self.check_alive(&state)?;

            let track = state
                .track
                .as_ref()
                .ok_or(Error::InvalidOperation("no track is loaded"))?;

            if !track.can_seek() {
                return Err(Error::InvalidOperation("the current track can't be seeked"));
            }

            (Arc::clone(&state.node), position.min(track.duration))
        };

        node.send(&OutgoingMessage::Seek(Seek::new(self.guild_id(), position))).await?;

        let mut state = self.lock();
        state.position = position;
        state.last_update = Some(Instant::now());

        Ok(())
    }

    /// Sets the volume, clamped to [`MIN_VOLUME`]..=[`MAX_VOLUME`].
    ///
    /// Returns the volume that was applied.
    pub async fn set_volume(&self, volume: i32) -> Result<u16, Error> {
        let volume = volume.clamp(i32::from(MIN_VOLUME), i32::from(MAX_VOLUME)) as u16;
        let _guard = self.inner.commands.lock().await;

        let node = self.bound_node()?;
        node.send(&OutgoingMessage::Volume(Volume::new(self.guild_id(), volume))).await?;

        self.lock().volume = volume;
        debug!("[{}] Set volume: {}", self.guild_id(), volume);

        Ok(volume)
    }

    pub async fn set_equalizer(&self, equalizer: Equalizer) -> Result<(), Error> {
        let _guard = self.inner.commands.lock().await;

        let node = self.bound_node()?;
        let update = EqualizerUpdate::new(self.guild_id(), equalizer.bands());
        node.send(&OutgoingMessage::Equalizer(update)).await?;

        debug!("[{}] Set equalizer: {}", self.guild_id(), equalizer.name());
        self.lock().equalizer = equalizer;

        Ok(())
    }

    /// Sets the gain of some bands, resetting the others to `0.0`.
    ///
    /// The bands are validated before anything is sent.
    pub async fn set_bands(&self, bands: &[(u8, f32)]) -> Result<(), Error> {
        let equalizer = Equalizer::build("Custom", bands)?;

        self.set_equalizer(equalizer).await
    }

    /// Stops the current track.
    pub async fn stop(&self) -> Result<(), Error> {
        let _guard = self.inner.commands.lock().await;

        let node = self.bound_node()?;
        node.send(&OutgoingMessage::Stop(Stop::new(self.guild_id()))).await?;

        let mut state = self.lock();
        debug!(
            "[{}] Stopped track: {:?}",
            self.guild_id(),
            state.track.as_ref().map(|track| &track.title),
        );
        state.track = None;
        state.position = 0;
        state.last_update = None;

        Ok(())
    }

    /// Destroys the player.
    ///
    /// The node is told to destroy its player if it is reachable, but the
    /// player is torn down locally either way and the guild is released for
    /// a new player.
    pub async fn destroy(&self) -> Result<(), Error> {
        let _guard = self.inner.commands.lock().await;

        let node = {
            let state = self.lock();

            if state.destroyed {
                return Ok(());
            }

            Arc::clone(&state.node)
        };

        if node.is_connected() {
            if let Err(why) = node.send(&OutgoingMessage::Destroy(Destroy::new(self.guild_id()))).await {
                warn!("[{}] Failed to send destroy: {}", self.guild_id(), why);
            }
        }

        self.teardown();
        info!("[{}] Player destroyed", self.guild_id());

        Ok(())
    }

    /// Forwards the guild's voice state from the host's voice gateway.
    ///
    /// A `channel_id` of `None` means the bot left the channel, clearing the
    /// stored voice state.
    pub async fn on_voice_state_update(
        &self,
        session_id: impl Into<String>,
        channel_id: Option<String>,
    ) -> Result<(), Error> {
        let _guard = self.inner.commands.lock().await;

        {
            let mut state = self.lock();
            self.check_alive(&state)?;

            match channel_id {
                Some(channel_id) => {
                    state.session_id = Some(session_id.into());
                    state.channel_id = Some(channel_id);
                },
                None => {
                    state.session_id = None;
                    state.voice_event = None;
                    state.channel_id = None;
                    state.voice_connected = false;

                    return Ok(());
                },
            }
        }

        self.dispatch_voice_update().await
    }

    /// Forwards the guild's voice server update from the host's voice
    /// gateway. The payload is sent to the node as-is.
    pub async fn on_voice_server_update(&self, event: Value) -> Result<(), Error> {
        let _guard = self.inner.commands.lock().await;

        {
            let mut state = self.lock();
            self.check_alive(&state)?;
            state.voice_event = Some(event);
        }

        self.dispatch_voice_update().await
    }

    /// Sends the voice state once both halves of it have arrived.
    async fn dispatch_voice_update(&self) -> Result<(), Error> {
        let (node, update) = {
            let state = self.lock();

            match (&state.session_id, &state.voice_event) {
                (Some(session_id), Some(event)) => {
                    let update = VoiceUpdate::new(self.guild_id(), session_id.as_str(), event.clone());

                    (Arc::clone(&state.node), update)
                },
                _ => return Ok(()),
            }
        };

        debug!("[{}] Dispatching voice update", self.guild_id());
        node.send(&OutgoingMessage::VoiceUpdate(update)).await?;
        self.lock().voice_connected = true;

        Ok(())
    }

    /// Moves the player to another node, resuming its playback there.
    ///
    /// The old node is told to destroy its player if it is still connected.
    /// Position accuracy is best-effort.
    pub(crate) async fn move_to(&self, target: Arc<Node>) -> Result<(), Error> {
        let _guard = self.inner.commands.lock().await;

        let (old, position, messages) = {
            let state = self.lock();
            self.check_alive(&state)?;

            if Arc::ptr_eq(&state.node, &target) {
                return Err(Error::InvalidOperation("the player is already on this node"));
            }

            let position = state.estimated_position();

            (Arc::clone(&state.node), position, self.resume_payload(&state, position))
        };

        if old.is_connected() {
            let destroy = OutgoingMessage::Destroy(Destroy::new(self.guild_id()));

            if let Err(why) = old.send(&destroy).await {
                debug!("[{}] Failed to destroy on {}: {}", self.guild_id(), old.identifier(), why);
            }
        }

        for message in &messages {
            target.send(message).await?;
        }

        let mut state = self.lock();
        old.unbind(self.guild_id());
        target.bind(self.guild_id());
        state.node = Arc::clone(&target);
        state.position = position;
        state.last_update = Some(Instant::now());

        info!(
            "[{}] Moved from node {} to {}",
            self.guild_id(),
            old.identifier(),
            target.identifier(),
        );

        Ok(())
    }

    /// The commands recreating the player's state on a fresh node.
    fn resume_payload(&self, state: &PlayerState, position: u64) -> Vec<OutgoingMessage> {
        let guild_id = self.guild_id();
        let mut messages = Vec::new();

        if let (Some(session_id), Some(event)) = (&state.session_id, &state.voice_event) {
            let update = VoiceUpdate::new(guild_id, session_id.as_str(), event.clone());
            messages.push(OutgoingMessage::VoiceUpdate(update));
        }

        match state.track {
            Some(ref track) => {
                let mut play = Play::new(guild_id, track.id.as_str(), position, None);

                if state.paused {
                    play.pause = Some(true);
                }

                if state.volume != DEFAULT_VOLUME {
                    play.volume = Some(state.volume);
                }

                messages.push(OutgoingMessage::Play(play));
            },
            None if state.volume != DEFAULT_VOLUME => {
                messages.push(OutgoingMessage::Volume(Volume::new(guild_id, state.volume)));
            },
            None => {},
        }

        if !state.equalizer.is_flat() {
            let update = EqualizerUpdate::new(guild_id, state.equalizer.bands());
            messages.push(OutgoingMessage::Equalizer(update));
        }

        messages
    }

    /// Marks the player destroyed, unbinds it from its node and releases the
    /// guild. Sends nothing.
    pub(crate) fn teardown(&self) {
        {
            let mut state = self.lock();

            if state.destroyed {
                return;
            }

            state.destroyed = true;
            state.track = None;
            state.voice_connected = false;
            state.node.unbind(self.guild_id());
        }

        if let Some(manager) = self.inner.manager.upgrade() {
            manager.release(self);
        }
    }

    pub(crate) fn update_state(&self, update: &PlayerUpdateState) {
        let mut state = self.lock();

        state.position = update.position;
        state.time = update.time;
        state.last_update = Some(Instant::now());

        if let Some(connected) = update.connected {
            state.voice_connected = connected;
        }
    }

    pub(crate) fn apply_event(&self, event: &Event) {
        let mut state = self.lock();

        let ended = match event {
            Event::TrackStart { .. } => None,
            Event::TrackEnd { reason: TrackEndReason::Replaced, .. } => None,
            Event::TrackEnd { track, .. }
            | Event::TrackException { track, .. }
            | Event::TrackStuck { track, .. } => Some(track),
            Event::ConnectionClosed { .. } => {
                state.voice_connected = false;

                None
            },
        };

        if let Some(ended) = ended {
            let current = state
                .track
                .as_ref()
                .map_or(false, |track| ended.is_empty() || track.id == *ended);

            if current {
                state.track = None;
                state.position = 0;
                state.last_update = None;
            }
        }
    }

    fn bound_node(&self) -> Result<Arc<Node>, Error> {
        let state = self.lock();
        self.check_alive(&state)?;

        Ok(Arc::clone(&state.node))
    }

    fn check_alive(&self, state: &PlayerState) -> Result<(), Error> {
        if state.destroyed {
            Err(Error::PlayerDestroyed(self.guild_id().to_owned()))
        } else {
            Ok(())
        }
    }

    fn lock(&self) -> MutexGuard<'_, PlayerState> {
        match self.inner.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::dispatcher::Dispatcher;
    use crate::event_handler::Listeners;
    use crate::nodes::NodeConfig;
    use tokio::sync::mpsc;

    fn track(id: &str, is_stream: bool) -> Track {
        Track {
            id: id.to_owned(),
            identifier: "dQw4w9WgXcQ".to_owned(),
            title: "a song".to_owned(),
            author: "someone".to_owned(),
            duration: 200_000,
            uri: None,
            is_stream,
            is_seekable: !is_stream,
            artwork: None,
            source: Some("youtube".to_owned()),
        }
    }

    /// A player bound to a node that is never connected.
    fn offline_player(guild_id: &str) -> (Arc<AudioPlayerManager>, AudioPlayer) {
        let manager = Arc::new(AudioPlayerManager::new());
        let dispatcher = Arc::new(Dispatcher::new(Arc::downgrade(&manager), Arc::new(Listeners::new())));
        let (lost, _) = mpsc::unbounded_channel();
        let node = Arc::new(Node::new(
            NodeConfig::new("A", "127.0.0.1", 1, "pass", "1"),
            0,
            &ClientConfig::default(),
            dispatcher,
            lost,
        ));
        let player = manager.create(guild_id, node, None).unwrap();

        (manager, player)
    }

    #[tokio::test]
    async fn test_one_player_per_guild() {
        let (manager, player) = offline_player("1");

        assert!(matches!(
            manager.create("1", player.node(), None),
            Err(Error::PlayerAlreadyExists(_)),
        ));
        assert_eq!(manager.len(), 1);
        assert_eq!(player.node().players(), vec!["1".to_owned()]);
    }

    #[tokio::test]
    async fn test_commands_fail_fast_when_offline() {
        let (_manager, player) = offline_player("1");

        assert!(matches!(
            player.play(&track("QAAA", false), None).await,
            Err(Error::NodeNotConnected(_)),
        ));
        assert!(matches!(player.set_volume(50).await, Err(Error::NodeNotConnected(_))));
        assert!(matches!(player.pause().await, Err(Error::NodeNotConnected(_))));

        assert_eq!(player.status(), PlayerStatus::Idle);
        assert_eq!(player.volume(), DEFAULT_VOLUME);
        assert!(!player.is_paused());
    }

    #[tokio::test]
    async fn test_resume_when_not_paused_is_a_noop() {
        let (_manager, player) = offline_player("1");

        // Nothing is sent, so the offline node doesn't matter.
        player.resume().await.unwrap();
    }

    #[tokio::test]
    async fn test_seek_validation() {
        let (_manager, player) = offline_player("1");

        assert!(matches!(player.seek(1000).await, Err(Error::InvalidOperation(_))));

        player.lock().track = Some(track("LIVE", true));

        assert!(matches!(player.seek(1000).await, Err(Error::InvalidOperation(_))));
        assert_eq!(player.status(), PlayerStatus::Playing);
        assert_eq!(player.track().map(|track| track.id), Some("LIVE".to_owned()));
    }

    #[tokio::test]
    async fn test_bad_bands_rejected_before_sending() {
        let (_manager, player) = offline_player("1");

        assert!(matches!(player.set_bands(&[(20, 0.1)]).await, Err(Error::InvalidOperation(_))));
        assert!(player.equalizer().is_flat());
    }

    #[tokio::test]
    async fn test_destroy_releases_guild() {
        let (manager, player) = offline_player("1");
        let node = player.node();

        player.destroy().await.unwrap();

        assert_eq!(player.status(), PlayerStatus::Destroyed);
        assert!(!manager.has("1"));
        assert!(node.players().is_empty());
        assert!(matches!(player.stop().await, Err(Error::PlayerDestroyed(_))));

        // Destroying twice is fine, and the guild can get a new player.
        player.destroy().await.unwrap();
        let fresh = manager.create("1", node, None).unwrap();
        assert_eq!(fresh.status(), PlayerStatus::Idle);
    }

    #[tokio::test]
    async fn test_track_end_clears_matching_track() {
        let (_manager, player) = offline_player("1");
        player.lock().track = Some(track("NEW", false));

        player.apply_event(&Event::TrackEnd {
            guild_id: "1".to_owned(),
            track: "OLD".to_owned(),
            reason: TrackEndReason::Finished,
        });
        assert_eq!(player.status(), PlayerStatus::Playing);

        player.apply_event(&Event::TrackEnd {
            guild_id: "1".to_owned(),
            track: "NEW".to_owned(),
            reason: TrackEndReason::Replaced,
        });
        assert_eq!(player.status(), PlayerStatus::Playing);

        player.apply_event(&Event::TrackException {
            guild_id: "1".to_owned(),
            track: "NEW".to_owned(),
            error: "boom".to_owned(),
        });
        assert_eq!(player.status(), PlayerStatus::Idle);
    }

    #[tokio::test]
    async fn test_position_is_clamped_and_frozen_when_paused() {
        let (_manager, player) = offline_player("1");
        assert_eq!(player.position(), 0);

        {
            let mut state = player.lock();
            state.track = Some(track("QAAA", false));
            state.position = 500_000;
            state.last_update = Some(Instant::now());
        }
        assert_eq!(player.position(), 200_000);

        {
            let mut state = player.lock();
            state.position = 1_000;
            state.paused = true;
        }
        assert_eq!(player.position(), 1_000);
        assert_eq!(player.status(), PlayerStatus::Paused);
    }

    #[tokio::test]
    async fn test_position_saturates_on_huge_reports() {
        let (_manager, player) = offline_player("1");
        player.lock().track = Some(track("LIVE", true));

        player.update_state(&PlayerUpdateState {
            time: 1,
            position: u64::MAX,
            connected: None,
        });
        std::thread::sleep(std::time::Duration::from_millis(5));

        assert_eq!(player.position(), u64::MAX);

        player.lock().track = Some(track("QAAA", false));
        assert_eq!(player.position(), 200_000);
    }

    #[tokio::test]
    async fn test_resume_payload() {
        let (_manager, player) = offline_player("1");

        {
            let mut state = player.lock();
            state.track = Some(track("QAAA", false));
            state.paused = true;
            state.volume = 40;
            state.session_id = Some("sess".to_owned());
            state.voice_event = Some(serde_json::json!({"token": "t"}));
            state.equalizer = Equalizer::metal();
        }

        let messages = {
            let state = player.lock();
            player.resume_payload(&state, 1234)
        };

        assert_eq!(messages.len(), 3);
        assert!(matches!(messages[0], OutgoingMessage::VoiceUpdate(_)));

        match messages[1] {
            OutgoingMessage::Play(ref play) => {
                assert_eq!(play.track, "QAAA");
                assert_eq!(play.start_time, 1234);
                assert_eq!(play.pause, Some(true));
                assert_eq!(play.volume, Some(40));
            },
            ref other => panic!("unexpected message: {:?}", other),
        }

        assert!(matches!(messages[2], OutgoingMessage::Equalizer(_)));
    }
}

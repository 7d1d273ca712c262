//! Per-guild playback sessions.
//!
//! A [`Session`] exists while the bot is connected to a voice channel in a
//! guild. Every operation on a session runs under that session's async
//! mutex, so node calls for one guild never interleave; two `play`
//! commands arriving together are handled one after the other.

use dashmap::DashMap;
use futures::future::join_all;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{
    filters::{EqPreset, FilterState},
    node::{Announcer, PlayerHandle},
    pool::NodePool,
    queue::{PlaybackQueue, QueuePreview, Track},
};
use crate::{
    config::MAX_VOLUME,
    error::{MusicError, MusicResult},
};

/// Volume assumed by relative adjustments when none is known yet.
pub const FALLBACK_VOLUME: u16 = 100;

/// What the "now playing" slot is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
}

/// Result of [`SessionController::enqueue_or_play`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    /// Nothing was playing; the track started right away.
    Playing(Track),
    /// Appended to the queue at the given 1-based position.
    Queued { track: Track, position: usize },
}

/// Result of [`SessionController::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Joined {
    Connected,
    AlreadyConnected,
}

pub struct Session {
    guild_id: GuildId,
    voice_channel: ChannelId,
    reply_to: ChannelId,
    player: Box<dyn PlayerHandle>,
    now_playing: Option<Track>,
    queue: PlaybackQueue,
    filters: FilterState,
    volume: Option<u16>,
    paused: bool,
}

impl Session {
    fn new(
        guild_id: GuildId,
        voice_channel: ChannelId,
        reply_to: ChannelId,
        player: Box<dyn PlayerHandle>,
    ) -> Self {
        Self {
            guild_id,
            voice_channel,
            reply_to,
            player,
            now_playing: None,
            queue: PlaybackQueue::new(),
            filters: FilterState::default(),
            volume: None,
            paused: false,
        }
    }

    pub fn state(&self) -> PlaybackState {
        if self.now_playing.is_some() {
            PlaybackState::Playing
        } else {
            PlaybackState::Idle
        }
    }

    async fn start(&mut self, track: Track) -> MusicResult<()> {
        // el nodo conserva la pausa entre pistas
        if self.paused {
            self.player.resume().await?;
            self.paused = false;
        }
        self.player.play(&track).await?;
        info!("🎵 Reproduciendo en guild {}: {}", self.guild_id, track.title);
        self.now_playing = Some(track);
        Ok(())
    }

    async fn apply_volume(&mut self, level: i64) -> MusicResult<u16> {
        let level = clamp_volume(level);
        self.player.set_volume(level).await?;
        self.volume = Some(level);
        debug!("🔊 Volumen en guild {} ajustado a {}", self.guild_id, level);
        Ok(level)
    }

    async fn apply_filters(&mut self, filters: FilterState) -> MusicResult<()> {
        self.player.set_filters(&filters).await?;
        self.filters = filters;
        Ok(())
    }
}

pub fn clamp_volume(level: i64) -> u16 {
    level.clamp(0, i64::from(MAX_VOLUME)) as u16
}

type SessionRef = Arc<Mutex<Session>>;

/// Owns every guild's session and drives them from commands and node events.
pub struct SessionController {
    pool: Arc<NodePool>,
    announcer: Arc<dyn Announcer>,
    sessions: DashMap<GuildId, SessionRef>,
    /// Per-guild gates so a guild never ends up with two players.
    join_gates: DashMap<GuildId, Arc<Mutex<()>>>,
    default_volume: u16,
}

impl SessionController {
    pub fn new(pool: Arc<NodePool>, announcer: Arc<dyn Announcer>, default_volume: u16) -> Self {
        Self {
            pool,
            announcer,
            sessions: DashMap::new(),
            join_gates: DashMap::new(),
            default_volume: default_volume.min(MAX_VOLUME),
        }
    }

    pub fn pool(&self) -> &Arc<NodePool> {
        &self.pool
    }

    #[cfg(test)]
    pub fn has_session(&self, guild_id: GuildId) -> bool {
        self.sessions.contains_key(&guild_id)
    }

    fn session(&self, guild_id: GuildId) -> MusicResult<SessionRef> {
        self.sessions
            .get(&guild_id)
            .map(|entry| entry.value().clone())
            .ok_or(MusicError::NoActiveSession)
    }

    /// Connects to the requester's voice channel, reusing a live session.
    pub async fn join(
        &self,
        guild_id: GuildId,
        requester_voice: Option<ChannelId>,
        reply_to: ChannelId,
    ) -> MusicResult<Joined> {
        let voice_channel = requester_voice.ok_or(MusicError::NotInVoice)?;

        let gate = self.join_gates.entry(guild_id).or_default().clone();
        let _gate = gate.lock().await;

        if let Some(existing) = self.sessions.get(&guild_id).map(|e| e.value().clone()) {
            let session = existing.lock().await;
            if session.player.is_connected() {
                debug!(
                    "Ya conectado en guild {} (canal {})",
                    guild_id, session.voice_channel
                );
                return Ok(Joined::AlreadyConnected);
            }

            warn!("La sesión en guild {} perdió su reproductor, reconectando", guild_id);
            if let Err(e) = session.player.disconnect().await {
                warn!("Error al cerrar el reproductor viejo en guild {}: {:#}", guild_id, e);
            }
            drop(session);
            self.sessions.remove(&guild_id);
        }

        let node = self.pool.ensure_node().await?;
        let player = node.open_player(guild_id, voice_channel).await?;

        let mut session = Session::new(guild_id, voice_channel, reply_to, player);
        if let Err(e) = session.apply_volume(i64::from(self.default_volume)).await {
            // sin volumen inicial el reproductor sigue siendo usable
            warn!("No se pudo fijar el volumen por defecto en guild {}: {}", guild_id, e);
        }

        info!(
            "🔊 Unido al canal de voz {} en guild {}",
            voice_channel, guild_id
        );
        self.sessions.insert(guild_id, Arc::new(Mutex::new(session)));

        Ok(Joined::Connected)
    }

    /// Tears the session down. Returns `false` if there was none.
    pub async fn leave(&self, guild_id: GuildId) -> bool {
        let Some((_, session)) = self.sessions.remove(&guild_id) else {
            return false;
        };

        let mut session = session.lock().await;
        session.queue.clear();
        session.now_playing = None;
        if let Err(e) = session.player.disconnect().await {
            error!("Error desconectando reproductor en guild {}: {:#}", guild_id, e);
        }

        info!("👋 Salida del canal de voz en guild {}", guild_id);
        true
    }

    /// Leaves every guild at once, used on shutdown. Returns how many
    /// sessions were torn down.
    pub async fn leave_all(&self) -> usize {
        let guilds: Vec<GuildId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        let left = join_all(guilds.into_iter().map(|guild_id| self.leave(guild_id))).await;
        left.into_iter().filter(|left| *left).count()
    }

    /// Resolves a query to its first track on the session's node.
    pub async fn search(&self, guild_id: GuildId, query: &str) -> MusicResult<Track> {
        let node = self.pool.ensure_node().await?;
        let tracks = node.search(guild_id, query).await?;

        tracks
            .into_iter()
            .next()
            .ok_or_else(|| MusicError::SearchEmpty(query.to_string()))
    }

    /// Starts `track` if the session is idle, otherwise queues it.
    pub async fn enqueue_or_play(&self, guild_id: GuildId, track: Track) -> MusicResult<Enqueued> {
        let session = self.session(guild_id)?;
        let mut session = session.lock().await;

        match session.state() {
            PlaybackState::Idle => {
                session.start(track.clone()).await?;
                Ok(Enqueued::Playing(track))
            }
            PlaybackState::Playing => {
                let position = session.queue.push(track.clone());
                Ok(Enqueued::Queued { track, position })
            }
        }
    }

    /// Node callback: the active track finished.
    ///
    /// Plays the queue head and announces it, or goes idle when the queue is
    /// empty. The session stays connected either way.
    pub async fn advance_on_track_end(&self, guild_id: GuildId) -> MusicResult<Option<Track>> {
        let session = self.session(guild_id)?;
        let mut session = session.lock().await;

        let Some(next) = session.queue.pop() else {
            session.now_playing = None;
            session.paused = false;
            debug!("Cola terminada en guild {}", guild_id);
            return Ok(None);
        };

        if let Err(e) = session.start(next.clone()).await {
            session.now_playing = None;
            return Err(e);
        }

        if session.queue.is_empty() {
            debug!("Última pista de la cola en guild {}", guild_id);
        } else {
            debug!("Quedan {} pistas en cola en guild {}", session.queue.len(), guild_id);
        }

        if let Err(e) = self
            .announcer
            .now_playing_next(session.reply_to, &next)
            .await
        {
            warn!("No se pudo anunciar la siguiente pista en guild {}: {:#}", guild_id, e);
        }

        Ok(Some(next))
    }

    /// Returns `false` when there is nothing to pause.
    pub async fn pause(&self, guild_id: GuildId) -> MusicResult<bool> {
        let session = self.session(guild_id)?;
        let mut session = session.lock().await;

        if session.state() == PlaybackState::Idle {
            return Ok(false);
        }

        session.player.pause().await?;
        session.paused = true;
        info!("⏸️ Pausado en guild {}", guild_id);
        Ok(true)
    }

    pub async fn resume(&self, guild_id: GuildId) -> MusicResult<()> {
        let session = self.session(guild_id)?;
        let mut session = session.lock().await;

        session.player.resume().await?;
        session.paused = false;
        info!("▶️ Reanudado en guild {}", guild_id);
        Ok(())
    }

    /// Stops the current track and returns it; the node's track-end event
    /// then advances the queue. `None` when nothing was playing.
    pub async fn skip(&self, guild_id: GuildId) -> MusicResult<Option<Track>> {
        let session = self.session(guild_id)?;
        let session = session.lock().await;

        let Some(current) = session.now_playing.clone() else {
            return Ok(None);
        };

        session.player.stop().await?;
        info!("⏭️ Saltada en guild {}: {}", guild_id, current.title);
        Ok(Some(current))
    }

    /// Clears the queue and stops playback, returning how many queued tracks
    /// were dropped.
    pub async fn stop(&self, guild_id: GuildId) -> MusicResult<usize> {
        let session = self.session(guild_id)?;
        let mut session = session.lock().await;

        let cleared = session.queue.clear();
        session.player.stop().await?;
        info!("⏹️ Detenido en guild {}", guild_id);
        Ok(cleared)
    }

    pub async fn set_volume(&self, guild_id: GuildId, level: i64) -> MusicResult<u16> {
        let session = self.session(guild_id)?;
        let mut session = session.lock().await;
        session.apply_volume(level).await
    }

    pub async fn adjust_volume(&self, guild_id: GuildId, delta: i64) -> MusicResult<u16> {
        let session = self.session(guild_id)?;
        let mut session = session.lock().await;

        let current = i64::from(session.volume.unwrap_or(FALLBACK_VOLUME));
        session.apply_volume(current.saturating_add(delta)).await
    }

    /// Applies a bass preset by name. Unknown names leave the filters as
    /// they are.
    pub async fn set_equalizer(&self, guild_id: GuildId, preset: &str) -> MusicResult<EqPreset> {
        let session = self.session(guild_id)?;
        let preset: EqPreset = preset.parse()?;

        let mut session = session.lock().await;
        session.apply_filters(FilterState::equalizer(preset)).await?;
        info!("🎚️ Refuerzo de graves en guild {}: {}", guild_id, preset);
        Ok(preset)
    }

    pub async fn set_playback_rate(&self, guild_id: GuildId, rate: f64) -> MusicResult<f64> {
        let session = self.session(guild_id)?;
        let mut session = session.lock().await;

        let filters = FilterState::playback_rate(rate);
        let applied = filters.rate;
        session.apply_filters(filters).await?;
        info!("⏩ Velocidad en guild {}: {:.2}", guild_id, applied);
        Ok(applied)
    }

    pub async fn reset_filters(&self, guild_id: GuildId) -> MusicResult<()> {
        let session = self.session(guild_id)?;
        let mut session = session.lock().await;

        session.apply_filters(FilterState::default()).await?;
        info!("♻️ Filtros limpiados en guild {}", guild_id);
        Ok(())
    }

    /// `None` when there is no session or nothing is playing.
    pub async fn now_playing(&self, guild_id: GuildId) -> Option<Track> {
        let session = self.session(guild_id).ok()?;
        let session = session.lock().await;
        session.now_playing.clone()
    }

    /// `false` when there is no session.
    pub async fn is_paused(&self, guild_id: GuildId) -> bool {
        match self.session(guild_id) {
            Ok(session) => session.lock().await.paused,
            Err(_) => false,
        }
    }

    /// `None` when there is no session.
    pub async fn queue_preview(&self, guild_id: GuildId, limit: usize) -> Option<QueuePreview> {
        let session = self.session(guild_id).ok()?;
        let session = session.lock().await;
        Some(session.queue.preview(limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        node::{AudioNode, MockNodeConnector, NodeEndpoint},
        testing::{FakeNode, PlayerCall, RecordingAnnouncer},
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::{sync::Notify, time::Instant};
    use url::Url;

    const GUILD: GuildId = GuildId::new(1);
    const VOICE: ChannelId = ChannelId::new(10);
    const TEXT: ChannelId = ChannelId::new(20);

    struct Harness {
        controller: SessionController,
        node: Arc<FakeNode>,
        announcer: Arc<RecordingAnnouncer>,
    }

    /// Controller over `node`; reconnecting revives the node.
    fn controller_with(node: &Arc<FakeNode>, announcer: Arc<dyn Announcer>) -> SessionController {
        let mut connector = MockNodeConnector::new();
        {
            let node = node.clone();
            connector.expect_connect().returning(move |_| {
                node.set_connected(true);
                Ok(node.clone() as Arc<dyn AudioNode>)
            });
        }
        let pool = Arc::new(NodePool::new(
            Arc::new(connector),
            NodeEndpoint {
                url: Url::parse("http://127.0.0.1:2333").unwrap(),
                password: "changeme".to_string(),
            },
        ));
        SessionController::new(pool, announcer, 50)
    }

    fn harness() -> Harness {
        let node = Arc::new(FakeNode::new("http://127.0.0.1:2333"));
        let announcer = Arc::new(RecordingAnnouncer::default());
        let controller = controller_with(&node, announcer.clone());

        Harness {
            controller,
            node,
            announcer,
        }
    }

    async fn joined() -> Harness {
        let h = harness();
        h.controller.join(GUILD, Some(VOICE), TEXT).await.unwrap();
        h.node.clear_calls();
        h
    }

    fn track(title: &str) -> Track {
        Track::new(title, format!("enc:{title}"))
    }

    async fn snapshot(h: &Harness) -> (Option<Track>, Vec<Track>) {
        let session = h.controller.session(GUILD).unwrap();
        let session = session.lock().await;
        (
            session.now_playing.clone(),
            session.queue.iter().cloned().collect(),
        )
    }

    #[tokio::test]
    async fn test_join_requires_voice_channel() {
        let h = harness();
        let err = h.controller.join(GUILD, None, TEXT).await.unwrap_err();

        assert!(matches!(err, MusicError::NotInVoice));
        assert!(!h.controller.has_session(GUILD));
        assert_eq!(h.node.player_count(), 0);
    }

    #[tokio::test]
    async fn test_join_sets_default_volume_and_is_reused() {
        let h = harness();
        assert_eq!(
            h.controller.join(GUILD, Some(VOICE), TEXT).await.unwrap(),
            Joined::Connected
        );
        assert_eq!(h.node.calls(), vec![PlayerCall::Volume(50)]);

        assert_eq!(
            h.controller.join(GUILD, Some(VOICE), TEXT).await.unwrap(),
            Joined::AlreadyConnected
        );
        assert_eq!(h.node.player_count(), 1);

        let session = h.controller.session(GUILD).unwrap();
        let session = session.lock().await;
        assert_eq!(session.volume, Some(50));
        assert_eq!(session.reply_to, TEXT);
        assert_eq!(session.voice_channel, VOICE);
        assert_eq!(session.state(), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_join_rebuilds_session_with_dead_player() {
        let h = joined().await;
        h.controller.enqueue_or_play(GUILD, track("A")).await.unwrap();
        h.node.clear_calls();

        h.node.set_connected(false);
        assert_eq!(
            h.controller.join(GUILD, Some(VOICE), TEXT).await.unwrap(),
            Joined::Connected
        );

        assert_eq!(
            h.node.calls(),
            vec![PlayerCall::Disconnect, PlayerCall::Volume(50)]
        );
        assert_eq!(h.node.player_count(), 1);
        assert_eq!(h.controller.now_playing(GUILD).await, None);
    }

    #[derive(Default)]
    struct SlowAnnouncer {
        started: Notify,
    }

    #[async_trait::async_trait]
    impl Announcer for SlowAnnouncer {
        async fn now_playing_next(&self, _channel: ChannelId, _track: &Track) -> anyhow::Result<()> {
            self.started.notify_one();
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_guild_does_not_hold_up_other_joins() {
        let node = Arc::new(FakeNode::new("http://127.0.0.1:2333"));
        let announcer = Arc::new(SlowAnnouncer::default());
        let controller = Arc::new(controller_with(&node, announcer.clone()));
        let other = GuildId::new(2);

        controller.join(GUILD, Some(VOICE), TEXT).await.unwrap();
        for title in ["A", "B"] {
            controller.enqueue_or_play(GUILD, track(title)).await.unwrap();
        }

        let advancing = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.advance_on_track_end(GUILD).await })
        };
        announcer.started.notified().await;

        // waits on GUILD's session while holding GUILD's join gate
        let rejoining = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.join(GUILD, Some(VOICE), TEXT).await })
        };
        tokio::task::yield_now().await;

        let started = Instant::now();
        assert_eq!(
            controller.join(other, Some(VOICE), TEXT).await.unwrap(),
            Joined::Connected
        );
        assert!(started.elapsed() < Duration::from_secs(1));

        assert_eq!(advancing.await.unwrap().unwrap(), Some(track("B")));
        assert_eq!(rejoining.await.unwrap().unwrap(), Joined::AlreadyConnected);
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let h = joined().await;

        assert!(h.controller.leave(GUILD).await);
        assert!(!h.controller.has_session(GUILD));
        assert_eq!(h.node.calls(), vec![PlayerCall::Disconnect]);
        assert_eq!(h.node.player_count(), 0);

        assert!(!h.controller.leave(GUILD).await);
    }

    #[tokio::test]
    async fn test_leave_all_disconnects_every_guild() {
        let h = joined().await;
        let other = GuildId::new(2);
        h.controller.join(other, Some(VOICE), TEXT).await.unwrap();
        assert_eq!(h.node.player_count(), 2);

        assert_eq!(h.controller.leave_all().await, 2);
        assert!(!h.controller.has_session(GUILD));
        assert!(!h.controller.has_session(other));
        assert_eq!(h.node.player_count(), 0);
        assert_eq!(h.controller.leave_all().await, 0);
    }

    #[tokio::test]
    async fn test_first_track_plays_and_rest_are_queued() {
        let h = joined().await;

        let first = h.controller.enqueue_or_play(GUILD, track("A")).await.unwrap();
        assert_eq!(first, Enqueued::Playing(track("A")));
        let (current, queue) = snapshot(&h).await;
        assert_eq!(current, Some(track("A")));
        assert!(queue.is_empty());

        for (i, title) in ["B", "C", "D"].into_iter().enumerate() {
            let outcome = h.controller.enqueue_or_play(GUILD, track(title)).await.unwrap();
            assert_eq!(
                outcome,
                Enqueued::Queued {
                    track: track(title),
                    position: i + 1
                }
            );
        }

        let (current, queue) = snapshot(&h).await;
        assert_eq!(current, Some(track("A")));
        assert_eq!(queue, vec![track("B"), track("C"), track("D")]);
        assert_eq!(h.node.calls(), vec![PlayerCall::Play("A".to_string())]);
    }

    #[tokio::test]
    async fn test_enqueue_without_session_fails() {
        let h = harness();
        let err = h.controller.enqueue_or_play(GUILD, track("A")).await.unwrap_err();
        assert!(matches!(err, MusicError::NoActiveSession));
    }

    #[tokio::test]
    async fn test_track_end_advances_and_announces() {
        let h = joined().await;
        for title in ["A", "B", "C"] {
            h.controller.enqueue_or_play(GUILD, track(title)).await.unwrap();
        }

        let next = h.controller.advance_on_track_end(GUILD).await.unwrap();
        assert_eq!(next, Some(track("B")));

        let (current, queue) = snapshot(&h).await;
        assert_eq!(current, Some(track("B")));
        assert_eq!(queue, vec![track("C")]);
        assert_eq!(h.announcer.sent(), vec![(TEXT, "B".to_string())]);
    }

    #[tokio::test]
    async fn test_track_end_on_empty_queue_goes_idle() {
        let h = joined().await;
        h.controller.enqueue_or_play(GUILD, track("A")).await.unwrap();

        assert_eq!(h.controller.advance_on_track_end(GUILD).await.unwrap(), None);

        let (current, queue) = snapshot(&h).await;
        assert_eq!(current, None);
        assert!(queue.is_empty());
        assert!(h.announcer.sent().is_empty());
        // still connected
        assert!(h.controller.has_session(GUILD));
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let h = joined().await;
        assert!(!h.controller.pause(GUILD).await.unwrap());
        assert!(h.node.calls().is_empty());

        h.controller.enqueue_or_play(GUILD, track("A")).await.unwrap();
        assert!(h.controller.pause(GUILD).await.unwrap());
        assert!(h.controller.is_paused(GUILD).await);
        h.controller.resume(GUILD).await.unwrap();
        assert!(!h.controller.is_paused(GUILD).await);

        assert_eq!(
            h.node.calls(),
            vec![
                PlayerCall::Play("A".to_string()),
                PlayerCall::Pause,
                PlayerCall::Resume
            ]
        );

        let other = GuildId::new(2);
        assert!(matches!(
            h.controller.pause(other).await.unwrap_err(),
            MusicError::NoActiveSession
        ));
        assert!(matches!(
            h.controller.resume(other).await.unwrap_err(),
            MusicError::NoActiveSession
        ));
    }

    #[tokio::test]
    async fn test_skip_stops_current_and_waits_for_track_end() {
        let h = joined().await;
        assert_eq!(h.controller.skip(GUILD).await.unwrap(), None);
        assert!(h.node.calls().is_empty());

        h.controller.enqueue_or_play(GUILD, track("A")).await.unwrap();
        h.controller.enqueue_or_play(GUILD, track("B")).await.unwrap();

        assert_eq!(h.controller.skip(GUILD).await.unwrap(), Some(track("A")));
        assert_eq!(h.node.calls().last(), Some(&PlayerCall::Stop));

        // the node reports the end of A
        h.controller.advance_on_track_end(GUILD).await.unwrap();
        assert_eq!(h.controller.now_playing(GUILD).await, Some(track("B")));
    }

    #[tokio::test]
    async fn test_next_track_after_paused_skip_is_audible() {
        let h = joined().await;
        h.controller.enqueue_or_play(GUILD, track("A")).await.unwrap();
        h.controller.enqueue_or_play(GUILD, track("B")).await.unwrap();

        assert!(h.controller.pause(GUILD).await.unwrap());
        h.controller.skip(GUILD).await.unwrap();
        h.controller.advance_on_track_end(GUILD).await.unwrap();

        assert!(!h.controller.is_paused(GUILD).await);
        assert_eq!(
            h.node.calls(),
            vec![
                PlayerCall::Play("A".to_string()),
                PlayerCall::Pause,
                PlayerCall::Stop,
                PlayerCall::Resume,
                PlayerCall::Play("B".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_clears_queue() {
        let h = joined().await;
        for title in ["A", "B", "C"] {
            h.controller.enqueue_or_play(GUILD, track(title)).await.unwrap();
        }

        assert_eq!(h.controller.stop(GUILD).await.unwrap(), 2);
        assert_eq!(h.node.calls().last(), Some(&PlayerCall::Stop));

        h.controller.advance_on_track_end(GUILD).await.unwrap();
        assert_eq!(h.controller.now_playing(GUILD).await, None);
        assert!(h.controller.queue_preview(GUILD, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_volume_is_clamped() {
        let h = joined().await;

        assert_eq!(h.controller.set_volume(GUILD, 999).await.unwrap(), 150);
        assert_eq!(h.controller.set_volume(GUILD, -5).await.unwrap(), 0);
        assert_eq!(h.controller.adjust_volume(GUILD, 10).await.unwrap(), 10);
        assert_eq!(h.controller.adjust_volume(GUILD, -9999).await.unwrap(), 0);
        assert_eq!(h.controller.adjust_volume(GUILD, i64::MAX).await.unwrap(), 150);

        assert_eq!(
            h.node.calls(),
            vec![
                PlayerCall::Volume(150),
                PlayerCall::Volume(0),
                PlayerCall::Volume(10),
                PlayerCall::Volume(0),
                PlayerCall::Volume(150),
            ]
        );
    }

    #[tokio::test]
    async fn test_adjust_volume_defaults_to_hundred_when_unknown() {
        let h = joined().await;
        {
            let session = h.controller.session(GUILD).unwrap();
            session.lock().await.volume = None;
        }

        assert_eq!(h.controller.adjust_volume(GUILD, -10).await.unwrap(), 90);
    }

    #[tokio::test]
    async fn test_equalizer_presets() {
        let h = joined().await;

        assert_eq!(
            h.controller.set_equalizer(GUILD, "extreme").await.unwrap(),
            EqPreset::Extreme
        );
        let expected = FilterState::equalizer(EqPreset::Extreme);
        assert_eq!(h.node.calls(), vec![PlayerCall::Filters(expected.clone())]);

        let err = h.controller.set_equalizer(GUILD, "unknown").await.unwrap_err();
        assert!(matches!(err, MusicError::InvalidPreset(_)));

        let session = h.controller.session(GUILD).unwrap();
        assert_eq!(session.lock().await.filters, expected);
        assert_eq!(h.node.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_playback_rate_and_reset() {
        let h = joined().await;

        assert_eq!(h.controller.set_playback_rate(GUILD, 5.0).await.unwrap(), 2.0);
        assert_eq!(h.controller.set_playback_rate(GUILD, 0.75).await.unwrap(), 0.75);
        h.controller.reset_filters(GUILD).await.unwrap();

        assert_eq!(
            h.node.calls(),
            vec![
                PlayerCall::Filters(FilterState::playback_rate(2.0)),
                PlayerCall::Filters(FilterState::playback_rate(0.75)),
                PlayerCall::Filters(FilterState::default()),
            ]
        );
    }

    #[tokio::test]
    async fn test_search_returns_first_match() {
        let h = joined().await;
        h.node
            .catalog
            .lock()
            .extend([track("Lofi Beats"), track("Lofi Rain")]);

        assert_eq!(
            h.controller.search(GUILD, "lofi").await.unwrap(),
            track("Lofi Beats")
        );
        assert!(matches!(
            h.controller.search(GUILD, "metal").await.unwrap_err(),
            MusicError::SearchEmpty(ref q) if q == "metal"
        ));
    }

    #[tokio::test]
    async fn test_concurrent_plays_are_serialized() {
        let h = Arc::new(joined().await);

        let plays: Vec<_> = ["A", "B", "C", "D"]
            .into_iter()
            .map(|title| {
                let h = h.clone();
                tokio::spawn(async move { h.controller.enqueue_or_play(GUILD, track(title)).await })
            })
            .collect();

        let mut started = 0;
        for play in plays {
            if let Enqueued::Playing(_) = play.await.unwrap().unwrap() {
                started += 1;
            }
        }

        assert_eq!(started, 1);
        assert_eq!(h.controller.queue_preview(GUILD, 10).await.unwrap().items.len(), 3);
    }
}

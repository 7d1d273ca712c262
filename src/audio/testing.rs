//! In-memory node, player and announcer used by the unit tests.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use super::{
    filters::FilterState,
    node::{Announcer, AudioNode, PlayerHandle},
    queue::Track,
};

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCall {
    Play(String),
    Pause,
    Resume,
    Stop,
    Volume(u16),
    Filters(FilterState),
    Disconnect,
}

pub struct FakeNode {
    uri: String,
    connected: Arc<AtomicBool>,
    players: Arc<AtomicUsize>,
    pub calls: Arc<Mutex<Vec<PlayerCall>>>,
    pub catalog: Mutex<Vec<Track>>,
}

impl FakeNode {
    pub fn new(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            connected: Arc::new(AtomicBool::new(true)),
            players: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(Mutex::new(Vec::new())),
            catalog: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<PlayerCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Simulates the node's socket going down or coming back. Players on a
    /// dead node report themselves disconnected.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl AudioNode for FakeNode {
    fn uri(&self) -> String {
        self.uri.clone()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn player_count(&self) -> usize {
        self.players.load(Ordering::SeqCst)
    }

    async fn open_player(
        &self,
        _guild_id: GuildId,
        _voice_channel: ChannelId,
    ) -> Result<Box<dyn PlayerHandle>> {
        self.players.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePlayer {
            calls: self.calls.clone(),
            players: self.players.clone(),
            node_alive: self.connected.clone(),
            connected: AtomicBool::new(true),
        }))
    }

    async fn search(&self, _guild_id: GuildId, query: &str) -> Result<Vec<Track>> {
        let needle = query.to_lowercase();
        Ok(self
            .catalog
            .lock()
            .iter()
            .filter(|track| track.title.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }
}

pub struct FakePlayer {
    calls: Arc<Mutex<Vec<PlayerCall>>>,
    players: Arc<AtomicUsize>,
    node_alive: Arc<AtomicBool>,
    connected: AtomicBool,
}

impl FakePlayer {
    fn record(&self, call: PlayerCall) -> Result<()> {
        self.calls.lock().push(call);
        Ok(())
    }
}

#[async_trait]
impl PlayerHandle for FakePlayer {
    async fn play(&self, track: &Track) -> Result<()> {
        self.record(PlayerCall::Play(track.title.clone()))
    }

    async fn pause(&self) -> Result<()> {
        self.record(PlayerCall::Pause)
    }

    async fn resume(&self) -> Result<()> {
        self.record(PlayerCall::Resume)
    }

    async fn stop(&self) -> Result<()> {
        self.record(PlayerCall::Stop)
    }

    async fn set_volume(&self, volume: u16) -> Result<()> {
        self.record(PlayerCall::Volume(volume))
    }

    async fn set_filters(&self, filters: &FilterState) -> Result<()> {
        self.record(PlayerCall::Filters(filters.clone()))
    }

    async fn disconnect(&self) -> Result<()> {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.players.fetch_sub(1, Ordering::SeqCst);
        }
        self.record(PlayerCall::Disconnect)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.node_alive.load(Ordering::SeqCst)
    }
}

/// Collects every "now playing next" notification.
#[derive(Default)]
pub struct RecordingAnnouncer {
    pub sent: Mutex<Vec<(ChannelId, String)>>,
}

impl RecordingAnnouncer {
    pub fn sent(&self) -> Vec<(ChannelId, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Announcer for RecordingAnnouncer {
    async fn now_playing_next(&self, channel: ChannelId, track: &Track) -> Result<()> {
        self.sent.lock().push((channel, track.title.clone()));
        Ok(())
    }
}

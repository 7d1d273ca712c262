//! Seams towards the external audio node.
//!
//! The session controller and the node pool only talk to these traits; the
//! Lavalink implementation lives in [`super::lavalink_client`].

use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use url::Url;

use super::{filters::FilterState, queue::Track};

/// Where and how to reach an audio node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEndpoint {
    pub url: Url,
    pub password: String,
}

impl NodeEndpoint {
    /// `host:port`, the form the node client expects.
    pub fn authority(&self) -> String {
        match (self.url.host_str(), self.url.port_or_known_default()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => self.url.to_string(),
        }
    }

    pub fn is_ssl(&self) -> bool {
        self.url.scheme() == "https"
    }
}

/// Opens connections to audio nodes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NodeConnector: Send + Sync {
    async fn connect(&self, endpoint: &NodeEndpoint) -> Result<Arc<dyn AudioNode>>;
}

/// One live connection to an audio node.
#[async_trait]
pub trait AudioNode: Send + Sync {
    fn uri(&self) -> String;

    fn is_connected(&self) -> bool;

    /// Players currently hosted on this node.
    fn player_count(&self) -> usize;

    /// Joins `voice_channel` and creates a player for the guild on this node.
    async fn open_player(
        &self,
        guild_id: GuildId,
        voice_channel: ChannelId,
    ) -> Result<Box<dyn PlayerHandle>>;

    /// Resolves a user query (URL or free text) into tracks.
    async fn search(&self, guild_id: GuildId, query: &str) -> Result<Vec<Track>>;
}

/// Per-guild player living on an audio node.
#[async_trait]
pub trait PlayerHandle: Send + Sync {
    async fn play(&self, track: &Track) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    /// Stops the current track; the node answers with a track-end event.
    async fn stop(&self) -> Result<()>;

    async fn set_volume(&self, volume: u16) -> Result<()>;

    async fn set_filters(&self, filters: &FilterState) -> Result<()>;

    /// Destroys the player and leaves the voice channel.
    async fn disconnect(&self) -> Result<()>;

    fn is_connected(&self) -> bool;
}

/// Callbacks coming back from a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    Ready { node: String, session_id: String },
    TrackEnd { guild_id: GuildId },
}

/// Sends asynchronous notifications to a session's reply channel.
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn now_playing_next(&self, channel: ChannelId, track: &Track) -> Result<()>;
}

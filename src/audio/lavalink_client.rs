use anyhow::{Context, Result};
use async_trait::async_trait;
use lavalink_rs::{
    model::{
        events,
        http::{UpdatePlayer, UpdatePlayerTrack},
        player::{ConnectionInfo, Equalizer, Filters, Timescale},
        track::{TrackData, TrackLoadData},
        GuildId as NodeGuildId, UserId as NodeUserId,
    },
    prelude::{LavalinkClient, NodeBuilder, NodeDistributionStrategy, PlayerContext},
};
use serenity::model::id::{ChannelId, GuildId, UserId};
use songbird::Songbird;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{mpsc::UnboundedSender, Mutex};
use tracing::{debug, error, info, warn};

use super::{
    filters::FilterState,
    node::{AudioNode, NodeConnector, NodeEndpoint, NodeEvent, PlayerHandle},
    queue::Track,
};

/// How long the `/version` check may take before the attempt counts as failed.
const VERSION_TIMEOUT: Duration = Duration::from_secs(5);

/// Turns a user query into a Lavalink identifier: URLs are loaded as-is,
/// anything else is a YouTube search.
pub fn search_identifier(query: &str) -> String {
    let query = query.trim();
    if query.starts_with("http://") || query.starts_with("https://") {
        query.to_string()
    } else {
        format!("ytsearch:{}", query)
    }
}

/// Shared with the lavalink-rs hooks through the client's user data.
struct NodeSink {
    uri: String,
    events: UnboundedSender<NodeEvent>,
}

impl NodeSink {
    fn send(&self, event: NodeEvent) {
        if self.events.send(event).is_err() {
            warn!("Evento de nodo descartado, el receptor ya no existe");
        }
    }
}

#[lavalink_rs::hook]
async fn on_ready(client: LavalinkClient, session_id: String, _event: &events::Ready) {
    match client.data::<NodeSink>() {
        Ok(sink) => sink.send(NodeEvent::Ready {
            node: sink.uri.clone(),
            session_id,
        }),
        Err(e) => error!("Cliente Lavalink sin canal de eventos: {:?}", e),
    }
}

/// Whether a track end should move the guild's queue forward. Replaced and
/// cleaned-up players end their track without the guild being done with it.
fn starts_next(reason: &events::TrackEndReason) -> bool {
    !matches!(
        reason,
        events::TrackEndReason::Replaced | events::TrackEndReason::Cleanup
    )
}

#[lavalink_rs::hook]
async fn on_track_end(client: LavalinkClient, _session_id: String, event: &events::TrackEnd) {
    if !starts_next(&event.reason) {
        debug!(
            "Fin de pista ignorado en guild {} ({:?})",
            event.guild_id.0, event.reason
        );
        return;
    }

    debug!("Pista terminada en guild {} ({:?})", event.guild_id.0, event.reason);
    match client.data::<NodeSink>() {
        Ok(sink) => sink.send(NodeEvent::TrackEnd {
            guild_id: GuildId::new(event.guild_id.0),
        }),
        Err(e) => error!("Cliente Lavalink sin canal de eventos: {:?}", e),
    }
}

/// Connects to Lavalink through `lavalink-rs`, joining voice via Songbird.
///
/// The `LavalinkClient` is built once and reused: it keeps reconnecting its
/// websocket on its own, so later `connect` calls only check whether it is up.
pub struct LavalinkConnector {
    user_id: UserId,
    songbird: Arc<Songbird>,
    events: UnboundedSender<NodeEvent>,
    http: reqwest::Client,
    node: Mutex<Option<Arc<LavalinkNode>>>,
}

impl LavalinkConnector {
    pub fn new(
        user_id: UserId,
        songbird: Arc<Songbird>,
        events: UnboundedSender<NodeEvent>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(VERSION_TIMEOUT)
            .build()
            .context("Error building HTTP client")?;

        Ok(Self {
            user_id,
            songbird,
            events,
            http,
            node: Mutex::new(None),
        })
    }

    /// Fails fast when the node is down or rejects the password.
    async fn fetch_version(&self, endpoint: &NodeEndpoint) -> Result<String> {
        let url = endpoint.url.join("version").context("invalid node URL")?;
        let version = self
            .http
            .get(url)
            .header("Authorization", &endpoint.password)
            .send()
            .await
            .with_context(|| format!("node {} unreachable", endpoint.url))?
            .error_for_status()
            .with_context(|| format!("node {} refused the connection", endpoint.url))?
            .text()
            .await?;

        Ok(version.trim().to_string())
    }

    async fn build(&self, endpoint: &NodeEndpoint) -> LavalinkNode {
        let events = events::Events {
            ready: Some(on_ready),
            track_end: Some(on_track_end),
            ..Default::default()
        };

        let node = NodeBuilder {
            hostname: endpoint.authority(),
            is_ssl: endpoint.is_ssl(),
            events: events::Events::default(),
            password: endpoint.password.clone(),
            user_id: NodeUserId(self.user_id.get()),
            session_id: None,
        };

        let uri = endpoint.url.to_string();
        let sink = Arc::new(NodeSink {
            uri: uri.clone(),
            events: self.events.clone(),
        });

        let client = LavalinkClient::new_with_data(
            events,
            vec![node],
            NodeDistributionStrategy::round_robin(),
            sink,
        )
        .await;

        LavalinkNode {
            uri,
            client,
            songbird: self.songbird.clone(),
            players: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl NodeConnector for LavalinkConnector {
    async fn connect(&self, endpoint: &NodeEndpoint) -> Result<Arc<dyn AudioNode>> {
        let mut cached = self.node.lock().await;

        let node = match cached.as_ref() {
            Some(node) => node.clone(),
            None => {
                let version = self.fetch_version(endpoint).await?;
                info!("🎼 Lavalink {} respondiendo en {}", version, endpoint.url);

                let node = Arc::new(self.build(endpoint).await);
                *cached = Some(node.clone());
                node
            }
        };

        // new_with_data solo registra el fallo del websocket, no lo devuelve
        if !node.is_connected() {
            anyhow::bail!("Lavalink websocket at {} is not open", endpoint.url);
        }

        Ok(node as Arc<dyn AudioNode>)
    }
}

/// Real websocket state; lavalink-rs flips it on disconnect and reconnect.
fn socket_open(client: &LavalinkClient) -> bool {
    client
        .nodes
        .iter()
        .any(|node| node.is_running.load(Ordering::SeqCst))
}

pub struct LavalinkNode {
    uri: String,
    client: LavalinkClient,
    songbird: Arc<Songbird>,
    players: Arc<AtomicUsize>,
}

#[async_trait]
impl AudioNode for LavalinkNode {
    fn uri(&self) -> String {
        self.uri.clone()
    }

    fn is_connected(&self) -> bool {
        socket_open(&self.client)
    }

    fn player_count(&self) -> usize {
        self.players.load(Ordering::SeqCst)
    }

    async fn open_player(
        &self,
        guild_id: GuildId,
        voice_channel: ChannelId,
    ) -> Result<Box<dyn PlayerHandle>> {
        let (info, _call) = self
            .songbird
            .join_gateway(guild_id, voice_channel)
            .await
            .context("Error joining the voice channel")?;

        let connection = ConnectionInfo {
            endpoint: info.endpoint,
            token: info.token,
            session_id: info.session_id,
        };

        let context = match self
            .client
            .create_player_context(NodeGuildId(guild_id.get()), connection)
            .await
        {
            Ok(context) => context,
            Err(e) => {
                // una llamada sin reproductor no sirve, salir del canal
                if let Err(leave_err) = self.songbird.remove(guild_id).await {
                    warn!("Error al salir del canal de voz en guild {}: {:?}", guild_id, leave_err);
                }
                return Err(anyhow::Error::new(e).context("Error creating Lavalink player"));
            }
        };

        self.players.fetch_add(1, Ordering::SeqCst);
        info!("🔊 Reproductor Lavalink creado para guild {}", guild_id);

        Ok(Box::new(LavalinkPlayer {
            guild_id,
            context,
            client: self.client.clone(),
            songbird: self.songbird.clone(),
            players: self.players.clone(),
            connected: AtomicBool::new(true),
        }))
    }

    async fn search(&self, guild_id: GuildId, query: &str) -> Result<Vec<Track>> {
        let identifier = search_identifier(query);
        let loaded = self
            .client
            .load_tracks(NodeGuildId(guild_id.get()), &identifier)
            .await
            .context("Error searching tracks")?;

        let tracks = match loaded.data {
            Some(TrackLoadData::Track(track)) => vec![track],
            Some(TrackLoadData::Search(tracks)) => tracks,
            Some(TrackLoadData::Playlist(playlist)) => playlist.tracks,
            Some(TrackLoadData::Error(e)) => {
                error!("Error cargando pista {}: {:?}", identifier, e);
                anyhow::bail!("Error loading track: {:?}", e)
            }
            None => {
                warn!("Sin resultados para: {}", identifier);
                Vec::new()
            }
        };

        Ok(tracks.into_iter().map(to_track).collect())
    }
}

fn to_track(data: TrackData) -> Track {
    let info = data.info;
    let mut track = Track::new(info.title, data.encoded);
    track.author = Some(info.author).filter(|author| !author.is_empty());
    track.uri = info.uri;

    if info.is_stream {
        track
    } else {
        track.with_duration(Duration::from_millis(info.length))
    }
}

fn to_filters(state: &FilterState) -> Filters {
    let mut filters = Filters::default();
    if state.is_neutral() {
        return filters;
    }
    if !state.equalizer.is_empty() {
        filters.equalizer = Some(
            state
                .equalizer
                .iter()
                .map(|band| Equalizer {
                    band: band.band,
                    gain: band.gain,
                })
                .collect(),
        );
    }
    if state.rate != super::filters::DEFAULT_RATE {
        filters.timescale = Some(Timescale {
            rate: Some(state.rate),
            ..Default::default()
        });
    }
    filters
}

pub struct LavalinkPlayer {
    guild_id: GuildId,
    context: PlayerContext,
    client: LavalinkClient,
    songbird: Arc<Songbird>,
    players: Arc<AtomicUsize>,
    connected: AtomicBool,
}

#[async_trait]
impl PlayerHandle for LavalinkPlayer {
    async fn play(&self, track: &Track) -> Result<()> {
        let update = UpdatePlayer {
            track: Some(UpdatePlayerTrack {
                encoded: Some(track.identifier.clone()),
                ..Default::default()
            }),
            ..Default::default()
        };

        self.context
            .update_player(&update, false)
            .await
            .context("Error playing track")?;
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.context.set_pause(true).await.context("Error pausing")?;
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.context.set_pause(false).await.context("Error resuming")?;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.context.stop_now().await.context("Error stopping")?;
        Ok(())
    }

    async fn set_volume(&self, volume: u16) -> Result<()> {
        self.context
            .set_volume(volume)
            .await
            .context("Error changing volume")?;
        Ok(())
    }

    async fn set_filters(&self, filters: &FilterState) -> Result<()> {
        self.context
            .set_filters(to_filters(filters))
            .await
            .context("Error applying filters")?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.players.fetch_sub(1, Ordering::SeqCst);

        let deleted = self
            .client
            .delete_player(NodeGuildId(self.guild_id.get()))
            .await
            .context("Error destroying Lavalink player");
        let left = self
            .songbird
            .remove(self.guild_id)
            .await
            .context("Error leaving the voice channel");

        info!("Desconectado de guild {}", self.guild_id);
        deleted?;
        left?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && socket_open(&self.client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::filters::EqPreset;

    #[test]
    fn test_search_identifier() {
        assert_eq!(
            search_identifier("https://youtu.be/dQw4w9WgXcQ"),
            "https://youtu.be/dQw4w9WgXcQ"
        );
        assert_eq!(search_identifier("  lofi beats "), "ytsearch:lofi beats");
        assert_eq!(search_identifier("httpfoo"), "ytsearch:httpfoo");
    }

    #[test]
    fn test_replaced_and_cleanup_ends_do_not_advance() {
        use events::TrackEndReason;

        assert!(starts_next(&TrackEndReason::Finished));
        assert!(starts_next(&TrackEndReason::Stopped));
        assert!(starts_next(&TrackEndReason::LoadFailed));
        assert!(!starts_next(&TrackEndReason::Replaced));
        assert!(!starts_next(&TrackEndReason::Cleanup));
    }

    #[test]
    fn test_neutral_filters_are_empty() {
        let filters = to_filters(&FilterState::default());
        assert!(filters.equalizer.is_none());
        assert!(filters.timescale.is_none());
    }

    #[test]
    fn test_filters_carry_bands_and_rate() {
        let bass = to_filters(&FilterState::equalizer(EqPreset::Light));
        let bands: Vec<(u8, f64)> = bass
            .equalizer
            .unwrap()
            .into_iter()
            .map(|eq| (eq.band, eq.gain))
            .collect();
        assert_eq!(bands, vec![(0, 0.15), (1, 0.10), (2, 0.05)]);
        assert!(bass.timescale.is_none());

        let fast = to_filters(&FilterState::playback_rate(1.5));
        assert!(fast.equalizer.is_none());
        assert_eq!(fast.timescale.unwrap().rate, Some(1.5));
    }
}

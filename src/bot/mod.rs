//! # Bot Module
//!
//! Discord side of Lavalink Relay: prefix commands come in through
//! [`MusicBot`], get parsed by [`commands`], and are run against the
//! [`SessionController`] by [`handlers`]. Node callbacks travel the other
//! way through [`events::pump_node_events`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use crate::{audio::session::SessionController, bot::MusicBot, config::Config};
//!
//! fn example(config: &Config, controller: Arc<SessionController>) -> MusicBot {
//!     MusicBot::new(&config.command_prefix, controller)
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Message, Ready, UserId},
    http::Http,
};
use std::sync::Arc;
use tracing::{debug, error, info};

pub mod commands;
pub mod events;
pub mod handlers;

use crate::audio::{
    node::Announcer,
    pool::RetryPolicy,
    queue::Track,
    session::SessionController,
};
use handlers::Invocation;

/// Gateway event handler for the music bot.
pub struct MusicBot {
    prefix: String,
    controller: Arc<SessionController>,
}

impl MusicBot {
    pub fn new(prefix: &str, controller: Arc<SessionController>) -> Self {
        Self {
            prefix: prefix.to_string(),
            controller,
        }
    }
}

/// Voice channel the user is currently connected to, from the gateway cache.
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|state| state.channel_id)
}

#[async_trait]
impl EventHandler for MusicBot {
    /// Logs the session and starts connecting to the audio node in the
    /// background. Gateway reconnects fire this again; the retry loop
    /// returns immediately once a node is up.
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 ¡{} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        let pool = self.controller.pool().clone();
        tokio::spawn(async move {
            if pool.connect_with_retry(RetryPolicy::default()).await {
                info!("✅ Nodo de audio conectado");
            }
        });
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };

        let Some(parsed) = commands::parse(&self.prefix, &msg.content) else {
            return;
        };

        let reply = match parsed {
            Ok(command) => {
                let invocation = Invocation {
                    guild_id,
                    voice_channel: user_voice_channel(&ctx, guild_id, msg.author.id),
                    text_channel: msg.channel_id,
                };
                handlers::handle_command(&self.controller, invocation, command).await
            }
            Err(e) => {
                debug!("Comando rechazado de {}: {}", msg.author.name, e);
                format!("⚠️ {}", e)
            }
        };

        if let Err(e) = msg.channel_id.say(&ctx.http, reply).await {
            error!("Error enviando respuesta en canal {}: {:?}", msg.channel_id, e);
        }
    }
}

/// Posts "up next" notices into a session's text channel.
pub struct ChannelAnnouncer {
    http: Arc<Http>,
}

impl ChannelAnnouncer {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Announcer for ChannelAnnouncer {
    async fn now_playing_next(&self, channel: ChannelId, track: &Track) -> Result<()> {
        channel
            .say(&*self.http, format!("🎵 Up next: **{}**", track.title))
            .await?;
        Ok(())
    }
}

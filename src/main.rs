use anyhow::{Context as _, Result};
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;

use crate::audio::{
    lavalink_client::LavalinkConnector,
    node::NodeEndpoint,
    pool::NodePool,
    session::SessionController,
};
use crate::bot::{events::pump_node_events, ChannelAnnouncer, MusicBot};
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lavarelay=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?)
                .add_directive("lavalink_rs=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Lavalink Relay v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!("⚙️ {}", config.summary());

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let http = Arc::new(Http::new(&config.discord_token));
    let user_id = http
        .get_current_user()
        .await
        .context("Error obteniendo el usuario del bot, ¿es válido DISCORD_TOKEN?")?
        .id;

    let songbird = Songbird::serenity();
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let connector = LavalinkConnector::new(user_id, songbird.clone(), events_tx)?;
    let endpoint = NodeEndpoint {
        url: config.lavalink_url()?,
        password: config.lavalink_password.clone(),
    };
    let pool = Arc::new(NodePool::new(Arc::new(connector), endpoint));
    let controller = Arc::new(SessionController::new(
        pool,
        Arc::new(ChannelAnnouncer::new(http.clone())),
        config.default_volume,
    ));

    tokio::spawn(pump_node_events(controller.clone(), events_rx));

    let handler = MusicBot::new(&config.command_prefix, controller.clone());
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await
        .context("Error creando el cliente de Discord")?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error escuchando Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de apagado recibida, cerrando...");
        let left = controller.leave_all().await;
        info!("👋 Cerradas {} sesiones de voz", left);
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot iniciado");
    if let Err(why) = client.start().await {
        error!("Error del cliente: {:?}", why);
    }

    Ok(())
}

use serenity::model::id::{ChannelId, GuildId};
use std::time::Duration;
use tracing::{info, warn};

use super::commands::Command;
use crate::{
    audio::{
        pool::NodeStatus,
        queue::{QueuePreview, Track},
        session::{Enqueued, SessionController},
    },
    error::{MusicError, MusicResult},
};

/// Entries shown by the `queue` command.
const QUEUE_PAGE: usize = 10;

/// Where a command came from.
#[derive(Debug, Clone, Copy)]
pub struct Invocation {
    pub guild_id: GuildId,
    /// Voice channel the author is sitting in, if any.
    pub voice_channel: Option<ChannelId>,
    /// Text channel to answer in.
    pub text_channel: ChannelId,
}

/// Runs a command and renders its single reply. Errors never escape.
pub async fn handle_command(
    controller: &SessionController,
    invocation: Invocation,
    command: Command,
) -> String {
    info!(
        "📝 Comando {:?} en guild {}",
        command, invocation.guild_id
    );

    match run(controller, invocation, command).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("Comando fallido en guild {}: {}", invocation.guild_id, e);
            format!("⚠️ {}", e)
        }
    }
}

async fn run(
    controller: &SessionController,
    invocation: Invocation,
    command: Command,
) -> MusicResult<String> {
    let guild_id = invocation.guild_id;

    let reply = match command {
        Command::Join => {
            join(controller, invocation).await?;
            "✅ Joined the voice channel".to_string()
        }
        Command::Leave => {
            controller.leave(guild_id).await;
            "👋 Left the voice channel".to_string()
        }
        Command::Play(query) => {
            join(controller, invocation).await?;
            let track = controller.search(guild_id, &query).await?;
            match controller.enqueue_or_play(guild_id, track).await? {
                Enqueued::Playing(track) => format!("🎶 Now playing: **{}**", track.title),
                Enqueued::Queued { track, position } => {
                    format!("➕ Queued #{}: **{}**", position, track.title)
                }
            }
        }
        Command::Pause => match controller.pause(guild_id).await {
            Ok(true) => "⏸️ Paused".to_string(),
            Ok(false) | Err(MusicError::NoActiveSession) => {
                "ℹ️ Nothing is playing".to_string()
            }
            Err(e) => return Err(e),
        },
        Command::Resume => {
            controller.resume(guild_id).await?;
            "▶️ Resumed".to_string()
        }
        Command::Skip => match controller.skip(guild_id).await {
            Ok(Some(track)) => format!("⏭️ Skipped **{}**", track.title),
            Ok(None) | Err(MusicError::NoActiveSession) => {
                "ℹ️ Nothing to skip".to_string()
            }
            Err(e) => return Err(e),
        },
        Command::Stop => {
            controller.stop(guild_id).await?;
            "🛑 Stopped and cleared the queue".to_string()
        }
        Command::NowPlaying => match controller.now_playing(guild_id).await {
            Some(track) => {
                if controller.is_paused(guild_id).await {
                    format!("⏸️ Paused: {}", describe(&track))
                } else {
                    format!("🎧 Now: {}", describe(&track))
                }
            }
            None => "ℹ️ Nothing is playing".to_string(),
        },
        Command::Queue => match controller.queue_preview(guild_id, QUEUE_PAGE).await {
            Some(preview) if !preview.is_empty() => render_queue(&preview),
            _ => "📭 The queue is empty".to_string(),
        },
        Command::Volume(level) => {
            let level = controller.set_volume(guild_id, level).await?;
            format!("🔊 Volume set to {}", level)
        }
        Command::VolumeUp(step) => {
            let level = controller.adjust_volume(guild_id, step).await?;
            format!("🔊 Volume raised to {}", level)
        }
        Command::VolumeDown(step) => {
            let level = controller.adjust_volume(guild_id, step.saturating_neg()).await?;
            format!("🔉 Volume lowered to {}", level)
        }
        Command::Bass(level) => {
            let preset = controller.set_equalizer(guild_id, &level).await?;
            format!("🎚️ Bass boost: **{}**", preset)
        }
        Command::Speed(rate) => {
            let rate = controller.set_playback_rate(guild_id, rate).await?;
            format!("⏩ Speed (rate) = {:.2}", rate)
        }
        Command::ResetFilters => {
            controller.reset_filters(guild_id).await?;
            "♻️ All effects cleared".to_string()
        }
        Command::Nodes => render_nodes(&controller.pool().list_nodes()),
    };

    Ok(reply)
}

async fn join(controller: &SessionController, invocation: Invocation) -> MusicResult<()> {
    controller
        .join(
            invocation.guild_id,
            invocation.voice_channel,
            invocation.text_channel,
        )
        .await
        .map(|_| ())
}

fn describe(track: &Track) -> String {
    match track.duration {
        Some(duration) => format!("**{}** ({})", track.title, format_duration(duration)),
        None => format!("**{}** (🔴 live)", track.title),
    }
}

/// Whole seconds, humantime style (`3m 42s`).
fn format_duration(duration: Duration) -> String {
    humantime::format_duration(Duration::from_secs(duration.as_secs())).to_string()
}

fn render_queue(preview: &QueuePreview) -> String {
    let mut reply = String::from("📜 **Queue:**");
    if !preview.total.is_zero() {
        reply.push_str(&format!(" ({})", format_duration(preview.total)));
    }
    for (index, track) in preview.items.iter().enumerate() {
        reply.push_str(&format!("\n{}. {}", index + 1, track.title));
    }
    if preview.remaining > 0 {
        reply.push_str(&format!("\n...and {} more", preview.remaining));
    }
    reply
}

fn render_nodes(nodes: &[NodeStatus]) -> String {
    if nodes.is_empty() {
        return "❌ No nodes in the pool".to_string();
    }

    nodes
        .iter()
        .map(|node| {
            let ready = node
                .ready
                .as_ref()
                .map(|ready| ready.at.format("%H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "never".to_string());
            format!(
                "- {}: connected={} uri={} players={} ready={}",
                node.name, node.connected, node.uri, node.players, ready
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

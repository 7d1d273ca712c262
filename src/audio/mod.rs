//! # Audio Module
//!
//! Playback state for Lavalink Relay. Audio itself is decoded and streamed
//! by the Lavalink node; this module only keeps track of what each guild is
//! doing and tells the node about it.
//!
//! ## Architecture
//!
//! ### [`session`] - Session Controller
//! - One session per guild while connected to voice
//! - Now-playing slot, FIFO queue, filters and volume
//! - Advances the queue when the node reports a track end
//!
//! ### [`pool`] - Node Connections
//! - Startup connection with linear backoff (6 attempts, 2s steps)
//! - Lazy reconnect when a voice command finds no node
//! - Diagnostics for the `nodes` command
//!
//! ### [`filters`] - Filter State
//! - Bass boost presets (`off` to `extreme`)
//! - Playback rate between 0.5x and 2.0x
//!
//! ### [`lavalink_client`] - Lavalink Adapter
//! - Implements the [`node`] traits on top of `lavalink-rs` and Songbird
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use serenity::all::{ChannelId, GuildId};
//! use crate::audio::session::SessionController;
//!
//! async fn example(controller: Arc<SessionController>) -> anyhow::Result<()> {
//!     let guild_id = GuildId::new(123456789);
//!
//!     controller.join(guild_id, Some(ChannelId::new(1)), ChannelId::new(2)).await?;
//!     let track = controller.search(guild_id, "lofi hip hop").await?;
//!     controller.enqueue_or_play(guild_id, track).await?;
//!     controller.set_equalizer(guild_id, "medium").await?;
//!     Ok(())
//! }
//! ```

pub mod filters;
pub mod lavalink_client;
pub mod node;
pub mod pool;
pub mod queue;
pub mod session;

#[cfg(test)]
pub mod testing;

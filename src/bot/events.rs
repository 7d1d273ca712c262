use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info};

use crate::{
    audio::{node::NodeEvent, session::SessionController},
    error::MusicError,
};

/// Feeds node callbacks into the session controller until the channel closes.
///
/// Track ends are handled on their own task so a slow node call in one guild
/// never holds up events for the others.
pub async fn pump_node_events(
    controller: Arc<SessionController>,
    mut events: UnboundedReceiver<NodeEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            NodeEvent::Ready { node, session_id } => {
                controller.pool().record_ready(&node, &session_id);
            }
            NodeEvent::TrackEnd { guild_id } => {
                let controller = controller.clone();
                tokio::spawn(async move {
                    on_track_end(&controller, guild_id).await;
                });
            }
        }
    }

    info!("Canal de eventos del nodo cerrado");
}

async fn on_track_end(controller: &SessionController, guild_id: GuildId) {
    match controller.advance_on_track_end(guild_id).await {
        Ok(Some(track)) => debug!("Guild {} avanzó a {}", guild_id, track.title),
        Ok(None) => {}
        // el bot salió antes de que el nodo reportara el fin
        Err(MusicError::NoActiveSession) => {
            debug!("Fin de pista en guild {} sin sesión", guild_id)
        }
        Err(e) => error!("Error reproduciendo la siguiente pista en guild {}: {}", guild_id, e),
    }
}

use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::voice::RadioServices;

/// True when a voice-state transition takes the bot out of voice entirely.
pub fn left_voice(old_channel: Option<ChannelId>, new_channel: Option<ChannelId>) -> bool {
    old_channel.is_some() && new_channel.is_none()
}

/// Fast path after the bot was kicked or dropped from its voice channel.
///
/// Forgets the dead connection, waits the reconnect grace period and, if the
/// guild still wants to play, reconnects to its last target. Withdrawing the
/// intent during the wait cancels the reconnect.
pub async fn handle_own_disconnect(services: Arc<RadioServices>, guild_id: GuildId) {
    let Some(state) = services.states.get(guild_id) else {
        return;
    };
    if !state.desired_playing {
        debug!("Desconexión esperada en guild {}", guild_id);
        return;
    }

    warn!("🔌 Bot desconectado del canal de voz en guild {}", guild_id);
    services.connections.forget_connection(guild_id);

    let cancel = state.cancellation();
    tokio::select! {
        _ = cancel.cancelled() => {
            debug!("Reconexión cancelada en guild {}", guild_id);
            return;
        }
        _ = tokio::time::sleep(services.timings.reconnect_grace) => {}
    }

    let Some(target) = services
        .states
        .get(guild_id)
        .filter(|state| state.desired_playing)
        .and_then(|state| state.target_channel_id)
    else {
        info!("Guild {} ya no quiere reproducir, no se reconecta", guild_id);
        return;
    };

    info!("🔄 Reconectando a {} en guild {}", target, guild_id);
    // Los errores ya se notificaron dentro de start()
    let _ = services.start(guild_id, target, None).await;
}

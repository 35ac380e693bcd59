use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        gateway::{self, VoiceConnection, VoiceGateway},
        player::StreamPlayer,
    },
    error::RadioError,
    state::PlaybackStateStore,
    storage::ConfigStore,
};

/// Resultado de una llamada a [`ConnectionManager::ensure_connected_and_playing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// Playback was handed off to the player.
    Started,
    /// Already connected to the target and streaming the resolved URL.
    AlreadyPlaying,
}

/// Single choke point for every "make it play" request.
///
/// Manual joins, configuration changes, URL changes and automatic
/// reconnections all go through [`ConnectionManager::ensure_connected_and_playing`].
/// It is also the only writer of the connection handle in the guild state.
#[derive(Clone)]
pub struct ConnectionManager {
    gateway: Arc<dyn VoiceGateway>,
    store: Arc<dyn ConfigStore>,
    states: Arc<PlaybackStateStore>,
    player: StreamPlayer,
    default_stream_url: String,
}

impl ConnectionManager {
    pub fn new(
        gateway: Arc<dyn VoiceGateway>,
        store: Arc<dyn ConfigStore>,
        states: Arc<PlaybackStateStore>,
        player: StreamPlayer,
        default_stream_url: String,
    ) -> Self {
        Self {
            gateway,
            store,
            states,
            player,
            default_stream_url,
        }
    }

    /// URL efectiva: la de la guild si existe, si no la global.
    pub async fn resolve_stream_url(&self, guild_id: GuildId) -> String {
        self.store
            .get(guild_id)
            .await
            .and_then(|config| config.stream_url)
            .unwrap_or_else(|| self.default_stream_url.clone())
    }

    /// Conecta (o mueve) el bot al canal objetivo y arranca el stream.
    ///
    /// `notify_channel` is recorded as the guild's explicit notification
    /// channel when given. Connection failures are reported there (or in the
    /// guild's default text channel), clear the intent to play, and leave no
    /// half-open connection behind.
    pub async fn ensure_connected_and_playing(
        &self,
        guild_id: GuildId,
        target_channel_id: ChannelId,
        notify_channel: Option<ChannelId>,
    ) -> Result<EnsureOutcome, RadioError> {
        let lock = self.states.guild_lock(guild_id);
        let _guard = lock.lock().await;

        if !self.gateway.guild_exists(guild_id).await {
            debug!("Guild {} ya no disponible, limpiando estado", guild_id);
            self.states.remove(guild_id);
            return Err(RadioError::EntityGone(format!("guild {}", guild_id)));
        }

        if !self.gateway.voice_channel_exists(guild_id, target_channel_id).await {
            warn!("Canal de voz {} no encontrado en guild {}", target_channel_id, guild_id);
            self.states.remove(guild_id);
            return Err(RadioError::EntityGone(format!("canal {}", target_channel_id)));
        }

        let stream_url = self.resolve_stream_url(guild_id).await;

        self.states.update(guild_id, |state| {
            state.target_channel_id = Some(target_channel_id);
            state.stream_url = Some(stream_url.clone());
            if !state.desired_playing {
                state.failure_streak = 0;
            }
            state.set_desired(true);
            if notify_channel.is_some() {
                state.notification_channel_id = notify_channel;
            }
        });
        let notify_channel = self
            .states
            .notification_channel(self.gateway.as_ref(), guild_id)
            .await;

        let current = self.gateway.current_channel(guild_id).await;
        let connection = match current {
            Some(channel_id) if channel_id == target_channel_id => {
                let already_streaming = self.gateway.is_playing(guild_id).await
                    && self
                        .states
                        .get(guild_id)
                        .and_then(|state| state.current_stream_url)
                        .as_deref()
                        == Some(stream_url.as_str());
                if already_streaming {
                    debug!("Guild {} ya reproduce {} en el canal correcto", guild_id, stream_url);
                    return Ok(EnsureOutcome::AlreadyPlaying);
                }
                Ok(None)
            }
            Some(channel_id) => {
                info!(
                    "🔀 Moviendo de {} a {} en guild {}",
                    channel_id, target_channel_id, guild_id
                );
                self.gateway.move_to(guild_id, target_channel_id).await.map(Some)
            }
            None => self.gateway.connect(guild_id, target_channel_id).await.map(Some),
        };

        match connection {
            Ok(Some(connection)) => {
                self.states
                    .update_existing(guild_id, |state| state.connection = Some(connection));
            }
            Ok(None) => {}
            Err(e) => {
                let label = self.gateway.channel_label(guild_id, target_channel_id).await;
                let err = RadioError::from_voice(e, label);
                error!("{} en guild {}", err, guild_id);

                self.states.update_existing(guild_id, |state| {
                    state.set_desired(false);
                    state.connection = None;
                });
                if current.is_none() {
                    // Un join fallido puede dejar una llamada a medias en Songbird
                    if let Err(e) = self.gateway.disconnect(guild_id).await {
                        debug!("Limpieza tras fallo de conexión en guild {}: {}", guild_id, e);
                    }
                }

                if let Some(message) = err.user_message() {
                    gateway::notify(self.gateway.as_ref(), notify_channel, &message).await;
                }
                return Err(err);
            }
        }

        let player = self.player.clone();
        tokio::spawn(async move {
            if let Err(e) = player.play(guild_id, Some(stream_url), notify_channel).await {
                debug!("No se pudo iniciar el stream en guild {}: {}", guild_id, e);
            }
        });

        Ok(EnsureOutcome::Started)
    }

    /// Detiene el stream y abandona el canal de voz.
    ///
    /// Returns the name of the channel the bot was in, if it was connected.
    pub async fn disconnect(&self, guild_id: GuildId) -> Option<String> {
        let lock = self.states.guild_lock(guild_id);
        let _guard = lock.lock().await;

        self.forget_connection(guild_id);

        let channel_id = self.gateway.current_channel(guild_id).await?;
        let label = self.gateway.channel_label(guild_id, channel_id).await;

        if self.gateway.is_playing(guild_id).await {
            self.gateway.stop(guild_id).await;
        }
        if let Err(e) = self.gateway.disconnect(guild_id).await {
            warn!("Error al desconectar en guild {}: {}", guild_id, e);
        }

        Some(label)
    }

    /// Olvida el handle de la guild y lo devuelve, si había uno.
    pub fn forget_connection(&self, guild_id: GuildId) -> Option<VoiceConnection> {
        let dropped = self
            .states
            .update_existing(guild_id, |state| state.connection.take())
            .flatten()?;

        if dropped.guild_id != guild_id {
            warn!(
                "Handle de voz de la guild {} registrado bajo la guild {}",
                dropped.guild_id, guild_id
            );
        }
        debug!(
            "Conexión olvidada: guild {} canal {}",
            dropped.guild_id, dropped.channel_id
        );
        Some(dropped)
    }
}

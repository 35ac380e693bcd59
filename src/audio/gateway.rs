use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::VoiceError;

/// Handle de una conexión de voz viva.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceConnection {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

/// How a playback ended, as reported by the audio driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The stream ended or was stopped.
    Finished,
    /// Decode or network failure.
    Failed(String),
}

/// Resolves once when the started playback ends, for any reason.
pub type PlaybackWatch = oneshot::Receiver<PlaybackOutcome>;

/// Narrow contract over the platform's gateway and voice client.
///
/// The reconciliation subsystem depends only on this trait; the Songbird
/// implementation lives in [`crate::audio::driver`].
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn guild_exists(&self, guild_id: GuildId) -> bool;

    async fn voice_channel_exists(&self, guild_id: GuildId, channel_id: ChannelId) -> bool;

    async fn channel_name(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<String>;

    /// Channel name for user-facing messages, falling back to its id.
    async fn channel_label(&self, guild_id: GuildId, channel_id: ChannelId) -> String {
        self.channel_name(guild_id, channel_id)
            .await
            .unwrap_or_else(|| channel_id.to_string())
    }

    /// The guild's default text channel for status messages.
    async fn default_text_channel(&self, guild_id: GuildId) -> Option<ChannelId>;

    /// Channel of the live voice connection, if any.
    async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId>;

    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<VoiceConnection, VoiceError>;

    async fn move_to(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<VoiceConnection, VoiceError>;

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), VoiceError>;

    async fn is_playing(&self, guild_id: GuildId) -> bool;

    async fn stop(&self, guild_id: GuildId);

    /// Starts streaming `url`; the returned watch fires when it ends.
    async fn play(&self, guild_id: GuildId, url: &str) -> Result<PlaybackWatch, VoiceError>;

    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<(), VoiceError>;
}

/// Envía una notificación sin garantía de entrega.
///
/// Los fallos (p. ej. falta de permisos) se registran y se descartan.
pub async fn notify(gateway: &dyn VoiceGateway, channel_id: Option<ChannelId>, content: &str) {
    let Some(channel_id) = channel_id else {
        debug!("Sin canal de notificación para: {}", content);
        return;
    };

    if let Err(e) = gateway.send_message(channel_id, content).await {
        debug!("No se pudo notificar en {}: {}", channel_id, e);
    }
}

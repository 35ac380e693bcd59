//! # Voice Module
//!
//! Keeps every guild's voice connection in line with its configuration.
//!
//! - [`connection::ConnectionManager`] is the single entry point that joins,
//!   moves and starts the stream.
//! - [`reconcile::Reconciler`] periodically corrects drift between intent and
//!   reality.
//! - [`RadioServices`] bundles the shared components and is stored in the
//!   serenity client's data map so event handlers and commands can reach it.

use anyhow::Result;
use serenity::{
    model::id::{ChannelId, GuildId},
    prelude::{Context, TypeMapKey},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, info};

pub mod connection;
pub mod reconcile;

use crate::{
    audio::{gateway::VoiceGateway, player::StreamPlayer},
    config::{validate_stream_url, Timings},
    error::RadioError,
    state::PlaybackStateStore,
    storage::ConfigStore,
};
use connection::{ConnectionManager, EnsureOutcome};
use reconcile::Reconciler;

/// What `/setstreamurl` did besides persisting the new URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamUrlChange {
    /// The guild is live; playback must be restarted on this channel.
    Restart(ChannelId),
    /// The guild wants to play but is not connected; used on reconnect.
    PendingReconnect,
    /// Nothing is playing; stored for the next join.
    Saved,
}

/// Componentes compartidos del bot de radio.
pub struct RadioServices {
    pub gateway: Arc<dyn VoiceGateway>,
    pub store: Arc<dyn ConfigStore>,
    pub states: Arc<PlaybackStateStore>,
    pub connections: ConnectionManager,
    pub reconciler: Arc<Reconciler>,
    pub timings: Timings,
    sweep_started: AtomicBool,
}

impl TypeMapKey for RadioServices {
    type Value = Arc<RadioServices>;
}

impl RadioServices {
    /// Wires the subsystem together. Must run inside the tokio runtime.
    pub fn new(
        gateway: Arc<dyn VoiceGateway>,
        store: Arc<dyn ConfigStore>,
        default_stream_url: String,
        timings: Timings,
    ) -> Self {
        let states = Arc::new(PlaybackStateStore::new());
        let player = StreamPlayer::new(gateway.clone(), states.clone(), timings);
        let connections = ConnectionManager::new(
            gateway.clone(),
            store.clone(),
            states.clone(),
            player.clone(),
            default_stream_url,
        );
        let reconciler = Arc::new(Reconciler::new(
            gateway.clone(),
            store.clone(),
            states.clone(),
            player,
            connections.clone(),
            timings.sweep_interval,
        ));

        Self {
            gateway,
            store,
            states,
            connections,
            reconciler,
            timings,
            sweep_started: AtomicBool::new(false),
        }
    }

    pub async fn from_context(ctx: &Context) -> Option<Arc<Self>> {
        ctx.data.read().await.get::<Self>().cloned()
    }

    /// Lanza el bucle de reconciliación una sola vez por proceso.
    pub fn start_reconciler(&self) -> bool {
        if self.sweep_started.swap(true, Ordering::SeqCst) {
            return false;
        }

        let reconciler = self.reconciler.clone();
        tokio::spawn(reconciler.run());
        true
    }

    /// Conecta y reproduce, registrando el resultado.
    pub async fn start(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        notify_channel: Option<ChannelId>,
    ) -> Result<EnsureOutcome, RadioError> {
        let outcome = self
            .connections
            .ensure_connected_and_playing(guild_id, channel_id, notify_channel)
            .await;

        match &outcome {
            Ok(EnsureOutcome::Started) => info!("🔊 Radio iniciada en guild {}", guild_id),
            Ok(EnsureOutcome::AlreadyPlaying) => debug!("Guild {} ya estaba reproduciendo", guild_id),
            Err(e) => debug!("No se pudo iniciar la radio en guild {}: {}", guild_id, e),
        }
        outcome
    }

    /// Persists `channel_id` as the guild's radio channel and records the
    /// intent to play there. The stream URL override is preserved.
    pub async fn configure_channel(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        channel_name: String,
        notify_channel: ChannelId,
    ) -> Result<()> {
        let mut config = self.store.get(guild_id).await.unwrap_or_default();
        config.channel_id = Some(channel_id.get());
        config.channel_name = Some(channel_name);
        config.auto_join_on_startup = true;
        self.store.save(guild_id, config).await?;

        self.states.update(guild_id, |state| {
            state.target_channel_id = Some(channel_id);
            state.notification_channel_id = Some(notify_channel);
            state.set_desired(true);
        });
        Ok(())
    }

    /// Canal configurado para `/join`.
    pub async fn configured_channel(&self, guild_id: GuildId) -> Result<ChannelId, RadioError> {
        self.store
            .get(guild_id)
            .await
            .and_then(|config| config.voice_channel())
            .ok_or_else(|| RadioError::ConfigurationMissing("canal de voz no configurado".to_string()))
    }

    /// Withdraws the intent to play and leaves the voice channel.
    ///
    /// Returns the channel name if the bot was connected.
    pub async fn leave(&self, guild_id: GuildId) -> Option<String> {
        self.states.update_existing(guild_id, |state| {
            state.set_desired(false);
            state.current_stream_url = None;
            state.failure_streak = 0;
        });
        self.connections.disconnect(guild_id).await
    }

    /// Validates and persists a guild stream URL override.
    ///
    /// An invalid URL is rejected before anything is written.
    pub async fn set_stream_url(&self, guild_id: GuildId, raw_url: &str) -> Result<StreamUrlChange> {
        let url = validate_stream_url(raw_url)?;
        let url = url.to_string();

        let mut config = self.store.get(guild_id).await.unwrap_or_default();
        let configured_channel = config.voice_channel();
        config.stream_url = Some(url.clone());
        self.store.save(guild_id, config).await?;
        info!("📝 URL del stream actualizada en guild {}: {}", guild_id, url);

        let Some(state) = self.states.update_existing(guild_id, |state| {
            state.stream_url = Some(url);
            state.clone()
        }) else {
            return Ok(StreamUrlChange::Saved);
        };

        if !state.desired_playing {
            return Ok(StreamUrlChange::Saved);
        }

        let target = state.target_channel_id.or(configured_channel);
        match (self.gateway.current_channel(guild_id).await, target) {
            (Some(_), Some(target)) => Ok(StreamUrlChange::Restart(target)),
            _ => Ok(StreamUrlChange::PendingReconnect),
        }
    }

    /// El bot fue expulsado de la guild.
    pub fn forget_guild(&self, guild_id: GuildId) {
        if self.states.remove(guild_id).is_some() {
            info!("🗑️ Estado de guild {} eliminado", guild_id);
        }
    }
}

use serenity::model::id::{ChannelId, GuildId};
use std::{collections::BTreeSet, sync::Arc, time::Duration};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    audio::{gateway::VoiceGateway, player::StreamPlayer},
    error::RadioError,
    state::PlaybackStateStore,
    storage::{ConfigStore, GuildConfig},
    voice::connection::ConnectionManager,
};

/// Periodic self-healing pass over every known guild.
///
/// Compares persisted configuration and in-memory intent with the live voice
/// state and corrects any drift: reconnects, restarts in place, cleans up
/// orphans and cold-starts configured guilds that were never touched.
pub struct Reconciler {
    gateway: Arc<dyn VoiceGateway>,
    store: Arc<dyn ConfigStore>,
    states: Arc<PlaybackStateStore>,
    player: StreamPlayer,
    connections: ConnectionManager,
    sweep_interval: Duration,
}

impl Reconciler {
    pub fn new(
        gateway: Arc<dyn VoiceGateway>,
        store: Arc<dyn ConfigStore>,
        states: Arc<PlaybackStateStore>,
        player: StreamPlayer,
        connections: ConnectionManager,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            gateway,
            store,
            states,
            player,
            connections,
            sweep_interval,
        }
    }

    /// Marca como deseadas las guilds configuradas con auto-join.
    ///
    /// Guilds that already have an in-memory record are left alone, so a
    /// gateway resume never overrides an explicit `leave`.
    pub async fn prime_from_config(&self) -> usize {
        let configs = self.store.load_all().await;
        let mut primed = 0;

        for (guild_id, config) in configs {
            let Some(channel_id) = config.voice_channel() else {
                continue;
            };
            if !config.wants_auto_join() || self.states.contains(guild_id) {
                continue;
            }

            self.states.update(guild_id, |state| {
                state.target_channel_id = Some(channel_id);
                state.set_desired(true);
            });
            primed += 1;
        }

        info!("📋 {} guilds marcadas para auto-join", primed);
        primed
    }

    /// Bucle de reconciliación; el primer barrido es inmediato.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "🔁 Reconciliación periódica cada {}",
            humantime::format_duration(self.sweep_interval)
        );

        loop {
            ticker.tick().await;
            self.sweep().await;
        }
    }

    pub async fn sweep(&self) {
        let configs = self.store.load_all().await;

        let mut candidates: BTreeSet<GuildId> = configs.keys().copied().collect();
        candidates.extend(self.states.desired_guilds());
        debug!("Barrido de {} guilds", candidates.len());

        for guild_id in candidates {
            self.reconcile_guild(guild_id, configs.get(&guild_id)).await;
        }
    }

    async fn reconcile_guild(&self, guild_id: GuildId, config: Option<&GuildConfig>) {
        if !self.gateway.guild_exists(guild_id).await {
            if self.states.remove(guild_id).is_some() {
                debug!("Guild {} ya no disponible, estado eliminado", guild_id);
            }
            return;
        }

        let target = config.and_then(GuildConfig::voice_channel);

        let Some(state) = self.states.get(guild_id) else {
            // Sin registro en memoria: arranque en frío si está configurada
            if let Some(channel_id) = target.filter(|_| config.is_some_and(GuildConfig::wants_auto_join)) {
                info!("🚀 Auto-join en guild {} al canal {}", guild_id, channel_id);
                self.ensure(guild_id, channel_id).await;
            }
            return;
        };

        if !state.desired_playing {
            return;
        }

        let Some(target) = target else {
            self.clean_up_orphan(guild_id).await;
            return;
        };

        match self.gateway.current_channel(guild_id).await {
            Some(channel_id) if channel_id == target => {
                if self.gateway.is_playing(guild_id).await {
                    return;
                }
                self.restart_in_place(guild_id, state.stream_url).await;
            }
            current => {
                info!(
                    "🔌 Guild {} fuera de su canal ({:?} en lugar de {}), reconectando",
                    guild_id, current, target
                );
                self.ensure(guild_id, target).await;
            }
        }
    }

    async fn ensure(&self, guild_id: GuildId, channel_id: ChannelId) {
        if let Err(e) = self
            .connections
            .ensure_connected_and_playing(guild_id, channel_id, None)
            .await
        {
            debug!("Reconciliación de guild {} sin éxito: {}", guild_id, e);
        }
    }

    async fn restart_in_place(&self, guild_id: GuildId, known_url: Option<String>) {
        let url = match known_url {
            Some(url) => url,
            None => self.connections.resolve_stream_url(guild_id).await,
        };
        info!("▶️ Guild {} conectada pero sin reproducir, reiniciando stream", guild_id);

        let channel = self
            .states
            .notification_channel(self.gateway.as_ref(), guild_id)
            .await;
        match self.player.play(guild_id, Some(url), channel).await {
            Ok(()) => {}
            Err(e @ (RadioError::TransportPermission { .. } | RadioError::TransportClient { .. })) => {
                warn!("El transporte rechazó el reinicio en guild {}: {}", guild_id, e);
                self.connections.forget_connection(guild_id);
            }
            Err(e) => debug!("Reinicio en guild {} sin éxito: {}", guild_id, e),
        }
    }

    async fn clean_up_orphan(&self, guild_id: GuildId) {
        warn!("🧹 Guild {} quiere reproducir pero no tiene canal configurado", guild_id);
        if self.connections.disconnect(guild_id).await.is_some() {
            info!("Desconectado de guild {} sin configuración", guild_id);
        }
        self.states.remove(guild_id);
    }
}

//! # Bot Module
//!
//! Discord front-end of the radio bot.
//!
//! [`RadioBot`] implements Serenity's [`EventHandler`] trait:
//!
//! - **ready**: registers slash commands, marks configured guilds for
//!   auto-join and starts the periodic reconciliation loop.
//! - **interaction_create**: dispatches slash commands to [`handlers`].
//! - **voice_state_update**: reconnects quickly when the bot itself is
//!   dropped from its voice channel (see [`events`]).
//! - **guild_delete**: forgets guilds the bot was removed from.
//!
//! The shared [`RadioServices`] live in the client's data map and are fetched
//! per event.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, Guild, GuildId, Interaction, Ready, UnavailableGuild, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;

use crate::{config::Config, voice::RadioServices};

/// Manejador de eventos de Discord del bot de radio.
pub struct RadioBot {
    config: Arc<Config>,
}

impl RadioBot {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Registers slash commands globally, or on the development guild when
    /// `GUILD_ID` is set (instant propagation).
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for RadioBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        let Some(services) = RadioServices::from_context(&ctx).await else {
            error!("❌ Servicios de radio no inicializados");
            return;
        };

        services.reconciler.prime_from_config().await;
        if services.start_reconciler() {
            info!("🔁 Reconciliación de conexiones iniciada");
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id {
            return;
        }

        let old_channel = old.as_ref().and_then(|state| state.channel_id);
        if !events::left_voice(old_channel, new.channel_id) {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };
        let Some(services) = RadioServices::from_context(&ctx).await else {
            return;
        };

        tokio::spawn(events::handle_own_disconnect(services, guild_id));
    }

    async fn guild_delete(&self, ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // Caída temporal de Discord: se conserva el estado
        if incomplete.unavailable {
            return;
        }

        info!("🚪 Bot eliminado de la guild {}", incomplete.id);
        if let Some(services) = RadioServices::from_context(&ctx).await {
            services.forget_guild(incomplete.id);
        }
    }
}

use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod state;
mod storage;
#[cfg(test)]
mod testing;
mod ui;
mod voice;

use crate::audio::driver::SongbirdGateway;
use crate::bot::RadioBot;
use crate::config::Config;
use crate::storage::JsonConfigStore;
use crate::voice::RadioServices;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("radio_stream_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("📻 Iniciando Radio Stream Bot v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    // Configuración persistente por guild
    let store = Arc::new(JsonConfigStore::new(config.config_file.clone()).await?);

    // Solo guilds y estados de voz: no se leen mensajes
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let songbird = Songbird::serenity();
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(RadioBot::new(config.clone()))
        .register_songbird_with(songbird.clone())
        .await?;

    let gateway = Arc::new(SongbirdGateway::new(
        client.cache.clone(),
        client.http.clone(),
        songbird,
    )?);
    let services = Arc::new(RadioServices::new(
        gateway,
        store,
        config.default_stream_url.clone(),
        config.timings,
    ));

    // Insertar servicios en el contexto del cliente
    {
        let mut data = client.data.write().await;
        data.insert::<RadioServices>(services);
    }

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

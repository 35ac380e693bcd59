use anyhow::Result;
use serenity::{
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::CommandInteraction,
        channel::ChannelType,
        id::{ChannelId, GuildId},
    },
    prelude::Context,
};
use std::{sync::Arc, time::Instant};
use tracing::{info, warn};

use crate::{
    bot::RadioBot,
    error::RadioError,
    ui::embeds,
    voice::{RadioServices, StreamUrlChange},
};

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, _bot: &RadioBot) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        respond(
            ctx,
            &command,
            CreateInteractionResponseMessage::new()
                .content("❌ Este comando solo puede usarse en un servidor")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let services = RadioServices::from_context(ctx)
        .await
        .ok_or_else(|| anyhow::anyhow!("Servicios de radio no inicializados"))?;

    match command.data.name.as_str() {
        "ping" => handle_ping(ctx, &command).await?,
        "configurechannel" => handle_configurechannel(ctx, &command, guild_id, services).await?,
        "join" => handle_join(ctx, &command, guild_id, services).await?,
        "leave" => handle_leave(ctx, &command, guild_id, services).await?,
        "setstreamurl" => handle_setstreamurl(ctx, &command, guild_id, services).await?,
        "help" => handle_help(ctx, &command).await?,
        _ => {
            respond(
                ctx,
                &command,
                CreateInteractionResponseMessage::new()
                    .content("❌ Comando no reconocido")
                    .ephemeral(true),
            )
            .await?;
        }
    }

    Ok(())
}

async fn handle_ping(ctx: &Context, command: &CommandInteraction) -> Result<()> {
    let started = Instant::now();
    respond(ctx, command, CreateInteractionResponseMessage::new().content("🏓 Pong!")).await?;

    let latency = started.elapsed().as_millis();
    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new().content(format!("🏓 Pong! Latencia: {}ms", latency)),
        )
        .await?;

    Ok(())
}

async fn handle_configurechannel(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    services: Arc<RadioServices>,
) -> Result<()> {
    if !is_admin(command) {
        return deny_non_admin(ctx, command).await;
    }

    let Some(name) = string_option(command, "name") else {
        respond_warning(ctx, command, "Uso incorrecto", "Uso: `/configurechannel <nombre_canal>`").await?;
        return Ok(());
    };

    let Some((channel_id, channel_name)) = find_voice_channel(ctx, guild_id, name) else {
        respond_warning(
            ctx,
            command,
            "Canal no encontrado",
            &format!("Canal de voz '{}' no encontrado.", name),
        )
        .await?;
        return Ok(());
    };

    if let Err(e) = services
        .configure_channel(guild_id, channel_id, channel_name.clone(), command.channel_id)
        .await
    {
        warn!("Error guardando configuración de guild {}: {:?}", guild_id, e);
        respond(
            ctx,
            command,
            CreateInteractionResponseMessage::new()
                .embed(embeds::create_error_embed("Error", "No se pudo guardar la configuración."))
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    respond(
        ctx,
        command,
        CreateInteractionResponseMessage::new().embed(embeds::create_success_embed(
            "Canal configurado",
            &format!("Canal configurado: **{}**. Intentando unirse y reproducir.", channel_name),
        )),
    )
    .await?;

    // Los fallos de conexión se notifican en este mismo canal
    let _ = services.start(guild_id, channel_id, Some(command.channel_id)).await;
    Ok(())
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    services: Arc<RadioServices>,
) -> Result<()> {
    let channel_id = match services.configured_channel(guild_id).await {
        Ok(channel_id) => channel_id,
        Err(RadioError::ConfigurationMissing(_)) => {
            respond_warning(
                ctx,
                command,
                "Canal no configurado",
                "Canal no configurado. Usa `/configurechannel`.",
            )
            .await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    respond(
        ctx,
        command,
        CreateInteractionResponseMessage::new()
            .content("🔊 Intentando unirme y reproducir en el canal configurado..."),
    )
    .await?;

    let _ = services.start(guild_id, channel_id, Some(command.channel_id)).await;
    Ok(())
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    services: Arc<RadioServices>,
) -> Result<()> {
    let content = match services.leave(guild_id).await {
        Some(channel_name) => format!("👋 Desconectado de **{}**.", channel_name),
        None => "No estoy en un canal de voz.".to_string(),
    };

    respond(ctx, command, CreateInteractionResponseMessage::new().content(content)).await
}

async fn handle_setstreamurl(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    services: Arc<RadioServices>,
) -> Result<()> {
    if !is_admin(command) {
        return deny_non_admin(ctx, command).await;
    }

    let Some(url) = string_option(command, "url") else {
        respond_warning(ctx, command, "Uso incorrecto", "Uso: `/setstreamurl <URL>`").await?;
        return Ok(());
    };

    let change = match services.set_stream_url(guild_id, url).await {
        Ok(change) => change,
        Err(e) => {
            respond_warning(
                ctx,
                command,
                "URL inválida",
                &format!("La URL del stream no es válida: {}", e),
            )
            .await?;
            return Ok(());
        }
    };

    let status = match change {
        StreamUrlChange::Restart(_) => "Reiniciando la reproducción con la nueva URL...",
        StreamUrlChange::PendingReconnect => "URL guardada. Se usará al (re)conectar.",
        StreamUrlChange::Saved => "URL del stream guardada.",
    };
    respond(
        ctx,
        command,
        CreateInteractionResponseMessage::new().embed(embeds::create_success_embed(
            "URL actualizada",
            &format!("URL del stream actualizada para este servidor a: <{}>\n{}", url.trim(), status),
        )),
    )
    .await?;

    if let StreamUrlChange::Restart(channel_id) = change {
        let _ = services.start(guild_id, channel_id, Some(command.channel_id)).await;
    }
    Ok(())
}

async fn handle_help(ctx: &Context, command: &CommandInteraction) -> Result<()> {
    respond(
        ctx,
        command,
        CreateInteractionResponseMessage::new()
            .embed(embeds::create_help_embed())
            .ephemeral(true),
    )
    .await
}

// Funciones auxiliares

async fn respond(
    ctx: &Context,
    command: &CommandInteraction,
    message: CreateInteractionResponseMessage,
) -> Result<()> {
    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;
    Ok(())
}

async fn respond_warning(ctx: &Context, command: &CommandInteraction, title: &str, description: &str) -> Result<()> {
    respond(
        ctx,
        command,
        CreateInteractionResponseMessage::new()
            .embed(embeds::create_warning_embed(title, description))
            .ephemeral(true),
    )
    .await
}

async fn deny_non_admin(ctx: &Context, command: &CommandInteraction) -> Result<()> {
    respond_warning(
        ctx,
        command,
        "Permisos insuficientes",
        "Necesitas permisos de Administrador.",
    )
    .await
}

fn is_admin(command: &CommandInteraction) -> bool {
    command
        .member
        .as_ref()
        .and_then(|member| member.permissions)
        .is_some_and(|permissions| permissions.administrator())
}

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Busca un canal de voz de la guild por nombre exacto.
fn find_voice_channel(ctx: &Context, guild_id: GuildId, name: &str) -> Option<(ChannelId, String)> {
    let guild = ctx.cache.guild(guild_id)?;
    guild
        .channels
        .values()
        .find(|channel| {
            matches!(channel.kind, ChannelType::Voice | ChannelType::Stage) && channel.name == name
        })
        .map(|channel| (channel.id, channel.name.clone()))
}

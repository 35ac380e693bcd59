use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId, Permissions},
    prelude::Context,
};

/// Todos los comandos slash del bot
pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        ping_command(),
        configurechannel_command(),
        join_command(),
        leave_command(),
        setstreamurl_command(),
        help_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

fn ping_command() -> CreateCommand {
    CreateCommand::new("ping").description("Comprueba la latencia del bot")
}

// Comandos de administración

fn configurechannel_command() -> CreateCommand {
    CreateCommand::new("configurechannel")
        .description("Configura el canal de voz donde se reproduce la radio")
        .default_member_permissions(Permissions::ADMINISTRATOR)
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "name",
                "Nombre del canal de voz",
            )
            .required(true),
        )
}

fn setstreamurl_command() -> CreateCommand {
    CreateCommand::new("setstreamurl")
        .description("Establece la URL del stream de radio para este servidor")
        .default_member_permissions(Permissions::ADMINISTRATOR)
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "url",
                "URL http:// o https:// del stream",
            )
            .required(true),
        )
}

// Comandos de conexión

fn join_command() -> CreateCommand {
    CreateCommand::new("join")
        .description("Une el bot al canal configurado y reproduce la radio")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave")
        .description("Desconecta el bot del canal de voz")
}

fn help_command() -> CreateCommand {
    CreateCommand::new("help").description("Muestra la lista de comandos")
}

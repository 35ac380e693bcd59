use serenity::{
    all::{Colour, Timestamp},
    builder::{CreateEmbed, CreateEmbedFooter},
};

const STANDARD_FOOTER: &str = "Radio Stream Bot - Tu radio 24/7";

/// Paleta de colores del bot
pub mod colors {
    use super::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
}

/// Crea el embed de ayuda con todos los comandos
pub fn create_help_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("📻 Ayuda de Radio Stream Bot")
        .color(colors::INFO_BLUE)
        .description("Aquí tienes una lista de todos los comandos disponibles:")
        .field(
            "`/configurechannel <nombre>`",
            "Configura el canal de voz donde el bot reproducirá la radio. **(Solo Administradores)**\n\
            *Ejemplo: `/configurechannel Radio FM`*",
            false,
        )
        .field(
            "`/setstreamurl <url>`",
            "Establece o actualiza la URL del stream de radio para este servidor. **(Solo Administradores)**\n\
            Si no se configura, se usa la URL global del bot.\n\
            *Ejemplo: `/setstreamurl https://stream.example.com/mi_radio`*",
            false,
        )
        .field(
            "`/join`",
            "Une el bot al canal de voz configurado y comienza a reproducir la radio.",
            false,
        )
        .field("`/leave`", "Desconecta el bot del canal de voz actual.", false)
        .field("`/ping`", "Comprueba la latencia del bot.", false)
        .field("`/help`", "Muestra este mensaje de ayuda.", false)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
}

pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
}

/// Embed de advertencia (configuración incompleta, sin permisos, etc.)
pub fn create_warning_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("⚠️ {}", title))
        .description(description)
        .color(colors::WARNING_ORANGE)
        .timestamp(Timestamp::now())
}

use thiserror::Error;

/// Errores reportados por el transporte de voz (Songbird/Serenity).
#[derive(Debug, Clone, Error)]
pub enum VoiceError {
    /// El bot no tiene permisos de `Connect`/`Speak` en el canal.
    #[error("permisos insuficientes: {0}")]
    Permission(String),
    /// La librería de voz rechazó la operación (ya conectando, timeout, etc.).
    #[error("error del cliente de voz: {0}")]
    Client(String),
    #[error("no hay conexión de voz activa")]
    NotConnected,
}

/// Failure taxonomy of the playback reconciliation subsystem.
///
/// Every variant is caught at the boundary where it happens and turned into a
/// log line plus a best-effort notification; none of them crash the process.
#[derive(Debug, Clone, Error)]
pub enum RadioError {
    /// No target channel or no usable stream URL. User-correctable.
    #[error("configuración incompleta: {0}")]
    ConfigurationMissing(String),
    /// Missing connect/speak permission. Not retried automatically.
    #[error("permisos de voz insuficientes en {channel}: {reason}")]
    TransportPermission { channel: String, reason: String },
    /// The voice client rejected the operation. Not retried automatically.
    #[error("error de cliente de voz en {channel}: {reason}")]
    TransportClient { channel: String, reason: String },
    /// Decode/network failure mid-stream. Retried after the backoff.
    #[error("fallo de reproducción: {0}")]
    PlaybackFailure(String),
    /// Guild or channel no longer exists. Silent.
    #[error("{0} ya no existe")]
    EntityGone(String),
    #[error("sin conexión de voz")]
    NotConnected,
}

impl RadioError {
    pub fn from_voice(error: VoiceError, channel: impl Into<String>) -> Self {
        let channel = channel.into();
        match error {
            VoiceError::Permission(reason) => Self::TransportPermission { channel, reason },
            VoiceError::Client(reason) => Self::TransportClient { channel, reason },
            VoiceError::NotConnected => Self::NotConnected,
        }
    }

    /// Mensaje legible para el canal de notificaciones.
    ///
    /// `None` para las categorías que no se comunican al usuario.
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::ConfigurationMissing(detail) => Some(format!(
                "⚠️ Configuración incompleta: {detail}. Usa `/configurechannel` o `/setstreamurl`."
            )),
            Self::TransportPermission { channel, .. } => Some(format!(
                "❌ Error de permisos al unirse o moverse a **{channel}**. Verifica los permisos del bot."
            )),
            Self::TransportClient { channel, reason } => Some(format!(
                "❌ Error de cliente al conectar a **{channel}**: {reason}"
            )),
            Self::PlaybackFailure(reason) => Some(format!(
                "⚠️ Error durante la reproducción: `{reason}`. Reintentando automáticamente..."
            )),
            Self::EntityGone(_) | Self::NotConnected => None,
        }
    }
}

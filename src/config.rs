use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Valor de marcador que indica que la URL global no fue configurada.
pub const UNSET_STREAM_URL: &str = "YOUR_STREAM_URL_HERE";

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Radio
    pub default_stream_url: String,
    pub config_file: PathBuf,

    // Temporizadores
    pub timings: Timings,
}

/// Fixed waits used by the reconciliation subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Pause after stopping a track before starting the next one.
    pub stop_settle: Duration,
    /// Wait before restarting a stream that ended.
    pub retry_backoff: Duration,
    /// Wait after an involuntary disconnect before reconnecting.
    pub reconnect_grace: Duration,
    /// Period of the reconciliation sweep.
    pub sweep_interval: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            stop_settle: Duration::from_millis(500),
            retry_backoff: Duration::from_secs(10),
            reconnect_grace: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(45),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Timings::default();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN no encontrado en el entorno"))?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Radio
            default_stream_url: std::env::var("RADIO_STREAM_URL")
                .unwrap_or_else(|_| UNSET_STREAM_URL.to_string()),
            config_file: std::env::var("CONFIG_FILE")
                .unwrap_or_else(|_| "config.json".to_string())
                .into(),

            timings: Timings {
                stop_settle: duration_var("STOP_SETTLE_MS", defaults.stop_settle, Duration::from_millis)?,
                retry_backoff: duration_var("RETRY_BACKOFF_SECS", defaults.retry_backoff, Duration::from_secs)?,
                reconnect_grace: duration_var("RECONNECT_GRACE_SECS", defaults.reconnect_grace, Duration::from_secs)?,
                sweep_interval: duration_var("SWEEP_INTERVAL_SECS", defaults.sweep_interval, Duration::from_secs)?,
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// The bot refuses to start while the global stream URL still holds the
    /// sentinel value: there would be nothing to fall back on for guilds
    /// without their own override.
    ///
    /// # Validation Rules
    ///
    /// - `DISCORD_TOKEN` must not be empty
    /// - `RADIO_STREAM_URL` must be set and be an `http(s)` URL
    /// - The sweep interval and retry backoff must be greater than zero
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN está vacío");
        }

        if self.default_stream_url == UNSET_STREAM_URL || self.default_stream_url.trim().is_empty() {
            anyhow::bail!("RADIO_STREAM_URL global no configurado en .env");
        }

        if let Err(e) = validate_stream_url(&self.default_stream_url) {
            anyhow::bail!("RADIO_STREAM_URL inválido: {}", e);
        }

        if self.timings.sweep_interval.is_zero() {
            anyhow::bail!("SWEEP_INTERVAL_SECS debe ser mayor que 0");
        }

        if self.timings.retry_backoff.is_zero() {
            anyhow::bail!("RETRY_BACKOFF_SECS debe ser mayor que 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: comandos {}\n  \
            Radio: {} (config en {})\n  \
            Tiempos: barrido {}, reintento {}, gracia {}, asentamiento {}",
            self.guild_id.map_or("globales".to_string(), |id| format!("en guild {}", id)),
            self.default_stream_url,
            self.config_file.display(),
            humantime::format_duration(self.timings.sweep_interval),
            humantime::format_duration(self.timings.retry_backoff),
            humantime::format_duration(self.timings.reconnect_grace),
            humantime::format_duration(self.timings.stop_settle),
        )
    }
}

/// Checks that a stream URL is an absolute `http://` or `https://` URL.
pub fn validate_stream_url(raw: &str) -> Result<url::Url> {
    let raw = raw.trim();
    if !(raw.starts_with("http://") || raw.starts_with("https://")) {
        anyhow::bail!("la URL debe comenzar con http:// o https://");
    }

    let parsed = url::Url::parse(raw)?;
    if parsed.host_str().is_none() {
        anyhow::bail!("la URL no tiene host");
    }

    Ok(parsed)
}

/// `true` when the URL can be handed to the player.
pub fn is_playable_url(url: &str) -> bool {
    let url = url.trim();
    !url.is_empty() && url != UNSET_STREAM_URL
}

fn duration_var(name: &str, default: Duration, unit: fn(u64) -> Duration) -> Result<Duration> {
    match std::env::var(name) {
        Ok(val) if !val.trim().is_empty() => Ok(unit(val.trim().parse()?)),
        _ => Ok(default),
    }
}

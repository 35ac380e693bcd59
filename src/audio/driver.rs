use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::{
    all::{Cache, ChannelType, Http, Permissions},
    model::id::{ChannelId, GuildId},
};
use songbird::{
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::{
    audio::gateway::{PlaybackOutcome, PlaybackWatch, VoiceConnection, VoiceGateway},
    error::VoiceError,
};

/// [`VoiceGateway`] backed by the Serenity cache/HTTP client and Songbird.
pub struct SongbirdGateway {
    cache: Arc<Cache>,
    http: Arc<Http>,
    songbird: Arc<Songbird>,
    http_client: reqwest::Client,
    current_tracks: DashMap<GuildId, TrackHandle>,
}

impl SongbirdGateway {
    pub fn new(cache: Arc<Cache>, http: Arc<Http>, songbird: Arc<Songbird>) -> anyhow::Result<Self> {
        // Sin timeout total: el stream de radio no termina nunca
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            cache,
            http,
            songbird,
            http_client,
            current_tracks: DashMap::new(),
        })
    }

    /// Verifica permisos de `CONNECT` y `SPEAK` del bot en el canal.
    ///
    /// Si el miembro del bot no está en caché se deja que Discord decida.
    fn check_voice_permissions(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), VoiceError> {
        let bot_id = self.cache.current_user().id;
        let Some(guild) = self.cache.guild(guild_id) else {
            return Ok(());
        };
        let Some(channel) = guild.channels.get(&channel_id) else {
            return Err(VoiceError::Client(format!("canal {} no encontrado", channel_id)));
        };
        let Some(member) = guild.members.get(&bot_id) else {
            return Ok(());
        };

        let permissions = guild.user_permissions_in(channel, member);
        if permissions.contains(Permissions::CONNECT | Permissions::SPEAK) {
            Ok(())
        } else {
            Err(VoiceError::Permission(format!(
                "faltan CONNECT/SPEAK en {}",
                channel.name
            )))
        }
    }

    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<VoiceConnection, VoiceError> {
        self.check_voice_permissions(guild_id, channel_id)?;

        self.songbird
            .join(guild_id, channel_id)
            .await
            .map_err(|e| VoiceError::Client(e.to_string()))?;

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(VoiceConnection { guild_id, channel_id })
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn guild_exists(&self, guild_id: GuildId) -> bool {
        self.cache.guild(guild_id).is_some()
    }

    async fn voice_channel_exists(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        self.cache.guild(guild_id).is_some_and(|guild| {
            guild
                .channels
                .get(&channel_id)
                .is_some_and(|channel| matches!(channel.kind, ChannelType::Voice | ChannelType::Stage))
        })
    }

    async fn channel_name(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<String> {
        let guild = self.cache.guild(guild_id)?;
        guild.channels.get(&channel_id).map(|channel| channel.name.clone())
    }

    async fn default_text_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.cache.guild(guild_id).and_then(|guild| guild.system_channel_id)
    }

    async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let call = self.songbird.get(guild_id)?;
        let channel = call.lock().await.current_channel()?;
        Some(ChannelId::from(channel.0))
    }

    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<VoiceConnection, VoiceError> {
        self.join(guild_id, channel_id).await
    }

    async fn move_to(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<VoiceConnection, VoiceError> {
        // Songbird mueve la llamada existente al unirse a otro canal
        self.join(guild_id, channel_id).await
    }

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), VoiceError> {
        self.current_tracks.remove(&guild_id);

        if self.songbird.get(guild_id).is_some() {
            self.songbird
                .remove(guild_id)
                .await
                .map_err(|e| VoiceError::Client(e.to_string()))?;
            info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        }

        Ok(())
    }

    async fn is_playing(&self, guild_id: GuildId) -> bool {
        let Some(track) = self.current_tracks.get(&guild_id).map(|t| t.clone()) else {
            return false;
        };

        match track.get_info().await {
            Ok(info) => matches!(info.playing, PlayMode::Play | PlayMode::Pause),
            Err(_) => false,
        }
    }

    async fn stop(&self, guild_id: GuildId) {
        self.current_tracks.remove(&guild_id);

        if let Some(call) = self.songbird.get(guild_id) {
            call.lock().await.stop();
        }
    }

    async fn play(&self, guild_id: GuildId, url: &str) -> Result<PlaybackWatch, VoiceError> {
        let call = self.songbird.get(guild_id).ok_or(VoiceError::NotConnected)?;

        let input: Input = HttpRequest::new(self.http_client.clone(), url.to_string()).into();
        let track = call.lock().await.play_input(input);

        let (sender, watch) = oneshot::channel();
        let sender = Arc::new(Mutex::new(Some(sender)));

        for event in [TrackEvent::End, TrackEvent::Error] {
            track
                .add_event(
                    Event::Track(event),
                    TrackEndNotifier {
                        guild_id,
                        sender: sender.clone(),
                    },
                )
                .map_err(|e| VoiceError::Client(format!("Error al agregar event handler: {}", e)))?;
        }

        self.current_tracks.insert(guild_id, track);
        Ok(watch)
    }

    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<(), VoiceError> {
        channel_id
            .say(&self.http, content)
            .await
            .map(|_| ())
            .map_err(|e| VoiceError::Client(e.to_string()))
    }
}

/// Handler para cuando termina o falla el track.
///
/// Solo entrega el resultado por el oneshot: el reintento corre en una tarea
/// de tokio, nunca en el hilo de audio.
struct TrackEndNotifier {
    guild_id: GuildId,
    sender: Arc<Mutex<Option<oneshot::Sender<PlaybackOutcome>>>>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let outcome = match ctx {
            EventContext::Track(tracks) => tracks
                .first()
                .map(|(state, _)| match &state.playing {
                    PlayMode::Errored(e) => PlaybackOutcome::Failed(format!("{:?}", e)),
                    _ => PlaybackOutcome::Finished,
                })
                .unwrap_or(PlaybackOutcome::Finished),
            _ => PlaybackOutcome::Finished,
        };

        debug!("Track terminado en guild {}: {:?}", self.guild_id, outcome);

        if let Some(sender) = self.sender.lock().take() {
            let _ = sender.send(outcome);
        }

        None
    }
}

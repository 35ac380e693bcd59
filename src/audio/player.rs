use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, error, info, warn};

use crate::{
    audio::gateway::{self, PlaybackOutcome, PlaybackWatch, VoiceGateway},
    config::{is_playable_url, Timings},
    error::{RadioError, VoiceError},
    state::PlaybackStateStore,
};

/// Reintento pendiente de una guild
#[derive(Debug)]
struct RetryRequest {
    guild_id: GuildId,
    generation: u64,
}

/// Starts and restarts the radio stream on a live voice connection.
///
/// Every playback start bumps the guild's generation. When a playback ends
/// the completion is handled on its own task; if the guild still wants to
/// play, a retry request goes onto the retry queue. Each retry waits out the
/// backoff, re-reads the freshest state and calls [`StreamPlayer::play`] again.
/// Withdrawing the intent cancels the wait immediately.
#[derive(Clone)]
pub struct StreamPlayer {
    gateway: Arc<dyn VoiceGateway>,
    states: Arc<PlaybackStateStore>,
    timings: Timings,
    retries: mpsc::UnboundedSender<RetryRequest>,
}

impl StreamPlayer {
    /// Crea el reproductor y lanza la cola de reintentos en segundo plano.
    pub fn new(gateway: Arc<dyn VoiceGateway>, states: Arc<PlaybackStateStore>, timings: Timings) -> Self {
        let (retries, requests) = mpsc::unbounded_channel();
        let player = Self {
            gateway,
            states,
            timings,
            retries,
        };

        tokio::spawn(run_retry_queue(player.clone(), requests));
        player
    }

    /// Reproduce `url` en la conexión de voz actual de la guild.
    ///
    /// Fails fast on a missing/sentinel URL, clearing the intent to play.
    /// Without a live connection the intent is left untouched so the sweep
    /// can reconnect.
    pub async fn play(
        &self,
        guild_id: GuildId,
        url: Option<String>,
        notify_channel: Option<ChannelId>,
    ) -> Result<(), RadioError> {
        let lock = self.states.guild_lock(guild_id);
        let _guard = lock.lock().await;

        let Some(url) = url.filter(|url| is_playable_url(url)) else {
            let err = RadioError::ConfigurationMissing(
                "URL del stream no configurada o inválida".to_string(),
            );
            warn!("❌ URL de stream inválida para guild {}", guild_id);
            self.states.set_desired(guild_id, false);
            self.report(notify_channel, &err).await;
            return Err(err);
        };

        if self.gateway.current_channel(guild_id).await.is_none() {
            debug!("Guild {} sin conexión de voz al iniciar el stream", guild_id);
            return Err(RadioError::NotConnected);
        }

        // Invalida la finalización del track anterior antes de detenerlo
        let Some(generation) = self.states.update_existing(guild_id, |state| {
            state.playback_generation += 1;
            state.playback_generation
        }) else {
            return Err(RadioError::EntityGone(format!("estado de guild {}", guild_id)));
        };

        if self.gateway.is_playing(guild_id).await {
            self.gateway.stop(guild_id).await;
            tokio::time::sleep(self.timings.stop_settle).await;
        }

        match self.gateway.play(guild_id, &url).await {
            Ok(watch) => {
                self.states
                    .update_existing(guild_id, |state| state.current_stream_url = Some(url.clone()));
                info!("📻 Stream iniciado en guild {} con URL: {}", guild_id, url);

                let started = Instant::now();
                let player = self.clone();
                tokio::spawn(async move {
                    player.watch_playback(guild_id, generation, started, watch).await;
                });
                Ok(())
            }
            Err(VoiceError::NotConnected) => Err(RadioError::NotConnected),
            Err(e) => {
                let label = match self.gateway.current_channel(guild_id).await {
                    Some(channel_id) => self.gateway.channel_label(guild_id, channel_id).await,
                    None => "el canal de voz".to_string(),
                };
                let err = RadioError::from_voice(e, label);
                error!("Error al iniciar stream en guild {}: {}", guild_id, err);
                self.states.set_desired(guild_id, false);
                self.report(notify_channel, &err).await;
                Err(err)
            }
        }
    }

    async fn watch_playback(self, guild_id: GuildId, generation: u64, started: Instant, watch: PlaybackWatch) {
        // Si el driver descarta el track sin evento, se trata como fin normal
        let outcome = watch.await.unwrap_or(PlaybackOutcome::Finished);

        let is_current = self
            .states
            .get(guild_id)
            .is_some_and(|state| state.playback_generation == generation);
        if !is_current {
            debug!("Fin de un stream reemplazado en guild {}", guild_id);
            return;
        }

        match outcome {
            PlaybackOutcome::Failed(reason) => {
                error!("Error durante la reproducción en guild {}: {}", guild_id, reason);
                // Un stream que sobrevivió al backoff ya se había recuperado
                let recovered = started.elapsed() >= self.timings.retry_backoff;
                let first_failure = self
                    .states
                    .update_existing(guild_id, |state| {
                        if recovered {
                            state.failure_streak = 0;
                        }
                        state.failure_streak += 1;
                        state.failure_streak == 1
                    })
                    .unwrap_or(false);

                if first_failure {
                    let channel = self
                        .states
                        .notification_channel(self.gateway.as_ref(), guild_id)
                        .await;
                    self.report(channel, &RadioError::PlaybackFailure(reason)).await;
                }
            }
            PlaybackOutcome::Finished => {
                info!("Stream finalizado/interrumpido en guild {}", guild_id);
                self.states
                    .update_existing(guild_id, |state| state.failure_streak = 0);
            }
        }

        if !self.states.is_desired(guild_id) || self.gateway.current_channel(guild_id).await.is_none() {
            info!(
                "Playback detenido o bot desconectado en guild {}. No se reinicia automáticamente.",
                guild_id
            );
            return;
        }

        if self.retries.send(RetryRequest { guild_id, generation }).is_err() {
            warn!("Cola de reintentos cerrada, guild {} no se reiniciará", guild_id);
        }
    }

    async fn retry(&self, request: RetryRequest) {
        let guild_id = request.guild_id;
        let Some(cancel) = self.states.get(guild_id).map(|state| state.cancellation()) else {
            return;
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Reintento cancelado para guild {}", guild_id);
                return;
            }
            _ = tokio::time::sleep(self.timings.retry_backoff) => {}
        }

        // Estado más reciente: la URL pudo cambiar durante la espera
        let Some(state) = self.states.get(guild_id) else {
            return;
        };
        if state.playback_generation != request.generation {
            debug!("Guild {} ya reinició el stream por otra vía", guild_id);
            return;
        }
        if !state.desired_playing || self.gateway.current_channel(guild_id).await.is_none() {
            info!("No se reinicia el stream en guild {}, estado cambió o desconectado", guild_id);
            return;
        }

        let url = state.best_known_url().map(str::to_string);
        let channel = self
            .states
            .notification_channel(self.gateway.as_ref(), guild_id)
            .await;

        info!("🔄 Reintentando stream en guild {} con URL {:?}", guild_id, url);
        // play() valida la URL y desactiva la intención si no sirve
        if let Err(e) = self.play(guild_id, url, channel).await {
            debug!("Reintento fallido en guild {}: {}", guild_id, e);
        }
    }

    async fn report(&self, notify_channel: Option<ChannelId>, error: &RadioError) {
        if let Some(message) = error.user_message() {
            gateway::notify(self.gateway.as_ref(), notify_channel, &message).await;
        }
    }
}

async fn run_retry_queue(player: StreamPlayer, mut requests: mpsc::UnboundedReceiver<RetryRequest>) {
    while let Some(request) = requests.recv().await {
        let player = player.clone();
        tokio::spawn(async move {
            player.retry(request).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UNSET_STREAM_URL;
    use crate::testing::{FakeGateway, GUILD, TEXT, URL_A, URL_B, VOICE};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::time::sleep;

    fn setup() -> (Arc<FakeGateway>, Arc<PlaybackStateStore>, StreamPlayer) {
        let fake = Arc::new(FakeGateway::new().with_guild(GUILD, VOICE, TEXT));
        fake.set_connected(GUILD, VOICE);

        let states = Arc::new(PlaybackStateStore::new());
        states.update(GUILD, |state| {
            state.set_desired(true);
            state.target_channel_id = Some(VOICE);
            state.stream_url = Some(URL_A.to_string());
        });

        let player = StreamPlayer::new(fake.clone(), states.clone(), Timings::default());
        (fake, states, player)
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_sentinel_url() {
        let (fake, states, player) = setup();

        let result = player
            .play(GUILD, Some(UNSET_STREAM_URL.to_string()), Some(TEXT))
            .await;

        assert!(matches!(result, Err(RadioError::ConfigurationMissing(_))));
        assert!(!states.is_desired(GUILD));
        assert!(fake.plays().is_empty());
        assert_eq!(fake.messages().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_connection_keeps_intent() {
        let (fake, states, player) = setup();
        fake.drop_connection(GUILD);

        let result = player.play(GUILD, Some(URL_A.to_string()), None).await;

        assert!(matches!(result, Err(RadioError::NotConnected)));
        assert!(states.is_desired(GUILD));
        assert!(fake.messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_after_each_failure_until_intent_withdrawn() {
        let (fake, states, player) = setup();

        player.play(GUILD, Some(URL_A.to_string()), None).await.unwrap();
        assert_eq!(fake.plays().len(), 1);

        for restarts in 1..=3 {
            fake.finish_playback(GUILD, PlaybackOutcome::Failed("decode error".to_string()));

            sleep(Duration::from_secs(9)).await;
            assert_eq!(fake.plays().len(), restarts, "reinicio antes del backoff");

            sleep(Duration::from_secs(2)).await;
            assert_eq!(fake.plays().len(), restarts + 1);
        }

        // un solo aviso por racha de fallos
        assert_eq!(fake.messages(), vec![(TEXT, RadioError::PlaybackFailure("decode error".to_string()).user_message().unwrap())]);

        states.set_desired(GUILD, false);
        fake.finish_playback(GUILD, PlaybackOutcome::Failed("decode error".to_string()));
        sleep(Duration::from_secs(60)).await;

        assert_eq!(fake.plays().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_after_long_recovery_is_reported_again() {
        let (fake, _states, player) = setup();
        player.play(GUILD, Some(URL_A.to_string()), None).await.unwrap();

        fake.finish_playback(GUILD, PlaybackOutcome::Failed("decode error".to_string()));
        sleep(Duration::from_secs(11)).await;
        assert_eq!(fake.plays().len(), 2);

        // el reinicio aguanta una hora antes de volver a fallar
        sleep(Duration::from_secs(3600)).await;
        fake.finish_playback(GUILD, PlaybackOutcome::Failed("network".to_string()));
        sleep(Duration::from_millis(10)).await;

        let messages = fake.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[1].1.contains("network"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_withdrawing_intent_during_backoff_cancels_retry() {
        let (fake, states, player) = setup();
        player.play(GUILD, Some(URL_A.to_string()), None).await.unwrap();

        fake.finish_playback(GUILD, PlaybackOutcome::Finished);
        sleep(Duration::from_secs(3)).await;
        states.set_desired(GUILD, false);
        states.set_desired(GUILD, true);
        sleep(Duration::from_secs(30)).await;

        assert_eq!(fake.plays().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_supersedes_previous_playback() {
        let (fake, _states, player) = setup();

        player.play(GUILD, Some(URL_A.to_string()), None).await.unwrap();
        player.play(GUILD, Some(URL_B.to_string()), None).await.unwrap();

        // la detención del primer track no dispara un reintento
        sleep(Duration::from_secs(30)).await;

        assert_eq!(fake.stops(), 1);
        assert_eq!(fake.plays().len(), 2);
        assert_eq!(fake.now_playing(GUILD).as_deref(), Some(URL_B));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_restart_after_disconnect() {
        let (fake, _states, player) = setup();
        player.play(GUILD, Some(URL_A.to_string()), None).await.unwrap();

        fake.drop_connection(GUILD);
        sleep(Duration::from_secs(30)).await;

        assert_eq!(fake.plays().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_rejection_clears_intent() {
        let (fake, states, player) = setup();
        fake.fail_next_play(VoiceError::Client("ya reproduciendo".to_string()));

        let result = player.play(GUILD, Some(URL_A.to_string()), Some(TEXT)).await;

        assert!(matches!(result, Err(RadioError::TransportClient { .. })));
        assert!(!states.is_desired(GUILD));
        assert_eq!(fake.messages().len(), 1);
    }
}

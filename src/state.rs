//! # Playback State
//!
//! In-memory, per-guild record of desired vs. actual playback status.
//!
//! [`PlaybackStateStore`] is injected into every component that needs it.
//! Records are mutated through short synchronous closures, so no lock is ever
//! held across an `.await`. Connection and playback actions additionally
//! serialize per guild through [`PlaybackStateStore::guild_lock`].

use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::audio::gateway::{VoiceConnection, VoiceGateway};

/// Estado de reproducción de una guild
#[derive(Debug, Clone, Default)]
pub struct GuildPlaybackState {
    pub target_channel_id: Option<ChannelId>,
    /// Most recently resolved URL. Retries always read this one.
    pub stream_url: Option<String>,
    /// URL actually handed to the player last time.
    pub current_stream_url: Option<String>,
    pub desired_playing: bool,
    pub notification_channel_id: Option<ChannelId>,
    pub connection: Option<VoiceConnection>,
    pub playback_generation: u64,
    pub failure_streak: u32,
    cancel: CancellationToken,
}

impl GuildPlaybackState {
    /// Token cancelled as soon as the intent to play is withdrawn.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Best known URL: the freshest resolution, else whatever is playing.
    pub fn best_known_url(&self) -> Option<&str> {
        self.stream_url
            .as_deref()
            .or(self.current_stream_url.as_deref())
    }

    pub fn set_desired(&mut self, desired: bool) {
        if self.desired_playing && !desired {
            self.cancel.cancel();
            self.cancel = CancellationToken::new();
        }
        self.desired_playing = desired;
    }
}

#[derive(Default)]
pub struct PlaybackStateStore {
    guilds: DashMap<GuildId, GuildPlaybackState>,
    locks: DashMap<GuildId, Arc<Mutex<()>>>,
}

impl PlaybackStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<GuildPlaybackState> {
        self.guilds.get(&guild_id).map(|state| state.clone())
    }

    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.guilds.contains_key(&guild_id)
    }

    pub fn is_desired(&self, guild_id: GuildId) -> bool {
        self.guilds
            .get(&guild_id)
            .is_some_and(|state| state.desired_playing)
    }

    /// Runs `f` on the guild's record, creating it if needed.
    pub fn update<R>(&self, guild_id: GuildId, f: impl FnOnce(&mut GuildPlaybackState) -> R) -> R {
        let mut entry = self.guilds.entry(guild_id).or_default();
        f(entry.value_mut())
    }

    /// Runs `f` only if the guild already has a record.
    pub fn update_existing<R>(
        &self,
        guild_id: GuildId,
        f: impl FnOnce(&mut GuildPlaybackState) -> R,
    ) -> Option<R> {
        self.guilds.get_mut(&guild_id).map(|mut state| f(state.value_mut()))
    }

    /// Withdraws (or grants) the intent to play. Withdrawing cancels any
    /// pending retry for the guild.
    pub fn set_desired(&self, guild_id: GuildId, desired: bool) {
        self.update_existing(guild_id, |state| state.set_desired(desired));
    }

    /// Elimina el estado de la guild y cancela los reintentos pendientes.
    pub fn remove(&self, guild_id: GuildId) -> Option<GuildPlaybackState> {
        let removed = self.guilds.remove(&guild_id).map(|(_, state)| state);
        if let Some(state) = &removed {
            state.cancel.cancel();
        }
        removed
    }

    pub fn desired_guilds(&self) -> Vec<GuildId> {
        self.guilds
            .iter()
            .filter(|entry| entry.desired_playing)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Where status messages for the guild go: the explicit override if one
    /// was recorded, otherwise the guild's default text channel.
    pub async fn notification_channel(
        &self,
        gateway: &dyn VoiceGateway,
        guild_id: GuildId,
    ) -> Option<ChannelId> {
        let explicit = self
            .guilds
            .get(&guild_id)
            .and_then(|state| state.notification_channel_id);

        match explicit {
            Some(channel_id) => Some(channel_id),
            None => gateway.default_text_channel(guild_id).await,
        }
    }

    /// Per-guild mutex serializing connection and playback actions.
    pub fn guild_lock(&self, guild_id: GuildId) -> Arc<Mutex<()>> {
        self.locks.entry(guild_id).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_update_creates_lazily() {
        let store = PlaybackStateStore::new();
        let guild = GuildId::new(1);

        assert!(store.get(guild).is_none());
        assert!(store.update_existing(guild, |s| s.desired_playing = true).is_none());
        assert!(!store.contains(guild));

        store.update(guild, |s| {
            s.desired_playing = true;
            s.target_channel_id = Some(ChannelId::new(2));
        });

        let state = store.get(guild).unwrap();
        assert!(state.desired_playing);
        assert_eq!(state.target_channel_id, Some(ChannelId::new(2)));
        assert_eq!(store.desired_guilds(), vec![guild]);
    }

    #[test]
    fn test_withdrawing_intent_cancels_pending_work() {
        let store = PlaybackStateStore::new();
        let guild = GuildId::new(1);
        store.update(guild, |s| s.set_desired(true));

        let token = store.get(guild).unwrap().cancellation();
        assert!(!token.is_cancelled());

        store.set_desired(guild, false);
        assert!(token.is_cancelled());
        assert!(!store.is_desired(guild));

        // el siguiente ciclo recibe un token nuevo
        store.set_desired(guild, true);
        assert!(!store.get(guild).unwrap().cancellation().is_cancelled());
    }

    #[test]
    fn test_remove_cancels_token() {
        let store = PlaybackStateStore::new();
        let guild = GuildId::new(9);
        store.update(guild, |s| s.set_desired(true));
        let token = store.get(guild).unwrap().cancellation();

        assert!(store.remove(guild).is_some());
        assert!(token.is_cancelled());
        assert!(store.desired_guilds().is_empty());
    }

    #[test]
    fn test_best_known_url_prefers_latest_resolution() {
        let mut state = GuildPlaybackState::default();
        assert_eq!(state.best_known_url(), None);

        state.current_stream_url = Some("https://old.example/live".to_string());
        assert_eq!(state.best_known_url(), Some("https://old.example/live"));

        state.stream_url = Some("https://new.example/live".to_string());
        assert_eq!(state.best_known_url(), Some("https://new.example/live"));
    }

    #[tokio::test]
    async fn test_guild_lock_is_shared_per_guild() {
        let store = PlaybackStateStore::new();
        let a = store.guild_lock(GuildId::new(1));
        let b = store.guild_lock(GuildId::new(1));
        let other = store.guild_lock(GuildId::new(2));

        let _held = a.lock().await;
        assert!(b.try_lock().is_err());
        assert!(other.try_lock().is_ok());
    }
}

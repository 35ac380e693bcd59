//! In-memory voice gateway for unit tests without a Discord connection.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::collections::{HashMap, HashSet};
use tokio::sync::oneshot;

use crate::{
    audio::gateway::{PlaybackOutcome, PlaybackWatch, VoiceConnection, VoiceGateway},
    error::VoiceError,
};

pub const GUILD: GuildId = GuildId::new(100);
pub const VOICE: ChannelId = ChannelId::new(200);
pub const OTHER_VOICE: ChannelId = ChannelId::new(201);
pub const TEXT: ChannelId = ChannelId::new(300);
pub const URL_A: &str = "https://radio-a.example.com/live.mp3";
pub const URL_B: &str = "https://radio-b.example.com/live.aac";

#[derive(Default)]
struct FakeState {
    guilds: HashSet<GuildId>,
    voice_channels: HashMap<ChannelId, (GuildId, String)>,
    system_channels: HashMap<GuildId, ChannelId>,
    connected: HashMap<GuildId, ChannelId>,
    playing: HashMap<GuildId, String>,
    pending: HashMap<GuildId, oneshot::Sender<PlaybackOutcome>>,
    connects: Vec<(GuildId, ChannelId)>,
    moves: Vec<(GuildId, ChannelId)>,
    disconnects: Vec<GuildId>,
    plays: Vec<(GuildId, String)>,
    stops: usize,
    messages: Vec<(ChannelId, String)>,
    connect_error: Option<VoiceError>,
    play_error: Option<VoiceError>,
}

/// Records every call and lets the test drive track endings and drops.
#[derive(Default)]
pub struct FakeGateway {
    inner: Mutex<FakeState>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_guild(self, guild_id: GuildId, voice: ChannelId, system: ChannelId) -> Self {
        {
            let mut inner = self.inner.lock();
            inner.guilds.insert(guild_id);
            inner.voice_channels.insert(voice, (guild_id, "Radio".to_string()));
            inner.system_channels.insert(guild_id, system);
        }
        self
    }

    pub fn with_voice_channel(self, guild_id: GuildId, voice: ChannelId, name: &str) -> Self {
        self.inner
            .lock()
            .voice_channels
            .insert(voice, (guild_id, name.to_string()));
        self
    }

    pub fn remove_guild(&self, guild_id: GuildId) {
        let mut inner = self.inner.lock();
        inner.guilds.remove(&guild_id);
        inner.voice_channels.retain(|_, (guild, _)| *guild != guild_id);
    }

    pub fn set_connected(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.inner.lock().connected.insert(guild_id, channel_id);
    }

    /// Ends the current track the way the audio driver would.
    pub fn finish_playback(&self, guild_id: GuildId, outcome: PlaybackOutcome) {
        let sender = {
            let mut inner = self.inner.lock();
            inner.playing.remove(&guild_id);
            inner.pending.remove(&guild_id)
        };
        if let Some(sender) = sender {
            let _ = sender.send(outcome);
        }
    }

    /// Involuntary disconnect: the connection and its track vanish.
    pub fn drop_connection(&self, guild_id: GuildId) {
        self.inner.lock().connected.remove(&guild_id);
        self.finish_playback(guild_id, PlaybackOutcome::Finished);
    }

    pub fn fail_next_connect(&self, error: VoiceError) {
        self.inner.lock().connect_error = Some(error);
    }

    pub fn fail_next_play(&self, error: VoiceError) {
        self.inner.lock().play_error = Some(error);
    }

    pub fn connects(&self) -> Vec<(GuildId, ChannelId)> {
        self.inner.lock().connects.clone()
    }

    pub fn moves(&self) -> Vec<(GuildId, ChannelId)> {
        self.inner.lock().moves.clone()
    }

    pub fn disconnects(&self) -> Vec<GuildId> {
        self.inner.lock().disconnects.clone()
    }

    pub fn plays(&self) -> Vec<(GuildId, String)> {
        self.inner.lock().plays.clone()
    }

    pub fn stops(&self) -> usize {
        self.inner.lock().stops
    }

    pub fn messages(&self) -> Vec<(ChannelId, String)> {
        self.inner.lock().messages.clone()
    }

    pub fn now_playing(&self, guild_id: GuildId) -> Option<String> {
        self.inner.lock().playing.get(&guild_id).cloned()
    }

    pub fn connected_to(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.inner.lock().connected.get(&guild_id).copied()
    }
}

#[async_trait]
impl VoiceGateway for FakeGateway {
    async fn guild_exists(&self, guild_id: GuildId) -> bool {
        self.inner.lock().guilds.contains(&guild_id)
    }

    async fn voice_channel_exists(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        self.inner
            .lock()
            .voice_channels
            .get(&channel_id)
            .is_some_and(|(guild, _)| *guild == guild_id)
    }

    async fn channel_name(&self, _guild_id: GuildId, channel_id: ChannelId) -> Option<String> {
        self.inner
            .lock()
            .voice_channels
            .get(&channel_id)
            .map(|(_, name)| name.clone())
    }

    async fn default_text_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.inner.lock().system_channels.get(&guild_id).copied()
    }

    async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.connected_to(guild_id)
    }

    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<VoiceConnection, VoiceError> {
        let mut inner = self.inner.lock();
        inner.connects.push((guild_id, channel_id));
        if let Some(error) = inner.connect_error.take() {
            return Err(error);
        }
        inner.connected.insert(guild_id, channel_id);
        Ok(VoiceConnection { guild_id, channel_id })
    }

    async fn move_to(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<VoiceConnection, VoiceError> {
        let mut inner = self.inner.lock();
        inner.moves.push((guild_id, channel_id));
        if let Some(error) = inner.connect_error.take() {
            return Err(error);
        }
        inner.connected.insert(guild_id, channel_id);
        Ok(VoiceConnection { guild_id, channel_id })
    }

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), VoiceError> {
        let mut inner = self.inner.lock();
        inner.disconnects.push(guild_id);
        inner.connected.remove(&guild_id);
        inner.playing.remove(&guild_id);
        inner.pending.remove(&guild_id);
        Ok(())
    }

    async fn is_playing(&self, guild_id: GuildId) -> bool {
        self.now_playing(guild_id).is_some()
    }

    async fn stop(&self, guild_id: GuildId) {
        self.inner.lock().stops += 1;
        self.finish_playback(guild_id, PlaybackOutcome::Finished);
    }

    async fn play(&self, guild_id: GuildId, url: &str) -> Result<PlaybackWatch, VoiceError> {
        let mut inner = self.inner.lock();
        if !inner.connected.contains_key(&guild_id) {
            return Err(VoiceError::NotConnected);
        }
        if let Some(error) = inner.play_error.take() {
            return Err(error);
        }

        let (sender, watch) = oneshot::channel();
        inner.plays.push((guild_id, url.to_string()));
        inner.playing.insert(guild_id, url.to_string());
        inner.pending.insert(guild_id, sender);
        Ok(watch)
    }

    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<(), VoiceError> {
        self.inner
            .lock()
            .messages
            .push((channel_id, content.to_string()));
        Ok(())
    }
}

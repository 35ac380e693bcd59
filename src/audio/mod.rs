//! # Audio Module
//!
//! Radio stream playback on top of Songbird.
//!
//! ### [`gateway`] - Voice transport contract
//! - [`gateway::VoiceGateway`] is everything the playback core needs from
//!   Discord: guild/channel lookups, connect/move/disconnect, play/stop and
//!   status messages
//!
//! ### [`driver`] - Songbird implementation
//! - Joins through Songbird after checking `CONNECT`/`SPEAK` in the cache
//! - Streams the radio URL as a lazy HTTP input decoded by Symphonia
//! - Reports track end and errors back through a oneshot channel
//!
//! ### [`player`] - Stream player
//! - Starts and restarts the stream on a live connection
//! - Retries after the backoff while the guild still wants to play
//!
//! ## Audio Quality
//!
//! - **Sample Rate**: 48kHz (Discord standard)
//! - **Channels**: Stereo
//! - **Formats**: MP3, AAC, Ogg/Vorbis, FLAC and WAV radio streams

pub mod driver;
pub mod gateway;
pub mod player;

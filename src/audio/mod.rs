//! # Audio Module
//!
//! Per-guild music queues and their playback sessions.
//!
//! ## Architecture
//!
//! ### [`manager`] - Guild Queue Manager
//! - Entry point used by the command handlers
//! - Spawns one worker task per guild with queued music
//! - Publishes [`notice::MusicNotice`] events for things that happen after
//!   a command was answered
//!
//! ### [`session`] - Playback Session
//! - One session per playback attempt, tagged with a generation number
//! - Notifications from older generations are ignored
//!
//! ### [`voice`] - Voice Connector
//! - Songbird connection and player behind the [`voice::VoiceConnector`] trait
//!
//! ## Example Usage
//!
//! ```text
//! let request = TrackRequest::new("lofi hip hop", user_id);
//! let position = manager.enqueue(guild_id, channel_id, request).await?;
//!
//! manager.skip(guild_id).await?;
//! manager.stop(guild_id).await?;
//! ```

pub mod manager;
pub mod notice;
pub mod queue;
pub mod session;
pub mod voice;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use manager::{
    GuildQueueManager, ManagerSettings, QueueSnapshot, QueueStatus, SkipOutcome, StopOutcome,
};
pub use notice::MusicNotice;

/// Manager wired to yt-dlp and songbird.
pub type MusicManager =
    GuildQueueManager<crate::sources::YtDlpResolver, voice::SongbirdConnector>;

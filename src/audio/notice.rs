use serenity::model::id::GuildId;

/// Out-of-band events that no command reply can carry, because they happen
/// after the command that caused them has been answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MusicNotice {
    NowPlaying {
        guild_id: GuildId,
        query: String,
        title: Option<String>,
    },
    /// The track could not be fetched or played; the queue moved on.
    ResolutionFailed {
        guild_id: GuildId,
        query: String,
        reason: String,
    },
    /// Voice infrastructure failed; the guild's queue was torn down.
    ConnectionFailed { guild_id: GuildId, reason: String },
    /// The last track finished and the bot left the channel.
    QueueEnded { guild_id: GuildId },
}

impl MusicNotice {
    pub fn guild_id(&self) -> GuildId {
        match self {
            MusicNotice::NowPlaying { guild_id, .. }
            | MusicNotice::ResolutionFailed { guild_id, .. }
            | MusicNotice::ConnectionFailed { guild_id, .. }
            | MusicNotice::QueueEnded { guild_id } => *guild_id,
        }
    }
}

use async_trait::async_trait;
use dashmap::DashSet;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::Input, tracks::TrackHandle, Event, EventContext, EventHandler as VoiceEventHandler,
    Songbird, TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::session::PlayerListener;
use crate::error::MusicError;

/// Control over a track that is currently playing.
pub trait TrackControl: Send + Sync + 'static {
    fn halt(&self);
}

/// Voice connection and audio player provider.
#[async_trait]
pub trait VoiceConnector: Send + Sync + 'static {
    type Stream: Send + 'static;
    type Track: TrackControl;

    /// Joins `channel_id`, reusing the guild's connection when it is already there.
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), MusicError>;

    /// Starts `stream` on the guild's connection. The listener must receive
    /// exactly one end or error notification for this playback.
    async fn play(
        &self,
        guild_id: GuildId,
        stream: Self::Stream,
        listener: PlayerListener,
    ) -> Result<Self::Track, MusicError>;

    async fn leave(&self, guild_id: GuildId);

    /// Consumes the record of a disconnect started by [`leave`](Self::leave).
    /// Returns false when the guild has no such pending disconnect.
    fn take_departure(&self, guild_id: GuildId) -> bool;
}

/// Songbird-backed connector.
pub struct SongbirdConnector {
    songbird: Arc<Songbird>,
    volume: f32,
    /// Guilds whose gateway disconnect we caused and have not seen yet.
    departures: DashSet<GuildId>,
}

impl SongbirdConnector {
    pub fn new(songbird: Arc<Songbird>, volume: f32) -> Self {
        Self {
            songbird,
            volume,
            departures: DashSet::new(),
        }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    type Stream = Input;
    type Track = SongbirdTrack;

    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), MusicError> {
        if let Some(call) = self.songbird.get(guild_id) {
            let current = call.lock().await.current_channel();
            if current.map(|c| ChannelId::from(c.0)) == Some(channel_id) {
                debug!("🔁 Reusing voice connection in guild {}", guild_id);
                return Ok(());
            }
        }

        match self.songbird.join(guild_id, channel_id).await {
            Ok(_) => {
                info!("🔊 Connected to voice channel {} in guild {}", channel_id, guild_id);
                Ok(())
            }
            Err(e) => {
                error!("❌ Could not join voice in guild {}: {:?}", guild_id, e);
                Err(MusicError::Connection(e.to_string()))
            }
        }
    }

    async fn play(
        &self,
        guild_id: GuildId,
        stream: Input,
        listener: PlayerListener,
    ) -> Result<SongbirdTrack, MusicError> {
        let call = self
            .songbird
            .get(guild_id)
            .ok_or_else(|| MusicError::Connection("not connected to a voice channel".into()))?;

        let handle = {
            let mut call = call.lock().await;
            call.play_only_input(stream)
        };
        let _ = handle.set_volume(self.volume);

        let registered = handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndNotifier {
                    guild_id,
                    listener: listener.clone(),
                },
            )
            .and_then(|_| {
                handle.add_event(
                    Event::Track(TrackEvent::Error),
                    TrackErrorNotifier { guild_id, listener },
                )
            });

        if let Err(e) = registered {
            let _ = handle.stop();
            return Err(MusicError::Connection(format!(
                "could not register track events: {}",
                e
            )));
        }

        Ok(SongbirdTrack(handle))
    }

    async fn leave(&self, guild_id: GuildId) {
        // Recorded first: the disconnect event can arrive before `remove` returns.
        let recorded = self.departures.insert(guild_id);
        match self.songbird.remove(guild_id).await {
            Ok(()) => info!("👋 Left voice channel in guild {}", guild_id),
            Err(e) => {
                if recorded {
                    self.departures.remove(&guild_id);
                }
                debug!("No voice connection to release in guild {}: {:?}", guild_id, e);
            }
        }
    }

    fn take_departure(&self, guild_id: GuildId) -> bool {
        self.departures.remove(&guild_id).is_some()
    }
}

pub struct SongbirdTrack(TrackHandle);

impl TrackControl for SongbirdTrack {
    fn halt(&self) {
        if let Err(e) = self.0.stop() {
            debug!("Track already finished: {:?}", e);
        }
    }
}

/// Forwards the natural end of a track to its guild worker.
struct TrackEndNotifier {
    guild_id: GuildId,
    listener: PlayerListener,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        debug!(
            "🎵 Track ended in guild {} (generation {})",
            self.guild_id,
            self.listener.generation()
        );
        self.listener.ended();
        None
    }
}

struct TrackErrorNotifier {
    guild_id: GuildId,
    listener: PlayerListener,
}

#[async_trait]
impl VoiceEventHandler for TrackErrorNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let mut reason = String::from("playback error");
        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in track_list.iter() {
                reason = format!("{:?}", state.playing);
            }
        }

        warn!("❌ Track error in guild {}: {}", self.guild_id, reason);
        self.listener.errored(reason);
        None
    }
}

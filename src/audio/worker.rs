use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    manager::{QueueSnapshot, QueueStatus, Shared, SkipOutcome, StopOutcome},
    notice::MusicNotice,
    queue::{GuildQueue, TrackRequest},
    session::{PlaybackSession, PlayerEvent, PlayerEventKind, PlayerListener},
    voice::VoiceConnector,
};
use crate::{
    error::MusicError,
    sources::{Resolved, TrackResolver},
};

pub(crate) enum GuildCommand {
    Enqueue {
        track: TrackRequest,
        channel_id: ChannelId,
        reply: oneshot::Sender<Result<usize, MusicError>>,
    },
    Skip {
        reply: oneshot::Sender<Result<SkipOutcome, MusicError>>,
    },
    Stop {
        reply: oneshot::Sender<Result<StopOutcome, MusicError>>,
    },
    Status {
        reply: oneshot::Sender<Option<QueueStatus>>,
    },
    Snapshot {
        reply: oneshot::Sender<Result<QueueSnapshot, MusicError>>,
    },
}

/// Outcome of connecting and resolving for one playback generation.
pub(crate) struct Resolution<S> {
    generation: u64,
    result: Result<Resolved<S>, MusicError>,
}

enum Transition {
    Unchanged,
    Started(TrackRequest),
    Ended,
}

/// Queue state that exists only while something is queued.
struct ActiveQueue<V: VoiceConnector> {
    queue: GuildQueue,
    channel_id: ChannelId,
    session: Option<PlaybackSession<V::Track>>,
}

/// Owns one guild's queue and session. Every mutation for the guild goes
/// through this task, one message at a time.
pub(crate) struct GuildWorker<R, V>
where
    R: TrackResolver,
    V: VoiceConnector<Stream = R::Stream>,
{
    guild_id: GuildId,
    shared: Arc<Shared<R, V>>,
    mailbox: mpsc::UnboundedReceiver<GuildCommand>,
    resolutions_tx: mpsc::UnboundedSender<Resolution<R::Stream>>,
    resolutions: mpsc::UnboundedReceiver<Resolution<R::Stream>>,
    player_events_tx: mpsc::UnboundedSender<PlayerEvent>,
    player_events: mpsc::UnboundedReceiver<PlayerEvent>,
    active: Option<ActiveQueue<V>>,
}

impl<R, V> GuildWorker<R, V>
where
    R: TrackResolver,
    V: VoiceConnector<Stream = R::Stream>,
{
    pub(crate) fn new(
        guild_id: GuildId,
        shared: Arc<Shared<R, V>>,
        mailbox: mpsc::UnboundedReceiver<GuildCommand>,
    ) -> Self {
        let (resolutions_tx, resolutions) = mpsc::unbounded_channel();
        let (player_events_tx, player_events) = mpsc::unbounded_channel();
        Self {
            guild_id,
            shared,
            mailbox,
            resolutions_tx,
            resolutions,
            player_events_tx,
            player_events,
            active: None,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("🧵 Worker started for guild {}", self.guild_id);

        loop {
            tokio::select! {
                Some(resolution) = self.resolutions.recv() => self.on_resolution(resolution).await,
                Some(event) = self.player_events.recv() => self.on_player_event(event).await,
                command = self.mailbox.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
            }

            if self.active.is_none() && self.try_retire() {
                break;
            }
        }

        debug!("🧵 Worker stopped for guild {}", self.guild_id);
    }

    /// Leaves the worker map, but only if no command is waiting. Senders
    /// hold the map entry while sending, so the check cannot race with them.
    fn try_retire(&self) -> bool {
        let mailbox = &self.mailbox;
        self.shared
            .workers
            .remove_if(&self.guild_id, |_, _| mailbox.is_empty())
            .is_some()
    }

    async fn on_command(&mut self, command: GuildCommand) {
        match command {
            GuildCommand::Enqueue {
                track,
                channel_id,
                reply,
            } => {
                let result = self.enqueue(track, channel_id).await;
                let _ = reply.send(result);
            }
            GuildCommand::Skip { reply } => {
                let result = self.skip().await;
                let _ = reply.send(result);
            }
            GuildCommand::Stop { reply } => {
                let result = match self.active {
                    Some(_) => {
                        let discarded = self.teardown().await;
                        info!("⏹️ Stopped guild {} ({} discarded)", self.guild_id, discarded);
                        Ok(StopOutcome { discarded })
                    }
                    None => Err(MusicError::NotPlaying),
                };
                let _ = reply.send(result);
            }
            GuildCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
            GuildCommand::Snapshot { reply } => {
                let result = self
                    .active
                    .as_ref()
                    .map(|active| QueueSnapshot {
                        tracks: active.queue.snapshot(),
                        status: self.status(),
                    })
                    .ok_or(MusicError::EmptyQueue);
                let _ = reply.send(result);
            }
        }
    }

    async fn enqueue(
        &mut self,
        track: TrackRequest,
        channel_id: ChannelId,
    ) -> Result<usize, MusicError> {
        let max_size = self.shared.settings.max_queue_size;
        let active = self.active.get_or_insert_with(|| ActiveQueue {
            queue: GuildQueue::new(max_size),
            channel_id,
            session: None,
        });

        let result = active.queue.push(track);
        if active.queue.is_empty() {
            self.active = None;
            return result;
        }

        if let Ok(1) = result {
            self.transition(false).await;
        }
        result
    }

    async fn skip(&mut self) -> Result<SkipOutcome, MusicError> {
        if self.active.is_none() {
            return Err(MusicError::EmptyQueue);
        }

        match self.transition(true).await {
            Transition::Started(next) => {
                info!("⏭️ Skipped to {} in guild {}", next.query, self.guild_id);
                Ok(SkipOutcome::Advanced { next })
            }
            Transition::Ended | Transition::Unchanged => Ok(SkipOutcome::QueueEnded),
        }
    }

    /// The one place where the head changes. With `pop_head` the current
    /// head is dropped first (skip, natural end, failed track); without it
    /// the head is only started if nothing is playing (first enqueue).
    async fn transition(&mut self, pop_head: bool) -> Transition {
        let next = match self.active.as_mut() {
            None => return Transition::Unchanged,
            Some(active) => {
                if pop_head {
                    if let Some(mut session) = active.session.take() {
                        session.destroy();
                    }
                    active.queue.pop_head();
                }

                if active.session.is_some() {
                    return Transition::Unchanged;
                }
                active.queue.head().cloned()
            }
        };

        match next {
            Some(track) => {
                self.start_session(track.clone());
                Transition::Started(track)
            }
            None => {
                self.teardown().await;
                info!("📭 Queue finished in guild {}", self.guild_id);
                self.publish(MusicNotice::QueueEnded {
                    guild_id: self.guild_id,
                });
                Transition::Ended
            }
        }
    }

    fn start_session(&mut self, track: TrackRequest) {
        let Some(active) = self.active.as_mut() else {
            return;
        };

        let generation = self.shared.next_generation();
        let session = PlaybackSession::starting(generation, track.clone());
        info!(
            "🎵 Starting {} in guild {} (generation {})",
            track.query, self.guild_id, generation
        );

        tokio::spawn(prepare_playback(
            self.shared.clone(),
            self.guild_id,
            active.channel_id,
            track.query,
            generation,
            session.cancellation(),
            self.resolutions_tx.clone(),
        ));
        active.session = Some(session);
    }

    /// Destroys the session, releases the voice connection and drops the
    /// queue. Returns how many tracks were still queued.
    async fn teardown(&mut self) -> usize {
        let Some(mut active) = self.active.take() else {
            return 0;
        };

        if let Some(mut session) = active.session.take() {
            session.destroy();
        }
        self.shared.voice.leave(self.guild_id).await;
        active.queue.len()
    }

    async fn on_resolution(&mut self, resolution: Resolution<R::Stream>) {
        let Some(session) = self.live_session(resolution.generation) else {
            debug!(
                "🔕 Late resolution for generation {} ignored in guild {}",
                resolution.generation, self.guild_id
            );
            return;
        };
        let query = session.track().query.clone();

        match resolution.result {
            Ok(resolved) => {
                let listener =
                    PlayerListener::new(resolution.generation, self.player_events_tx.clone());
                match self
                    .shared
                    .voice
                    .play(self.guild_id, resolved.stream, listener)
                    .await
                {
                    Ok(player) => {
                        if let Some(session) = self.live_session_mut(resolution.generation) {
                            session.attach(player, resolved.title.clone());
                        }
                        info!("▶️ Now playing {} in guild {}", query, self.guild_id);
                        self.publish(MusicNotice::NowPlaying {
                            guild_id: self.guild_id,
                            query,
                            title: resolved.title,
                        });
                    }
                    Err(e) => self.fail_connection(e).await,
                }
            }
            Err(e @ MusicError::Connection(_)) => self.fail_connection(e).await,
            Err(e) => {
                warn!("❌ Could not resolve {} in guild {}: {}", query, self.guild_id, e);
                self.fail_track(resolution.generation, query, reason_of(e)).await;
            }
        }
    }

    async fn on_player_event(&mut self, event: PlayerEvent) {
        let Some(session) = self.live_session(event.generation) else {
            debug!(
                "🔕 Player event for generation {} ignored in guild {}",
                event.generation, self.guild_id
            );
            return;
        };
        let query = session.track().query.clone();

        match event.kind {
            PlayerEventKind::Ended => {
                if let Some(session) = self.live_session_mut(event.generation) {
                    session.mark_ended();
                }
                debug!("🏁 {} finished in guild {}", query, self.guild_id);
                self.transition(true).await;
            }
            PlayerEventKind::Errored(reason) => {
                self.fail_track(event.generation, query, reason).await;
            }
        }
    }

    /// A track that cannot be played counts as finished.
    async fn fail_track(&mut self, generation: u64, query: String, reason: String) {
        if let Some(session) = self.live_session_mut(generation) {
            session.mark_errored();
        }
        self.publish(MusicNotice::ResolutionFailed {
            guild_id: self.guild_id,
            query,
            reason,
        });
        self.transition(true).await;
    }

    async fn fail_connection(&mut self, error: MusicError) {
        error!("🔌 Voice failure in guild {}: {}", self.guild_id, error);
        let discarded = self.teardown().await;
        warn!(
            "🗑️ Queue of guild {} dropped after voice failure ({} tracks)",
            self.guild_id, discarded
        );
        self.publish(MusicNotice::ConnectionFailed {
            guild_id: self.guild_id,
            reason: reason_of(error),
        });
    }

    fn live_session(&self, generation: u64) -> Option<&PlaybackSession<V::Track>> {
        self.active
            .as_ref()
            .and_then(|active| active.session.as_ref())
            .filter(|session| session.accepts(generation))
    }

    fn live_session_mut(&mut self, generation: u64) -> Option<&mut PlaybackSession<V::Track>> {
        self.active
            .as_mut()
            .and_then(|active| active.session.as_mut())
            .filter(|session| session.accepts(generation))
    }

    fn status(&self) -> Option<QueueStatus> {
        let active = self.active.as_ref()?;
        let session = active.session.as_ref()?;
        Some(QueueStatus {
            current: session.track().clone(),
            title: session.title().map(str::to_string),
            state: session.state(),
            upcoming: active.queue.len().saturating_sub(1),
        })
    }

    fn publish(&self, notice: MusicNotice) {
        // Nobody listening is fine.
        let _ = self.shared.notices.send(notice);
    }
}

fn reason_of(error: MusicError) -> String {
    match error {
        MusicError::Resolution(reason) | MusicError::Connection(reason) => reason,
        other => other.to_string(),
    }
}

/// Detached part of a playback start: join the channel and resolve the
/// stream, then report back. Never touches queue state.
async fn prepare_playback<R, V>(
    shared: Arc<Shared<R, V>>,
    guild_id: GuildId,
    channel_id: ChannelId,
    query: String,
    generation: u64,
    cancel: CancellationToken,
    results: mpsc::UnboundedSender<Resolution<R::Stream>>,
) where
    R: TrackResolver,
    V: VoiceConnector<Stream = R::Stream>,
{
    let timeout = shared.settings.resolve_timeout;
    let work = async {
        shared.voice.join(guild_id, channel_id).await?;
        match tokio::time::timeout(timeout, shared.resolver.resolve(&query)).await {
            Ok(result) => result,
            Err(_) => Err(MusicError::Resolution(format!(
                "timed out after {}",
                humantime::format_duration(timeout)
            ))),
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => {
            debug!("🛑 Resolution of {} cancelled (generation {})", query, generation);
        }
        result = work => {
            if results.send(Resolution { generation, result }).is_err() {
                debug!("🔕 Worker for guild {} gone before {} resolved", guild_id, query);
            }
        }
    }
}

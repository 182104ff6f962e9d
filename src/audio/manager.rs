use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use super::{
    notice::MusicNotice,
    queue::TrackRequest,
    session::SessionState,
    voice::VoiceConnector,
    worker::{GuildCommand, GuildWorker},
};
use crate::{config::Config, error::MusicError, sources::TrackResolver};

const NOTICE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct ManagerSettings {
    pub max_queue_size: usize,
    pub resolve_timeout: Duration,
}

impl From<&Config> for ManagerSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_queue_size: config.max_queue_size,
            resolve_timeout: config.resolve_timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipOutcome {
    /// Playback continues with `next`.
    Advanced { next: TrackRequest },
    /// The skipped track was the last one; the queue is gone.
    QueueEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOutcome {
    /// Tracks dropped, including the one that was playing.
    pub discarded: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStatus {
    pub current: TrackRequest,
    pub title: Option<String>,
    pub state: SessionState,
    pub upcoming: usize,
}

/// Pending tracks and the session status, read in one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub tracks: Vec<TrackRequest>,
    pub status: Option<QueueStatus>,
}

pub(crate) struct WorkerHandle {
    mailbox: mpsc::UnboundedSender<GuildCommand>,
}

/// State shared between the manager and its guild workers.
pub(crate) struct Shared<R, V>
where
    R: TrackResolver,
    V: VoiceConnector<Stream = R::Stream>,
{
    pub(crate) resolver: Arc<R>,
    pub(crate) voice: Arc<V>,
    pub(crate) settings: ManagerSettings,
    pub(crate) notices: broadcast::Sender<MusicNotice>,
    pub(crate) workers: DashMap<GuildId, WorkerHandle>,
    generations: AtomicU64,
}

impl<R, V> Shared<R, V>
where
    R: TrackResolver,
    V: VoiceConnector<Stream = R::Stream>,
{
    pub(crate) fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Per-guild music queues.
///
/// Each guild with queued music gets its own worker task; commands for the
/// same guild are applied strictly in arrival order while different guilds
/// never wait on each other. Stream resolution runs outside the worker, so
/// `enqueue` answers as soon as the request is queued.
pub struct GuildQueueManager<R, V>
where
    R: TrackResolver,
    V: VoiceConnector<Stream = R::Stream>,
{
    shared: Arc<Shared<R, V>>,
}

impl<R, V> Clone for GuildQueueManager<R, V>
where
    R: TrackResolver,
    V: VoiceConnector<Stream = R::Stream>,
{
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<R, V> GuildQueueManager<R, V>
where
    R: TrackResolver,
    V: VoiceConnector<Stream = R::Stream>,
{
    pub fn new(resolver: Arc<R>, voice: Arc<V>, settings: ManagerSettings) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                resolver,
                voice,
                settings,
                notices,
                workers: DashMap::new(),
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// Queues `track` and returns its 1-based position. The first track of
    /// an idle guild starts playing in the background.
    pub async fn enqueue(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        track: TrackRequest,
    ) -> Result<usize, MusicError> {
        let (reply, answer) = oneshot::channel();
        self.send_or_spawn(
            guild_id,
            GuildCommand::Enqueue {
                track,
                channel_id,
                reply,
            },
        )?;
        answer.await.map_err(|_| MusicError::WorkerGone)?
    }

    pub async fn skip(&self, guild_id: GuildId) -> Result<SkipOutcome, MusicError> {
        let (reply, answer) = oneshot::channel();
        match self.send_existing(guild_id, GuildCommand::Skip { reply }) {
            Some(sent) => sent?,
            None => return Err(MusicError::EmptyQueue),
        }
        answer.await.map_err(|_| MusicError::WorkerGone)?
    }

    /// Drops the whole queue and leaves the voice channel.
    pub async fn stop(&self, guild_id: GuildId) -> Result<StopOutcome, MusicError> {
        let (reply, answer) = oneshot::channel();
        match self.send_existing(guild_id, GuildCommand::Stop { reply }) {
            Some(sent) => sent?,
            None => return Err(MusicError::NotPlaying),
        }
        answer.await.map_err(|_| MusicError::WorkerGone)?
    }

    /// Handles the bot losing its voice connection in `guild_id`.
    ///
    /// A disconnect we started through `leave` is only acknowledged, since a
    /// new queue may already be running by the time the gateway reports it.
    /// Any other disconnect stops the queue; `None` means nothing was stopped.
    pub async fn voice_disconnected(
        &self,
        guild_id: GuildId,
    ) -> Result<Option<StopOutcome>, MusicError> {
        if self.shared.voice.take_departure(guild_id) {
            debug!("👋 Own voice disconnect confirmed in guild {}", guild_id);
            return Ok(None);
        }

        match self.stop(guild_id).await {
            Ok(outcome) => {
                // Already disconnected, so no event will follow this leave.
                self.shared.voice.take_departure(guild_id);
                Ok(Some(outcome))
            }
            Err(MusicError::NotPlaying) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn peek_queue(&self, guild_id: GuildId) -> Result<Vec<TrackRequest>, MusicError> {
        self.queue_snapshot(guild_id).await.map(|snapshot| snapshot.tracks)
    }

    /// Queue listing together with the status of its head track.
    pub async fn queue_snapshot(&self, guild_id: GuildId) -> Result<QueueSnapshot, MusicError> {
        let (reply, answer) = oneshot::channel();
        match self.send_existing(guild_id, GuildCommand::Snapshot { reply }) {
            Some(sent) => sent?,
            None => return Err(MusicError::EmptyQueue),
        }
        answer.await.map_err(|_| MusicError::WorkerGone)?
    }

    pub async fn now_playing(&self, guild_id: GuildId) -> Option<QueueStatus> {
        let (reply, answer) = oneshot::channel();
        self.send_existing(guild_id, GuildCommand::Status { reply })?
            .ok()?;
        answer.await.ok().flatten()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MusicNotice> {
        self.shared.notices.subscribe()
    }

    /// Guilds that currently have a worker.
    pub fn active_guilds(&self) -> usize {
        self.shared.workers.len()
    }

    /// Stops every guild. Used on shutdown.
    pub async fn shutdown(&self) {
        let guilds: Vec<GuildId> = self.shared.workers.iter().map(|e| *e.key()).collect();
        for guild_id in guilds {
            match self.stop(guild_id).await {
                Ok(outcome) => info!(
                    "⏹️ Guild {} stopped on shutdown ({} tracks dropped)",
                    guild_id, outcome.discarded
                ),
                Err(MusicError::NotPlaying) => {}
                Err(e) => warn!("Could not stop guild {} on shutdown: {}", guild_id, e),
            }
        }
    }

    // The send happens while the map entry is held; see `GuildWorker::try_retire`.
    fn send_or_spawn(&self, guild_id: GuildId, command: GuildCommand) -> Result<(), MusicError> {
        let handle = self
            .shared
            .workers
            .entry(guild_id)
            .or_insert_with(|| self.spawn_worker(guild_id));
        handle
            .mailbox
            .send(command)
            .map_err(|_| MusicError::WorkerGone)
    }

    fn send_existing(
        &self,
        guild_id: GuildId,
        command: GuildCommand,
    ) -> Option<Result<(), MusicError>> {
        let handle = self.shared.workers.get(&guild_id)?;
        Some(
            handle
                .mailbox
                .send(command)
                .map_err(|_| MusicError::WorkerGone),
        )
    }

    fn spawn_worker(&self, guild_id: GuildId) -> WorkerHandle {
        debug!("🧵 Spawning worker for guild {}", guild_id);
        let (mailbox, commands) = mpsc::unbounded_channel();
        let worker = GuildWorker::new(guild_id, self.shared.clone(), commands);
        tokio::spawn(worker.run());
        WorkerHandle { mailbox }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{harness, next_notice, settle, FakeResolver};
    use futures::future::join_all;
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;

    const GUILD: GuildId = GuildId::new(100);
    const OTHER_GUILD: GuildId = GuildId::new(200);
    const CHANNEL: ChannelId = ChannelId::new(10);

    fn request(query: &str) -> TrackRequest {
        TrackRequest::new(query, UserId::new(1))
    }

    fn queries(tracks: Vec<TrackRequest>) -> Vec<String> {
        tracks.into_iter().map(|t| t.query).collect()
    }

    fn now_playing_notice(query: &str) -> impl Fn(&MusicNotice) -> bool + '_ {
        move |notice: &MusicNotice| matches!(notice, MusicNotice::NowPlaying { query: q, .. } if q == query)
    }

    /// `session present ⇔ pending non-empty`
    async fn assert_consistent<R, V>(manager: &GuildQueueManager<R, V>, guild_id: GuildId)
    where
        R: TrackResolver,
        V: VoiceConnector<Stream = R::Stream>,
    {
        match manager.queue_snapshot(guild_id).await {
            Ok(QueueSnapshot {
                tracks,
                status: Some(status),
            }) => {
                assert!(!tracks.is_empty());
                assert_eq!(tracks[0], status.current);
                assert_eq!(status.upcoming, tracks.len() - 1);
            }
            Err(MusicError::EmptyQueue) => assert_eq!(manager.now_playing(guild_id).await, None),
            other => panic!("queue and session disagree: {:?}", other),
        }
    }

    #[tokio::test]
    async fn first_enqueue_starts_playback() {
        let (manager, voice) = harness(FakeResolver::new());
        let mut notices = manager.subscribe();

        let position = manager.enqueue(GUILD, CHANNEL, request("a")).await.unwrap();
        assert_eq!(position, 1);

        next_notice(&mut notices, now_playing_notice("a")).await;
        assert_eq!(voice.plays(), vec![(GUILD, "a".to_string())]);
        assert_eq!(voice.joins(), vec![(GUILD, CHANNEL)]);

        let status = manager.now_playing(GUILD).await.unwrap();
        assert_eq!(status.state, SessionState::Playing);
        assert_eq!(status.title.as_deref(), Some("Title of a"));
        assert_consistent(&manager, GUILD).await;
    }

    #[tokio::test]
    async fn skipping_plays_tracks_in_fifo_order() {
        let (manager, voice) = harness(FakeResolver::new());
        let mut notices = manager.subscribe();

        for (i, q) in ["a", "b", "c"].into_iter().enumerate() {
            assert_eq!(manager.enqueue(GUILD, CHANNEL, request(q)).await, Ok(i + 1));
        }
        next_notice(&mut notices, now_playing_notice("a")).await;
        assert_consistent(&manager, GUILD).await;

        match manager.skip(GUILD).await.unwrap() {
            SkipOutcome::Advanced { next } => assert_eq!(next.query, "b"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        next_notice(&mut notices, now_playing_notice("b")).await;
        assert_consistent(&manager, GUILD).await;

        match manager.skip(GUILD).await.unwrap() {
            SkipOutcome::Advanced { next } => assert_eq!(next.query, "c"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        next_notice(&mut notices, now_playing_notice("c")).await;

        assert_eq!(manager.skip(GUILD).await, Ok(SkipOutcome::QueueEnded));
        assert_consistent(&manager, GUILD).await;

        let played: Vec<String> = voice.plays().into_iter().map(|(_, q)| q).collect();
        assert_eq!(played, vec!["a", "b", "c"]);
        assert_eq!(voice.leaves(), 1);
        assert_eq!(manager.skip(GUILD).await, Err(MusicError::EmptyQueue));
    }

    #[tokio::test]
    async fn natural_end_advances_queue() {
        let (manager, voice) = harness(FakeResolver::new());
        let mut notices = manager.subscribe();

        manager.enqueue(GUILD, CHANNEL, request("a")).await.unwrap();
        next_notice(&mut notices, now_playing_notice("a")).await;

        assert_eq!(manager.enqueue(GUILD, CHANNEL, request("b")).await, Ok(2));
        assert_eq!(manager.enqueue(GUILD, CHANNEL, request("c")).await, Ok(3));
        assert_eq!(
            queries(manager.peek_queue(GUILD).await.unwrap()),
            vec!["a", "b", "c"]
        );

        voice.finish_current(GUILD);
        next_notice(&mut notices, now_playing_notice("b")).await;

        assert_eq!(
            queries(manager.peek_queue(GUILD).await.unwrap()),
            vec!["b", "c"]
        );
        let status = manager.now_playing(GUILD).await.unwrap();
        assert_eq!(status.current.query, "b");
        assert_eq!(status.state, SessionState::Playing);
        assert_consistent(&manager, GUILD).await;
    }

    #[tokio::test]
    async fn last_natural_end_tears_down() {
        let (manager, voice) = harness(FakeResolver::new());
        let mut notices = manager.subscribe();

        manager.enqueue(GUILD, CHANNEL, request("a")).await.unwrap();
        next_notice(&mut notices, now_playing_notice("a")).await;

        voice.finish_current(GUILD);
        next_notice(&mut notices, |n| matches!(n, MusicNotice::QueueEnded { .. })).await;

        assert_eq!(manager.peek_queue(GUILD).await, Err(MusicError::EmptyQueue));
        assert_eq!(voice.leaves(), 1);
        settle(|| manager.active_guilds() == 0).await;
    }

    #[tokio::test]
    async fn stop_discards_everything_and_second_stop_reports_not_playing() {
        let (manager, voice) = harness(FakeResolver::new());
        let mut notices = manager.subscribe();

        for q in ["a", "b", "c"] {
            manager.enqueue(GUILD, CHANNEL, request(q)).await.unwrap();
        }
        next_notice(&mut notices, now_playing_notice("a")).await;

        assert_eq!(manager.stop(GUILD).await, Ok(StopOutcome { discarded: 3 }));
        assert_eq!(manager.stop(GUILD).await, Err(MusicError::NotPlaying));
        assert_eq!(manager.peek_queue(GUILD).await, Err(MusicError::EmptyQueue));
        assert_eq!(voice.leaves(), 1);
        assert_eq!(voice.halted(), 1);
    }

    #[tokio::test]
    async fn stop_on_unknown_guild_is_not_playing() {
        let (manager, _voice) = harness(FakeResolver::new());
        assert_eq!(manager.stop(GUILD).await, Err(MusicError::NotPlaying));
        assert_eq!(manager.skip(GUILD).await, Err(MusicError::EmptyQueue));
        assert_eq!(manager.peek_queue(GUILD).await, Err(MusicError::EmptyQueue));
        assert!(manager.now_playing(GUILD).await.is_none());
        assert_eq!(manager.active_guilds(), 0);
    }

    #[tokio::test]
    async fn failed_resolution_moves_on_and_reports() {
        let mut resolver = FakeResolver::new().failing("bad-url");
        let gate = resolver.gate("bad-url");
        let (manager, voice) = harness(resolver);
        let mut notices = manager.subscribe();

        manager.enqueue(GUILD, CHANNEL, request("bad-url")).await.unwrap();
        manager.enqueue(GUILD, CHANNEL, request("good-song")).await.unwrap();
        gate.notify_one();

        let failure = next_notice(&mut notices, |n| {
            matches!(n, MusicNotice::ResolutionFailed { .. })
        })
        .await;
        assert_eq!(
            failure,
            MusicNotice::ResolutionFailed {
                guild_id: GUILD,
                query: "bad-url".into(),
                reason: "bad-url is not playable".into(),
            }
        );
        next_notice(&mut notices, now_playing_notice("good-song")).await;

        assert_eq!(
            queries(manager.peek_queue(GUILD).await.unwrap()),
            vec!["good-song"]
        );
        assert_eq!(voice.plays(), vec![(GUILD, "good-song".to_string())]);
        assert_consistent(&manager, GUILD).await;
    }

    #[tokio::test]
    async fn playback_error_counts_as_track_end() {
        let (manager, voice) = harness(FakeResolver::new());
        let mut notices = manager.subscribe();

        manager.enqueue(GUILD, CHANNEL, request("a")).await.unwrap();
        manager.enqueue(GUILD, CHANNEL, request("b")).await.unwrap();
        next_notice(&mut notices, now_playing_notice("a")).await;

        voice.fail_current(GUILD, "decoder crashed");
        let failure = next_notice(&mut notices, |n| {
            matches!(n, MusicNotice::ResolutionFailed { .. })
        })
        .await;
        assert!(matches!(failure, MusicNotice::ResolutionFailed { query, .. } if query == "a"));

        next_notice(&mut notices, now_playing_notice("b")).await;
        assert_consistent(&manager, GUILD).await;
    }

    #[tokio::test]
    async fn resolution_finishing_after_stop_is_ignored() {
        let mut resolver = FakeResolver::new();
        let gate = resolver.gate("x");
        let (manager, voice) = harness(resolver);

        manager.enqueue(GUILD, CHANNEL, request("x")).await.unwrap();
        assert_eq!(
            manager.now_playing(GUILD).await.map(|s| s.state),
            Some(SessionState::Starting)
        );

        assert_eq!(manager.stop(GUILD).await, Ok(StopOutcome { discarded: 1 }));
        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(voice.plays().is_empty());
        assert!(manager.now_playing(GUILD).await.is_none());
        assert_eq!(manager.peek_queue(GUILD).await, Err(MusicError::EmptyQueue));
    }

    #[tokio::test]
    async fn end_event_of_skipped_track_is_ignored() {
        let (manager, voice) = harness(FakeResolver::new());
        let mut notices = manager.subscribe();

        for q in ["a", "b", "c"] {
            manager.enqueue(GUILD, CHANNEL, request(q)).await.unwrap();
        }
        next_notice(&mut notices, now_playing_notice("a")).await;

        // Halting "a" fires its end handler, like songbird does on stop.
        manager.skip(GUILD).await.unwrap();
        next_notice(&mut notices, now_playing_notice("b")).await;

        assert_eq!(
            queries(manager.peek_queue(GUILD).await.unwrap()),
            vec!["b", "c"]
        );
        assert_eq!(voice.halted(), 1);
    }

    #[tokio::test]
    async fn connection_failure_tears_down_guild() {
        let (manager, voice) = harness(FakeResolver::new());
        voice.refuse_joins();
        let mut notices = manager.subscribe();

        manager.enqueue(GUILD, CHANNEL, request("a")).await.unwrap();
        let notice = next_notice(&mut notices, |n| {
            matches!(n, MusicNotice::ConnectionFailed { .. })
        })
        .await;
        assert_eq!(notice.guild_id(), GUILD);

        assert_eq!(manager.peek_queue(GUILD).await, Err(MusicError::EmptyQueue));
        assert!(voice.plays().is_empty());
    }

    #[tokio::test]
    async fn full_queue_rejects_and_keeps_state() {
        let resolver = Arc::new(FakeResolver::new());
        let voice = Arc::new(crate::audio::testing::FakeVoice::default());
        let manager = GuildQueueManager::new(
            resolver,
            voice,
            ManagerSettings {
                max_queue_size: 2,
                resolve_timeout: Duration::from_secs(1),
            },
        );

        manager.enqueue(GUILD, CHANNEL, request("a")).await.unwrap();
        manager.enqueue(GUILD, CHANNEL, request("b")).await.unwrap();
        assert_eq!(
            manager.enqueue(GUILD, CHANNEL, request("c")).await,
            Err(MusicError::QueueFull(2))
        );
        assert_eq!(
            queries(manager.peek_queue(GUILD).await.unwrap()),
            vec!["a", "b"]
        );
    }

    #[tokio::test]
    async fn slow_resolution_times_out_as_failure() {
        let mut resolver = FakeResolver::new();
        let _gate = resolver.gate("stuck");
        let voice = Arc::new(crate::audio::testing::FakeVoice::default());
        let manager = GuildQueueManager::new(
            Arc::new(resolver),
            voice,
            ManagerSettings {
                max_queue_size: 10,
                resolve_timeout: Duration::from_millis(20),
            },
        );
        let mut notices = manager.subscribe();

        manager.enqueue(GUILD, CHANNEL, request("stuck")).await.unwrap();
        let notice = next_notice(&mut notices, |n| {
            matches!(n, MusicNotice::ResolutionFailed { .. })
        })
        .await;
        assert!(
            matches!(notice, MusicNotice::ResolutionFailed { reason, .. } if reason.starts_with("timed out"))
        );
        next_notice(&mut notices, |n| matches!(n, MusicNotice::QueueEnded { .. })).await;
    }

    #[tokio::test]
    async fn guilds_do_not_block_each_other() {
        let mut resolver = FakeResolver::new();
        let _gate = resolver.gate("slow");
        let (manager, _voice) = harness(resolver);
        let mut notices = manager.subscribe();

        manager.enqueue(GUILD, CHANNEL, request("slow")).await.unwrap();
        manager
            .enqueue(OTHER_GUILD, CHANNEL, request("fast"))
            .await
            .unwrap();

        let notice = next_notice(&mut notices, now_playing_notice("fast")).await;
        assert_eq!(notice.guild_id(), OTHER_GUILD);
        assert_eq!(
            manager.now_playing(GUILD).await.map(|s| s.state),
            Some(SessionState::Starting)
        );
        assert_eq!(manager.active_guilds(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_skips_tear_down_exactly_once() {
        const TRACKS: usize = 8;
        let (manager, voice) = harness(FakeResolver::new());
        let mut notices = manager.subscribe();

        for i in 0..TRACKS {
            manager
                .enqueue(GUILD, CHANNEL, request(&format!("track-{}", i)))
                .await
                .unwrap();
        }
        next_notice(&mut notices, now_playing_notice("track-0")).await;

        let skips = (0..TRACKS).map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.skip(GUILD).await })
        });
        let outcomes: Vec<_> = join_all(skips)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        let endings = outcomes
            .iter()
            .filter(|o| **o == SkipOutcome::QueueEnded)
            .count();
        assert_eq!(endings, 1);
        assert_eq!(voice.leaves(), 1);
        assert_eq!(manager.skip(GUILD).await, Err(MusicError::EmptyQueue));
        assert_eq!(manager.peek_queue(GUILD).await, Err(MusicError::EmptyQueue));
    }

    #[tokio::test]
    async fn shutdown_stops_every_guild() {
        let (manager, voice) = harness(FakeResolver::new());

        manager.enqueue(GUILD, CHANNEL, request("a")).await.unwrap();
        manager.enqueue(OTHER_GUILD, CHANNEL, request("b")).await.unwrap();
        manager.shutdown().await;

        assert_eq!(manager.peek_queue(GUILD).await, Err(MusicError::EmptyQueue));
        assert_eq!(
            manager.peek_queue(OTHER_GUILD).await,
            Err(MusicError::EmptyQueue)
        );
        assert_eq!(voice.leaves(), 2);
    }

    #[tokio::test]
    async fn own_disconnect_does_not_stop_a_newer_queue() {
        let (manager, voice) = harness(FakeResolver::new());
        let mut notices = manager.subscribe();

        manager.enqueue(GUILD, CHANNEL, request("a")).await.unwrap();
        next_notice(&mut notices, now_playing_notice("a")).await;
        manager.stop(GUILD).await.unwrap();

        // The gateway reports the leave only after the next /play got in.
        manager.enqueue(GUILD, CHANNEL, request("b")).await.unwrap();
        next_notice(&mut notices, now_playing_notice("b")).await;
        assert_eq!(manager.voice_disconnected(GUILD).await, Ok(None));

        let status = manager.now_playing(GUILD).await.unwrap();
        assert_eq!(status.current.query, "b");
        assert_eq!(voice.leaves(), 1);
        assert_consistent(&manager, GUILD).await;
    }

    #[tokio::test]
    async fn foreign_disconnect_stops_the_queue() {
        let (manager, voice) = harness(FakeResolver::new());
        let mut notices = manager.subscribe();

        for q in ["a", "b"] {
            manager.enqueue(GUILD, CHANNEL, request(q)).await.unwrap();
        }
        next_notice(&mut notices, now_playing_notice("a")).await;

        assert_eq!(
            manager.voice_disconnected(GUILD).await,
            Ok(Some(StopOutcome { discarded: 2 }))
        );
        assert_eq!(voice.leaves(), 1);
        assert_eq!(manager.voice_disconnected(GUILD).await, Ok(None));

        // The forced leave left no record behind to swallow the next kick.
        manager.enqueue(GUILD, CHANNEL, request("c")).await.unwrap();
        next_notice(&mut notices, now_playing_notice("c")).await;
        assert_eq!(
            manager.voice_disconnected(GUILD).await,
            Ok(Some(StopOutcome { discarded: 1 }))
        );
        assert_eq!(manager.peek_queue(GUILD).await, Err(MusicError::EmptyQueue));
    }

    #[tokio::test]
    async fn queue_snapshot_pairs_tracks_with_their_status() {
        let (manager, voice) = harness(FakeResolver::new());
        let mut notices = manager.subscribe();

        assert_eq!(
            manager.queue_snapshot(GUILD).await,
            Err(MusicError::EmptyQueue)
        );

        for q in ["a", "b"] {
            manager.enqueue(GUILD, CHANNEL, request(q)).await.unwrap();
        }
        next_notice(&mut notices, now_playing_notice("a")).await;

        let snapshot = manager.queue_snapshot(GUILD).await.unwrap();
        assert_eq!(queries(snapshot.tracks), vec!["a", "b"]);
        let status = snapshot.status.unwrap();
        assert_eq!(status.current.query, "a");
        assert_eq!(status.upcoming, 1);

        voice.finish_current(GUILD);
        next_notice(&mut notices, now_playing_notice("b")).await;

        let snapshot = manager.queue_snapshot(GUILD).await.unwrap();
        assert_eq!(queries(snapshot.tracks), vec!["b"]);
        let status = snapshot.status.unwrap();
        assert_eq!(status.current.query, "b");
        assert_eq!(status.upcoming, 0);
    }
}

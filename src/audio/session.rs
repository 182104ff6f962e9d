use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{queue::TrackRequest, voice::TrackControl};

/// Lifecycle of one playback attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connecting and resolving the stream.
    Starting,
    Playing,
    Ended,
    Errored,
    Destroyed,
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Starting => "starting",
            SessionState::Playing => "playing",
            SessionState::Ended => "ended",
            SessionState::Errored => "errored",
            SessionState::Destroyed => "destroyed",
        }
    }
}

/// Player notification for a given playback generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlayerEvent {
    pub generation: u64,
    pub kind: PlayerEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PlayerEventKind {
    Ended,
    Errored(String),
}

/// Handed to the player on every playback start. Each listener is bound to
/// a single generation, so notifications from a previous track can never be
/// mistaken for the current one.
#[derive(Debug, Clone)]
pub struct PlayerListener {
    generation: u64,
    events: mpsc::UnboundedSender<PlayerEvent>,
}

impl PlayerListener {
    pub(crate) fn new(generation: u64, events: mpsc::UnboundedSender<PlayerEvent>) -> Self {
        Self { generation, events }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The track reached its natural end.
    pub fn ended(&self) {
        self.notify(PlayerEventKind::Ended);
    }

    pub fn errored(&self, reason: impl Into<String>) {
        self.notify(PlayerEventKind::Errored(reason.into()));
    }

    fn notify(&self, kind: PlayerEventKind) {
        let event = PlayerEvent {
            generation: self.generation,
            kind,
        };
        // The worker is gone once its queue is torn down.
        if self.events.send(event).is_err() {
            debug!("🔕 Player event for generation {} dropped", self.generation);
        }
    }
}

/// Live playback of the head of a guild queue.
///
/// Owns the cancellation token of the in-flight resolution and, once
/// playback began, the player handle. Dropping the session destroys it.
pub struct PlaybackSession<T: TrackControl> {
    generation: u64,
    track: TrackRequest,
    title: Option<String>,
    state: SessionState,
    cancel: CancellationToken,
    player: Option<T>,
}

impl<T: TrackControl> PlaybackSession<T> {
    pub fn starting(generation: u64, track: TrackRequest) -> Self {
        Self {
            generation,
            track,
            title: None,
            state: SessionState::Starting,
            cancel: CancellationToken::new(),
            player: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn track(&self) -> &TrackRequest {
        &self.track
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Token observed by the resolution task of this session.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether a notification tagged with `generation` is meant for this session.
    pub fn accepts(&self, generation: u64) -> bool {
        self.generation == generation
            && matches!(self.state, SessionState::Starting | SessionState::Playing)
    }

    pub fn attach(&mut self, player: T, title: Option<String>) {
        self.player = Some(player);
        self.title = title;
        self.state = SessionState::Playing;
    }

    pub fn mark_ended(&mut self) {
        self.state = SessionState::Ended;
    }

    pub fn mark_errored(&mut self) {
        self.state = SessionState::Errored;
    }

    /// Cancels pending resolution and stops the player. Safe to call repeatedly.
    pub fn destroy(&mut self) {
        if self.state == SessionState::Destroyed {
            return;
        }

        self.cancel.cancel();
        if let Some(player) = self.player.take() {
            player.halt();
        }
        self.state = SessionState::Destroyed;
        debug!(
            "🧹 Session {} destroyed ({})",
            self.generation, self.track.query
        );
    }
}

impl<T: TrackControl> Drop for PlaybackSession<T> {
    fn drop(&mut self) {
        self.destroy();
    }
}

use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by the music queue.
///
/// Every variant is scoped to a single guild; none of them is fatal for the
/// process. A notification arriving for a session that no longer exists is
/// not represented here: it is dropped where it is received.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MusicError {
    /// Skip or queue listing on a guild without queued tracks.
    #[error("there are no songs in the queue")]
    EmptyQueue,

    /// Stop on a guild without an active session.
    #[error("no music is currently playing")]
    NotPlaying,

    #[error("the queue is full (maximum {0} songs)")]
    QueueFull(usize),

    /// The track could not be fetched or decoded.
    #[error("could not resolve track: {0}")]
    Resolution(String),

    /// Voice connection or player infrastructure failure.
    #[error("voice connection error: {0}")]
    Connection(String),

    /// The guild worker went away before answering.
    #[error("guild worker is no longer running")]
    WorkerGone,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EconomyError {
    #[error("amount must be positive")]
    InvalidAmount,

    #[error("insufficient funds: balance is {balance}")]
    InsufficientFunds { balance: u64 },

    #[error("daily reward already claimed, next claim in {}", fmt_remaining(.remaining))]
    DailyCooldown { remaining: Duration },

    #[error("robbery on cooldown for {}", fmt_remaining(.remaining))]
    RobCooldown { remaining: Duration },

    #[error("target only has {balance} coins (minimum {minimum})")]
    TargetTooPoor { balance: u64, minimum: u64 },

    #[error("you cannot target yourself")]
    SelfTarget,
}

fn fmt_remaining(remaining: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(Duration::from_secs(remaining.as_secs()))
}

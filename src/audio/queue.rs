use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::error::MusicError;

/// A song request as typed by the user. Nothing is resolved until the
/// request reaches the head of the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRequest {
    pub query: String,
    pub requested_by: UserId,
    pub added_at: DateTime<Utc>,
}

impl TrackRequest {
    pub fn new(query: impl Into<String>, requested_by: UserId) -> Self {
        Self {
            query: query.into(),
            requested_by,
            added_at: Utc::now(),
        }
    }
}

/// Ordered pending tracks of one guild. The head is the track that is
/// playing, or about to.
#[derive(Debug)]
pub struct GuildQueue {
    pending: VecDeque<TrackRequest>,
    max_size: usize,
}

impl GuildQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            max_size,
        }
    }

    /// Appends a request and returns its 1-based position.
    pub fn push(&mut self, track: TrackRequest) -> Result<usize, MusicError> {
        if self.pending.len() >= self.max_size {
            return Err(MusicError::QueueFull(self.max_size));
        }

        info!("➕ Added to queue: {}", track.query);
        self.pending.push_back(track);
        Ok(self.pending.len())
    }

    /// Drops the head and returns it.
    pub fn pop_head(&mut self) -> Option<TrackRequest> {
        let head = self.pending.pop_front();
        if let Some(ref track) = head {
            debug!("➡️ Removed head: {}", track.query);
        }
        head
    }

    pub fn head(&self) -> Option<&TrackRequest> {
        self.pending.front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn snapshot(&self) -> Vec<TrackRequest> {
        self.pending.iter().cloned().collect()
    }
}

//! In-memory resolver and voice connector for queue tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{broadcast, Notify};

use super::{
    manager::{GuildQueueManager, ManagerSettings},
    notice::MusicNotice,
    session::PlayerListener,
    voice::{TrackControl, VoiceConnector},
};
use crate::{
    error::MusicError,
    sources::{Resolved, TrackResolver},
};

const WAIT_LIMIT: Duration = Duration::from_secs(2);

/// Resolves every query to itself. Queries can be made to fail, or to wait
/// for a gate before answering.
#[derive(Default)]
pub struct FakeResolver {
    failing: HashSet<String>,
    gates: HashMap<String, Arc<Notify>>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, query: &str) -> Self {
        self.failing.insert(query.to_string());
        self
    }

    /// Holds resolution of `query` until the returned gate is notified.
    pub fn gate(&mut self, query: &str) -> Arc<Notify> {
        self.gates
            .entry(query.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }
}

#[async_trait]
impl TrackResolver for FakeResolver {
    type Stream = String;

    async fn resolve(&self, query: &str) -> Result<Resolved<String>, MusicError> {
        if let Some(gate) = self.gates.get(query) {
            gate.notified().await;
        }
        if self.failing.contains(query) {
            return Err(MusicError::Resolution(format!("{} is not playable", query)));
        }
        Ok(Resolved {
            stream: query.to_string(),
            title: Some(format!("Title of {}", query)),
        })
    }
}

#[derive(Default)]
struct VoiceLog {
    joins: Vec<(GuildId, ChannelId)>,
    plays: Vec<(GuildId, String)>,
    leaves: usize,
    departures: HashSet<GuildId>,
    listeners: HashMap<GuildId, PlayerListener>,
    refuse_joins: bool,
}

/// Records every voice call and lets tests end the current track.
#[derive(Default)]
pub struct FakeVoice {
    log: Mutex<VoiceLog>,
    halted: Arc<AtomicUsize>,
}

impl FakeVoice {
    pub fn refuse_joins(&self) {
        self.log.lock().refuse_joins = true;
    }

    pub fn joins(&self) -> Vec<(GuildId, ChannelId)> {
        self.log.lock().joins.clone()
    }

    pub fn plays(&self) -> Vec<(GuildId, String)> {
        self.log.lock().plays.clone()
    }

    pub fn leaves(&self) -> usize {
        self.log.lock().leaves
    }

    pub fn halted(&self) -> usize {
        self.halted.load(Ordering::SeqCst)
    }

    /// Natural end of whatever the guild is playing.
    pub fn finish_current(&self, guild_id: GuildId) {
        let listener = self.log.lock().listeners.remove(&guild_id);
        if let Some(listener) = listener {
            listener.ended();
        }
    }

    pub fn fail_current(&self, guild_id: GuildId, reason: &str) {
        let listener = self.log.lock().listeners.remove(&guild_id);
        if let Some(listener) = listener {
            listener.errored(reason);
        }
    }
}

pub struct FakeTrack {
    listener: PlayerListener,
    halted: Arc<AtomicUsize>,
}

impl TrackControl for FakeTrack {
    // Songbird fires the end event on stop as well.
    fn halt(&self) {
        self.halted.fetch_add(1, Ordering::SeqCst);
        self.listener.ended();
    }
}

#[async_trait]
impl VoiceConnector for FakeVoice {
    type Stream = String;
    type Track = FakeTrack;

    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), MusicError> {
        let mut log = self.log.lock();
        if log.refuse_joins {
            return Err(MusicError::Connection("voice gateway unreachable".into()));
        }
        log.joins.push((guild_id, channel_id));
        Ok(())
    }

    async fn play(
        &self,
        guild_id: GuildId,
        stream: String,
        listener: PlayerListener,
    ) -> Result<FakeTrack, MusicError> {
        let mut log = self.log.lock();
        log.plays.push((guild_id, stream));
        log.listeners.insert(guild_id, listener.clone());
        Ok(FakeTrack {
            listener,
            halted: self.halted.clone(),
        })
    }

    async fn leave(&self, guild_id: GuildId) {
        let mut log = self.log.lock();
        log.leaves += 1;
        log.departures.insert(guild_id);
        log.listeners.remove(&guild_id);
    }

    fn take_departure(&self, guild_id: GuildId) -> bool {
        self.log.lock().departures.remove(&guild_id)
    }
}

pub fn harness(
    resolver: FakeResolver,
) -> (GuildQueueManager<FakeResolver, FakeVoice>, Arc<FakeVoice>) {
    let voice = Arc::new(FakeVoice::default());
    let manager = GuildQueueManager::new(
        Arc::new(resolver),
        voice.clone(),
        ManagerSettings {
            max_queue_size: 100,
            resolve_timeout: Duration::from_secs(5),
        },
    );
    (manager, voice)
}

/// Waits for the first notice accepted by `wanted`, skipping the others.
pub async fn next_notice<F>(notices: &mut broadcast::Receiver<MusicNotice>, wanted: F) -> MusicNotice
where
    F: Fn(&MusicNotice) -> bool,
{
    let search = async {
        loop {
            match notices.recv().await {
                Ok(notice) if wanted(&notice) => return notice,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("notice channel closed"),
            }
        }
    };
    tokio::time::timeout(WAIT_LIMIT, search)
        .await
        .expect("expected notice never arrived")
}

/// Polls until `done` holds.
pub async fn settle(done: impl Fn() -> bool) {
    let poll = async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(WAIT_LIMIT, poll)
        .await
        .expect("condition never settled");
}

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serenity::all::{ChannelId, CreateMessage, GuildId, Http};
use std::sync::Arc;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, warn};

use crate::{audio::MusicNotice, ui::embeds};

/// Text channel where each guild's music notices go. Set by `/play`.
pub type NoticeChannels = Arc<DashMap<GuildId, ChannelId>>;

/// Where notices are posted.
#[async_trait]
pub trait NoticeSink: Send + Sync + 'static {
    async fn post(&self, channel_id: ChannelId, notice: &MusicNotice) -> Result<()>;
}

#[async_trait]
impl NoticeSink for Http {
    async fn post(&self, channel_id: ChannelId, notice: &MusicNotice) -> Result<()> {
        let message = CreateMessage::new().embed(embeds::create_notice_embed(notice));
        channel_id.send_message(self, message).await?;
        Ok(())
    }
}

/// Forwards music notices to the guild's text channel until the manager
/// goes away. Notices for guilds without a known channel are dropped.
pub fn spawn_notice_pump<S: NoticeSink>(
    sink: Arc<S>,
    mut notices: broadcast::Receiver<MusicNotice>,
    channels: NoticeChannels,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let notice = match notices.recv().await {
                Ok(notice) => notice,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("📪 Notice pump fell behind, {} notices dropped", missed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let guild_id = notice.guild_id();
            let Some(channel_id) = channels.get(&guild_id).map(|entry| *entry) else {
                debug!("No text channel known for guild {}", guild_id);
                continue;
            };

            if let Err(e) = sink.post(channel_id, &notice).await {
                warn!("Could not post notice in guild {}: {:?}", guild_id, e);
            }
        }
        debug!("📪 Notice pump stopped");
    })
}

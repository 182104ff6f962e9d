//! # Bot Module
//!
//! Discord-facing glue for Sparkle Bot.
//!
//! - Command registration ([`commands`])
//! - Slash command dispatch ([`handlers`])
//! - Posting music notices to text channels ([`notices`])
//!
//! The [`SparkleBot`] handler owns nothing that holds music state: the
//! queues live in the [`MusicManager`], the coins in the [`Economy`].

use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;
pub mod notices;

use crate::{audio::MusicManager, config::Config, economy::Economy};
use notices::NoticeChannels;

/// Main Discord event handler.
pub struct SparkleBot {
    config: Arc<Config>,
    pub music: MusicManager,
    pub economy: Arc<Economy>,
    /// Text channel per guild where music notices are posted
    pub notice_channels: NoticeChannels,
    notices_started: AtomicBool,
}

impl SparkleBot {
    pub fn new(config: Config, music: MusicManager, economy: Arc<Economy>) -> Self {
        Self {
            config: Arc::new(config),
            music,
            economy,
            notice_channels: Arc::new(DashMap::new()),
            notices_started: AtomicBool::new(false),
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Commands go to the `GUILD_ID` guild when it is configured (updates show
    /// up within seconds) and globally otherwise (propagation can take up to
    /// an hour).
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registering slash commands...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ Bot is not a member of the configured guild {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Could not register guild commands: {:?}", e);
                        anyhow::anyhow!("Guild command registration failed. Check the 'applications.commands' scope.")
                    })?;
                info!("✅ Guild commands registered for {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Could not register global commands: {:?}", e);
                    anyhow::anyhow!("Global command registration failed. Check the 'applications.commands' scope.")
                })?;
                info!("✅ Global commands registered");
            }
        }

        Ok(())
    }

    /// The notice pump survives reconnects, so it is started only once.
    fn start_notice_pump(&self, ctx: &Context) {
        if self.notices_started.swap(true, Ordering::SeqCst) {
            return;
        }

        notices::spawn_notice_pump(
            ctx.http.clone(),
            self.music.subscribe(),
            self.notice_channels.clone(),
        );
        debug!("📬 Notice pump started");
    }
}

#[async_trait]
impl EventHandler for SparkleBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🎶 {} is ready!", ready.user.name);
        info!("📊 Connected to {} servers", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error registering commands: {:?}", e);
        }

        self.start_notice_pump(&ctx);
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error handling command: {:?}", e);
            }
        }
    }

    /// Drops the guild's queue when the bot is disconnected from voice by
    /// someone else. Disconnects caused by our own leave are ignored.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }
        let Some(guild_id) = new.guild_id else {
            return;
        };

        match self.music.voice_disconnected(guild_id).await {
            Ok(Some(outcome)) => info!(
                "🔌 Disconnected from voice in guild {}, {} tracks dropped",
                guild_id, outcome.discarded
            ),
            Ok(None) => {}
            Err(e) => error!("Error stopping playback in guild {}: {:?}", guild_id, e),
        }
    }
}

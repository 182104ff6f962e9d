use anyhow::Result;
use serenity::{all::ApplicationId, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod economy;
mod error;
mod sources;
mod ui;

use crate::audio::{voice::SongbirdConnector, ManagerSettings, MusicManager};
use crate::bot::SparkleBot;
use crate::config::Config;
use crate::economy::{Economy, EconomyRules};
use crate::sources::YtDlpResolver;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sparkle_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🌟 Starting Sparkle Bot v{}", env!("CARGO_PKG_VERSION"));

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    let config = Config::load()?;
    info!("{}", config.summary());

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_PRESENCES;

    let songbird = Songbird::serenity();
    let music = MusicManager::new(
        Arc::new(YtDlpResolver::new()?),
        Arc::new(SongbirdConnector::new(songbird.clone(), config.default_volume)),
        ManagerSettings::from(&config),
    );
    let economy = Arc::new(Economy::new(EconomyRules::from(&config)));
    let handler = SparkleBot::new(config.clone(), music.clone(), economy);

    let mut client = Client::builder(&config.discord_token, intents)
        .application_id(ApplicationId::new(config.application_id))
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Shutdown signal received, stopping all queues...");
        music.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    sources::verify_dependencies().await?;
    println!("OK");
    Ok(())
}

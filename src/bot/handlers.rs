use anyhow::Result;
use serenity::{
    all::{CreateEmbed, ResolvedOption, ResolvedValue, User},
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage},
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::{
    audio::{queue::TrackRequest, SkipOutcome},
    bot::SparkleBot,
    error::{EconomyError, MusicError},
    ui::embeds::{self, format_coins, CURRENCY},
};

/// What a command answers with.
#[derive(Debug)]
enum Reply {
    Embed(CreateEmbed),
    Text(String),
    /// Only visible to the caller.
    Ephemeral(String),
}

impl Reply {
    fn ephemeral(text: impl Into<String>) -> Self {
        Reply::Ephemeral(text.into())
    }
}

/// Handles slash commands
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &SparkleBot) -> Result<()> {
    info!(
        "📝 Command /{} used by {} in {}",
        command.data.name,
        command.user.name,
        command
            .guild_id
            .map_or("DM".to_string(), |id| format!("guild {}", id))
    );

    let reply = match dispatch(ctx, &command, bot).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("❌ /{} failed: {:?}", command.data.name, e);
            Reply::ephemeral("❌ There was an error processing the command!")
        }
    };

    respond(ctx, &command, reply).await
}

async fn dispatch(ctx: &Context, command: &CommandInteraction, bot: &SparkleBot) -> Result<Reply> {
    let options = command.data.options();

    match command.data.name.as_str() {
        "help" => Ok(Reply::Embed(embeds::create_help_embed(&command.user))),
        "profile" => Ok(handle_profile(ctx, command, bot)),
        "balance" => Ok(Reply::Embed(embeds::create_balance_embed(
            &bot.economy.account(command.user.id),
        ))),
        "daily" => Ok(match bot.economy.claim_daily(command.user.id) {
            Ok(reward) => Reply::Embed(embeds::create_daily_embed(&reward)),
            Err(e) => economy_error_reply(&e, None),
        }),
        "pay" => handle_pay(command, &options, bot),
        "rob" => handle_rob(command, &options, bot),
        "top" => handle_top(ctx, bot).await,
        "play" => handle_play(ctx, command, &options, bot).await,
        "skip" => handle_skip(command, bot).await,
        "stop" => handle_stop(command, bot).await,
        "queue" => handle_queue(command, bot).await,
        "nowplaying" => handle_nowplaying(command, bot).await,
        other => {
            debug!("Unknown command /{}", other);
            Ok(Reply::ephemeral("❌ Unknown command"))
        }
    }
}

async fn respond(ctx: &Context, command: &CommandInteraction, reply: Reply) -> Result<()> {
    let message = match reply {
        Reply::Embed(embed) => CreateInteractionResponseMessage::new().embed(embed),
        Reply::Text(text) => CreateInteractionResponseMessage::new().content(text),
        Reply::Ephemeral(text) => CreateInteractionResponseMessage::new()
            .content(text)
            .ephemeral(true),
    };

    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;
    Ok(())
}

// Economy

fn handle_profile(ctx: &Context, command: &CommandInteraction, bot: &SparkleBot) -> Reply {
    let status = command.guild_id.and_then(|guild_id| {
        let guild = guild_id.to_guild_cached(&ctx.cache)?;
        guild
            .presences
            .get(&command.user.id)
            .map(|presence| presence.status)
    });
    let account = bot.economy.account(command.user.id);

    Reply::Embed(embeds::create_profile_embed(
        &command.user,
        command.member.as_deref(),
        status,
        &account,
    ))
}

fn handle_pay(command: &CommandInteraction, options: &[ResolvedOption<'_>], bot: &SparkleBot) -> Result<Reply> {
    let recipient = user_option(options, "user")
        .ok_or_else(|| anyhow::anyhow!("missing user option"))?;
    let amount = integer_option(options, "amount")
        .ok_or_else(|| anyhow::anyhow!("missing amount option"))?;

    Ok(match bot.economy.pay(command.user.id, recipient.id, amount) {
        Ok(transfer) => Reply::Embed(embeds::create_payment_embed(&transfer, &recipient.name)),
        Err(e) => economy_error_reply(&e, Some(&recipient.name)),
    })
}

fn handle_rob(command: &CommandInteraction, options: &[ResolvedOption<'_>], bot: &SparkleBot) -> Result<Reply> {
    let target = user_option(options, "user")
        .ok_or_else(|| anyhow::anyhow!("missing user option"))?;

    Ok(match bot.economy.rob(command.user.id, target.id) {
        Ok(attempt) => Reply::Embed(embeds::create_rob_embed(&attempt, &target.name)),
        Err(e) => economy_error_reply(&e, Some(&target.name)),
    })
}

async fn handle_top(ctx: &Context, bot: &SparkleBot) -> Result<Reply> {
    let limit = bot.economy.rules().leaderboard_size;
    let mut ranking = Vec::with_capacity(limit);

    for entry in bot.economy.leaderboard(limit) {
        // Users Discord no longer knows about are left out.
        match entry.user_id.to_user(ctx).await {
            Ok(user) => ranking.push((user.name, entry.net_worth)),
            Err(e) => debug!("Skipping {} on the leaderboard: {:?}", entry.user_id, e),
        }
    }

    Ok(Reply::Embed(embeds::create_leaderboard_embed(&ranking)))
}

// Music

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    options: &[ResolvedOption<'_>],
    bot: &SparkleBot,
) -> Result<Reply> {
    let Some(guild_id) = command.guild_id else {
        return Ok(guild_only());
    };
    let song = string_option(options, "song")
        .ok_or_else(|| anyhow::anyhow!("missing song option"))?;

    let Some(voice_channel_id) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        return Ok(Reply::ephemeral("❌ You need to be in a voice channel!"));
    };

    bot.notice_channels.insert(guild_id, command.channel_id);

    let track = TrackRequest::new(song, command.user.id);
    match bot.music.enqueue(guild_id, voice_channel_id, track.clone()).await {
        Ok(position) => Ok(Reply::Embed(embeds::create_track_added_embed(
            &track,
            position,
            &command.user,
        ))),
        Err(e) => music_error_reply(e),
    }
}

async fn handle_skip(command: &CommandInteraction, bot: &SparkleBot) -> Result<Reply> {
    let Some(guild_id) = command.guild_id else {
        return Ok(guild_only());
    };

    match bot.music.skip(guild_id).await {
        Ok(SkipOutcome::Advanced { .. }) => Ok(Reply::Text("⏭️ Skipped to the next song!".into())),
        Ok(SkipOutcome::QueueEnded) => Ok(Reply::Text("❌ No more songs in the queue!".into())),
        Err(e) => music_error_reply(e),
    }
}

async fn handle_stop(command: &CommandInteraction, bot: &SparkleBot) -> Result<Reply> {
    let Some(guild_id) = command.guild_id else {
        return Ok(guild_only());
    };

    match bot.music.stop(guild_id).await {
        Ok(_) => Ok(Reply::Text("⏹️ Music stopped and connection closed.".into())),
        Err(e) => music_error_reply(e),
    }
}

async fn handle_queue(command: &CommandInteraction, bot: &SparkleBot) -> Result<Reply> {
    let Some(guild_id) = command.guild_id else {
        return Ok(guild_only());
    };

    match bot.music.queue_snapshot(guild_id).await {
        Ok(snapshot) => Ok(Reply::Embed(embeds::create_queue_embed(
            &snapshot.tracks,
            snapshot.status.as_ref(),
        ))),
        Err(e) => music_error_reply(e),
    }
}

async fn handle_nowplaying(command: &CommandInteraction, bot: &SparkleBot) -> Result<Reply> {
    let Some(guild_id) = command.guild_id else {
        return Ok(guild_only());
    };

    match bot.music.now_playing(guild_id).await {
        Some(status) => Ok(Reply::Embed(embeds::create_now_playing_embed(&status))),
        None => music_error_reply(MusicError::NotPlaying),
    }
}

// Helpers

fn guild_only() -> Reply {
    Reply::ephemeral("❌ This command only works in a server!")
}

/// User mistakes become ephemeral replies; anything else is an error for
/// the caller to log.
fn music_error_reply(error: MusicError) -> Result<Reply> {
    let text = match error {
        MusicError::EmptyQueue => "❌ There are no songs in the queue!".to_string(),
        MusicError::NotPlaying => "❌ No music is currently playing!".to_string(),
        MusicError::QueueFull(max) => format!("❌ The queue is full (maximum {} songs)!", max),
        MusicError::Resolution(_) => "❌ Failed to play the song!".to_string(),
        MusicError::Connection(_) => "❌ Could not connect to your voice channel!".to_string(),
        MusicError::WorkerGone => return Err(MusicError::WorkerGone.into()),
    };
    Ok(Reply::Ephemeral(text))
}

fn economy_error_reply(error: &EconomyError, target: Option<&str>) -> Reply {
    let target = target.unwrap_or("That user");
    let text = match error {
        EconomyError::InvalidAmount => "❌ Amount must be positive!".to_string(),
        EconomyError::InsufficientFunds { balance } => format!(
            "❌ You don't have enough {}! You only have {}.",
            CURRENCY,
            format_coins(*balance)
        ),
        EconomyError::DailyCooldown { remaining } => format!(
            "⏳ You already claimed your daily! Next claim available in {}",
            clock_format(*remaining)
        ),
        EconomyError::RobCooldown { remaining } => format!(
            "⏳ You can't rob again yet! Wait {}",
            clock_format(*remaining)
        ),
        EconomyError::TargetTooPoor { minimum, .. } => format!(
            "❌ {} doesn't have enough {} to rob (minimum {} required)",
            target,
            CURRENCY,
            format_coins(*minimum)
        ),
        EconomyError::SelfTarget => "❌ You can't do that to yourself!".to_string(),
    };
    Reply::Ephemeral(text)
}

/// `HH:MM:SS`, the way cooldowns are shown to users.
fn clock_format(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

fn string_option<'a>(options: &[ResolvedOption<'a>], name: &str) -> Option<&'a str> {
    options.iter().find(|opt| opt.name == name).and_then(|opt| match opt.value {
        ResolvedValue::String(value) => Some(value),
        _ => None,
    })
}

fn integer_option(options: &[ResolvedOption<'_>], name: &str) -> Option<i64> {
    options.iter().find(|opt| opt.name == name).and_then(|opt| match opt.value {
        ResolvedValue::Integer(value) => Some(value),
        _ => None,
    })
}

fn user_option<'a>(options: &[ResolvedOption<'a>], name: &str) -> Option<&'a User> {
    options.iter().find(|opt| opt.name == name).and_then(|opt| match opt.value {
        ResolvedValue::User(user, _) => Some(user),
        _ => None,
    })
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ephemeral_text(reply: Reply) -> String {
        match reply {
            Reply::Ephemeral(text) => text,
            other => panic!("expected an ephemeral reply, got {:?}", other),
        }
    }

    #[test]
    fn queue_errors_map_to_user_messages() {
        assert_eq!(
            ephemeral_text(music_error_reply(MusicError::EmptyQueue).unwrap()),
            "❌ There are no songs in the queue!"
        );
        assert_eq!(
            ephemeral_text(music_error_reply(MusicError::NotPlaying).unwrap()),
            "❌ No music is currently playing!"
        );
        assert_eq!(
            ephemeral_text(music_error_reply(MusicError::QueueFull(100)).unwrap()),
            "❌ The queue is full (maximum 100 songs)!"
        );
    }

    #[test]
    fn lost_worker_is_an_internal_error() {
        assert!(music_error_reply(MusicError::WorkerGone).is_err());
    }

    #[test]
    fn economy_errors_map_to_user_messages() {
        assert_eq!(
            ephemeral_text(economy_error_reply(
                &EconomyError::InsufficientFunds { balance: 1_500 },
                None
            )),
            "❌ You don't have enough 💰! You only have 1,500."
        );
        assert_eq!(
            ephemeral_text(economy_error_reply(
                &EconomyError::DailyCooldown {
                    remaining: Duration::from_secs(5 * 3600 + 7 * 60 + 9)
                },
                None
            )),
            "⏳ You already claimed your daily! Next claim available in 05:07:09"
        );
        assert_eq!(
            ephemeral_text(economy_error_reply(
                &EconomyError::TargetTooPoor {
                    balance: 20,
                    minimum: 100
                },
                Some("bob")
            )),
            "❌ bob doesn't have enough 💰 to rob (minimum 100 required)"
        );
    }

    #[test]
    fn cooldowns_render_as_clock() {
        assert_eq!(clock_format(Duration::from_secs(0)), "00:00:00");
        assert_eq!(clock_format(Duration::from_secs(23 * 3600 + 59 * 60 + 59)), "23:59:59");
    }
}

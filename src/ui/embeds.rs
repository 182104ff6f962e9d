use chrono::{DateTime, Utc};
use num_format::{Locale, ToFormattedString};
use serenity::{
    all::{Member, OnlineStatus, Timestamp, User},
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::{
    audio::{queue::TrackRequest, MusicNotice, QueueStatus},
    economy::{Account, DailyReward, RobAttempt, RobResult, Transfer},
};

/// Standard color palette
pub mod colors {
    use serenity::all::Colour;

    pub const GOLD: Colour = Colour::from_rgb(255, 215, 0);
    pub const BLURPLE: Colour = Colour::from_rgb(88, 101, 242);
    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(87, 242, 135);
    pub const ERROR_RED: Colour = Colour::from_rgb(237, 66, 69);
    pub const LEADERBOARD_YELLOW: Colour = Colour::from_rgb(254, 231, 92);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

pub const CURRENCY: &str = "💰";

const STANDARD_FOOTER: &str = "🌟 Sparkle Bot";

/// Thousands separators, e.g. `1,234,567`.
pub fn format_coins(amount: u64) -> String {
    amount.to_formatted_string(&Locale::en)
}

/// Discord renders this as a relative time ("in 3 hours").
fn relative_time(at: DateTime<Utc>) -> String {
    format!("<t:{}:R>", at.timestamp())
}

fn short_date(at: Timestamp) -> String {
    format!("<t:{}:D>", at.unix_timestamp())
}

fn status_label(status: Option<OnlineStatus>) -> &'static str {
    match status {
        Some(OnlineStatus::Online) => "🟢 Online",
        Some(OnlineStatus::Idle) => "🟠 Idle",
        Some(OnlineStatus::DoNotDisturb) => "🔴 Do Not Disturb",
        _ => "⚫ Offline",
    }
}

pub fn create_help_embed(requested_by: &User) -> CreateEmbed {
    CreateEmbed::default()
        .title("🌟 Sparkle Bot Commands")
        .description("Here are all available commands:")
        .color(colors::GOLD)
        .field(
            "💰 Economy",
            "`/balance`, `/daily`, `/pay`, `/rob`, `/top`",
            false,
        )
        .field(
            "🎵 Music",
            "`/play`, `/skip`, `/stop`, `/queue`, `/nowplaying`",
            false,
        )
        .field("📊 Profile", "`/profile`, `/help`", false)
        .footer(
            CreateEmbedFooter::new(format!("Requested by {}", requested_by.name))
                .icon_url(requested_by.face()),
        )
}

pub fn create_profile_embed(
    user: &User,
    member: Option<&Member>,
    status: Option<OnlineStatus>,
    account: &Account,
) -> CreateEmbed {
    let joined = member
        .and_then(|m| m.joined_at)
        .map(short_date)
        .unwrap_or_else(|| "Unknown".to_string());

    CreateEmbed::default()
        .title(format!("📊 {}'s Profile", user.name))
        .thumbnail(user.face())
        .color(colors::BLURPLE)
        .field("🆔 Discord ID", user.id.to_string(), true)
        .field("🕒 Account Created", short_date(user.id.created_at()), true)
        .field("📅 Joined Server", joined, true)
        .field("💎 Status", status_label(status), true)
        .field(
            format!("{} Balance", CURRENCY),
            format_coins(account.balance),
            true,
        )
        .field("🏦 Bank", format_coins(account.bank), true)
        .footer(CreateEmbedFooter::new(format!("Profile for {}", user.name)).icon_url(user.face()))
}

pub fn create_balance_embed(account: &Account) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("{} Your Balance", CURRENCY))
        .description(format!(
            "You have **{}** {} Sparkle Coins!",
            format_coins(account.balance),
            CURRENCY
        ))
        .color(colors::SUCCESS_GREEN)
        .field("🏦 Bank", format_coins(account.bank), true)
        .field("💵 Net Worth", format_coins(account.net_worth()), true)
}

pub fn create_daily_embed(reward: &DailyReward) -> CreateEmbed {
    CreateEmbed::default()
        .title("🎁 Daily Reward Claimed")
        .description(format!(
            "You received **{}** {}!",
            format_coins(reward.amount),
            CURRENCY
        ))
        .color(colors::GOLD)
        .field("💳 New Balance", format_coins(reward.balance), true)
        .field("⏳ Next Daily", relative_time(reward.next_claim), true)
}

pub fn create_payment_embed(transfer: &Transfer, recipient: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("💸 Payment Successful")
        .description(format!(
            "You sent **{}** {} to {}!",
            format_coins(transfer.amount),
            CURRENCY,
            recipient
        ))
        .color(colors::SUCCESS_GREEN)
        .field(
            "📉 Your New Balance",
            format_coins(transfer.sender_balance),
            true,
        )
        .field(
            "📈 Their Balance",
            format_coins(transfer.recipient_balance),
            true,
        )
        .footer(CreateEmbedFooter::new("Transaction completed"))
}

pub fn create_rob_embed(attempt: &RobAttempt, target: &str) -> CreateEmbed {
    let embed = match attempt.result {
        RobResult::Stole(stolen) => CreateEmbed::default()
            .title("🦹 Robbery Successful")
            .description(format!(
                "You stole **{}** {} from {}!",
                format_coins(stolen),
                CURRENCY,
                target
            ))
            .color(colors::SUCCESS_GREEN),
        RobResult::Caught { fine } => CreateEmbed::default()
            .title("🚓 Robbery Failed")
            .description(format!(
                "You were caught trying to rob {} and paid a **{}** {} fine!",
                target,
                format_coins(fine),
                CURRENCY
            ))
            .color(colors::ERROR_RED),
    };

    embed
        .field("💳 Your Balance", format_coins(attempt.balance), true)
        .field("⏳ Next Robbery", relative_time(attempt.next_attempt), true)
}

/// `ranking` holds display names with net worth, richest first.
pub fn create_leaderboard_embed(ranking: &[(String, u64)]) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(format!("🏆 Top {} Richest Users", ranking.len()))
        .description(format!(
            "Leaderboard of users with the most {} Sparkle Coins",
            CURRENCY
        ))
        .color(colors::LEADERBOARD_YELLOW)
        .footer(CreateEmbedFooter::new("Economy Leaderboard"));

    if ranking.is_empty() {
        return embed.description("Nobody has any coins yet.");
    }

    for (i, (name, net_worth)) in ranking.iter().enumerate() {
        embed = embed.field(
            format!("{}. {}", i + 1, name),
            format!("**{}** {}", format_coins(*net_worth), CURRENCY),
            false,
        );
    }
    embed
}

pub fn create_track_added_embed(track: &TrackRequest, position: usize, requester: &User) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("🎵 Added to Queue")
        .description(format!("**{}**", track.query))
        .color(colors::BLURPLE)
        .footer(
            CreateEmbedFooter::new(format!("Requested by {}", requester.name))
                .icon_url(requester.face()),
        );

    if position == 1 {
        embed.field("📍 Position", "Playing now", true)
    } else {
        embed.field("📍 Position", format!("#{}", position), true)
    }
}

pub fn create_queue_embed(tracks: &[TrackRequest], status: Option<&QueueStatus>) -> CreateEmbed {
    const SHOWN: usize = 10;

    let mut embed = CreateEmbed::default()
        .title("🎶 Current Queue")
        .color(colors::BLURPLE);

    let Some((current, upcoming)) = tracks.split_first() else {
        return embed
            .description("There are no songs in the queue!")
            .color(colors::NEUTRAL_GRAY);
    };

    let heading = match status {
        Some(status) => format!("▶️ Now ({})", status.state.label()),
        None => "▶️ Now".to_string(),
    };
    let title = status
        .and_then(|s| s.title.clone())
        .unwrap_or_else(|| current.query.clone());
    embed = embed.field(
        heading,
        format!("**{}** • <@{}>", title, current.requested_by),
        false,
    );

    if !upcoming.is_empty() {
        let mut listing = String::new();
        for (i, track) in upcoming.iter().take(SHOWN).enumerate() {
            listing.push_str(&format!(
                "**{}**. {} • <@{}>\n",
                i + 2,
                track.query,
                track.requested_by
            ));
        }
        if upcoming.len() > SHOWN {
            listing.push_str(&format!("…and {} more", upcoming.len() - SHOWN));
        }
        embed = embed.field("Up next", listing, false);
    }

    embed.footer(CreateEmbedFooter::new(format!(
        "{} songs • {}",
        tracks.len(),
        STANDARD_FOOTER
    )))
}

pub fn create_now_playing_embed(status: &QueueStatus) -> CreateEmbed {
    let title = status.title.as_deref().unwrap_or(&status.current.query);
    CreateEmbed::default()
        .title("🎵 Now Playing")
        .description(format!("**{}**", title))
        .color(colors::SUCCESS_GREEN)
        .field("👤 Requested by", format!("<@{}>", status.current.requested_by), true)
        .field("📡 State", status.state.label(), true)
        .field("📋 Up next", status.upcoming.to_string(), true)
        .field("🕒 Queued", relative_time(status.current.added_at), true)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Message posted to a guild's text channel for an out-of-band music event.
pub fn create_notice_embed(notice: &MusicNotice) -> CreateEmbed {
    let embed = match notice {
        MusicNotice::NowPlaying { query, title, .. } => CreateEmbed::default()
            .title("🎵 Now Playing")
            .description(format!("**{}**", title.as_deref().unwrap_or(query)))
            .color(colors::SUCCESS_GREEN),
        MusicNotice::ResolutionFailed { query, reason, .. } => create_error_embed(
            "Failed to play the song!",
            &format!("**{}** was skipped: {}", query, reason),
        ),
        MusicNotice::ConnectionFailed { reason, .. } => create_error_embed(
            "Voice connection lost",
            &format!("The queue was cleared: {}", reason),
        ),
        MusicNotice::QueueEnded { .. } => CreateEmbed::default()
            .title("📭 Queue finished")
            .description("No more songs in the queue!")
            .color(colors::NEUTRAL_GRAY),
    };
    embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
}

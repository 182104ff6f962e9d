use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Every slash command the bot answers to.
pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        help_command(),
        profile_command(),
        balance_command(),
        daily_command(),
        pay_command(),
        rob_command(),
        top_command(),
        play_command(),
        skip_command(),
        stop_command(),
        queue_command(),
        nowplaying_command(),
    ]
}

/// Registers commands globally
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registers commands for a single guild (development)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

fn help_command() -> CreateCommand {
    CreateCommand::new("help").description("Show all available commands")
}

// Economy commands

fn profile_command() -> CreateCommand {
    CreateCommand::new("profile").description("Show your profile information")
}

fn balance_command() -> CreateCommand {
    CreateCommand::new("balance").description("Check your coin balance")
}

fn daily_command() -> CreateCommand {
    CreateCommand::new("daily").description("Claim your daily coins")
}

fn pay_command() -> CreateCommand {
    CreateCommand::new("pay")
        .description("Send coins to another user")
        .add_option(
            CreateCommandOption::new(CommandOptionType::User, "user", "User to send coins to")
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "amount", "Amount to send")
                .required(true),
        )
}

fn rob_command() -> CreateCommand {
    CreateCommand::new("rob")
        .description("Attempt to rob another user")
        .add_option(
            CreateCommandOption::new(CommandOptionType::User, "user", "User to rob").required(true),
        )
}

fn top_command() -> CreateCommand {
    CreateCommand::new("top").description("Show the richest users")
}

// Music commands

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Play music")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "song", "Song name or URL")
                .required(true),
        )
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skip current song")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Stop music")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Show current queue")
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Show the song that is playing")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_every_command_once() {
        let commands = all_commands();
        assert_eq!(commands.len(), 12);

        let names: std::collections::HashSet<String> = commands
            .iter()
            .map(|command| {
                serde_json::to_value(command).unwrap()["name"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect();
        assert_eq!(names.len(), 12);
        for name in ["help", "pay", "rob", "play", "nowplaying"] {
            assert!(names.contains(name), "missing /{}", name);
        }
    }
}

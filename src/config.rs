use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Development guild for instant command updates

    // Music
    pub default_volume: f32,
    pub max_queue_size: usize,
    #[serde(with = "humantime_duration")]
    pub resolve_timeout: Duration,

    // Economy
    pub starting_balance: u64,
    pub leaderboard_size: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. `load` uses the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let config = Self {
            // Discord
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            application_id: var("APPLICATION_ID")
                .context("APPLICATION_ID is not set")?
                .parse()
                .context("APPLICATION_ID must be a number")?,
            guild_id: var("GUILD_ID").and_then(|s| s.parse().ok()),

            // Music
            default_volume: match var("DEFAULT_VOLUME") {
                Some(value) => value.parse().context("DEFAULT_VOLUME must be a number")?,
                None => defaults.default_volume,
            },
            max_queue_size: match var("MAX_QUEUE_SIZE") {
                Some(value) => value.parse().context("MAX_QUEUE_SIZE must be a number")?,
                None => defaults.max_queue_size,
            },
            resolve_timeout: match var("RESOLVE_TIMEOUT") {
                Some(value) => humantime::parse_duration(&value)
                    .context("RESOLVE_TIMEOUT must be a duration such as 30s")?,
                None => defaults.resolve_timeout,
            },

            // Economy
            starting_balance: match var("STARTING_BALANCE") {
                Some(value) => value.parse().context("STARTING_BALANCE must be a number")?,
                None => defaults.starting_balance,
            },
            leaderboard_size: match var("LEADERBOARD_SIZE") {
                Some(value) => value.parse().context("LEADERBOARD_SIZE must be a number")?,
                None => defaults.leaderboard_size,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Queue size and leaderboard size must be greater than 0
    /// - Resolve timeout must be at least one second
    pub fn validate(&self) -> Result<()> {
        if self.default_volume < 0.0 || self.default_volume > 2.0 {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.resolve_timeout < Duration::from_secs(1) {
            anyhow::bail!(
                "Resolve timeout must be at least 1s, got: {}",
                humantime::format_duration(self.resolve_timeout)
            );
        }

        if self.leaderboard_size == 0 {
            anyhow::bail!("Leaderboard size must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging. The token
    /// is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Music: {}% vol, {} queue, {} resolve timeout\n  \
            Economy: {} starting coins, top {} leaderboard",
            self.application_id,
            self.guild_id
                .map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            humantime::format_duration(self.resolve_timeout),
            self.starting_balance,
            self.leaderboard_size
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            // Music defaults
            default_volume: 0.5,
            max_queue_size: 100,
            resolve_timeout: Duration::from_secs(30),

            // Economy defaults
            starting_balance: 100,
            leaderboard_size: 10,
        }
    }
}

/// Serializes durations in humantime notation ("30s").
mod humantime_duration {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(D::Error::custom)
    }
}

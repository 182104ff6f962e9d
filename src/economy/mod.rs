//! # Economy Module
//!
//! In-memory Sparkle Coin ledger: balances, daily rewards, transfers,
//! robberies and the leaderboard.
//!
//! Accounts are created lazily the first time a user is seen. Every
//! operation takes the single ledger lock, so a transfer or robbery is
//! never observed half-applied. Randomness and time come from the [`Dice`]
//! and [`Clock`] collaborators.

pub mod chance;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serenity::model::id::UserId;
use std::{collections::HashMap, time::Duration};
use tracing::{debug, info};

pub use chance::{Clock, Dice, SystemClock, ThreadDice};

use crate::{config::Config, error::EconomyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Account {
    pub balance: u64,
    pub bank: u64,
    pub last_daily: Option<DateTime<Utc>>,
    pub last_rob: Option<DateTime<Utc>>,
}

impl Account {
    fn opened_with(balance: u64) -> Self {
        Self {
            balance,
            bank: 0,
            last_daily: None,
            last_rob: None,
        }
    }

    pub fn net_worth(&self) -> u64 {
        self.balance.saturating_add(self.bank)
    }
}

/// Tunables of the economy. Defaults match the classic Sparkle Bot rules.
#[derive(Debug, Clone)]
pub struct EconomyRules {
    pub starting_balance: u64,
    pub daily_cooldown: Duration,
    /// Daily reward is drawn from `[daily_min, daily_max)`.
    pub daily_min: u64,
    pub daily_max: u64,
    pub rob_cooldown: Duration,
    pub rob_min_target: u64,
    pub rob_success_chance: f64,
    pub rob_steal_ratio: f64,
    pub rob_fine_ratio: f64,
    pub leaderboard_size: usize,
}

impl Default for EconomyRules {
    fn default() -> Self {
        Self {
            starting_balance: 100,
            daily_cooldown: Duration::from_secs(24 * 60 * 60),
            daily_min: 500,
            daily_max: 1000,
            rob_cooldown: Duration::from_secs(60 * 60),
            rob_min_target: 100,
            rob_success_chance: 0.6,
            rob_steal_ratio: 0.3,
            rob_fine_ratio: 0.1,
            leaderboard_size: 10,
        }
    }
}

impl From<&Config> for EconomyRules {
    fn from(config: &Config) -> Self {
        Self {
            starting_balance: config.starting_balance,
            leaderboard_size: config.leaderboard_size,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyReward {
    pub amount: u64,
    pub balance: u64,
    pub next_claim: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub amount: u64,
    pub sender_balance: u64,
    pub recipient_balance: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobResult {
    Stole(u64),
    Caught { fine: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobAttempt {
    pub result: RobResult,
    /// Robber's balance afterwards.
    pub balance: u64,
    pub next_attempt: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub net_worth: u64,
}

pub struct Economy<D = ThreadDice, C = SystemClock> {
    rules: EconomyRules,
    dice: D,
    clock: C,
    ledger: Mutex<HashMap<UserId, Account>>,
}

impl Economy {
    pub fn new(rules: EconomyRules) -> Self {
        Self::with_sources(rules, ThreadDice, SystemClock)
    }
}

impl<D: Dice, C: Clock> Economy<D, C> {
    pub fn with_sources(rules: EconomyRules, dice: D, clock: C) -> Self {
        Self {
            rules,
            dice,
            clock,
            ledger: Mutex::new(HashMap::new()),
        }
    }

    pub fn rules(&self) -> &EconomyRules {
        &self.rules
    }

    /// Current account of `user`, opening it if needed.
    pub fn account(&self, user: UserId) -> Account {
        let mut ledger = self.ledger.lock();
        *self.open(&mut ledger, user)
    }

    pub fn claim_daily(&self, user: UserId) -> Result<DailyReward, EconomyError> {
        let now = self.clock.now();
        let mut ledger = self.ledger.lock();
        let account = self.open(&mut ledger, user);

        let remaining = remaining_cooldown(account.last_daily, self.rules.daily_cooldown, now);
        if !remaining.is_zero() {
            return Err(EconomyError::DailyCooldown { remaining });
        }

        let amount = self.dice.between(self.rules.daily_min, self.rules.daily_max);
        account.balance = account.balance.saturating_add(amount);
        account.last_daily = Some(now);

        info!("🎁 {} claimed a daily reward of {}", user, amount);
        Ok(DailyReward {
            amount,
            balance: account.balance,
            next_claim: after(now, self.rules.daily_cooldown),
        })
    }

    pub fn pay(&self, from: UserId, to: UserId, amount: i64) -> Result<Transfer, EconomyError> {
        if from == to {
            return Err(EconomyError::SelfTarget);
        }
        let amount = u64::try_from(amount)
            .ok()
            .filter(|amount| *amount > 0)
            .ok_or(EconomyError::InvalidAmount)?;

        let mut ledger = self.ledger.lock();
        let sender = self.open(&mut ledger, from);
        if sender.balance < amount {
            return Err(EconomyError::InsufficientFunds {
                balance: sender.balance,
            });
        }
        sender.balance -= amount;
        let sender_balance = sender.balance;

        let recipient = self.open(&mut ledger, to);
        recipient.balance = recipient.balance.saturating_add(amount);

        debug!("💸 {} paid {} coins to {}", from, amount, to);
        Ok(Transfer {
            amount,
            sender_balance,
            recipient_balance: recipient.balance,
        })
    }

    /// Attempts a robbery. Rejected attempts leave the cooldown untouched;
    /// a completed attempt starts it whether it succeeded or not.
    pub fn rob(&self, robber: UserId, target: UserId) -> Result<RobAttempt, EconomyError> {
        if robber == target {
            return Err(EconomyError::SelfTarget);
        }

        let now = self.clock.now();
        let mut ledger = self.ledger.lock();

        let last_rob = self.open(&mut ledger, robber).last_rob;
        let remaining = remaining_cooldown(last_rob, self.rules.rob_cooldown, now);
        if !remaining.is_zero() {
            return Err(EconomyError::RobCooldown { remaining });
        }

        let victim = self.open(&mut ledger, target);
        if victim.balance < self.rules.rob_min_target {
            return Err(EconomyError::TargetTooPoor {
                balance: victim.balance,
                minimum: self.rules.rob_min_target,
            });
        }

        let stolen = if self.dice.roll() < self.rules.rob_success_chance {
            let stolen = portion(victim.balance, self.rules.rob_steal_ratio);
            victim.balance -= stolen;
            Some(stolen)
        } else {
            None
        };

        let thief = self.open(&mut ledger, robber);
        let result = match stolen {
            Some(stolen) => {
                thief.balance = thief.balance.saturating_add(stolen);
                info!("🦹 {} stole {} coins from {}", robber, stolen, target);
                RobResult::Stole(stolen)
            }
            None => {
                let fine = portion(thief.balance, self.rules.rob_fine_ratio);
                thief.balance -= fine;
                info!("🚓 {} was caught robbing {} (fine {})", robber, target, fine);
                RobResult::Caught { fine }
            }
        };
        thief.last_rob = Some(now);

        Ok(RobAttempt {
            result,
            balance: thief.balance,
            next_attempt: after(now, self.rules.rob_cooldown),
        })
    }

    /// Richest users by balance plus bank. Ties keep the lower user id first.
    pub fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        let ledger = self.ledger.lock();
        let mut entries: Vec<LeaderboardEntry> = ledger
            .iter()
            .map(|(user_id, account)| LeaderboardEntry {
                user_id: *user_id,
                net_worth: account.net_worth(),
            })
            .collect();
        drop(ledger);

        entries.sort_by(|a, b| {
            b.net_worth
                .cmp(&a.net_worth)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        entries.truncate(limit);
        entries
    }

    fn open<'a>(&self, ledger: &'a mut HashMap<UserId, Account>, user: UserId) -> &'a mut Account {
        let starting_balance = self.rules.starting_balance;
        ledger.entry(user).or_insert_with(|| {
            debug!("🆕 Opened account for {}", user);
            Account::opened_with(starting_balance)
        })
    }
}

fn remaining_cooldown(last: Option<DateTime<Utc>>, cooldown: Duration, now: DateTime<Utc>) -> Duration {
    let Some(last) = last else {
        return Duration::ZERO;
    };
    // A clock that went backwards counts as no time elapsed.
    let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
    cooldown.saturating_sub(elapsed)
}

fn after(now: DateTime<Utc>, cooldown: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(cooldown)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(now)
}

fn portion(amount: u64, ratio: f64) -> u64 {
    ((amount as f64) * ratio).floor() as u64
}

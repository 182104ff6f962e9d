use chrono::{DateTime, Utc};
use rand::Rng;

/// Source of randomness for rewards and robberies.
#[cfg_attr(test, mockall::automock)]
pub trait Dice: Send + Sync + 'static {
    /// Uniform in `[0, 1)`.
    fn roll(&self) -> f64;

    /// Uniform in `[low, high)`.
    fn between(&self, low: u64, high: u64) -> u64;
}

#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadDice;

impl Dice for ThreadDice {
    fn roll(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }

    fn between(&self, low: u64, high: u64) -> u64 {
        if high <= low {
            return low;
        }
        rand::thread_rng().gen_range(low..high)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_dice_stays_in_range() {
        let dice = ThreadDice;
        for _ in 0..1_000 {
            let roll = dice.roll();
            assert!((0.0..1.0).contains(&roll));

            let value = dice.between(500, 1000);
            assert!((500..1000).contains(&value));
        }
        assert_eq!(dice.between(7, 7), 7);
    }
}

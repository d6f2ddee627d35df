//! Source rotation and start-up jitter
//!
//! The bot can either poll every source account on each run or rotate
//! through them, one account per slot of the UTC day.

use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use rand::Rng;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Which source accounts a run polls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationMode {
    /// Poll every configured account
    All,
    /// Split the day into this many slots and poll one account per slot
    DailySlots(u32),
}

impl RotationMode {
    /// `0` means no rotation
    pub fn from_slots(slots: u32) -> Self {
        if slots == 0 {
            Self::All
        } else {
            Self::DailySlots(slots)
        }
    }
}

impl std::fmt::Display for RotationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all accounts"),
            Self::DailySlots(n) => write!(f, "{} daily slots", n),
        }
    }
}

/// Index of the slot `now` falls into when the UTC day is cut into `slots`
/// equal parts. Returns 0 when `slots` is 0.
pub fn current_slot(now: DateTime<Utc>, slots: u32) -> u32 {
    if slots == 0 {
        return 0;
    }
    let minutes = now.hour() * 60 + now.minute();
    let slot = (u64::from(minutes) * u64::from(slots)) / u64::from(MINUTES_PER_DAY);
    (slot as u32).min(slots - 1)
}

/// Accounts to poll this run, in configured order
pub fn accounts_for_run(accounts: &[String], mode: RotationMode, now: DateTime<Utc>) -> Vec<String> {
    if accounts.is_empty() {
        return Vec::new();
    }
    match mode {
        RotationMode::All => accounts.to_vec(),
        RotationMode::DailySlots(slots) => {
            let slot = current_slot(now, slots) as usize;
            vec![accounts[slot % accounts.len()].clone()]
        }
    }
}

/// Random delay in `[0, max)`; zero when `max` is zero
pub fn startup_jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let millis = max.as_millis().min(u128::from(u64::MAX)) as u64;
    Duration::from_millis(rand::thread_rng().gen_range(0..millis.max(1)))
}

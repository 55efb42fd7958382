//! Keeps the codes of one decoded result set current.
//!
//! The scheduler does not own a timer. A driver calls [`RefreshScheduler::tick`]
//! every [`SchedulerConfig::tick_interval`] with the wall-clock time; every
//! countdown is recomputed from that time, so late or missed ticks do not
//! accumulate drift.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::account::{Account, DecodingResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
        }
    }
}

/// Identifies one arming of the scheduler. Arming again or disarming makes
/// every earlier token stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Generation(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Countdowns moved, codes are unchanged
    Counting,
    /// At least one window rolled over and every code was regenerated
    Regenerated,
    /// The token belongs to a result set that has been replaced
    Stale,
    /// Nothing is loaded
    Idle,
}

#[derive(Debug)]
struct Armed {
    generation: Generation,
    result: DecodingResult,
    time_left: Vec<u64>,
    /// Window index each account's code was computed for
    windows: Vec<u64>,
}

impl Armed {
    fn regenerate(&mut self, now: u64) {
        for (account, window) in self.result.accounts.iter_mut().zip(self.windows.iter_mut()) {
            account.refresh(now);
            *window = window_of(account, now);
        }
    }
}

fn window_of(account: &Account, now: u64) -> u64 {
    now / account.period.max(1)
}

#[derive(Debug, Default)]
pub struct RefreshScheduler {
    config: SchedulerConfig,
    armed: Option<Armed>,
    last_generation: u64,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn tick_interval(&self) -> Duration {
        self.config.tick_interval
    }

    /// Replaces whatever was loaded with `result` and starts its countdowns.
    ///
    /// An empty result leaves the scheduler idle, but still invalidates the
    /// previous token.
    pub fn arm(&mut self, result: DecodingResult, now: u64) -> Generation {
        self.disarm();
        let generation = Generation(self.last_generation);

        if result.accounts.is_empty() {
            log::debug!("nothing to schedule for generation {}", generation.0);
            return generation;
        }

        let mut armed = Armed {
            generation,
            time_left: result.accounts.iter().map(|a| a.time_left(now)).collect(),
            windows: vec![0; result.accounts.len()],
            result,
        };
        armed.regenerate(now);

        log::debug!(
            "armed generation {} with {} accounts",
            generation.0,
            armed.result.accounts.len()
        );
        self.armed = Some(armed);

        generation
    }

    /// Drops the loaded result set; pending ticks become stale.
    pub fn disarm(&mut self) {
        if let Some(armed) = self.armed.take() {
            log::debug!("disarmed generation {}", armed.generation.0);
        }
        self.last_generation += 1;
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// The token of the loaded result set, if any
    pub fn generation(&self) -> Option<Generation> {
        self.armed.as_ref().map(|a| a.generation)
    }

    /// Recomputes every countdown for `now`.
    ///
    /// When any account has just entered a new window, the codes of all
    /// accounts are regenerated so the displayed set stays consistent.
    pub fn tick(&mut self, token: Generation, now: u64) -> TickOutcome {
        let Some(armed) = self.armed.as_mut() else {
            return if token.0 == self.last_generation {
                TickOutcome::Idle
            } else {
                TickOutcome::Stale
            };
        };
        if armed.generation != token {
            return TickOutcome::Stale;
        }

        let mut rolled_over = false;
        for (index, account) in armed.result.accounts.iter().enumerate() {
            let time_left = account.time_left(now);
            armed.time_left[index] = time_left;

            if time_left == account.period || armed.windows[index] != window_of(account, now) {
                rolled_over = true;
            }
        }

        if !rolled_over {
            return TickOutcome::Counting;
        }

        log::debug!("window rolled over at {now}, regenerating codes");
        armed.regenerate(now);
        TickOutcome::Regenerated
    }

    /// Seconds left in each account's window as of the last tick, in account order
    pub fn time_left(&self) -> &[u64] {
        self.armed
            .as_ref()
            .map(|a| a.time_left.as_slice())
            .unwrap_or_default()
    }

    pub fn accounts(&self) -> &[Account] {
        self.armed
            .as_ref()
            .map(|a| a.result.accounts.as_slice())
            .unwrap_or_default()
    }

    pub fn result(&self) -> Option<&DecodingResult> {
        self.armed.as_ref().map(|a| &a.result)
    }
}

/// Seconds since the UNIX epoch according to the system clock
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    use super::{RefreshScheduler, SchedulerConfig, TickOutcome};
    use crate::{
        account::{Account, DecodingResult, RawOtpParameter, OTP_TYPE_TOTP},
        Dialect,
    };

    fn account(secret: &[u8], period: u64) -> Account {
        let raw = RawOtpParameter {
            secret_bytes: secret.to_vec(),
            label: Some(format!("every {period}s")),
            otp_type: OTP_TYPE_TOTP,
            period: Some(period),
            ..RawOtpParameter::default()
        };

        Account::normalize(raw, 0).unwrap()
    }

    #[fixture]
    fn mixed_periods() -> DecodingResult {
        DecodingResult {
            dialect: Dialect::Migration,
            accounts: vec![account(b"thirty-seconds", 30), account(b"sixty-seconds", 60)],
        }
    }

    #[rstest]
    fn arm_computes_countdowns(mixed_periods: DecodingResult) {
        let mut scheduler = RefreshScheduler::new();
        let token = scheduler.arm(mixed_periods, 1041);

        assert!(scheduler.is_armed());
        assert_eq!(Some(token), scheduler.generation());
        assert_eq!(&[9, 39], scheduler.time_left());
    }

    #[rstest]
    fn counting_inside_a_window(mixed_periods: DecodingResult) {
        let mut scheduler = RefreshScheduler::new();
        let token = scheduler.arm(mixed_periods, 1041);
        let before: Vec<_> = scheduler.accounts().to_vec();

        assert_eq!(TickOutcome::Counting, scheduler.tick(token, 1042));
        assert_eq!(&[8, 38], scheduler.time_left());
        assert_eq!(before, scheduler.accounts());
    }

    #[rstest]
    fn rollover_of_one_regenerates_all(mixed_periods: DecodingResult) {
        let mut scheduler = RefreshScheduler::new();
        let token = scheduler.arm(mixed_periods, 1041);

        // Only the 30 second account starts a new window at 1050
        if let Some(armed) = scheduler.armed.as_mut() {
            for account in armed.result.accounts.iter_mut() {
                account.current_code = "stale".to_string();
            }
        }

        assert_eq!(TickOutcome::Regenerated, scheduler.tick(token, 1050));
        assert_eq!(&[30, 30], scheduler.time_left());
        for account in scheduler.accounts() {
            assert_eq!(
                account.totp().generate(1050).unwrap().to_string(),
                account.current_code
            );
        }
    }

    #[rstest]
    fn missed_boundary_tick_still_regenerates(mixed_periods: DecodingResult) {
        let mut scheduler = RefreshScheduler::new();
        let token = scheduler.arm(mixed_periods, 1041);

        assert_eq!(TickOutcome::Regenerated, scheduler.tick(token, 1052));
        assert_eq!(TickOutcome::Counting, scheduler.tick(token, 1053));
    }

    #[rstest]
    fn rearming_invalidates_the_old_token(mixed_periods: DecodingResult) {
        let mut scheduler = RefreshScheduler::new();
        let old = scheduler.arm(mixed_periods.clone(), 1041);
        let new = scheduler.arm(mixed_periods, 1041);

        assert!(old != new);
        assert_eq!(TickOutcome::Stale, scheduler.tick(old, 1042));
        assert_eq!(TickOutcome::Counting, scheduler.tick(new, 1042));
    }

    #[rstest]
    fn disarm_tears_down(mixed_periods: DecodingResult) {
        let mut scheduler = RefreshScheduler::new();
        let token = scheduler.arm(mixed_periods, 1041);
        scheduler.disarm();

        assert!(!scheduler.is_armed());
        assert!(scheduler.accounts().is_empty());
        assert!(scheduler.time_left().is_empty());
        assert_eq!(TickOutcome::Stale, scheduler.tick(token, 1042));
    }

    #[test]
    fn empty_result_stays_idle() {
        let mut scheduler = RefreshScheduler::new();
        let token = scheduler.arm(
            DecodingResult {
                dialect: Dialect::Migration,
                accounts: Vec::new(),
            },
            0,
        );

        assert!(!scheduler.is_armed());
        assert_eq!(None, scheduler.generation());
        assert_eq!(TickOutcome::Idle, scheduler.tick(token, 1));
    }

    #[test]
    fn config_sets_tick_interval() {
        let default = RefreshScheduler::new();
        let custom = RefreshScheduler::with_config(SchedulerConfig {
            tick_interval: Duration::from_millis(250),
        });

        assert_eq!(Duration::from_secs(1), default.tick_interval());
        assert_eq!(Duration::from_millis(250), custom.tick_interval());
    }
}

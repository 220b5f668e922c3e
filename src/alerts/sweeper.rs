//! Periodic re-evaluation of open low-balance episodes
//!
//! Runs on the target's own worker between lines, so it never interleaves
//! with the engine. Delinquency records are event-driven and left alone.

use chrono::{DateTime, Utc};

use super::intent::AlertIntent;
use crate::config::TargetConfig;
use crate::state::{Target, TargetState};

/// Sweep a target's state under its lock
pub fn sweep(target: &Target, now: DateTime<Utc>) -> Vec<AlertIntent> {
    target.with_state(|state| sweep_state(&target.config, state, now))
}

/// Close episodes whose last known balance is healthy and repeat low-balance
/// alerts whose interval has elapsed
pub fn sweep_state(
    config: &TargetConfig,
    state: &mut TargetState,
    now: DateTime<Utc>,
) -> Vec<AlertIntent> {
    let mut intents = Vec::new();

    for account in state.accounts_in_episode() {
        let Some(record) = state.balances.get_mut(&account) else {
            continue;
        };

        if record.last_known_balance >= config.min_balance {
            let since = record.first_alert_time.take();
            tracing::info!(
                validator = %config.id,
                account = %account,
                balance = record.last_known_balance,
                "Balance recovery detected during periodic check"
            );
            if config.alerts.balance_recovery {
                intents.push(AlertIntent::balance_recovery(
                    &config.id,
                    &account,
                    record.last_known_balance,
                    since,
                    now,
                ));
            }
            continue;
        }

        if config.alerts.low_balance && now - record.last_alert_time >= config.intervals.balance() {
            record.last_alert_time = now;
            tracing::info!(
                validator = %config.id,
                account = %account,
                "Sending periodic low balance alert"
            );
            intents.push(AlertIntent::low_balance(
                &config.id,
                &account,
                record.last_known_balance,
                record.first_alert_time,
                now,
            ));
        }
    }

    intents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::intent::AlertKind;
    use crate::config::AlertToggles;
    use crate::state::{BalanceRecord, DelinquencyRecord};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn config() -> TargetConfig {
        TargetConfig::new("mainnet", "Identity").with_min_balance(0.5)
    }

    fn open_episode(balance: f64) -> BalanceRecord {
        BalanceRecord {
            first_alert_time: Some(t0()),
            last_alert_time: t0(),
            last_known_balance: balance,
        }
    }

    #[test]
    fn test_sweep_catches_missed_crossing() {
        let mut state = TargetState::new();
        state.balances.insert("Acct".to_string(), open_episode(0.9));

        let intents = sweep_state(&config(), &mut state, t0() + Duration::seconds(10));
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].kind, AlertKind::BalanceRecovery);
        assert_eq!(intents[0].balance, Some(0.9));
        assert!(!state.balances["Acct"].in_episode());

        // Nothing left to do on the next tick
        assert!(sweep_state(&config(), &mut state, t0() + Duration::seconds(20)).is_empty());
    }

    #[test]
    fn test_sweep_repeats_low_balance_after_interval() {
        let mut state = TargetState::new();
        state.balances.insert("Acct".to_string(), open_episode(0.2));

        assert!(sweep_state(&config(), &mut state, t0() + Duration::seconds(299)).is_empty());

        let at = t0() + Duration::seconds(300);
        let intents = sweep_state(&config(), &mut state, at);
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].kind, AlertKind::LowBalance);
        assert_eq!(intents[0].since, Some(t0()));
        assert_eq!(state.balances["Acct"].last_alert_time, at);
    }

    #[test]
    fn test_sweep_ignores_closed_episodes_and_delinquency() {
        let mut state = TargetState::new();
        state.balances.insert(
            "Healthy".to_string(),
            BalanceRecord {
                first_alert_time: None,
                last_alert_time: t0(),
                last_known_balance: 0.1,
            },
        );
        state.delinquency.insert(
            "Val1".to_string(),
            DelinquencyRecord {
                is_delinquent: true,
                delinquent_since: Some(t0()),
                last_alert_time: Some(t0()),
            },
        );

        assert!(sweep_state(&config(), &mut state, t0() + Duration::hours(2)).is_empty());
        assert_eq!(state.delinquency["Val1"].last_alert_time, Some(t0()));
    }

    #[test]
    fn test_sweep_respects_toggles() {
        let config = config().with_alerts(AlertToggles {
            low_balance: false,
            balance_recovery: false,
            ..AlertToggles::default()
        });
        let mut state = TargetState::new();
        state.balances.insert("Low".to_string(), open_episode(0.1));
        state.balances.insert("Ok".to_string(), open_episode(0.8));

        assert!(sweep_state(&config, &mut state, t0() + Duration::hours(1)).is_empty());
        assert!(state.balances["Low"].in_episode());
        assert!(!state.balances["Ok"].in_episode());
    }

    #[test]
    fn test_sweep_on_target() {
        let target = Target::new(config());
        target.with_state(|s| {
            s.balances.insert("Acct".to_string(), open_episode(0.7));
        });
        assert_eq!(sweep(&target, t0()).len(), 1);
        assert_eq!(target.snapshot().low_balance_count(), 0);
    }
}

//! Alert decision engine
//!
//! Applies one [`Event`] to a target's state and decides which alerts fire.
//! Decisions depend only on the event, the state, the target's policy and
//! the `now` passed in, so every transition is testable without a clock.
//!
//! Callers must feed events of one target sequentially, in arrival order.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::balance::BalanceSource;
use super::intent::AlertIntent;
use crate::detector::{Event, RecoveryScope};
use crate::state::{BalanceRecord, DelinquencyRecord, Target, TargetState};

/// Per-target alert decision engine
pub struct AlertEngine {
    target: Arc<Target>,
    balances: Arc<dyn BalanceSource>,
}

impl AlertEngine {
    pub fn new(target: Arc<Target>, balances: Arc<dyn BalanceSource>) -> Self {
        Self { target, balances }
    }

    pub fn target(&self) -> &Arc<Target> {
        &self.target
    }

    /// Apply one event, returning the alerts it triggers
    pub async fn handle(&self, event: Event, now: DateTime<Utc>) -> Vec<AlertIntent> {
        match event {
            Event::DelinquentDetected(entity) => self
                .target
                .with_state(|s| self.on_delinquent(s, &entity, now))
                .into_iter()
                .collect(),
            Event::Recovery(scope) => self.target.with_state(|s| self.on_recovery(s, &scope, now)),
            Event::BalanceObserved { account, balance } => self
                .target
                .with_state(|s| self.on_balance(s, &account, balance, now))
                .into_iter()
                .collect(),
            Event::SanityOk => {
                // Balance recoveries go out before entity recoveries
                let mut intents = self.on_sanity_ok(now).await;
                intents.extend(
                    self.target
                        .with_state(|s| self.on_recovery(s, &RecoveryScope::All, now)),
                );
                intents
            }
        }
    }

    /// An entity was reported delinquent
    pub fn on_delinquent(
        &self,
        state: &mut TargetState,
        entity: &str,
        now: DateTime<Utc>,
    ) -> Option<AlertIntent> {
        let config = &self.target.config;
        let record = state
            .delinquency
            .entry(entity.to_string())
            .or_insert_with(DelinquencyRecord::default);

        if !record.is_delinquent {
            record.is_delinquent = true;
            record.delinquent_since = Some(now);
            record.last_alert_time = Some(now);
            tracing::info!(
                validator = %config.id,
                entity = %entity,
                "Validator DELINQUENT state detected"
            );
        } else {
            let due = record
                .last_alert_time
                .map(|last| now - last >= config.intervals.delinquent())
                .unwrap_or(true);
            if !due {
                tracing::debug!(
                    validator = %config.id,
                    entity = %entity,
                    "Delinquent alert suppressed by interval"
                );
                return None;
            }
            record.last_alert_time = Some(now);
            tracing::info!(validator = %config.id, entity = %entity, "Repeating DELINQUENT alert");
        }

        if !config.alerts.delinquent {
            tracing::debug!(validator = %config.id, "Delinquent alerts disabled");
            return None;
        }
        Some(AlertIntent::delinquent(
            &config.id,
            entity,
            record.delinquent_since,
            now,
        ))
    }

    /// A recovery signal for one entity or for all of them
    pub fn on_recovery(
        &self,
        state: &mut TargetState,
        scope: &RecoveryScope,
        now: DateTime<Utc>,
    ) -> Vec<AlertIntent> {
        let config = &self.target.config;
        let mut recovered: Vec<(&String, &mut DelinquencyRecord)> = state
            .delinquency
            .iter_mut()
            .filter(|(entity, record)| {
                record.is_delinquent
                    && match scope {
                        RecoveryScope::All => true,
                        RecoveryScope::Entity(e) => *entity == e,
                    }
            })
            .collect();
        recovered.sort_by(|a, b| a.0.cmp(b.0));

        let mut intents = Vec::new();
        for (entity, record) in recovered {
            let since = record.delinquent_since.take();
            record.is_delinquent = false;
            tracing::info!(validator = %config.id, entity = %entity, "Validator RECOVERY detected");

            if config.alerts.recovery {
                intents.push(AlertIntent::recovery(&config.id, entity, since, now));
            }
        }
        intents
    }

    /// A balance reading for an account
    pub fn on_balance(
        &self,
        state: &mut TargetState,
        account: &str,
        balance: f64,
        now: DateTime<Utc>,
    ) -> Option<AlertIntent> {
        let config = &self.target.config;
        let threshold = config.min_balance;
        let below = balance < threshold;

        let Some(record) = state.balances.get_mut(account) else {
            state.balances.insert(
                account.to_string(),
                BalanceRecord {
                    first_alert_time: below.then_some(now),
                    last_alert_time: now,
                    last_known_balance: balance,
                },
            );
            if !below {
                tracing::info!(
                    validator = %config.id,
                    account = %account,
                    balance,
                    "New account with normal balance"
                );
                return None;
            }
            tracing::info!(
                validator = %config.id,
                account = %account,
                balance,
                "New account with low balance"
            );
            return config
                .alerts
                .low_balance
                .then(|| AlertIntent::low_balance(&config.id, account, balance, Some(now), now));
        };

        let was_below = record.last_known_balance < threshold;
        record.last_known_balance = balance;
        tracing::debug!(validator = %config.id, account = %account, balance, "Updated balance");

        if !below {
            if was_below {
                if let Some(since) = record.first_alert_time.take() {
                    tracing::info!(
                        validator = %config.id,
                        account = %account,
                        balance,
                        threshold,
                        "Balance recovery detected"
                    );
                    return config.alerts.balance_recovery.then(|| {
                        AlertIntent::balance_recovery(
                            &config.id,
                            account,
                            balance,
                            Some(since),
                            now,
                        )
                    });
                }
            }
            return None;
        }

        if record.first_alert_time.is_none() {
            record.first_alert_time = Some(now);
            if was_below {
                tracing::info!(
                    validator = %config.id,
                    account = %account,
                    "Low balance episode reopened"
                );
            } else {
                tracing::info!(
                    validator = %config.id,
                    account = %account,
                    "Balance dropped below threshold again"
                );
            }
        }

        if !config.alerts.low_balance || now - record.last_alert_time < config.intervals.balance() {
            return None;
        }
        record.last_alert_time = now;
        tracing::info!(validator = %config.id, account = %account, balance, "Low balance alert");
        Some(AlertIntent::low_balance(
            &config.id,
            account,
            balance,
            record.first_alert_time,
            now,
        ))
    }

    /// Sanity ok: close every open low-balance episode.
    ///
    /// Balances are looked up outside the state lock. When a lookup fails
    /// the threshold is reported instead.
    pub async fn on_sanity_ok(&self, now: DateTime<Utc>) -> Vec<AlertIntent> {
        let config = &self.target.config;
        let accounts = self.target.with_state(|s| s.accounts_in_episode());
        if accounts.is_empty() {
            return Vec::new();
        }
        tracing::info!(
            validator = %config.id,
            accounts = accounts.len(),
            "Sanity ok, marking low balance accounts as recovered"
        );

        let mut intents = Vec::new();
        for account in accounts {
            let looked_up = if config.alerts.balance_recovery {
                match self.balances.lookup(&account).await {
                    Ok(balance) => Some(balance),
                    Err(e) => {
                        tracing::warn!(
                            validator = %config.id,
                            account = %account,
                            error = %e,
                            "Balance lookup failed, assuming threshold"
                        );
                        None
                    }
                }
            } else {
                None
            };

            let since = self.target.with_state(|s| {
                let record = s.balances.get_mut(&account)?;
                if let Some(balance) = looked_up {
                    record.last_known_balance = balance;
                }
                record.first_alert_time.take()
            });
            let Some(since) = since else {
                continue;
            };

            let balance = looked_up.unwrap_or(config.min_balance);
            tracing::info!(
                validator = %config.id,
                account = %account,
                balance,
                "Account marked as recovered"
            );
            if config.alerts.balance_recovery {
                intents.push(AlertIntent::balance_recovery(
                    &config.id,
                    &account,
                    balance,
                    Some(since),
                    now,
                ));
            }
        }
        intents
    }
}

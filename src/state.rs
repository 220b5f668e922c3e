//! Per-target alert state
//!
//! Two tables keyed by entity / account id, created lazily on first
//! observation and kept in memory for the lifetime of the process.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::TargetConfig;

/// Delinquency state of one validator entity
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DelinquencyRecord {
    pub is_delinquent: bool,
    /// Set only while continuously delinquent
    pub delinquent_since: Option<DateTime<Utc>>,
    pub last_alert_time: Option<DateTime<Utc>>,
}

/// Balance state of one account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceRecord {
    /// Start of the open low-balance episode, `None` when there is none
    pub first_alert_time: Option<DateTime<Utc>>,
    pub last_alert_time: DateTime<Utc>,
    pub last_known_balance: f64,
}

impl BalanceRecord {
    pub fn in_episode(&self) -> bool {
        self.first_alert_time.is_some()
    }
}

/// Mutable alert state owned by one target
#[derive(Debug, Clone, Default, Serialize)]
pub struct TargetState {
    pub delinquency: HashMap<String, DelinquencyRecord>,
    pub balances: HashMap<String, BalanceRecord>,
}

impl TargetState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities currently delinquent
    pub fn delinquent_count(&self) -> usize {
        self.delinquency.values().filter(|r| r.is_delinquent).count()
    }

    /// Number of accounts with an open low-balance episode
    pub fn low_balance_count(&self) -> usize {
        self.balances.values().filter(|r| r.in_episode()).count()
    }

    /// Accounts with an open episode, sorted for deterministic processing
    pub fn accounts_in_episode(&self) -> Vec<String> {
        let mut accounts: Vec<String> = self
            .balances
            .iter()
            .filter(|(_, r)| r.in_episode())
            .map(|(a, _)| a.clone())
            .collect();
        accounts.sort();
        accounts
    }
}

/// A monitored target: static policy plus the state it exclusively owns.
///
/// The state sits behind a mutex so read-only observers (the status
/// endpoint) can take snapshots; all mutation happens on the target's own
/// worker.
pub struct Target {
    pub config: Arc<TargetConfig>,
    state: Mutex<TargetState>,
}

impl Target {
    pub fn new(config: TargetConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Mutex::new(TargetState::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Run `f` with exclusive access to the state
    pub fn with_state<R>(&self, f: impl FnOnce(&mut TargetState) -> R) -> R {
        let mut state = self.state.lock();
        f(&mut state)
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> TargetState {
        self.state.lock().clone()
    }
}

//! Alert intents: decided, not yet delivered

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Kind of notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Delinquent,
    Recovery,
    LowBalance,
    BalanceRecovery,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Delinquent => "delinquent",
            AlertKind::Recovery => "recovery",
            AlertKind::LowBalance => "low_balance",
            AlertKind::BalanceRecovery => "balance_recovery",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to render one notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertIntent {
    pub kind: AlertKind,
    /// Owning target id
    pub target: String,
    /// Validator entity or account id
    pub subject: String,
    /// Balance to report, for balance kinds
    pub balance: Option<f64>,
    /// Start of the state being reported, if known
    pub since: Option<DateTime<Utc>>,
    /// When the decision was made
    pub at: DateTime<Utc>,
}

impl AlertIntent {
    pub fn delinquent(
        target: &str,
        entity: &str,
        since: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Self {
        Self::new(AlertKind::Delinquent, target, entity, None, since, at)
    }

    pub fn recovery(
        target: &str,
        entity: &str,
        since: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Self {
        Self::new(AlertKind::Recovery, target, entity, None, since, at)
    }

    pub fn low_balance(
        target: &str,
        account: &str,
        balance: f64,
        since: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Self {
        Self::new(AlertKind::LowBalance, target, account, Some(balance), since, at)
    }

    pub fn balance_recovery(
        target: &str,
        account: &str,
        balance: f64,
        since: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Self {
        Self::new(
            AlertKind::BalanceRecovery,
            target,
            account,
            Some(balance),
            since,
            at,
        )
    }

    fn new(
        kind: AlertKind,
        target: &str,
        subject: &str,
        balance: Option<f64>,
        since: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            target: target.to_string(),
            subject: subject.to_string(),
            balance,
            since,
            at,
        }
    }

    /// Time spent in the reported state, if a start is known
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.since.map(|since| self.at - since)
    }
}

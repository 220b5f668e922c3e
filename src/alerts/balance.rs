//! Point lookups of account balances
//!
//! Used only by the sanity-ok bulk recovery path. Lookups are bounded by a
//! timeout and their failure is never fatal.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tokio::process::Command;

lazy_static! {
    static ref SOL_AMOUNT: Regex = Regex::new(r"([\d.]+)\s+SOL").expect("valid pattern");
}

/// Balance lookup errors
#[derive(Debug, thiserror::Error)]
pub enum BalanceError {
    #[error("Failed to run balance command: {0}")]
    Spawn(String),

    #[error("Balance command failed: {0}")]
    Command(String),

    #[error("Could not parse balance from output: {0:?}")]
    Parse(String),

    #[error("Balance lookup timed out after {0:?}")]
    Timeout(Duration),

    #[error("Balance lookup unavailable")]
    Unavailable,
}

/// Source of authoritative balances
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn lookup(&self, account: &str) -> Result<f64, BalanceError>;
}

/// Looks balances up by running the Solana CLI
pub struct CliBalanceSource {
    bin: String,
    rpc_url: String,
    timeout: Duration,
}

impl CliBalanceSource {
    pub fn new(bin: impl Into<String>, rpc_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            rpc_url: rpc_url.into(),
            timeout,
        }
    }

    /// Pull the first `<amount> SOL` out of CLI output
    pub fn parse_output(output: &str) -> Result<f64, BalanceError> {
        SOL_AMOUNT
            .captures(output)
            .and_then(|c| c[1].parse::<f64>().ok())
            .ok_or_else(|| BalanceError::Parse(output.trim().to_string()))
    }
}

#[async_trait]
impl BalanceSource for CliBalanceSource {
    async fn lookup(&self, account: &str) -> Result<f64, BalanceError> {
        let mut command = Command::new(&self.bin);
        command
            .arg("-u")
            .arg(&self.rpc_url)
            .arg("balance")
            .arg(account)
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| BalanceError::Timeout(self.timeout))?
            .map_err(|e| BalanceError::Spawn(e.to_string()))?;

        if !output.status.success() {
            return Err(BalanceError::Command(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let balance = Self::parse_output(&String::from_utf8_lossy(&output.stdout))?;
        tracing::info!(account = %account, balance, "Retrieved balance");
        Ok(balance)
    }
}

/// Fixed balances, for wiring without a CLI and for tests
#[derive(Debug, Default, Clone)]
pub struct StaticBalanceSource {
    balances: HashMap<String, f64>,
}

impl StaticBalanceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(mut self, account: impl Into<String>, balance: f64) -> Self {
        self.balances.insert(account.into(), balance);
        self
    }
}

#[async_trait]
impl BalanceSource for StaticBalanceSource {
    async fn lookup(&self, account: &str) -> Result<f64, BalanceError> {
        self.balances
            .get(account)
            .copied()
            .ok_or(BalanceError::Unavailable)
    }
}

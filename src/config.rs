//! Monitor configuration
//!
//! Everything is read from environment variables, optionally pre-loaded from
//! an env file. Parsing goes through a lookup closure so tests never touch
//! the process environment.
//!
//! Global variables:
//! - `WATCHTOWER_TARGETS`: comma-separated target ids (required)
//! - `TELEGRAM_BOT_TOKEN`: bot token, required when any target has a Telegram chat
//! - `SOLANA_BIN`: CLI used for balance lookups (default: solana)
//! - `WATCHTOWER_SHOW_FULL_ID`: print full account ids in messages (default: true)
//! - `WATCHTOWER_SWEEP_INTERVAL_SECS`: periodic sweep cadence (default: 10)
//! - `WATCHTOWER_WEBHOOK_TIMEOUT_SECS`: notifier request timeout (default: 10)
//! - `WATCHTOWER_BALANCE_TIMEOUT_SECS`: balance lookup timeout (default: 30)
//! - `WATCHTOWER_STATUS_ADDR`: bind address of the status endpoint (optional)
//! - `WATCHTOWER_LOG_DIR`: directory for the rolling log file (optional)
//!
//! Per-target variables use the prefix `WATCHTOWER_<ID>_`, see
//! [`TargetConfig::from_lookup`].

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

/// Default location of the env file loaded at startup
pub const DEFAULT_ENV_FILE: &str = "/usr/local/etc/watchtower-relay.env";

/// Configuration errors. Always fatal, and only raised before any worker starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required variable: {0}")]
    Missing(String),

    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: String, value: String },

    #[error("Target {0} has no notification channel configured")]
    NoChannels(String),

    #[error("No targets enabled")]
    NoTargets,

    #[error("Failed to load env file {path}: {message}")]
    EnvFile { path: String, message: String },
}

/// Which alert kinds a target emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlertToggles {
    pub delinquent: bool,
    pub recovery: bool,
    pub low_balance: bool,
    pub balance_recovery: bool,
}

impl Default for AlertToggles {
    fn default() -> Self {
        Self {
            delinquent: true,
            recovery: true,
            low_balance: true,
            balance_recovery: true,
        }
    }
}

impl AlertToggles {
    /// (name, enabled) pairs, in a stable order
    pub fn entries(&self) -> [(&'static str, bool); 4] {
        [
            ("delinquent", self.delinquent),
            ("recovery", self.recovery),
            ("low_balance", self.low_balance),
            ("balance_recovery", self.balance_recovery),
        ]
    }
}

/// Longest accepted repeat interval, ten years
pub const MAX_INTERVAL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Minimum spacing between repeated alerts of the same kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlertIntervals {
    pub delinquent_secs: u64,
    pub balance_secs: u64,
}

impl Default for AlertIntervals {
    fn default() -> Self {
        Self {
            delinquent_secs: 180,
            balance_secs: 300,
        }
    }
}

impl AlertIntervals {
    pub fn delinquent(&self) -> chrono::Duration {
        Self::to_duration(self.delinquent_secs)
    }

    pub fn balance(&self) -> chrono::Duration {
        Self::to_duration(self.balance_secs)
    }

    fn to_duration(secs: u64) -> chrono::Duration {
        chrono::Duration::seconds(secs.min(MAX_INTERVAL_SECS) as i64)
    }
}

/// A notification channel configured for a target
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelConfig {
    Discord {
        #[serde(skip_serializing)]
        webhook_url: String,
    },
    Telegram { chat_id: String },
}

/// Static policy of one monitored validator. Immutable after load.
#[derive(Debug, Clone, Serialize)]
pub struct TargetConfig {
    /// Short identifier, e.g. `mainnet`
    pub id: String,
    /// Display name used in messages, e.g. `MAINNET`
    pub name: String,
    /// Validator identity pubkey
    pub identity: String,
    pub rpc_url: String,
    /// systemd unit whose journal carries the watchtower output
    pub service: String,
    /// Balance threshold; at or above counts as healthy
    pub min_balance: f64,
    pub alerts: AlertToggles,
    pub intervals: AlertIntervals,
    pub channels: Vec<ChannelConfig>,
    /// Print account ids in full instead of `first10...last4`
    pub show_full_id: bool,
}

impl TargetConfig {
    /// Create a target with default policy
    pub fn new(id: impl Into<String>, identity: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.to_uppercase(),
            service: format!("agave-watchtower-{}.service", id),
            id,
            identity: identity.into(),
            rpc_url: String::new(),
            min_balance: 0.5,
            alerts: AlertToggles::default(),
            intervals: AlertIntervals::default(),
            channels: Vec::new(),
            show_full_id: true,
        }
    }

    /// Set the balance threshold
    pub fn with_min_balance(mut self, min_balance: f64) -> Self {
        self.min_balance = min_balance;
        self
    }

    /// Set alert toggles
    pub fn with_alerts(mut self, alerts: AlertToggles) -> Self {
        self.alerts = alerts;
        self
    }

    /// Set alert intervals
    pub fn with_intervals(mut self, intervals: AlertIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    /// Add a notification channel
    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channels.push(channel);
        self
    }

    /// Read one target's configuration.
    ///
    /// Variables, all prefixed with `WATCHTOWER_<ID>_`:
    /// `IDENTITY` and `RPC_URL` (required), `NAME`, `SERVICE`, `MIN_BALANCE`,
    /// `DELINQUENT_INTERVAL_SECS`, `BALANCE_INTERVAL_SECS`, `ALERT_DELINQUENT`,
    /// `ALERT_RECOVERY`, `ALERT_LOW_BALANCE`, `ALERT_BALANCE_RECOVERY`,
    /// `SHOW_FULL_ID`, `DISCORD_WEBHOOK`, `TELEGRAM_CHAT_ID`.
    pub fn from_lookup<F>(id: &str, show_full_id: bool, lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = format!("WATCHTOWER_{}_", id.to_uppercase().replace('-', "_"));
        let var = |suffix: &str| format!("{}{}", prefix, suffix);
        let get = |suffix: &str| non_empty(lookup(&var(suffix)));

        let identity = get("IDENTITY").ok_or_else(|| ConfigError::Missing(var("IDENTITY")))?;
        let mut target = TargetConfig::new(id, identity);

        target.rpc_url = get("RPC_URL").ok_or_else(|| ConfigError::Missing(var("RPC_URL")))?;
        if let Some(name) = get("NAME") {
            target.name = name;
        }
        if let Some(service) = get("SERVICE") {
            target.service = service;
        }
        if let Some(raw) = get("MIN_BALANCE") {
            target.min_balance = raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .ok_or_else(|| ConfigError::Invalid {
                    var: var("MIN_BALANCE"),
                    value: raw.clone(),
                })?;
        }

        target.intervals = AlertIntervals {
            delinquent_secs: parse_secs(
                &var("DELINQUENT_INTERVAL_SECS"),
                get("DELINQUENT_INTERVAL_SECS"),
                target.intervals.delinquent_secs,
                0,
            )?,
            balance_secs: parse_secs(
                &var("BALANCE_INTERVAL_SECS"),
                get("BALANCE_INTERVAL_SECS"),
                target.intervals.balance_secs,
                0,
            )?,
        };

        target.alerts = AlertToggles {
            delinquent: parse_bool(&var("ALERT_DELINQUENT"), get("ALERT_DELINQUENT"), true)?,
            recovery: parse_bool(&var("ALERT_RECOVERY"), get("ALERT_RECOVERY"), true)?,
            low_balance: parse_bool(&var("ALERT_LOW_BALANCE"), get("ALERT_LOW_BALANCE"), true)?,
            balance_recovery: parse_bool(
                &var("ALERT_BALANCE_RECOVERY"),
                get("ALERT_BALANCE_RECOVERY"),
                true,
            )?,
        };
        target.show_full_id = parse_bool(&var("SHOW_FULL_ID"), get("SHOW_FULL_ID"), show_full_id)?;

        if let Some(webhook_url) = get("DISCORD_WEBHOOK") {
            target.channels.push(ChannelConfig::Discord { webhook_url });
        }
        if let Some(chat_id) = get("TELEGRAM_CHAT_ID") {
            target.channels.push(ChannelConfig::Telegram { chat_id });
        }
        if target.channels.is_empty() {
            return Err(ConfigError::NoChannels(target.id));
        }

        Ok(target)
    }

    pub fn has_telegram(&self) -> bool {
        self.channels
            .iter()
            .any(|c| matches!(c, ChannelConfig::Telegram { .. }))
    }

    pub fn has_discord(&self) -> bool {
        self.channels
            .iter()
            .any(|c| matches!(c, ChannelConfig::Discord { .. }))
    }

    /// Log this target's policy, one line per setting
    pub fn log_summary(&self) {
        tracing::info!(validator = %self.id, "{} ({})", self.id.to_uppercase(), self.name);
        tracing::info!(validator = %self.id, "  Validator ID: {}", self.identity);
        tracing::info!(validator = %self.id, "  Service: {}", self.service);
        tracing::info!(validator = %self.id, "  Suggested balance: {} SOL", self.min_balance);
        for (kind, enabled) in self.alerts.entries() {
            tracing::info!(
                validator = %self.id,
                "  Alert {}: {}",
                kind,
                if enabled { "enabled" } else { "disabled" }
            );
        }
        tracing::info!(
            validator = %self.id,
            "  Intervals: delinquent {}s, balance {}s",
            self.intervals.delinquent_secs,
            self.intervals.balance_secs
        );
        tracing::info!(
            validator = %self.id,
            "  Discord: {}, Telegram: {}",
            if self.has_discord() { "configured" } else { "not configured" },
            if self.has_telegram() { "configured" } else { "not configured" }
        );
    }
}

/// Process-wide configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub targets: Vec<TargetConfig>,
    pub telegram_bot_token: Option<String>,
    pub solana_bin: String,
    pub sweep_interval: Duration,
    pub webhook_timeout: Duration,
    pub balance_timeout: Duration,
    pub status_addr: Option<SocketAddr>,
    pub log_dir: Option<PathBuf>,
}

impl MonitorConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ids: Vec<String> = non_empty(lookup("WATCHTOWER_TARGETS"))
            .ok_or_else(|| ConfigError::Missing("WATCHTOWER_TARGETS".to_string()))?
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        if ids.is_empty() {
            return Err(ConfigError::NoTargets);
        }

        let show_full_id = parse_bool(
            "WATCHTOWER_SHOW_FULL_ID",
            non_empty(lookup("WATCHTOWER_SHOW_FULL_ID")),
            true,
        )?;

        let targets = ids
            .iter()
            .map(|id| TargetConfig::from_lookup(id, show_full_id, &lookup))
            .collect::<Result<Vec<_>, _>>()?;

        let telegram_bot_token = non_empty(lookup("TELEGRAM_BOT_TOKEN"));
        if telegram_bot_token.is_none() && targets.iter().any(TargetConfig::has_telegram) {
            return Err(ConfigError::Missing("TELEGRAM_BOT_TOKEN".to_string()));
        }

        let status_addr = match non_empty(lookup("WATCHTOWER_STATUS_ADDR")) {
            Some(raw) => Some(raw.parse::<SocketAddr>().map_err(|_| ConfigError::Invalid {
                var: "WATCHTOWER_STATUS_ADDR".to_string(),
                value: raw.clone(),
            })?),
            None => None,
        };

        let secs = |var: &str, default: u64| -> Result<Duration, ConfigError> {
            parse_secs(var, non_empty(lookup(var)), default, 1).map(Duration::from_secs)
        };

        Ok(Self {
            targets,
            telegram_bot_token,
            solana_bin: non_empty(lookup("SOLANA_BIN")).unwrap_or_else(|| "solana".to_string()),
            sweep_interval: secs("WATCHTOWER_SWEEP_INTERVAL_SECS", 10)?,
            webhook_timeout: secs("WATCHTOWER_WEBHOOK_TIMEOUT_SECS", 10)?,
            balance_timeout: secs("WATCHTOWER_BALANCE_TIMEOUT_SECS", 30)?,
            status_addr,
            log_dir: non_empty(lookup("WATCHTOWER_LOG_DIR")).map(PathBuf::from),
        })
    }
}

/// Load `KEY=value` pairs from an env file into the process environment.
///
/// A missing file is not an error; returns whether a file was loaded.
/// Variables already set in the environment win.
pub fn load_env_file(path: &Path) -> Result<bool, ConfigError> {
    if !path.exists() {
        return Ok(false);
    }
    dotenvy::from_path(path).map_err(|e| ConfigError::EnvFile {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(true)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: std::str::FromStr>(
    var: &str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(raw) => raw.parse::<T>().map_err(|_| ConfigError::Invalid {
            var: var.to_string(),
            value: raw,
        }),
        None => Ok(default),
    }
}

/// Parse a number of seconds within `min..=MAX_INTERVAL_SECS`
fn parse_secs(var: &str, raw: Option<String>, default: u64, min: u64) -> Result<u64, ConfigError> {
    let secs = parse_or(var, raw, default)?;
    if (min..=MAX_INTERVAL_SECS).contains(&secs) {
        Ok(secs)
    } else {
        Err(ConfigError::Invalid {
            var: var.to_string(),
            value: secs.to_string(),
        })
    }
}

fn parse_bool(var: &str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::to_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(_) => Err(ConfigError::Invalid {
            var: var.to_string(),
            value: raw.unwrap_or_default(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![
            ("WATCHTOWER_TARGETS", "mainnet,testnet"),
            ("WATCHTOWER_MAINNET_IDENTITY", "MainId111"),
            ("WATCHTOWER_MAINNET_RPC_URL", "https://api.mainnet-beta.solana.com"),
            ("WATCHTOWER_MAINNET_DISCORD_WEBHOOK", "https://discord.test/hook"),
            ("WATCHTOWER_TESTNET_IDENTITY", "TestId222"),
            ("WATCHTOWER_TESTNET_RPC_URL", "https://api.testnet.solana.com"),
            ("WATCHTOWER_TESTNET_TELEGRAM_CHAT_ID", "-1001"),
            ("WATCHTOWER_TESTNET_MIN_BALANCE", "1.5"),
            ("WATCHTOWER_TESTNET_ALERT_RECOVERY", "false"),
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
        ]
    }

    #[test]
    fn test_full_config() {
        let config = MonitorConfig::from_lookup(env(&base())).unwrap();
        assert_eq!(config.targets.len(), 2);
        assert_eq!(config.sweep_interval, Duration::from_secs(10));
        assert_eq!(config.balance_timeout, Duration::from_secs(30));
        assert_eq!(config.solana_bin, "solana");
        assert!(config.status_addr.is_none());

        let mainnet = &config.targets[0];
        assert_eq!(mainnet.name, "MAINNET");
        assert_eq!(mainnet.service, "agave-watchtower-mainnet.service");
        assert_eq!(mainnet.min_balance, 0.5);
        assert_eq!(mainnet.intervals, AlertIntervals::default());
        assert!(mainnet.has_discord());
        assert!(!mainnet.has_telegram());

        let testnet = &config.targets[1];
        assert_eq!(testnet.min_balance, 1.5);
        assert!(!testnet.alerts.recovery);
        assert!(testnet.alerts.delinquent);
        assert!(testnet.has_telegram());
    }

    #[test]
    fn test_missing_identity() {
        let mut pairs = base();
        pairs.retain(|(k, _)| *k != "WATCHTOWER_TESTNET_IDENTITY");
        let err = MonitorConfig::from_lookup(env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(var) if var == "WATCHTOWER_TESTNET_IDENTITY"));
    }

    #[test]
    fn test_telegram_requires_token() {
        let mut pairs = base();
        pairs.retain(|(k, _)| *k != "TELEGRAM_BOT_TOKEN");
        let err = MonitorConfig::from_lookup(env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(var) if var == "TELEGRAM_BOT_TOKEN"));
    }

    #[test]
    fn test_target_without_channels() {
        let mut pairs = base();
        pairs.retain(|(k, _)| *k != "WATCHTOWER_MAINNET_DISCORD_WEBHOOK");
        let err = MonitorConfig::from_lookup(env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::NoChannels(id) if id == "mainnet"));
    }

    #[test]
    fn test_invalid_values() {
        let mut pairs = base();
        pairs.push(("WATCHTOWER_MAINNET_MIN_BALANCE", "-1"));
        assert!(matches!(
            MonitorConfig::from_lookup(env(&pairs)).unwrap_err(),
            ConfigError::Invalid { .. }
        ));

        let mut pairs = base();
        pairs.push(("WATCHTOWER_MAINNET_ALERT_DELINQUENT", "maybe"));
        assert!(matches!(
            MonitorConfig::from_lookup(env(&pairs)).unwrap_err(),
            ConfigError::Invalid { .. }
        ));

        let mut pairs = base();
        pairs.push(("WATCHTOWER_STATUS_ADDR", "not-an-addr"));
        assert!(matches!(
            MonitorConfig::from_lookup(env(&pairs)).unwrap_err(),
            ConfigError::Invalid { .. }
        ));
    }

    #[test]
    fn test_out_of_range_intervals() {
        for (var, value) in [
            ("WATCHTOWER_SWEEP_INTERVAL_SECS", "0"),
            ("WATCHTOWER_WEBHOOK_TIMEOUT_SECS", "0"),
            ("WATCHTOWER_MAINNET_DELINQUENT_INTERVAL_SECS", "99999999999999999"),
            ("WATCHTOWER_TESTNET_BALANCE_INTERVAL_SECS", "99999999999999999"),
        ] {
            let mut pairs = base();
            pairs.push((var, value));
            let err = MonitorConfig::from_lookup(env(&pairs)).unwrap_err();
            assert!(
                matches!(&err, ConfigError::Invalid { var: v, .. } if v == var),
                "{var}={value} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_interval_bounds() {
        let mut pairs = base();
        pairs.push(("WATCHTOWER_MAINNET_DELINQUENT_INTERVAL_SECS", "0"));
        pairs.push(("WATCHTOWER_SWEEP_INTERVAL_SECS", "1"));
        let config = MonitorConfig::from_lookup(env(&pairs)).unwrap();
        assert_eq!(config.sweep_interval, Duration::from_secs(1));
        assert_eq!(config.targets[0].intervals.delinquent(), chrono::Duration::zero());

        // Values set in code are clamped instead of overflowing
        let huge = AlertIntervals {
            delinquent_secs: u64::MAX,
            balance_secs: u64::MAX,
        };
        assert_eq!(
            huge.balance(),
            chrono::Duration::seconds(MAX_INTERVAL_SECS as i64)
        );
    }

    #[test]
    fn test_dashed_target_id() {
        let pairs = vec![
            ("WATCHTOWER_TARGETS", "mainnet-debug"),
            ("WATCHTOWER_MAINNET_DEBUG_IDENTITY", "DebugId"),
            ("WATCHTOWER_MAINNET_DEBUG_RPC_URL", "http://localhost:8899"),
            ("WATCHTOWER_MAINNET_DEBUG_DISCORD_WEBHOOK", "https://discord.test/debug"),
            ("WATCHTOWER_MAINNET_DEBUG_BALANCE_INTERVAL_SECS", "60"),
        ];
        let config = MonitorConfig::from_lookup(env(&pairs)).unwrap();
        let target = &config.targets[0];
        assert_eq!(target.id, "mainnet-debug");
        assert_eq!(target.name, "MAINNET-DEBUG");
        assert_eq!(target.intervals.balance_secs, 60);
    }

    #[test]
    fn test_missing_targets() {
        assert!(matches!(
            MonitorConfig::from_lookup(env(&[])).unwrap_err(),
            ConfigError::Missing(_)
        ));
        assert!(matches!(
            MonitorConfig::from_lookup(env(&[("WATCHTOWER_TARGETS", " , ")])).unwrap_err(),
            ConfigError::NoTargets
        ));
    }

    #[test]
    fn test_load_env_file() {
        let missing = std::path::Path::new("/nonexistent/watchtower-relay.env");
        assert!(!load_env_file(missing).unwrap());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "export WATCHTOWER_RELAY_TEST_VAR=\"from-file\"").unwrap();
        assert!(load_env_file(file.path()).unwrap());
        assert_eq!(
            std::env::var("WATCHTOWER_RELAY_TEST_VAR").unwrap(),
            "from-file"
        );
    }
}

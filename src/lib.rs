//! watchtower-relay: validator delinquency and low-balance alert relay
//!
//! Follows the journal output of one `agave-watchtower` instance per
//! monitored validator, turns recognized lines into events, and relays
//! alerts to Discord and Telegram with per-kind repeat intervals.
//!
//! # Features
//!
//! - **Event extraction**: Ordered table of line patterns, first match wins
//! - **Stateful alerting**: Per-entity delinquency and per-account balance episodes
//! - **Repeat gating**: Alerts repeat only after the configured interval
//! - **Periodic sweep**: Catches balance recoveries the log never reported
//! - **Isolated targets**: One worker per validator, reconnecting on its own
//! - **Status endpoint**: Optional read-only JSON view of every target
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chrono::Utc;
//! use watchtower_relay::alerts::{AlertEngine, StaticBalanceSource};
//! use watchtower_relay::config::TargetConfig;
//! use watchtower_relay::detector::extract;
//! use watchtower_relay::state::Target;
//!
//! # async fn demo() {
//! let target = Arc::new(Target::new(TargetConfig::new("mainnet", "Identity")));
//! let engine = AlertEngine::new(Arc::clone(&target), Arc::new(StaticBalanceSource::new()));
//!
//! if let Some(event) = extract("delinquent sanity failure: Val1 delinquent") {
//!     let intents = engine.handle(event, Utc::now()).await;
//!     println!("Alerts: {:?}", intents);
//! }
//! # }
//! ```

pub mod alerts;
pub mod api;
pub mod config;
pub mod detector;
pub mod monitor;
pub mod state;

// Re-export commonly used types
pub use alerts::{AlertEngine, AlertIntent, AlertKind, Dispatcher};
pub use config::{ConfigError, MonitorConfig, TargetConfig};
pub use detector::{extract, Event, RecoveryScope};
pub use monitor::{Orchestrator, TargetSupervisor};
pub use state::{Target, TargetState};

//! Alert decisions and delivery
//!
//! The engine and sweeper turn events and time into [`AlertIntent`]s; the
//! dispatcher renders them per platform and hands them to notifiers.

pub mod balance;
pub mod dispatcher;
pub mod engine;
pub mod intent;
pub mod notifier;
pub mod render;
pub mod sweeper;

pub use balance::{BalanceError, BalanceSource, CliBalanceSource, StaticBalanceSource};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use engine::AlertEngine;
pub use intent::{AlertIntent, AlertKind};
pub use notifier::{
    build_notifiers, http_client, DiscordNotifier, LogNotifier, Notifier, NotifierError,
    TelegramNotifier,
};
pub use render::{format_duration, format_id, render, Platform};
pub use sweeper::{sweep, sweep_state};

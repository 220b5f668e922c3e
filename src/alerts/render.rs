//! Platform-specific message rendering
//!
//! Pure text formatting: the same intent always renders to the same text.

use serde::Serialize;

use super::intent::{AlertIntent, AlertKind};
use crate::config::TargetConfig;

/// Target chat platform, which decides the emphasis markup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// `**bold**` labels
    Discord,
    /// `*bold*` labels and backtick-quoted ids
    Telegram,
    Plain,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Discord => f.write_str("discord"),
            Platform::Telegram => f.write_str("telegram"),
            Platform::Plain => f.write_str("plain"),
        }
    }
}

/// Shorten an id to `first10...last4` unless full ids are requested
pub fn format_id(id: &str, show_full: bool) -> String {
    let chars: Vec<char> = id.chars().collect();
    if show_full || chars.len() <= 14 {
        return id.to_string();
    }
    let head: String = chars[..10].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Format a duration as `{h}h {m}m {s}s`
pub fn format_duration(duration: chrono::Duration) -> String {
    let total = duration.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{}h {}m {}s", hours, minutes, seconds)
}

fn elapsed_or(intent: &AlertIntent, sentinel: &str) -> String {
    intent
        .elapsed()
        .map(format_duration)
        .unwrap_or_else(|| sentinel.to_string())
}

/// Title, then (label, value, is_id) rows
fn fields(
    intent: &AlertIntent,
    target: &TargetConfig,
) -> (String, Vec<(&'static str, String, bool)>) {
    let network = &target.name;
    let subject = format_id(&intent.subject, target.show_full_id);
    let balance = intent.balance.unwrap_or(target.min_balance);

    match intent.kind {
        AlertKind::Delinquent => (
            format!("⚠️ ALERT: {} VALIDATOR DELINQUENT ⚠️", network),
            vec![
                ("Validator", subject, true),
                ("Time in this state", elapsed_or(intent, "just detected"), false),
                ("Network", network.clone(), false),
            ],
        ),
        AlertKind::Recovery => (
            format!("✅ RECOVERED: {} VALIDATOR ACTIVE AGAIN ✅", network),
            vec![
                ("Validator", subject, true),
                ("Time in delinquent state", elapsed_or(intent, "unknown time"), false),
                ("Network", network.clone(), false),
            ],
        ),
        AlertKind::LowBalance => (
            format!("{} IDENTITY LOW BALANCE", network),
            vec![
                ("Account", subject, true),
                ("Balance", format!("◎{:.2} SOL", balance), false),
                ("Suggested", format!("◎{} SOL", target.min_balance), false),
                ("Time in this state", elapsed_or(intent, "just detected"), false),
            ],
        ),
        AlertKind::BalanceRecovery => (
            format!(
                "✅ BALANCE RECOVERED: {} IDENTITY BALANCE NORMAL ✅",
                network
            ),
            vec![
                ("Account", subject, true),
                ("Current Balance", format!("◎{:.2} SOL", balance), false),
                ("Suggested", format!("◎{} SOL", target.min_balance), false),
                (
                    "Time in low balance state",
                    elapsed_or(intent, "unknown time"),
                    false,
                ),
            ],
        ),
    }
}

/// Render an intent for one platform
pub fn render(intent: &AlertIntent, target: &TargetConfig, platform: Platform) -> String {
    let (title, rows) = fields(intent, target);

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(match platform {
        Platform::Discord => format!("**{}**", title),
        Platform::Telegram => format!("*{}*", title),
        Platform::Plain => title,
    });
    for (label, value, is_id) in rows {
        lines.push(match platform {
            Platform::Discord => format!("**{}:** {}", label, value),
            Platform::Telegram if is_id => format!("*{}*: `{}`", label, value),
            Platform::Telegram => format!("*{}:* {}", label, value),
            Platform::Plain => format!("{}: {}", label, value),
        });
    }
    lines.join("\n")
}

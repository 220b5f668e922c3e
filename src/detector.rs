//! Status line event extraction
//!
//! Maps one raw watchtower line to at most one [`Event`]. Patterns are tried
//! in the order of [`PATTERNS`]; the first one that matches and yields a
//! well-formed event wins.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

/// Periodic "everything is fine" datapoint
pub const SANITY_OK: &str = r"datapoint: watchtower-sanity ok=true";
/// Generic all-clear after a failure streak
pub const ALL_CLEAR: &str = r"All clear after";
/// A validator reported delinquent
pub const DELINQUENT: &str = r"delinquent sanity failure: (\w+) delinquent";
/// A validator reported active again
pub const NOW_ACTIVE: &str = r"validator (\w+) is now active";
/// Balance reported as a sanity failure
pub const BALANCE_FAILURE: &str = r"balance sanity failure: (\w+) has ◎([\d.]+)";
/// Balance reported as a plain error line
pub const BALANCE_ERROR: &str = r"Error: balance: (\w+) has ◎([\d.]+)";

/// Which entities a recovery signal applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryScope {
    All,
    Entity(String),
}

/// A structured event extracted from a status line
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    DelinquentDetected(String),
    Recovery(RecoveryScope),
    BalanceObserved { account: String, balance: f64 },
    /// Sanity ok: bulk balance recovery followed by recovery of all entities
    SanityOk,
}

type Constructor = fn(&Captures) -> Option<Event>;

lazy_static! {
    /// Ordered (name, pattern, constructor) table
    pub static ref PATTERNS: Vec<(&'static str, Regex, Constructor)> = vec![
        ("sanity_ok", compile(SANITY_OK), sanity_ok_event as Constructor),
        ("all_clear", compile(ALL_CLEAR), all_clear_event as Constructor),
        ("delinquent", compile(DELINQUENT), delinquent_event as Constructor),
        ("now_active", compile(NOW_ACTIVE), now_active_event as Constructor),
        ("balance_failure", compile(BALANCE_FAILURE), balance_event as Constructor),
        ("balance_error", compile(BALANCE_ERROR), balance_event as Constructor),
    ];
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid pattern")
}

fn sanity_ok_event(_: &Captures) -> Option<Event> {
    Some(Event::SanityOk)
}

fn all_clear_event(_: &Captures) -> Option<Event> {
    Some(Event::Recovery(RecoveryScope::All))
}

fn delinquent_event(captures: &Captures) -> Option<Event> {
    Some(Event::DelinquentDetected(captures[1].to_string()))
}

fn now_active_event(captures: &Captures) -> Option<Event> {
    Some(Event::Recovery(RecoveryScope::Entity(captures[1].to_string())))
}

fn balance_event(captures: &Captures) -> Option<Event> {
    let raw = &captures[2];
    match raw.parse::<f64>() {
        Ok(balance) if balance.is_finite() => Some(Event::BalanceObserved {
            account: captures[1].to_string(),
            balance,
        }),
        _ => {
            tracing::debug!(value = %raw, "Dropping balance line with malformed amount");
            None
        }
    }
}

/// Extract the first event a line carries
pub fn extract(line: &str) -> Option<Event> {
    PATTERNS
        .iter()
        .find_map(|(_, regex, build)| regex.captures(line).and_then(|c| build(&c)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delinquent() {
        let line = "[2024-05-01T10:00:00Z ERROR agave_watchtower] delinquent sanity failure: \
                    7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU delinquent";
        assert_eq!(
            extract(line),
            Some(Event::DelinquentDetected(
                "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU".to_string()
            ))
        );
    }

    #[test]
    fn test_recovery_signals() {
        assert_eq!(
            extract("validator Abc123 is now active"),
            Some(Event::Recovery(RecoveryScope::Entity("Abc123".to_string())))
        );
        assert_eq!(
            extract("INFO agave_watchtower] All clear after 5m"),
            Some(Event::Recovery(RecoveryScope::All))
        );
        assert_eq!(
            extract("datapoint: watchtower-sanity ok=true"),
            Some(Event::SanityOk)
        );
    }

    #[test]
    fn test_sanity_ok_wins_over_later_patterns() {
        let line = "datapoint: watchtower-sanity ok=true All clear after 3m";
        assert_eq!(extract(line), Some(Event::SanityOk));
    }

    #[test]
    fn test_balance_phrasings() {
        assert_eq!(
            extract("balance sanity failure: Acct111 has ◎0.25"),
            Some(Event::BalanceObserved {
                account: "Acct111".to_string(),
                balance: 0.25
            })
        );
        assert_eq!(
            extract("Error: balance: Acct222 has ◎12.5"),
            Some(Event::BalanceObserved {
                account: "Acct222".to_string(),
                balance: 12.5
            })
        );
    }

    #[test]
    fn test_malformed_balance_is_no_event() {
        assert_eq!(extract("balance sanity failure: Acct111 has ◎1.2.3"), None);
        assert_eq!(extract("balance sanity failure: Acct111 has ◎abc"), None);
        assert_eq!(extract("balance sanity failure: Acct111 has ◎."), None);
    }

    #[test]
    fn test_unrelated_lines() {
        assert_eq!(extract(""), None);
        assert_eq!(extract("datapoint: watchtower-sanity ok=false"), None);
        assert_eq!(extract("balance: Acct has ◎1.0"), None);
        assert_eq!(extract("some other watchtower chatter"), None);
    }

    #[test]
    fn test_pattern_table_order() {
        let names: Vec<&str> = PATTERNS.iter().map(|(name, _, _)| *name).collect();
        assert_eq!(
            names,
            vec![
                "sanity_ok",
                "all_clear",
                "delinquent",
                "now_active",
                "balance_failure",
                "balance_error"
            ]
        );
    }
}

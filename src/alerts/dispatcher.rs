//! Fan-out of alert intents to a target's notifiers

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use super::intent::AlertIntent;
use super::notifier::{Notifier, NotifierError};
use super::render::render;
use crate::config::TargetConfig;

/// Outcome of one dispatch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Renders intents per platform and delivers them to every notifier
pub struct Dispatcher {
    config: Arc<TargetConfig>,
    notifiers: Vec<Box<dyn Notifier>>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(config: Arc<TargetConfig>, timeout: Duration) -> Self {
        Self {
            config,
            notifiers: Vec::new(),
            timeout,
        }
    }

    /// Add a notifier
    pub fn add_notifier(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    /// Get number of notifiers
    pub fn notifier_count(&self) -> usize {
        self.notifiers.len()
    }

    /// Deliver one intent to all notifiers concurrently.
    ///
    /// Failures are logged per notifier and never propagate; each delivery
    /// is cut off after the configured timeout.
    pub async fn dispatch(&self, intent: &AlertIntent) -> DispatchReport {
        let deliveries = self.notifiers.iter().map(|notifier| async move {
            let text = render(intent, &self.config, notifier.platform());
            tracing::info!(
                validator = %self.config.id,
                channel = notifier.name(),
                kind = %intent.kind,
                subject = %intent.subject,
                "Sending alert"
            );
            let result = match tokio::time::timeout(self.timeout, notifier.deliver(&text)).await {
                Ok(result) => result,
                Err(_) => Err(NotifierError::Timeout(self.timeout)),
            };
            if let Err(e) = &result {
                tracing::error!(
                    validator = %self.config.id,
                    channel = notifier.name(),
                    kind = %intent.kind,
                    error = %e,
                    "Failed to deliver alert"
                );
            }
            result.is_ok()
        });

        let results = join_all(deliveries).await;
        let delivered = results.iter().filter(|ok| **ok).count();
        DispatchReport {
            delivered,
            failed: results.len() - delivered,
        }
    }

    /// Deliver intents one after another, in decision order
    pub async fn dispatch_all(&self, intents: &[AlertIntent]) -> DispatchReport {
        let mut report = DispatchReport::default();
        for intent in intents {
            let r = self.dispatch(intent).await;
            report.delivered += r.delivered;
            report.failed += r.failed;
        }
        report
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::alerts::render::Platform;
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;

    /// Records what it receives; optionally fails or hangs
    pub(crate) struct RecordingNotifier {
        pub platform: Platform,
        pub fail: bool,
        pub hang: bool,
        pub received: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingNotifier {
        pub(crate) fn new(platform: Platform) -> (Self, Arc<Mutex<Vec<String>>>) {
            let received = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    platform,
                    fail: false,
                    hang: false,
                    received: Arc::clone(&received),
                },
                received,
            )
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn deliver(&self, text: &str) -> Result<(), NotifierError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.fail {
                return Err(NotifierError::Webhook("boom".to_string()));
            }
            self.received.lock().push(text.to_string());
            Ok(())
        }

        fn platform(&self) -> Platform {
            self.platform
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn config() -> Arc<TargetConfig> {
        Arc::new(TargetConfig::new("mainnet", "Identity"))
    }

    fn intent() -> AlertIntent {
        AlertIntent::delinquent("mainnet", "Val1", None, Utc::now())
    }

    #[tokio::test]
    async fn test_renders_per_platform() {
        let mut dispatcher = Dispatcher::new(config(), Duration::from_secs(1));
        let (discord, discord_rx) = RecordingNotifier::new(Platform::Discord);
        let (telegram, telegram_rx) = RecordingNotifier::new(Platform::Telegram);
        dispatcher.add_notifier(Box::new(discord));
        dispatcher.add_notifier(Box::new(telegram));

        let report = dispatcher.dispatch(&intent()).await;
        assert_eq!(report, DispatchReport { delivered: 2, failed: 0 });
        assert!(discord_rx.lock()[0].contains("**Validator:** Val1"));
        assert!(telegram_rx.lock()[0].contains("*Validator*: `Val1`"));
    }

    #[tokio::test]
    async fn test_failure_does_not_block_others() {
        let mut dispatcher = Dispatcher::new(config(), Duration::from_secs(1));
        let (mut failing, _) = RecordingNotifier::new(Platform::Discord);
        failing.fail = true;
        let (ok, ok_rx) = RecordingNotifier::new(Platform::Plain);
        dispatcher.add_notifier(Box::new(failing));
        dispatcher.add_notifier(Box::new(ok));

        let report = dispatcher.dispatch(&intent()).await;
        assert_eq!(report, DispatchReport { delivered: 1, failed: 1 });
        assert_eq!(ok_rx.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_hung_notifier_times_out() {
        let mut dispatcher = Dispatcher::new(config(), Duration::from_millis(100));
        let (mut hung, _) = RecordingNotifier::new(Platform::Discord);
        hung.hang = true;
        let (ok, ok_rx) = RecordingNotifier::new(Platform::Telegram);
        dispatcher.add_notifier(Box::new(hung));
        dispatcher.add_notifier(Box::new(ok));

        let report = dispatcher.dispatch(&intent()).await;
        assert_eq!(report, DispatchReport { delivered: 1, failed: 1 });
        assert_eq!(ok_rx.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_no_notifiers() {
        let dispatcher = Dispatcher::new(config(), Duration::from_secs(1));
        assert_eq!(dispatcher.notifier_count(), 0);
        let report = dispatcher.dispatch_all(&[intent(), intent()]).await;
        assert_eq!(report, DispatchReport::default());
    }
}

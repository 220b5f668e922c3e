//! Per-target worker
//!
//! One supervisor owns one target's line source. Lines, sweep ticks and the
//! shutdown signal share a single `select!` loop, so the engine and the
//! sweeper never touch the target's state at the same time.

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::{self, Interval, MissedTickBehavior};

use super::source::{SourceConnector, SourceError};
use crate::alerts::{sweep, AlertEngine, DispatchReport, Dispatcher};
use crate::detector;
use crate::state::Target;

/// Upper bound on the delay between reconnect attempts
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

fn reconnect_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_secs(1),
        max_interval: MAX_RECONNECT_DELAY,
        max_elapsed_time: None,
        multiplier: 2.0,
        ..Default::default()
    }
}

enum StreamEnd {
    Shutdown,
    Closed,
    Failed(SourceError),
}

/// Drives one target: reads lines, applies them, sweeps, reconnects
pub struct TargetSupervisor {
    engine: AlertEngine,
    dispatcher: Dispatcher,
    connector: Box<dyn SourceConnector>,
    sweep_interval: Duration,
    backoff: ExponentialBackoff,
}

impl TargetSupervisor {
    pub fn new(
        engine: AlertEngine,
        dispatcher: Dispatcher,
        connector: Box<dyn SourceConnector>,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            engine,
            dispatcher,
            connector,
            // tokio intervals must be non-zero
            sweep_interval: sweep_interval.max(Duration::from_millis(1)),
            backoff: reconnect_backoff(),
        }
    }

    /// Override the reconnect schedule
    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn target(&self) -> &Arc<Target> {
        self.engine.target()
    }

    /// Apply one raw log line and deliver whatever it triggers
    pub async fn handle_line(&self, line: &str, now: DateTime<Utc>) -> DispatchReport {
        let line = line.trim();
        if line.is_empty() {
            return DispatchReport::default();
        }
        tracing::debug!(validator = %self.target().id(), "{}", line);

        match detector::extract(line) {
            Some(event) => {
                let intents = self.engine.handle(event, now).await;
                self.dispatcher.dispatch_all(&intents).await
            }
            None => DispatchReport::default(),
        }
    }

    /// Run one periodic sweep and deliver its alerts
    pub async fn tick(&self, now: DateTime<Utc>) -> DispatchReport {
        let intents = sweep(self.target(), now);
        self.dispatcher.dispatch_all(&intents).await
    }

    /// Run until `shutdown` flips to true or its sender goes away
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let id = self.target().id().to_string();
        let mut backoff = self.backoff.clone();
        let mut ticker = time::interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        tracing::info!(
            validator = %id,
            source = %self.connector.describe(),
            "Monitor started"
        );

        while !*shutdown.borrow() {
            let end = match self.connector.connect().await {
                Ok(mut source) => {
                    tracing::info!(validator = %id, "Connected to log source");
                    loop {
                        tokio::select! {
                            _ = shutdown.changed() => break StreamEnd::Shutdown,
                            _ = ticker.tick() => {
                                self.tick(Utc::now()).await;
                            }
                            line = source.next_line() => match line {
                                Ok(Some(line)) => {
                                    backoff.reset();
                                    self.handle_line(&line, Utc::now()).await;
                                }
                                Ok(None) => break StreamEnd::Closed,
                                Err(e) => break StreamEnd::Failed(e),
                            }
                        }
                    }
                }
                Err(e) => StreamEnd::Failed(e),
            };

            match end {
                StreamEnd::Shutdown => break,
                StreamEnd::Closed => tracing::warn!(validator = %id, "Log source ended"),
                StreamEnd::Failed(e) => {
                    tracing::error!(validator = %id, error = %e, "Log source failed")
                }
            }

            let delay = backoff
                .next_backoff()
                .unwrap_or(MAX_RECONNECT_DELAY)
                .min(MAX_RECONNECT_DELAY);
            tracing::info!(validator = %id, delay = ?delay, "Reconnecting to log source");
            if !self.wait(delay, &mut ticker, &mut shutdown).await {
                break;
            }
        }

        tracing::info!(validator = %id, "Monitor stopped");
    }

    /// Sleep before reconnecting while still sweeping. Returns false on shutdown.
    async fn wait(
        &self,
        delay: Duration,
        ticker: &mut Interval,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let sleep = time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = shutdown.changed() => return false,
                _ = ticker.tick() => {
                    self.tick(Utc::now()).await;
                }
                _ = &mut sleep => return true,
            }
        }
    }
}

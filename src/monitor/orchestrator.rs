//! Starts one supervisor per target and stops them together

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::source::JournalConnector;
use super::supervisor::TargetSupervisor;
use crate::alerts::{
    build_notifiers, http_client, AlertEngine, BalanceSource, CliBalanceSource, Dispatcher,
    LogNotifier,
};
use crate::config::MonitorConfig;
use crate::state::Target;

/// Owns the per-target supervisors until they are started
#[derive(Default)]
pub struct Orchestrator {
    supervisors: Vec<TargetSupervisor>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire up every configured target for production use
    pub fn from_config(config: &MonitorConfig) -> Self {
        let client = http_client(config.webhook_timeout);
        let mut orchestrator = Self::new();

        for target_config in &config.targets {
            let target = Arc::new(Target::new(target_config.clone()));

            let balances: Arc<dyn BalanceSource> = Arc::new(CliBalanceSource::new(
                &config.solana_bin,
                &target_config.rpc_url,
                config.balance_timeout,
            ));
            let engine = AlertEngine::new(Arc::clone(&target), balances);

            let mut dispatcher =
                Dispatcher::new(Arc::clone(&target.config), config.webhook_timeout);
            for notifier in build_notifiers(
                target_config,
                &client,
                config.telegram_bot_token.as_deref(),
            ) {
                dispatcher.add_notifier(notifier);
            }
            if dispatcher.notifier_count() == 0 {
                tracing::warn!(
                    validator = %target_config.id,
                    "No notification channels available, alerts go to the log only"
                );
                dispatcher.add_notifier(Box::new(LogNotifier));
            }

            let connector = JournalConnector::new(&target_config.service);
            orchestrator.add_supervisor(TargetSupervisor::new(
                engine,
                dispatcher,
                Box::new(connector),
                config.sweep_interval,
            ));
        }

        orchestrator
    }

    pub fn add_supervisor(&mut self, supervisor: TargetSupervisor) {
        self.supervisors.push(supervisor);
    }

    /// Targets in start order
    pub fn targets(&self) -> Vec<Arc<Target>> {
        self.supervisors
            .iter()
            .map(|s| Arc::clone(s.target()))
            .collect()
    }

    /// Spawn every supervisor on its own task
    pub fn start(self) -> OrchestratorHandle {
        let (shutdown_tx, _) = watch::channel(false);
        let tasks = self
            .supervisors
            .into_iter()
            .map(|supervisor| {
                let id = supervisor.target().id().to_string();
                let handle = tokio::spawn(supervisor.run(shutdown_tx.subscribe()));
                (id, handle)
            })
            .collect::<Vec<_>>();

        tracing::info!("Started {} validator monitor(s)", tasks.len());
        OrchestratorHandle { shutdown_tx, tasks }
    }

    /// Run until `signal` resolves, then stop every supervisor
    pub async fn run<F>(self, signal: F)
    where
        F: Future<Output = ()>,
    {
        let handle = self.start();
        signal.await;
        handle.shutdown().await;
    }
}

/// Running supervisors plus the switch that stops them
pub struct OrchestratorHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl OrchestratorHandle {
    /// A receiver that observes the same shutdown signal
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Signal shutdown and wait for every supervisor to exit
    pub async fn shutdown(self) {
        tracing::info!("Shutdown signal received, stopping monitors...");
        // No receivers left is fine: every supervisor already exited
        let _ = self.shutdown_tx.send(true);

        for (id, task) in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(validator = %id, error = %e, "Monitor task failed");
            }
        }
        tracing::info!("All monitors stopped");
    }
}

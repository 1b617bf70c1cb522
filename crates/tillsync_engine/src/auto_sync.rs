//! Background sync driver.

use crate::listeners::Subscription;
use crate::orchestrator::SyncOrchestrator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Runs full syncs periodically and whenever the device comes back online.
///
/// The first sync starts as soon as the driver is spawned. Triggers that
/// arrive while a sync is running are refused by the orchestrator and
/// dropped.
pub struct AutoSync {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
    _reconnect: Subscription,
}

impl AutoSync {
    /// Spawns the driver on the current tokio runtime.
    pub fn spawn(orchestrator: Arc<SyncOrchestrator>, interval: Duration) -> Self {
        let reconnected = Arc::new(Notify::new());
        let signal = Arc::clone(&reconnected);
        let reconnect = orchestrator.connectivity().subscribe(Box::new(move |online| {
            if online {
                signal.notify_one();
            }
        }));

        let (shutdown, mut stop) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    _ = ticker.tick() => run(&orchestrator, "interval").await,
                    _ = reconnected.notified() => run(&orchestrator, "reconnect").await,
                }
            }
            tracing::debug!("auto-sync stopped");
        });

        tracing::info!(?interval, "auto-sync started");
        Self {
            shutdown: Some(shutdown),
            handle,
            _reconnect: reconnect,
        }
    }

    /// Spawns the driver if the orchestrator's config sets a sync interval.
    pub fn from_config(orchestrator: Arc<SyncOrchestrator>) -> Option<Self> {
        let interval = orchestrator.config().sync_interval?;
        Some(Self::spawn(orchestrator, interval))
    }

    /// Stops the driver and waits for a running sync to finish.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            tracing::warn!(error = %e, "auto-sync task ended abnormally");
        }
    }
}

impl Drop for AutoSync {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl std::fmt::Debug for AutoSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoSync")
            .field("running", &!self.handle.is_finished())
            .finish()
    }
}

async fn run(orchestrator: &SyncOrchestrator, trigger: &'static str) {
    let report = orchestrator.perform_full_sync().await;
    if report.is_rejected() {
        tracing::debug!(trigger, "sync already running; trigger dropped");
    } else if report.success {
        tracing::debug!(trigger, "automatic sync succeeded");
    } else {
        tracing::warn!(trigger, errors = ?report.errors, "automatic sync failed");
    }
}

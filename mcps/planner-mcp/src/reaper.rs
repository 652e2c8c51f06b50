//! Background sweeps over the client cache and the session registry
//!
//! Two independent interval tasks, one per registry, each evicting whatever
//! has expired since the previous tick. [`Reaper::shutdown`] stops both and
//! then releases everything still held.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::resolver::ClientResolver;

pub struct Reaper {
    resolver: Arc<ClientResolver>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    drained: AtomicBool,
}

impl Reaper {
    /// Spawn the sweeps. In single-tenant mode nothing expires, so no task is
    /// started and only [`shutdown`](Self::shutdown) has any effect.
    pub fn start(
        resolver: Arc<ClientResolver>,
        client_interval: Duration,
        session_interval: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        if let Some(cache) = resolver.client_cache() {
            let cache = cache.clone();
            tasks.push(spawn_sweep("client", client_interval, cancel.clone(), move || {
                let cache = cache.clone();
                async move { cache.sweep_expired().await }
            }));

            let sessions = resolver.clone();
            tasks.push(spawn_sweep("session", session_interval, cancel.clone(), move || {
                let resolver = sessions.clone();
                async move {
                    match resolver.sessions() {
                        Some(sessions) => sessions.sweep_expired().await,
                        None => 0,
                    }
                }
            }));

            info!(
                client_interval_secs = client_interval.as_secs(),
                session_interval_secs = session_interval.as_secs(),
                "reaper started"
            );
        }

        Self {
            resolver,
            cancel,
            tasks: Mutex::new(tasks),
            drained: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.tasks.lock().is_empty()
    }

    /// Stop both sweeps. Safe to call more than once.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            self.cancel.cancel();
            debug!("reaper stopped");
        }
    }

    /// Stop the sweeps, wait for a sweep in progress to finish, then close
    /// every session and log out every client. Only the first call drains.
    pub async fn shutdown(&self) {
        self.stop();

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "sweep task ended abnormally");
            }
        }

        if self.drained.swap(true, Ordering::SeqCst) {
            debug!("shutdown drain already done");
            return;
        }
        info!("draining sessions and clients");
        self.resolver.cleanup_all().await;
    }
}

fn spawn_sweep<F, Fut>(
    kind: &'static str,
    period: Duration,
    cancel: CancellationToken,
    sweep: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = usize> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = sweep().await;
                    debug!(kind, evicted, "sweep finished");
                }
            }
        }
        debug!(kind, "sweep task exiting");
    })
}

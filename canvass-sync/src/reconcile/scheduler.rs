//! Fixed-interval scheduling of reconciler passes
//!
//! Each reconciler gets its own task and timer; timers never wait on each
//! other. A tick that arrives while a pass is still running is skipped rather
//! than queued. Cancelling the shutdown token stops every timer and lets an
//! in-flight pass stop after its current submission.

use super::Reconciler;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct Scheduler {
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Start running `reconciler` every `period`, first pass immediately
    pub fn spawn(&mut self, reconciler: Arc<dyn Reconciler>, period: Duration) {
        let shutdown = self.shutdown.clone();
        info!(reconciler = reconciler.name(), period_secs = period.as_secs(), "Scheduling reconciler");

        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = reconciler.run_once(&shutdown).await {
                            warn!(reconciler = reconciler.name(), error = %e, "Reconcile pass aborted");
                        }
                    }
                }
            }

            info!(reconciler = reconciler.name(), "Reconciler stopped");
        }));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every reconciler task to stop
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Reconciler task ended abnormally");
            }
        }
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
//! Background refresh and evolution loop.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::binder::Binder;
use crate::evolve::VerifyReport;
use crate::global::RefreshReport;
use crate::schema::SchemaCatalog;

/// What one worker cycle did. Failed steps are logged and left at their default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub refresh: Option<RefreshReport>,
    pub pruned: usize,
    pub captured: usize,
    pub flushed: usize,
    pub verify: VerifyReport,
    pub purged: u64,
}

/// Run one maintenance cycle: incremental refresh, prune, capture, flush +
/// verify, then purge expired tombstones.
///
/// Capture and evolution only run when enabled in the binder's config.
pub async fn run_cycle(binder: &Binder, catalog: &dyn SchemaCatalog) -> CycleReport {
    let config = binder.config();
    let global = binder.global();
    let mut report = CycleReport::default();

    match global.refresh(false).await {
        Ok(refresh) => report.refresh = Some(refresh),
        Err(e) => warn!(error = %e, "binding refresh failed"),
    }

    match global.prune_invalid(catalog).await {
        Ok(pruned) => report.pruned = pruned,
        Err(e) => warn!(error = %e, "binding prune failed"),
    }

    if config.capture_plan_baselines {
        match binder.evolution().capture(binder.summary().as_ref()).await {
            Ok(captured) => report.captured = captured,
            Err(e) => warn!(error = %e, "plan capture failed"),
        }
    }

    if config.evolve_plan_baselines {
        match binder.evolution().flush().await {
            Ok(flushed) => report.flushed = flushed,
            Err(e) => warn!(error = %e, "evolution flush failed"),
        }
        match binder.evolution().verify().await {
            Ok(verify) => report.verify = verify,
            Err(e) => warn!(error = %e, "evolution verify failed"),
        }
    }

    let cutoff = i64::try_from(config.tombstone_retention_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|retention| Utc::now().checked_sub_signed(retention));
    if let Some(cutoff) = cutoff {
        match global.purge_tombstones(cutoff).await {
            Ok(purged) => report.purged = purged,
            Err(e) => warn!(error = %e, "tombstone purge failed"),
        }
    }

    debug!(?report, "binding worker cycle done");
    report
}

/// Handle on the spawned maintenance task.
pub struct BindWorker {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl BindWorker {
    /// Spawn the loop on the current runtime, ticking every `lease_ms`.
    ///
    /// Returns `None` when the lease is 0.
    pub fn spawn(binder: Arc<Binder>, catalog: Arc<dyn SchemaCatalog>) -> Option<Self> {
        let lease = binder.config().lease()?;
        let (shutdown, mut stopped) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(lease);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(lease_ms = lease.as_millis() as u64, "binding worker started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run_cycle(&binder, catalog.as_ref()).await;
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("binding worker stopped");
        });

        Some(Self { shutdown, task })
    }

    /// Stop scheduling cycles and wait for the task. A cycle in progress
    /// runs to completion.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "binding worker task ended abnormally");
        }
    }
}

impl std::fmt::Debug for BindWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindWorker")
            .field("finished", &self.task.is_finished())
            .finish_non_exhaustive()
    }
}

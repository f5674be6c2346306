//! Background sync scheduling.
//!
//! One worker task per entity drives the periodic cadence. Immediate
//! triggers (fired after local mutations) ride the same worker through a
//! single-slot command channel, so a burst of mutations coalesces into
//! one run instead of queueing one run each. Retry with capped
//! exponential backoff lives here rather than in the replicators, and an
//! exhausted retry ends quietly: the unsynced flags keep the work visible
//! for the next scheduled cycle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{Error, Result};

use super::connectivity::ConnectivityHandle;
use super::record::EntityKind;
use super::replicator::Replicate;

/// Retry behavior for a single scheduled sync run
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per run, counting the first one
    pub max_attempts: u32,
    /// Wait before the first retry; doubles on each retry after that
    pub base_delay: Duration,
    /// Backoff ceiling
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (zero-based)
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

enum WorkerCommand {
    TriggerNow,
    Shutdown,
}

struct WorkerHandle {
    commands: mpsc::Sender<WorkerCommand>,
    task: JoinHandle<()>,
}

/// Owns the background workers that keep entities replicated.
///
/// All methods are synchronous; the scheduler only ever hands work to
/// spawned tasks, so callers can nudge it from non-async code.
pub struct SyncScheduler {
    replicators: HashMap<EntityKind, Arc<dyn Replicate>>,
    workers: Mutex<HashMap<EntityKind, WorkerHandle>>,
    connectivity: ConnectivityHandle,
    retry: RetryPolicy,
}

impl SyncScheduler {
    #[must_use]
    pub fn new(
        replicators: Vec<Arc<dyn Replicate>>,
        connectivity: ConnectivityHandle,
        retry: RetryPolicy,
    ) -> Self {
        let replicators = replicators
            .into_iter()
            .map(|replicator| (replicator.entity(), replicator))
            .collect();
        Self {
            replicators,
            workers: Mutex::new(HashMap::new()),
            connectivity,
            retry,
        }
    }

    /// Start periodic sync for an entity. The first run happens right
    /// away; re-registering an already scheduled entity keeps the
    /// existing worker and its cadence.
    pub fn schedule_periodic(&self, entity: EntityKind, period: Duration) -> Result<()> {
        let replicator = self.replicator(entity)?;
        let mut workers = self.workers();

        if let Some(existing) = workers.get(&entity) {
            if !existing.task.is_finished() {
                tracing::debug!("Periodic {entity} sync already scheduled, keeping existing job");
                return Ok(());
            }
        }

        let (commands, inbox) = mpsc::channel(1);
        let task = tokio::spawn(worker_loop(
            replicator,
            self.connectivity.clone(),
            self.retry.clone(),
            period,
            inbox,
        ));
        workers.insert(entity, WorkerHandle { commands, task });
        tracing::info!("Scheduled periodic {entity} sync every {period:?}");
        Ok(())
    }

    /// Ask for a sync soon after a local mutation. Returns immediately.
    /// When a trigger is already waiting, the new one merges into it;
    /// without a periodic worker the run happens on a detached task.
    pub fn trigger_immediate(&self, entity: EntityKind) -> Result<()> {
        let replicator = self.replicator(entity)?;

        {
            let workers = self.workers();
            if let Some(worker) = workers.get(&entity) {
                if !worker.task.is_finished() {
                    match worker.commands.try_send(WorkerCommand::TriggerNow) {
                        Ok(()) => {
                            tracing::debug!("Queued immediate {entity} sync");
                            return Ok(());
                        }
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            // A run is already pending; this trigger merges
                            // into it
                            tracing::debug!("Immediate {entity} sync coalesced into pending run");
                            return Ok(());
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {}
                    }
                }
            }
        }

        // No live worker; run one detached cycle under the usual retry rules
        let connectivity = self.connectivity.clone();
        let retry = self.retry.clone();
        tokio::spawn(async move {
            run_with_retry(replicator.as_ref(), &connectivity, &retry).await;
        });
        Ok(())
    }

    /// Stop periodic sync for an entity. A cycle already in flight
    /// finishes first when possible.
    pub fn cancel_periodic(&self, entity: EntityKind) {
        if let Some(worker) = self.workers().remove(&entity) {
            if worker.commands.try_send(WorkerCommand::Shutdown).is_err() {
                worker.task.abort();
            }
            tracing::info!("Cancelled periodic {entity} sync");
        }
    }

    /// True while a periodic worker for the entity is alive
    #[must_use]
    pub fn is_scheduled(&self, entity: EntityKind) -> bool {
        self.workers()
            .get(&entity)
            .is_some_and(|worker| !worker.task.is_finished())
    }

    /// Stop every worker. Cycles cut off mid-flight leave their records
    /// unsynced, and the flags are the source of truth.
    pub fn shutdown(&self) {
        let mut workers = self.workers();
        for (entity, worker) in workers.drain() {
            worker.task.abort();
            tracing::debug!("Stopped {entity} sync worker");
        }
    }

    fn replicator(&self, entity: EntityKind) -> Result<Arc<dyn Replicate>> {
        self.replicators
            .get(&entity)
            .cloned()
            .ok_or_else(|| Error::Sync(format!("no replicator registered for {entity}")))
    }

    fn workers(&self) -> MutexGuard<'_, HashMap<EntityKind, WorkerHandle>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn worker_loop(
    replicator: Arc<dyn Replicate>,
    connectivity: ConnectivityHandle,
    retry: RetryPolicy,
    period: Duration,
    mut inbox: mpsc::Receiver<WorkerCommand>,
) {
    let mut ticker = tokio::time::interval(period);
    // Ticks missed while a slow cycle ran should collapse into one
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_with_retry(replicator.as_ref(), &connectivity, &retry).await;
            }
            command = inbox.recv() => match command {
                Some(WorkerCommand::TriggerNow) => {
                    run_with_retry(replicator.as_ref(), &connectivity, &retry).await;
                }
                Some(WorkerCommand::Shutdown) | None => break,
            },
        }
    }
}

/// Run one sync under the retry policy. Offline checks fail fast and
/// still consume an attempt. Exhaustion is quiet; the records stay
/// flagged for the next cycle.
async fn run_with_retry(
    replicator: &dyn Replicate,
    connectivity: &ConnectivityHandle,
    retry: &RetryPolicy,
) {
    let entity = replicator.entity();
    for attempt in 0..retry.max_attempts {
        if attempt > 0 {
            tokio::time::sleep(retry.delay_for(attempt - 1)).await;
        }

        if !connectivity.is_online() {
            tracing::debug!(
                "Device offline, {entity} sync attempt {} failed fast",
                attempt + 1
            );
            continue;
        }

        if replicator.run_sync().await.is_success() {
            return;
        }
        tracing::warn!(
            "{entity} sync attempt {} of {} failed",
            attempt + 1,
            retry.max_attempts
        );
    }
    tracing::debug!("{entity} sync retries exhausted, leaving records for the next cycle");
}

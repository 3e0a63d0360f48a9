//! Synchronization coordinator.
//!
//! Owns the bounded pending queue and drives each cycle through
//! `Detecting → Resolving → Applying → Broadcasting` and back to `Idle`.
//!
//! A cycle is time-boxed by `sync.syncTimeoutMs`. Cache writes are staged
//! during `Applying` and committed in one batch at the very end, and only if
//! the deadline has not passed. A cycle that times out therefore leaves the
//! cache exactly as it found it, and its changes are not re-queued.
//!
//! Cycles on one coordinator run one at a time. `add_change` never waits for
//! a cycle.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ctxsync_core::{ContextChange, CycleId, SharedClock};
use ctxsync_settings::SyncSettings;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::applier::ChangeApplier;
use crate::cache::{BatchSummary, ContextCache};
use crate::conflict::{ConflictResolver, ResolutionRecord};
use crate::errors::SyncError;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Where a cycle currently is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// No cycle running.
    #[default]
    Idle,
    /// Taking in the batch.
    Collecting,
    /// Grouping changes by conflict key.
    Detecting,
    /// Applying the conflict strategy.
    Resolving,
    /// Staging cache writes.
    Applying,
    /// Publishing the resolved batch.
    Broadcasting,
}

/// Receives each resolved batch before it is committed.
#[async_trait]
pub trait ChangePublisher: Send + Sync {
    /// Publish `changes` for cycle `cycle_id`. A failure is logged; the
    /// cycle still commits.
    async fn publish(&self, cycle_id: &CycleId, changes: &[ContextChange]) -> Result<(), SyncError>;
}

/// Notification sent to in-process subscribers after a commit.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncEvent {
    /// Cycle that committed.
    pub cycle_id: CycleId,
    /// Changes applied.
    pub changes: Vec<ContextChange>,
    /// Cache effect.
    pub summary: BatchSummary,
    /// Commit time, Unix seconds.
    pub completed_at: f64,
}

/// Result of one `sync` call.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SyncOutcome {
    /// Cycle identifier.
    pub cycle_id: CycleId,
    /// Whether the cycle committed.
    pub success: bool,
    /// Changes handed to the cycle.
    pub received: usize,
    /// Changes written to the cache.
    pub applied: usize,
    /// Changes rejected by validation.
    pub rejected: usize,
    /// Conflict sets found.
    pub conflicts_detected: usize,
    /// Conflict sets resolved.
    pub conflicts_resolved: usize,
    /// Wall time of the cycle.
    pub duration_ms: u64,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncOutcome {
    fn empty(cycle_id: CycleId) -> Self {
        Self {
            cycle_id,
            success: true,
            received: 0,
            applied: 0,
            rejected: 0,
            conflicts_detected: 0,
            conflicts_resolved: 0,
            duration_ms: 0,
            error: None,
        }
    }
}

/// Coordinator counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SyncStats {
    /// Cycles begun.
    pub cycles_started: u64,
    /// Cycles committed.
    pub cycles_succeeded: u64,
    /// Cycles that failed (timeouts included).
    pub cycles_failed: u64,
    /// Cycles abandoned at the deadline.
    pub cycles_timed_out: u64,
    /// Changes handed to cycles.
    pub changes_received: u64,
    /// Changes written to the cache.
    pub changes_applied: u64,
    /// Changes rejected by validation.
    pub changes_failed: u64,
    /// Changes evicted from a full queue.
    pub changes_dropped: u64,
    /// Conflict sets found.
    pub conflicts_detected: u64,
    /// Conflict sets resolved.
    pub conflicts_resolved: u64,
    /// Duration of the most recent cycle.
    pub last_cycle_ms: u64,
    /// Sum of all cycle durations.
    pub total_cycle_ms: u64,
    /// Changes waiting in the queue.
    pub pending: usize,
}

impl SyncStats {
    /// Mean cycle duration over finished cycles.
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_cycle_ms(&self) -> f64 {
        let finished = self.cycles_succeeded + self.cycles_failed;
        if finished == 0 {
            0.0
        } else {
            self.total_cycle_ms as f64 / finished as f64
        }
    }
}

struct CycleReport {
    applied: Vec<ContextChange>,
    rejected: usize,
    conflicts_detected: usize,
    conflicts_resolved: usize,
}

/// Drives synchronization cycles over one cache.
pub struct SyncCoordinator {
    resolver: ConflictResolver,
    applier: ChangeApplier,
    pending: Mutex<VecDeque<ContextChange>>,
    stats: Mutex<SyncStats>,
    phase: Mutex<SyncPhase>,
    cycle_gate: tokio::sync::Mutex<()>,
    events: broadcast::Sender<SyncEvent>,
    publisher: Option<Arc<dyn ChangePublisher>>,
    settings: SyncSettings,
    clock: SharedClock,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("pending", &self.pending.lock().len())
            .field("phase", &*self.phase.lock())
            .field("strategy", &self.resolver.strategy())
            .finish_non_exhaustive()
    }
}

impl SyncCoordinator {
    /// Coordinator writing into `cache`.
    pub fn new(cache: Arc<ContextCache>, settings: SyncSettings, clock: SharedClock) -> Self {
        let resolver = ConflictResolver::new(
            settings.strategy,
            settings.conflict_window_secs,
            settings.resolution_history_limit,
            Arc::clone(&clock),
        );
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            resolver,
            applier: ChangeApplier::new(cache),
            pending: Mutex::new(VecDeque::new()),
            stats: Mutex::new(SyncStats::default()),
            phase: Mutex::new(SyncPhase::Idle),
            cycle_gate: tokio::sync::Mutex::new(()),
            events,
            publisher: None,
            settings,
            clock,
        }
    }

    /// Attach an external publisher for resolved batches.
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<dyn ChangePublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Settings in effect.
    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Enqueue without synchronizing. Returns the change evicted to make
    /// room, if the queue was full.
    pub fn add_change(&self, change: ContextChange) -> Option<ContextChange> {
        let mut pending = self.pending.lock();
        let evicted = if pending.len() >= self.settings.max_pending_changes {
            pending.pop_front()
        } else {
            None
        };
        pending.push_back(change);
        let queued = pending.len();
        drop(pending);

        if let Some(dropped) = &evicted {
            self.stats.lock().changes_dropped += 1;
            warn!(change_id = %dropped.change_id, queued, "pending queue full, dropped oldest change");
        } else {
            trace!(queued, "change queued");
        }
        evicted
    }

    /// Whether a captured change should be synchronized right away.
    pub fn needs_immediate_sync(&self, change: &ContextChange) -> bool {
        change.requires_sync && change.priority >= self.settings.immediate_sync_priority
    }

    /// Changes waiting.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Copy of the queue, oldest first.
    pub fn pending_snapshot(&self) -> Vec<ContextChange> {
        self.pending.lock().iter().cloned().collect()
    }

    /// Current phase.
    pub fn phase(&self) -> SyncPhase {
        *self.phase.lock()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> SyncStats {
        let mut stats = self.stats.lock().clone();
        stats.pending = self.pending_len();
        stats
    }

    /// Recent conflict resolutions, oldest first.
    pub fn resolution_history(&self) -> Vec<ResolutionRecord> {
        self.resolver.history()
    }

    /// Subscribe to post-commit notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Drain the queue and synchronize it.
    pub async fn sync_pending(&self) -> SyncOutcome {
        let drained: Vec<ContextChange> = self.pending.lock().drain(..).collect();
        if drained.is_empty() {
            return SyncOutcome::empty(CycleId::new());
        }
        self.sync(drained).await
    }

    /// Run one full cycle over `changes`, bounded by the sync timeout.
    ///
    /// Either every surviving change is committed or, on timeout, none is.
    #[instrument(skip_all, fields(changes = changes.len()))]
    pub async fn sync(&self, changes: Vec<ContextChange>) -> SyncOutcome {
        let cycle_id = CycleId::new();
        let received = changes.len();
        let timeout = self.settings.sync_timeout();
        let started = Instant::now();
        let deadline = started + timeout;
        {
            let mut stats = self.stats.lock();
            stats.cycles_started += 1;
            stats.changes_received += received as u64;
        }

        let result = match tokio::time::timeout(timeout, self.run_cycle(&cycle_id, changes, deadline)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout {
                timeout_ms: self.settings.sync_timeout_ms,
            }),
        };
        let duration_ms = duration_ms(started.elapsed());

        let mut stats = self.stats.lock();
        stats.last_cycle_ms = duration_ms;
        stats.total_cycle_ms += duration_ms;
        match result {
            Ok(report) => {
                stats.cycles_succeeded += 1;
                stats.changes_applied += report.applied.len() as u64;
                stats.changes_failed += report.rejected as u64;
                stats.conflicts_detected += report.conflicts_detected as u64;
                stats.conflicts_resolved += report.conflicts_resolved as u64;
                drop(stats);
                debug!(cycle_id = %cycle_id, applied = report.applied.len(), duration_ms, "sync cycle committed");
                SyncOutcome {
                    cycle_id,
                    success: true,
                    received,
                    applied: report.applied.len(),
                    rejected: report.rejected,
                    conflicts_detected: report.conflicts_detected,
                    conflicts_resolved: report.conflicts_resolved,
                    duration_ms,
                    error: None,
                }
            }
            Err(err) => {
                stats.cycles_failed += 1;
                if matches!(err, SyncError::Timeout { .. }) {
                    stats.cycles_timed_out += 1;
                }
                drop(stats);
                warn!(cycle_id = %cycle_id, error = %err, received, "sync cycle abandoned");
                SyncOutcome {
                    error: Some(err.to_string()),
                    success: false,
                    received,
                    duration_ms,
                    ..SyncOutcome::empty(cycle_id)
                }
            }
        }
    }

    async fn run_cycle(
        &self,
        cycle_id: &CycleId,
        changes: Vec<ContextChange>,
        deadline: Instant,
    ) -> Result<CycleReport, SyncError> {
        let _gate = self.cycle_gate.lock().await;
        // Declared after the gate so the phase resets before the gate opens.
        let _idle = IdleOnDrop(&self.phase);

        let _ = self.set_phase(SyncPhase::Collecting);
        let _ = self.set_phase(SyncPhase::Detecting);
        let _ = self.set_phase(SyncPhase::Resolving);
        let resolution = self.resolver.resolve(changes);
        if resolution.conflicts_detected > 0 {
            info!(
                cycle_id = %cycle_id,
                conflicts = resolution.conflicts_detected,
                strategy = %self.resolver.strategy(),
                "conflicts resolved"
            );
        }

        let _ = self.set_phase(SyncPhase::Applying);
        let staged = self.applier.stage(&resolution.changes, self.clock.now());
        let rejected = staged.failed.len();
        let applied = staged.applied.clone();

        let _ = self.set_phase(SyncPhase::Broadcasting);
        if let Some(publisher) = &self.publisher {
            if let Err(err) = publisher.publish(cycle_id, &applied).await {
                warn!(cycle_id = %cycle_id, error = %err, "publisher rejected batch");
            }
        }

        if Instant::now() > deadline {
            return Err(SyncError::Timeout {
                timeout_ms: self.settings.sync_timeout_ms,
            });
        }
        let summary = self.applier.commit(staged);

        let _ = self.events.send(SyncEvent {
            cycle_id: cycle_id.clone(),
            changes: applied.clone(),
            summary,
            completed_at: self.clock.now(),
        });

        Ok(CycleReport {
            applied,
            rejected,
            conflicts_detected: resolution.conflicts_detected,
            conflicts_resolved: resolution.conflicts_resolved,
        })
    }

    fn set_phase(&self, next: SyncPhase) -> SyncPhase {
        let previous = std::mem::replace(&mut *self.phase.lock(), next);
        trace!(from = ?previous, to = ?next, "sync phase");
        previous
    }

    /// Drain the queue every `sync.syncIntervalMs` until `cancel` fires,
    /// then drain once more.
    pub fn spawn_periodic_sync(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(coordinator.settings.sync_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let _ = ticker.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let outcome = coordinator.sync_pending().await;
                        if !outcome.success {
                            debug!(error = ?outcome.error, "periodic sync failed");
                        }
                    }
                }
            }
            let _ = coordinator.sync_pending().await;
            debug!("periodic sync stopped");
        })
    }
}

fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Puts the phase back to `Idle` when a cycle ends, timed out or not.
struct IdleOnDrop<'a>(&'a Mutex<SyncPhase>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        *self.0.lock() = SyncPhase::Idle;
    }
}

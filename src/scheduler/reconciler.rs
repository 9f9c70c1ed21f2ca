//! Reconciliation cycle
//!
//! One cycle loads a snapshot of every tracked entry, then walks it in order.
//! Stale entries are refreshed through the [`RefreshBackend`] one at a time:
//! the next entry is not evaluated until the previous refresh reached a
//! terminal state (or timed out) and any resulting timestamp was persisted.
//!
//! ```text
//!  Idle ──▶ Scanning ──▶ Evaluating ──fresh──▶ Evaluating (next)
//!                            │
//!                          stale
//!                            ▼
//!                        Refreshing ──error──▶ Evaluating (next)
//!                            │
//!                         finished
//!                            ▼
//!                        Persisting ─────────▶ Evaluating (next)
//! ```
//!
//! A store failure during scanning or persisting aborts the cycle; a refresh
//! failure only affects its own entry.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::error::{SchedulerError, SchedulerResult};
use super::policy::StalenessPolicy;
use super::snapshot::Snapshot;
use crate::events::{EventBus, UpdateEvent};
use crate::refresh::{RefreshBackend, RefreshError, RefreshOutcome};
use crate::storage::{EntryStore, StoreError, TrackedEntry};
use crate::utils::{format_millis, Clock, SystemClock};

/// Default upper bound on a single refresh
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(120);

// ============================================================================
// Cycle State and Report
// ============================================================================

/// Observable phase of the reconciler
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CycleState {
    #[default]
    Idle,
    Scanning,
    Evaluating { position: usize },
    Refreshing { resource_id: String },
    Persisting { resource_id: String },
}

impl CycleState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Summary of one completed cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Entries in the snapshot
    pub evaluated: usize,
    /// Entries that were still fresh
    pub skipped: usize,
    /// Entries refreshed and persisted
    pub refreshed: usize,
    /// Refreshes that failed or timed out
    pub failed: usize,
    /// Refreshes that finished after their entry was removed
    pub discarded: usize,
}

// ============================================================================
// Reconciler
// ============================================================================

/// Walks tracked entries and refreshes the stale ones
pub struct Reconciler {
    store: Arc<dyn EntryStore>,
    backend: Arc<dyn RefreshBackend>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    policy: RwLock<StalenessPolicy>,
    refresh_timeout: Duration,
    cycle_lock: Mutex<()>,
    state: watch::Sender<CycleState>,
}

impl Reconciler {
    /// Create a reconciler with the default policy, system clock and timeout
    pub fn new(
        store: Arc<dyn EntryStore>,
        backend: Arc<dyn RefreshBackend>,
        events: EventBus,
    ) -> Self {
        let (state, _) = watch::channel(CycleState::Idle);
        Self {
            store,
            backend,
            events,
            clock: Arc::new(SystemClock),
            policy: RwLock::new(StalenessPolicy::default()),
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            cycle_lock: Mutex::new(()),
            state,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: StalenessPolicy) -> Self {
        self.policy = RwLock::new(policy);
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// Current staleness policy
    pub async fn policy(&self) -> StalenessPolicy {
        *self.policy.read().await
    }

    /// Replace the staleness policy. A running cycle keeps the policy it
    /// started with; the change applies from the next cycle.
    pub async fn set_policy(&self, policy: StalenessPolicy) {
        *self.policy.write().await = policy;
        info!(
            frequency_ms = policy.frequency_ms(),
            "Staleness frequency updated"
        );
    }

    pub fn refresh_timeout(&self) -> Duration {
        self.refresh_timeout
    }

    /// Current phase
    pub fn state(&self) -> CycleState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every phase change
    pub fn subscribe_state(&self) -> watch::Receiver<CycleState> {
        self.state.subscribe()
    }

    /// Check if a cycle is running right now
    pub fn is_running(&self) -> bool {
        self.cycle_lock.try_lock().is_err()
    }

    /// Run one reconciliation cycle to completion
    ///
    /// Fails with [`SchedulerError::CycleInProgress`] if another cycle is
    /// already running; cycles never overlap.
    pub async fn run_cycle(&self) -> SchedulerResult<CycleReport> {
        let _guard = self
            .cycle_lock
            .try_lock()
            .map_err(|_| SchedulerError::CycleInProgress)?;

        let result = self.walk().await;
        self.set_state(CycleState::Idle);

        match &result {
            Ok(report) => {
                info!(
                    evaluated = report.evaluated,
                    skipped = report.skipped,
                    refreshed = report.refreshed,
                    failed = report.failed,
                    "Reconciliation cycle completed"
                );
                self.events
                    .publish(UpdateEvent::CycleCompleted { report: *report });
            }
            Err(e) => {
                error!(error = %e, "Reconciliation cycle aborted");
                self.events.publish(UpdateEvent::CycleAborted {
                    reason: e.to_string(),
                });
            }
        }

        result
    }

    async fn walk(&self) -> SchedulerResult<CycleReport> {
        let policy = self.policy().await;

        self.set_state(CycleState::Scanning);
        let mut snapshot = self.scan().await?;
        let mut report = CycleReport {
            evaluated: snapshot.len(),
            ..CycleReport::default()
        };
        debug!(entries = snapshot.len(), "Snapshot loaded");

        while let Some(entry) = snapshot.current().cloned() {
            self.set_state(CycleState::Evaluating {
                position: snapshot.cursor().position(),
            });

            let now = self.clock.now_millis();
            let staleness = policy.evaluate(&entry, now);
            if !staleness.is_stale() {
                debug!(
                    resource_id = %entry.resource_id,
                    elapsed_ms = staleness.elapsed_ms(),
                    "Entry is fresh, skipping"
                );
                report.skipped += 1;
                snapshot.advance();
                continue;
            }

            debug!(
                resource_id = %entry.resource_id,
                last_update = %format_millis(entry.last_update),
                "Entry is stale, refreshing"
            );
            self.set_state(CycleState::Refreshing {
                resource_id: entry.resource_id.clone(),
            });

            match self.refresh(&entry).await {
                RefreshOutcome::Finished { completed_at } => {
                    self.set_state(CycleState::Persisting {
                        resource_id: entry.resource_id.clone(),
                    });

                    if self.persist(&entry, completed_at).await? {
                        snapshot.record_refresh(completed_at);
                        report.refreshed += 1;
                        info!(
                            resource_id = %entry.resource_id,
                            last_update = %format_millis(completed_at),
                            "Entry refreshed"
                        );
                        self.events.publish(UpdateEvent::EntryRefreshed {
                            resource_id: entry.resource_id.clone(),
                            last_update: completed_at,
                        });
                    } else {
                        report.discarded += 1;
                    }
                }
                RefreshOutcome::Failed { reason } => {
                    warn!(
                        resource_id = %entry.resource_id,
                        reason = %reason,
                        "Refresh failed"
                    );
                    report.failed += 1;
                    self.events.publish(UpdateEvent::RefreshFailed {
                        resource_id: entry.resource_id.clone(),
                        reason,
                    });
                }
            }

            snapshot.advance();
        }

        Ok(report)
    }

    async fn scan(&self) -> SchedulerResult<Snapshot> {
        self.store
            .open()
            .await
            .map_err(SchedulerError::scan_failed)?;

        let entries = self
            .store
            .iterate_all()
            .await
            .map_err(SchedulerError::scan_failed)?;

        Ok(Snapshot::new(entries))
    }

    async fn refresh(&self, entry: &TrackedEntry) -> RefreshOutcome {
        let handle = self
            .backend
            .schedule_update(&entry.resource_id, &entry.source_location);

        match tokio::time::timeout(self.refresh_timeout, handle.wait()).await {
            Ok(outcome) => outcome,
            Err(_) => RefreshOutcome::Failed {
                reason: RefreshError::Timeout(self.refresh_timeout.as_millis() as u64)
                    .to_string(),
            },
        }
    }

    /// Write the new timestamp back. Returns `false` when the entry was
    /// removed while its refresh was running.
    async fn persist(&self, entry: &TrackedEntry, completed_at: i64) -> SchedulerResult<bool> {
        match self.store.touch(&entry.resource_id, completed_at).await {
            Ok(()) => Ok(true),
            Err(StoreError::NotFound(_)) => {
                warn!(
                    resource_id = %entry.resource_id,
                    "Entry removed during refresh, discarding result"
                );
                Ok(false)
            }
            Err(e) => Err(SchedulerError::persist_failed(&entry.resource_id, e)),
        }
    }

    fn set_state(&self, state: CycleState) {
        self.state.send_replace(state);
    }
}

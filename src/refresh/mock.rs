//! Scripted refresh backend for tests
//!
//! Replays a per-resource script of outcomes and records every
//! `schedule_update` call, together with how many refreshes were in flight
//! at the same time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{RefreshBackend, UpdateHandle};
use crate::utils::{Clock, SystemClock};

/// Scripted behavior for one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedRefresh {
    /// Report `checking`, then `finished` at the clock's current time
    Finish,
    /// Report `checking`, then `finished` at a fixed time
    FinishAt(i64),
    /// Report `checking`, then `error`
    Fail(String),
    /// Report `checking` and never terminate
    Hang,
    /// Drop the reporter without a terminal state
    Vanish,
}

/// One recorded `schedule_update` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub resource_id: String,
    pub source_location: String,
    /// Refreshes in flight when this one was scheduled, itself included
    pub in_flight: usize,
}

#[derive(Default)]
struct MockState {
    scripts: HashMap<String, ScriptedRefresh>,
    calls: Vec<RecordedCall>,
}

/// Refresh backend that replays scripted outcomes
#[derive(Clone)]
pub struct MockRefreshBackend {
    state: Arc<Mutex<MockState>>,
    in_flight: Arc<AtomicUsize>,
    delay: Duration,
    clock: Arc<dyn Clock>,
}

impl MockRefreshBackend {
    /// Create a backend where every refresh finishes
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` for `ScriptedRefresh::Finish` timestamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Wait `delay` before reporting the terminal state
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Script the outcome for one resource
    pub fn script(&self, resource_id: impl Into<String>, outcome: ScriptedRefresh) {
        self.lock().scripts.insert(resource_id.into(), outcome);
    }

    /// All calls so far, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Resource identifiers of all calls so far, in order
    pub fn called_ids(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .map(|c| c.resource_id.clone())
            .collect()
    }

    /// Highest number of refreshes that were in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .map(|c| c.in_flight)
            .max()
            .unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockRefreshBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshBackend for MockRefreshBackend {
    fn schedule_update(&self, resource_id: &str, source_location: &str) -> UpdateHandle {
        let (reporter, handle) = UpdateHandle::channel(resource_id);
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;

        let script = {
            let mut state = self.lock();
            state.calls.push(RecordedCall {
                resource_id: resource_id.to_string(),
                source_location: source_location.to_string(),
                in_flight,
            });
            state
                .scripts
                .get(resource_id)
                .cloned()
                .unwrap_or(ScriptedRefresh::Finish)
        };

        let counter = Arc::clone(&self.in_flight);
        let clock = Arc::clone(&self.clock);
        let delay = self.delay;

        tokio::spawn(async move {
            reporter.checking();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match script {
                ScriptedRefresh::Hang => {
                    reporter.closed().await;
                    counter.fetch_sub(1, Ordering::SeqCst);
                    return;
                }
                ScriptedRefresh::Vanish => {
                    counter.fetch_sub(1, Ordering::SeqCst);
                    drop(reporter);
                    return;
                }
                _ => {}
            }

            counter.fetch_sub(1, Ordering::SeqCst);
            match script {
                ScriptedRefresh::FinishAt(at) => reporter.finished(at),
                ScriptedRefresh::Fail(reason) => reporter.error(reason),
                _ => reporter.finished(clock.now_millis()),
            }
        });

        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::RefreshOutcome;

    #[tokio::test]
    async fn test_default_script_finishes() {
        let backend = MockRefreshBackend::new();
        let outcome = backend.schedule_update("r1", "s1").wait().await;
        assert!(matches!(outcome, RefreshOutcome::Finished { .. }));
        assert_eq!(backend.called_ids(), vec!["r1"]);
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let backend = MockRefreshBackend::new();
        backend.script("r1", ScriptedRefresh::Fail("offline".into()));

        let outcome = backend.schedule_update("r1", "s1").wait().await;
        assert_eq!(
            outcome,
            RefreshOutcome::Failed {
                reason: "offline".into()
            }
        );
    }

    #[tokio::test]
    async fn test_finish_at() {
        let backend = MockRefreshBackend::new();
        backend.script("r1", ScriptedRefresh::FinishAt(1234));

        let outcome = backend.schedule_update("r1", "s1").wait().await;
        assert_eq!(outcome, RefreshOutcome::Finished { completed_at: 1234 });
        assert_eq!(backend.max_in_flight(), 1);
    }
}

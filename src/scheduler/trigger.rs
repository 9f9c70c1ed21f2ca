//! Periodic cycle trigger
//!
//! While enabled, a background task starts a reconciliation cycle every
//! `scan_interval`. Disabling stops future fires but never interrupts a
//! cycle that is already running.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::error::{SchedulerError, SchedulerResult};
use super::reconciler::Reconciler;

// ============================================================================
// Trigger Configuration
// ============================================================================

/// Configuration for the cycle trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Time between timer fires
    pub scan_interval: Duration,

    /// Fire once immediately when enabled instead of waiting one interval
    pub scan_on_enable: bool,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(300),
            scan_on_enable: false,
        }
    }
}

impl TriggerConfig {
    pub fn new(scan_interval: Duration) -> Self {
        Self {
            scan_interval,
            ..Self::default()
        }
    }

    pub fn scan_on_enable(mut self, enabled: bool) -> Self {
        self.scan_on_enable = enabled;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.scan_interval.is_zero() {
            return Err(SchedulerError::invalid_interval(0));
        }
        Ok(())
    }
}

// ============================================================================
// Cycle Trigger
// ============================================================================

struct RunningTrigger {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Starts reconciliation cycles on a fixed interval
pub struct CycleTrigger {
    config: TriggerConfig,
    running: Mutex<Option<RunningTrigger>>,
}

impl CycleTrigger {
    /// Create a disabled trigger
    pub fn new(config: TriggerConfig) -> SchedulerResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            running: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    /// Start firing. Returns `false` if the trigger was already enabled.
    pub async fn enable(&self, reconciler: Arc<Reconciler>) -> bool {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return false;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_trigger_loop(
            reconciler,
            self.config.clone(),
            shutdown_rx,
        ));

        *running = Some(RunningTrigger { shutdown, handle });
        tracing::info!(
            scan_interval_secs = self.config.scan_interval.as_secs_f64(),
            scan_on_enable = self.config.scan_on_enable,
            "Update trigger enabled"
        );
        true
    }

    /// Stop future fires. Returns `false` if the trigger was not enabled.
    ///
    /// A cycle that is running keeps running until it finishes.
    pub async fn disable(&self) -> bool {
        match self.running.lock().await.take() {
            Some(running) => {
                let _ = running.shutdown.send(true);
                tracing::info!("Update trigger disabled");
                true
            }
            None => false,
        }
    }

    /// Stop future fires and wait for a running cycle to finish
    pub async fn shutdown(&self) {
        let running = self.running.lock().await.take();
        if let Some(running) = running {
            let _ = running.shutdown.send(true);
            if let Err(e) = running.handle.await {
                tracing::error!(error = %e, "Update trigger task failed");
            }
            tracing::info!("Update trigger stopped");
        }
    }

    pub async fn is_enabled(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

async fn run_trigger_loop(
    reconciler: Arc<Reconciler>,
    config: TriggerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let period = config.scan_interval;
    let start = if config.scan_on_enable {
        Instant::now()
    } else {
        Instant::now() + period
    };

    let mut interval = tokio::time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                // Checked again here: both branches may be ready at once
                if *shutdown_rx.borrow() {
                    break;
                }

                match reconciler.run_cycle().await {
                    Ok(_) => {}
                    Err(SchedulerError::CycleInProgress) => {
                        tracing::debug!("Previous cycle still running, skipping timer fire");
                    }
                    // Already logged and published by the reconciler
                    Err(_) => {}
                }
            }
            _ = shutdown_rx.changed() => {
                tracing::debug!("Update trigger loop shutting down");
                break;
            }
        }
    }
}

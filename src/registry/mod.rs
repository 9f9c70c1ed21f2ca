//! Update registry
//!
//! Public entry point of the service. The registry owns the entry store, the
//! event bus, the reconciler and the cycle trigger, and exposes the
//! operations callers use to manage tracked entries and the periodic scan.
//!
//! Every successful add or remove publishes a completion event, so callers
//! can sequence dependent work by subscribing instead of polling.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use appcache_updater::refresh::MockRefreshBackend;
//! use appcache_updater::registry::UpdateRegistry;
//! use appcache_updater::storage::MemoryEntryStore;
//!
//! #[tokio::main]
//! async fn main() -> appcache_updater::Result<()> {
//!     let registry = UpdateRegistry::builder(
//!         Arc::new(MemoryEntryStore::new()),
//!         Arc::new(MockRefreshBackend::new()),
//!     )
//!     .build()?;
//!
//!     registry.init().await?;
//!     registry
//!         .add_entry("https://example.com/app.appcache", "https://example.com/app")
//!         .await?;
//!     registry.set_staleness_frequency(Duration::from_secs(3600)).await?;
//!     registry.enable().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{EventBus, SubscriptionToken, Topic, UpdateEvent};
use crate::refresh::RefreshBackend;
use crate::scheduler::{
    CycleReport, CycleState, CycleTrigger, Reconciler, StalenessPolicy, TriggerConfig,
    DEFAULT_REFRESH_TIMEOUT,
};
use crate::storage::{EntryStore, TrackedEntry};
use crate::utils::{Clock, SystemClock};

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`UpdateRegistry`]
pub struct RegistryBuilder {
    store: Arc<dyn EntryStore>,
    backend: Arc<dyn RefreshBackend>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    policy: StalenessPolicy,
    refresh_timeout: Duration,
    trigger: TriggerConfig,
}

impl RegistryBuilder {
    /// Share an existing event bus
    pub fn events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Time source for `last_update` stamps and staleness checks
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(mut self, policy: StalenessPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn trigger(mut self, config: TriggerConfig) -> Self {
        self.trigger = config;
        self
    }

    /// Build the registry. Updates start disabled.
    pub fn build(self) -> Result<UpdateRegistry> {
        let trigger = CycleTrigger::new(self.trigger)?;

        let reconciler = Reconciler::new(
            Arc::clone(&self.store),
            self.backend,
            self.events.clone(),
        )
        .with_clock(Arc::clone(&self.clock))
        .with_policy(self.policy)
        .with_refresh_timeout(self.refresh_timeout);

        Ok(UpdateRegistry {
            store: self.store,
            events: self.events,
            clock: self.clock,
            reconciler: Arc::new(reconciler),
            trigger,
        })
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Tracks cached resources and keeps them fresh
pub struct UpdateRegistry {
    store: Arc<dyn EntryStore>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    reconciler: Arc<Reconciler>,
    trigger: CycleTrigger,
}

impl UpdateRegistry {
    /// Start building a registry over `store` and `backend`
    pub fn builder(store: Arc<dyn EntryStore>, backend: Arc<dyn RefreshBackend>) -> RegistryBuilder {
        RegistryBuilder {
            store,
            backend,
            events: EventBus::new(),
            clock: Arc::new(SystemClock),
            policy: StalenessPolicy::default(),
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            trigger: TriggerConfig::default(),
        }
    }

    /// Build a registry with the scheduler settings from `config`
    pub fn from_config(
        config: &Config,
        store: Arc<dyn EntryStore>,
        backend: Arc<dyn RefreshBackend>,
    ) -> Result<Self> {
        Self::builder(store, backend)
            .policy(config.staleness_policy()?)
            .refresh_timeout(config.refresh_timeout())
            .trigger(config.trigger_config())
            .build()
    }

    /// Open the entry store and announce that it is ready
    pub async fn init(&self) -> Result<()> {
        self.store.open().await?;
        info!("Update registry ready");
        self.events.publish(UpdateEvent::StoreReady);
        Ok(())
    }

    /// Start tracking a resource
    ///
    /// The entry is stamped with the current time, so it is first refreshed
    /// once the staleness frequency has elapsed.
    ///
    /// # Errors
    ///
    /// `StoreError::Duplicate` if `resource_id` is already tracked; the
    /// existing record is left unchanged.
    pub async fn add_entry(
        &self,
        resource_id: impl Into<String>,
        source_location: impl Into<String>,
    ) -> Result<TrackedEntry> {
        let entry = TrackedEntry::new(resource_id, source_location, self.clock.now_millis());

        if entry.resource_id.trim().is_empty() {
            return Err(Error::invalid_entry("resource identifier must not be empty"));
        }
        if entry.source_location.trim().is_empty() {
            return Err(Error::invalid_entry(format!(
                "source location for '{}' must not be empty",
                entry.resource_id
            )));
        }

        self.store.insert(&entry).await?;

        info!(
            resource_id = %entry.resource_id,
            source_location = %entry.source_location,
            "Entry added"
        );
        self.events.publish(UpdateEvent::EntryAdded {
            resource_id: entry.resource_id.clone(),
            source_location: entry.source_location.clone(),
        });

        Ok(entry)
    }

    /// Stop tracking a resource, returning the removed record
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` if `resource_id` is not tracked.
    pub async fn remove_entry(&self, resource_id: &str) -> Result<TrackedEntry> {
        let removed = self.store.delete(resource_id).await?;

        info!(resource_id = %resource_id, "Entry removed");
        self.events.publish(UpdateEvent::EntryRemoved {
            resource_id: removed.resource_id.clone(),
        });

        Ok(removed)
    }

    /// Look up one tracked entry
    pub async fn get_entry(&self, resource_id: &str) -> Result<TrackedEntry> {
        Ok(self.store.get(resource_id).await?)
    }

    /// All tracked entries in key order
    pub async fn entries(&self) -> Result<Vec<TrackedEntry>> {
        Ok(self.store.iterate_all().await?)
    }

    /// Change the staleness frequency. Applies from the next cycle.
    pub async fn set_staleness_frequency(&self, frequency: Duration) -> Result<()> {
        let policy = StalenessPolicy::new(frequency)?;
        self.reconciler.set_policy(policy).await;
        Ok(())
    }

    pub async fn staleness_frequency(&self) -> Duration {
        self.reconciler.policy().await.frequency()
    }

    /// Start the periodic scan. No-op if already enabled.
    pub async fn enable(&self) {
        if !self.trigger.enable(Arc::clone(&self.reconciler)).await {
            debug!("Updates already enabled");
        }
    }

    /// Stop the periodic scan. No-op if already disabled.
    ///
    /// A cycle that is running completes and persists its results.
    pub async fn disable(&self) {
        if !self.trigger.disable().await {
            debug!("Updates already disabled");
        }
    }

    /// Stop the periodic scan and wait for a running cycle to finish
    pub async fn shutdown(&self) {
        self.trigger.shutdown().await;
    }

    pub async fn is_enabled(&self) -> bool {
        self.trigger.is_enabled().await
    }

    /// Run one cycle now, outside the timer
    ///
    /// # Errors
    ///
    /// `SchedulerError::CycleInProgress` if a cycle is already running.
    pub async fn run_cycle_now(&self) -> Result<CycleReport> {
        Ok(self.reconciler.run_cycle().await?)
    }

    /// Current reconciler phase
    pub fn cycle_state(&self) -> CycleState {
        self.reconciler.state()
    }

    /// Observe reconciler phase changes
    pub fn watch_state(&self) -> watch::Receiver<CycleState> {
        self.reconciler.subscribe_state()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Register a handler for one topic
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionToken
    where
        F: Fn(&UpdateEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(topic, handler)
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.events.unsubscribe(token)
    }

    /// Receive every event published from now on
    pub fn watch_events(&self) -> broadcast::Receiver<UpdateEvent> {
        self.events.watch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::MockRefreshBackend;
    use crate::storage::{MemoryEntryStore, StoreError};
    use crate::utils::ManualClock;

    const T0: i64 = 1_700_000_000_000;

    fn registry() -> UpdateRegistry {
        UpdateRegistry::builder(
            Arc::new(MemoryEntryStore::new()),
            Arc::new(MockRefreshBackend::new()),
        )
        .clock(Arc::new(ManualClock::new(T0)))
        .build()
        .unwrap()
    }

    #[tokio::test]
    async fn test_add_entry_stamps_now() {
        let registry = registry();
        let entry = registry.add_entry("r1", "s1").await.unwrap();
        assert_eq!(entry.last_update, T0);
        assert_eq!(registry.get_entry("r1").await.unwrap(), entry);
    }

    #[tokio::test]
    async fn test_add_duplicate_rejected() {
        let registry = registry();
        registry.add_entry("r1", "s1").await.unwrap();

        let err = registry.add_entry("r1", "other").await.unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(registry.get_entry("r1").await.unwrap().source_location, "s1");
    }

    #[tokio::test]
    async fn test_add_empty_identifier_rejected() {
        let registry = registry();
        assert!(matches!(
            registry.add_entry("  ", "s1").await,
            Err(Error::InvalidEntry(_))
        ));
        assert!(matches!(
            registry.add_entry("r1", "").await,
            Err(Error::InvalidEntry(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_unknown_reports_not_found() {
        let registry = registry();
        let err = registry.remove_entry("missing").await.unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_zero_frequency_rejected() {
        let registry = registry();
        assert!(registry
            .set_staleness_frequency(Duration::ZERO)
            .await
            .is_err());
        assert_eq!(
            registry.staleness_frequency().await,
            Duration::from_secs(300)
        );
    }
}

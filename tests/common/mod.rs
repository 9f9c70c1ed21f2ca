//! Common test utilities

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use appcache_updater::events::UpdateEvent;
use appcache_updater::refresh::MockRefreshBackend;
use appcache_updater::registry::UpdateRegistry;
use appcache_updater::scheduler::{StalenessPolicy, TriggerConfig};
use appcache_updater::storage::{
    EntryStore, MemoryEntryStore, StoreError, StoreResult, TrackedEntry,
};
use appcache_updater::utils::ManualClock;

/// Reference time used across tests (ms since epoch)
pub const T0: i64 = 1_700_000_000_000;

/// One hour, the frequency used by most scenarios
pub const HOUR_MS: u64 = 3_600_000;

/// Registry wired to in-memory collaborators the test can inspect
pub struct Harness {
    pub registry: Arc<UpdateRegistry>,
    pub store: Arc<FlakyStore>,
    pub backend: MockRefreshBackend,
    pub clock: Arc<ManualClock>,
    pub events: broadcast::Receiver<UpdateEvent>,
}

/// Options for [`harness`]
pub struct HarnessOptions {
    pub entries: Vec<TrackedEntry>,
    pub frequency: Duration,
    pub refresh_timeout: Duration,
    pub trigger: TriggerConfig,
    pub backend_delay: Duration,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            frequency: Duration::from_millis(HOUR_MS),
            refresh_timeout: Duration::from_secs(120),
            trigger: TriggerConfig::default(),
            backend_delay: Duration::ZERO,
        }
    }
}

pub fn harness(options: HarnessOptions) -> Harness {
    let clock = Arc::new(ManualClock::new(T0));
    let store = Arc::new(FlakyStore::new(MemoryEntryStore::with_entries(
        options.entries,
    )));
    let backend = MockRefreshBackend::new()
        .with_clock(clock.clone())
        .with_delay(options.backend_delay);

    let registry = UpdateRegistry::builder(store.clone(), Arc::new(backend.clone()))
        .clock(clock.clone())
        .policy(StalenessPolicy::new(options.frequency).unwrap())
        .refresh_timeout(options.refresh_timeout)
        .trigger(options.trigger)
        .build()
        .unwrap();
    let events = registry.watch_events();

    Harness {
        registry: Arc::new(registry),
        store,
        backend,
        clock,
        events,
    }
}

/// Harness holding `entries`, everything else default
pub fn harness_with(entries: Vec<TrackedEntry>) -> Harness {
    harness(HarnessOptions {
        entries,
        ..Default::default()
    })
}

/// Events received so far, without waiting
pub fn drain(rx: &mut broadcast::Receiver<UpdateEvent>) -> Vec<UpdateEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Wait for the next event matching `pred`
pub async fn next_matching<F>(rx: &mut broadcast::Receiver<UpdateEvent>, pred: F) -> UpdateEvent
where
    F: Fn(&UpdateEvent) -> bool,
{
    loop {
        let event = rx.recv().await.expect("event bus closed");
        if pred(&event) {
            return event;
        }
    }
}

/// In-memory store whose reads and writes can be made to fail
pub struct FlakyStore {
    inner: MemoryEntryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: MemoryEntryStore) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_read(&self) -> StoreResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Read("injected read failure".into()));
        }
        Ok(())
    }

    fn check_write(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Write("injected write failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl EntryStore for FlakyStore {
    async fn open(&self) -> StoreResult<()> {
        self.inner.open().await
    }

    async fn get(&self, resource_id: &str) -> StoreResult<TrackedEntry> {
        self.check_read()?;
        self.inner.get(resource_id).await
    }

    async fn insert(&self, entry: &TrackedEntry) -> StoreResult<()> {
        self.check_write()?;
        self.inner.insert(entry).await
    }

    async fn put(&self, entry: &TrackedEntry) -> StoreResult<()> {
        self.check_write()?;
        self.inner.put(entry).await
    }

    async fn touch(&self, resource_id: &str, last_update: i64) -> StoreResult<()> {
        self.check_write()?;
        self.inner.touch(resource_id, last_update).await
    }

    async fn delete(&self, resource_id: &str) -> StoreResult<TrackedEntry> {
        self.check_write()?;
        self.inner.delete(resource_id).await
    }

    async fn iterate_all(&self) -> StoreResult<Vec<TrackedEntry>> {
        self.check_read()?;
        self.inner.iterate_all().await
    }
}

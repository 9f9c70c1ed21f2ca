//! Event bus for update-service notifications
//!
//! Callers observe the outcome of registry operations and reconciliation
//! cycles through named topics instead of return values. The bus offers two
//! ways to listen:
//!
//! - [`EventBus::subscribe`] registers a handler for one topic and returns a
//!   [`SubscriptionToken`] that can later be passed to
//!   [`EventBus::unsubscribe`].
//! - [`EventBus::watch`] returns a `tokio::sync::broadcast` receiver that
//!   sees every event, for async consumers.
//!
//! Events are for observability only; the scheduler never routes its own
//! control flow through the bus.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::scheduler::CycleReport;

/// Default capacity of the broadcast channel
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// Topics and Events
// ============================================================================

/// Named topics published by the update service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    /// The entry store was opened and is ready
    StoreReady,
    /// An entry was added to the registry
    EntryAdded,
    /// An entry was removed from the registry
    EntryRemoved,
    /// An entry was refreshed and its timestamp persisted
    EntryRefreshed,
    /// A refresh terminated with an error or timed out
    RefreshFailed,
    /// A reconciliation cycle walked its whole snapshot
    CycleCompleted,
    /// A reconciliation cycle was aborted by a store failure
    CycleAborted,
}

impl Topic {
    /// Wire name of the topic
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StoreReady => "store-ready",
            Self::EntryAdded => "entry-added",
            Self::EntryRemoved => "entry-removed",
            Self::EntryRefreshed => "entry-refreshed",
            Self::RefreshFailed => "refresh-failed",
            Self::CycleCompleted => "cycle-completed",
            Self::CycleAborted => "cycle-aborted",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events published on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", rename_all = "kebab-case")]
pub enum UpdateEvent {
    StoreReady,

    EntryAdded {
        resource_id: String,
        source_location: String,
    },

    EntryRemoved {
        resource_id: String,
    },

    EntryRefreshed {
        resource_id: String,
        last_update: i64,
    },

    RefreshFailed {
        resource_id: String,
        reason: String,
    },

    CycleCompleted {
        report: CycleReport,
    },

    CycleAborted {
        reason: String,
    },
}

impl UpdateEvent {
    /// Topic this event is published on
    pub fn topic(&self) -> Topic {
        match self {
            Self::StoreReady => Topic::StoreReady,
            Self::EntryAdded { .. } => Topic::EntryAdded,
            Self::EntryRemoved { .. } => Topic::EntryRemoved,
            Self::EntryRefreshed { .. } => Topic::EntryRefreshed,
            Self::RefreshFailed { .. } => Topic::RefreshFailed,
            Self::CycleCompleted { .. } => Topic::CycleCompleted,
            Self::CycleAborted { .. } => Topic::CycleAborted,
        }
    }

    /// Resource identifier the event concerns, if any
    pub fn resource_id(&self) -> Option<&str> {
        match self {
            Self::EntryAdded { resource_id, .. }
            | Self::EntryRemoved { resource_id }
            | Self::EntryRefreshed { resource_id, .. }
            | Self::RefreshFailed { resource_id, .. } => Some(resource_id),
            _ => None,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(Uuid);

impl fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Handler = Arc<dyn Fn(&UpdateEvent) + Send + Sync>;

struct Subscription {
    topic: Topic,
    handler: Handler,
}

struct BusInner {
    handlers: RwLock<HashMap<SubscriptionToken, Subscription>>,
    sender: broadcast::Sender<UpdateEvent>,
}

/// Publish/subscribe bus keyed by [`Topic`]. Cheap to clone.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a bus with the default channel capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus with a custom broadcast capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(BusInner {
                handlers: RwLock::new(HashMap::new()),
                sender,
            }),
        }
    }

    /// Publish an event to its topic's handlers and to all watchers
    pub fn publish(&self, event: UpdateEvent) {
        let topic = event.topic();
        tracing::trace!(topic = %topic, "Publishing event");

        // Handlers are cloned out so none runs while the map is locked
        let handlers: Vec<Handler> = self
            .read_handlers()
            .values()
            .filter(|s| s.topic == topic)
            .map(|s| Arc::clone(&s.handler))
            .collect();

        for handler in handlers {
            handler(&event);
        }

        // No receivers is fine
        let _ = self.inner.sender.send(event);
    }

    /// Register a handler for one topic
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionToken
    where
        F: Fn(&UpdateEvent) + Send + Sync + 'static,
    {
        let token = SubscriptionToken(Uuid::new_v4());
        let subscription = Subscription {
            topic,
            handler: Arc::new(handler),
        };

        self.write_handlers().insert(token, subscription);

        tracing::debug!(topic = %topic, token = %token, "Subscribed");
        token
    }

    /// Remove a handler. Returns `false` if the token was unknown.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.write_handlers().remove(&token).is_some()
    }

    /// Receive every event published from now on
    pub fn watch(&self) -> broadcast::Receiver<UpdateEvent> {
        self.inner.sender.subscribe()
    }

    /// Number of registered topic handlers
    pub fn handler_count(&self) -> usize {
        self.read_handlers().len()
    }

    // A panicking handler must not take the bus down with it
    fn read_handlers(&self) -> RwLockReadGuard<'_, HashMap<SubscriptionToken, Subscription>> {
        self.inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_handlers(&self) -> RwLockWriteGuard<'_, HashMap<SubscriptionToken, Subscription>> {
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handler_count())
            .field("watchers", &self.inner.sender.receiver_count())
            .finish()
    }
}

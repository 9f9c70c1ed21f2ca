//! Staleness-driven refresh scheduling
//!
//! The scheduler decides when each tracked entry is due for a refresh and
//! drives those refreshes one at a time.
//!
//! # Overview
//!
//! A [`CycleTrigger`] fires every scan interval while updates are enabled.
//! Each fire runs one reconciliation cycle on the [`Reconciler`]: it loads a
//! [`Snapshot`] of all entries, evaluates each against the
//! [`StalenessPolicy`], refreshes stale ones through the refresh backend, and
//! persists the new timestamps.
//!
//! ```text
//! ┌──────────────┐  fire   ┌──────────────┐  schedule_update  ┌──────────────┐
//! │ CycleTrigger │────────▶│  Reconciler  │──────────────────▶│   Backend    │
//! └──────────────┘         └──────┬───────┘◀──── terminal ────└──────────────┘
//!                                 │
//!                       iterate_all / get / put
//!                                 ▼
//!                          ┌──────────────┐
//!                          │  EntryStore  │
//!                          └──────────────┘
//! ```
//!
//! # Guarantees
//!
//! - At most one refresh is in flight at any time.
//! - Cycles never overlap; a fire during a running cycle is skipped.
//! - Disabling the trigger never interrupts a running cycle.
//!
//! # Modules
//!
//! - [`policy`] - Staleness evaluation
//! - [`snapshot`] - Per-cycle entry snapshot and cursor
//! - [`reconciler`] - The cycle state machine
//! - [`trigger`] - Interval timer that starts cycles
//! - [`error`] - Scheduler error types

pub mod error;
pub mod policy;
pub mod reconciler;
pub mod snapshot;
pub mod trigger;

pub use error::{SchedulerError, SchedulerResult};
pub use policy::{Staleness, StalenessPolicy, DEFAULT_FREQUENCY};
pub use reconciler::{CycleReport, CycleState, Reconciler, DEFAULT_REFRESH_TIMEOUT};
pub use snapshot::{Cursor, Snapshot};
pub use trigger::{CycleTrigger, TriggerConfig};

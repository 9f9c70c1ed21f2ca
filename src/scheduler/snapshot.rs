//! Per-cycle snapshot of tracked entries and the cursor walking it
//!
//! A snapshot is loaded once at the start of a cycle and never reloaded
//! during it: entries added or removed mid-cycle show up in the next one.

use crate::storage::TrackedEntry;

/// Position in the current snapshot. Only moves forward within a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    position: usize,
}

impl Cursor {
    pub fn position(&self) -> usize {
        self.position
    }

    fn advance(&mut self) {
        self.position += 1;
    }
}

/// Ordered entries for one reconciliation cycle
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: Vec<TrackedEntry>,
    cursor: Cursor,
}

impl Snapshot {
    /// Build a snapshot with the cursor at 0
    pub fn new(entries: Vec<TrackedEntry>) -> Self {
        Self {
            entries,
            cursor: Cursor::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Entry under the cursor, `None` once the snapshot is exhausted
    pub fn current(&self) -> Option<&TrackedEntry> {
        self.entries.get(self.cursor.position)
    }

    /// Move to the next entry
    pub fn advance(&mut self) {
        if !self.is_exhausted() {
            self.cursor.advance();
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor.position >= self.entries.len()
    }

    /// Mirror a persisted refresh into the entry under the cursor
    pub fn record_refresh(&mut self, completed_at: i64) {
        if let Some(entry) = self.entries.get_mut(self.cursor.position) {
            entry.last_update = completed_at;
        }
    }

    pub fn entries(&self) -> &[TrackedEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(ids: &[&str]) -> Snapshot {
        Snapshot::new(ids.iter().map(|id| TrackedEntry::new(*id, *id, 0)).collect())
    }

    #[test]
    fn test_empty_snapshot_is_exhausted() {
        let snap = Snapshot::new(Vec::new());
        assert!(snap.is_empty());
        assert!(snap.is_exhausted());
        assert!(snap.current().is_none());
    }

    #[test]
    fn test_walk_in_order() {
        let mut snap = snapshot(&["a", "b", "c"]);
        let mut seen = Vec::new();
        while let Some(entry) = snap.current() {
            seen.push(entry.resource_id.clone());
            snap.advance();
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(snap.cursor().position(), 3);
    }

    #[test]
    fn test_advance_past_end_is_noop() {
        let mut snap = snapshot(&["a"]);
        snap.advance();
        snap.advance();
        assert_eq!(snap.cursor().position(), 1);
    }

    #[test]
    fn test_record_refresh_updates_current_only() {
        let mut snap = snapshot(&["a", "b"]);
        snap.advance();
        snap.record_refresh(500);

        assert_eq!(snap.entries()[0].last_update, 0);
        assert_eq!(snap.entries()[1].last_update, 500);
    }
}

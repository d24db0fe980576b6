//! Pointer-based undo/redo history of document snapshots.
//!
//! Provides:
//! - `HistoryStack` - ordered snapshots plus a cursor
//! - truncate-on-append: a new edit after undo abandons the redo branch
//! - navigate-without-truncate: `restore` only moves the cursor

use tracing::warn;

use crate::change::has_meaningful_change;
use crate::record::DraftRecord;
use crate::snapshot::Snapshot;

/// Ordered snapshots of one post with a cursor at the displayed entry.
///
/// Index 0 holds the baseline (the published state, `is_original == true`)
/// once the stack has been hydrated. The stack is never empty and the cursor
/// is always in range; anything that would violate that is clamped.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryStack {
    entries: Vec<Snapshot>,
    cursor: usize,
}

impl HistoryStack {
    /// Create a stack holding only `baseline`, marked as the original.
    pub fn new(mut baseline: Snapshot) -> Self {
        baseline.is_original = true;
        Self {
            entries: vec![baseline],
            cursor: 0,
        }
    }

    /// Rebuild a stack from stored parts.
    ///
    /// Returns `None` for an empty entry list. An out-of-range cursor is
    /// clamped to the last entry.
    pub fn from_parts(entries: Vec<Snapshot>, cursor: usize) -> Option<Self> {
        if entries.is_empty() {
            return None;
        }
        let last = entries.len() - 1;
        if cursor > last {
            warn!(cursor, last, "history cursor out of range, clamping");
        }
        Some(Self {
            cursor: cursor.min(last),
            entries,
        })
    }

    pub fn entries(&self) -> &[Snapshot] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// A stack always holds at least its first entry.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn get(&self, index: usize) -> Option<&Snapshot> {
        self.entries.get(index)
    }

    /// The snapshot at the cursor.
    pub fn current(&self) -> &Snapshot {
        &self.entries[self.cursor]
    }

    /// The snapshot at index 0.
    pub fn baseline(&self) -> &Snapshot {
        &self.entries[0]
    }

    pub fn last_index(&self) -> usize {
        self.entries.len() - 1
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.last_index()
    }

    /// Record a new edit.
    ///
    /// Drops every entry after the cursor, pushes `snapshot` and moves the
    /// cursor onto it. Returns false, leaving the stack untouched, when the
    /// snapshot does not differ meaningfully from the one at the cursor.
    pub fn append(&mut self, mut snapshot: Snapshot) -> bool {
        if !has_meaningful_change(&snapshot, self.current()) {
            return false;
        }
        snapshot.is_original = false;
        self.entries.truncate(self.cursor + 1);
        self.entries.push(snapshot);
        self.cursor = self.entries.len() - 1;
        true
    }

    /// Step back one entry. No-op at the baseline.
    pub fn undo(&mut self) -> &Snapshot {
        if self.can_undo() {
            self.cursor -= 1;
        }
        self.current()
    }

    /// Step forward one entry. No-op at the newest entry.
    pub fn redo(&mut self) -> &Snapshot {
        if self.can_redo() {
            self.cursor += 1;
        }
        self.current()
    }

    /// Jump to `index`, clamped into range. Later entries are kept.
    pub fn restore(&mut self, index: usize) -> &Snapshot {
        self.cursor = index.min(self.last_index());
        self.current()
    }

    /// True unless the stack is exactly one original baseline.
    pub fn is_dirty(&self) -> bool {
        self.entries.len() > 1 || !self.entries[0].is_original
    }

    /// Collapse back to the baseline alone, as when a draft is discarded.
    pub fn clear_history(&mut self) {
        self.entries.truncate(1);
        self.cursor = 0;
    }

    /// Whole-record mirror for the draft store.
    pub fn to_record(&self) -> DraftRecord {
        DraftRecord {
            entries: self.entries.clone(),
            cursor: Some(self.cursor),
        }
    }
}

//! The persisted mirror of a post's history.

use serde::{Deserialize, Serialize};

use crate::snapshot::Snapshot;

/// What the draft store holds for one post: every entry plus the cursor.
///
/// Always written whole; never patched field by field. `history` and
/// `currentIndex` are accepted as aliases for records written by older
/// editors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftRecord {
    #[serde(default, alias = "history")]
    pub entries: Vec<Snapshot>,

    /// Missing means "the newest entry".
    #[serde(
        default,
        alias = "currentIndex",
        skip_serializing_if = "Option::is_none"
    )]
    pub cursor: Option<usize>,
}

impl DraftRecord {
    pub fn new(entries: Vec<Snapshot>, cursor: usize) -> Self {
        Self {
            entries,
            cursor: Some(cursor),
        }
    }

    /// The stored cursor, defaulting to the newest entry.
    pub fn cursor_or_last(&self) -> usize {
        self.cursor
            .unwrap_or_else(|| self.entries.len().saturating_sub(1))
    }

    /// True when the record carries no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

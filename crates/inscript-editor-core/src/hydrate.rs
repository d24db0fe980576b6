//! Building the initial history when a post is opened.
//!
//! The published file on disk is the source of truth for index 0. A stored
//! draft whose first entry no longer matches it (the draft predates
//! reconciliation, or the post was edited outside the editor) gets the
//! baseline prepended, and its cursor shifted so it still points at the same
//! snapshot.
//!
//! Posts that were never published have no file on disk. For those the
//! earliest stored entry is promoted to baseline instead.

use chrono::{DateTime, Utc};
use inscript_common::LoadError;
use smol_str::SmolStr;
use tracing::debug;

use crate::history::HistoryStack;
use crate::record::DraftRecord;
use crate::snapshot::{DocumentState, Snapshot};

/// The published state of a post.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Baseline {
    pub title: SmolStr,
    pub content: String,
    pub tags: Vec<SmolStr>,
    pub categories: Vec<SmolStr>,
    pub created: Option<DateTime<Utc>>,
}

impl Baseline {
    pub fn document(&self) -> DocumentState {
        DocumentState {
            content: self.content.clone(),
            title: self.title.clone(),
            tags: self.tags.clone(),
            categories: self.categories.clone(),
        }
    }

    /// The original snapshot for this baseline, stamped with the creation
    /// time when known.
    pub fn to_snapshot(&self, now: DateTime<Utc>) -> Snapshot {
        Snapshot::original(self.document(), self.created.unwrap_or(now))
    }
}

/// Result of hydrating a post.
#[derive(Debug, Clone, PartialEq)]
pub struct Hydrated {
    pub history: HistoryStack,
    /// No published baseline exists; index 0 came from the draft.
    pub unpublished: bool,
    /// The baseline was prepended in front of the stored entries.
    pub prepended_baseline: bool,
}

/// Produce the initial history for `post_id`.
///
/// Fails with [`LoadError::NotFound`] only when there is neither a published
/// baseline nor a non-empty stored draft.
pub fn hydrate(
    post_id: &str,
    baseline: Option<&Baseline>,
    stored: Option<DraftRecord>,
    now: DateTime<Utc>,
) -> Result<Hydrated, LoadError> {
    let stored = stored.filter(|record| !record.is_empty());
    let not_found = || LoadError::NotFound {
        post_id: post_id.into(),
    };

    let (entries, cursor, unpublished, prepended_baseline) = match (baseline, stored) {
        (None, None) => return Err(not_found()),
        (Some(baseline), None) => (vec![baseline.to_snapshot(now)], 0, false, false),
        (None, Some(record)) => {
            let cursor = record.cursor_or_last();
            (record.entries, cursor, true, false)
        }
        (Some(baseline), Some(record)) => {
            let original = baseline.to_snapshot(now);
            let cursor = record.cursor_or_last();
            let mut entries = record.entries;
            if entries[0].content == original.content {
                (entries, cursor, false, false)
            } else {
                debug!(post_id, "stored draft predates baseline, prepending original");
                entries.insert(0, original);
                (entries, cursor + 1, false, true)
            }
        }
    };

    let history =
        HistoryStack::from_parts(mark_baseline(entries), cursor).ok_or_else(not_found)?;

    Ok(Hydrated {
        history,
        unpublished,
        prepended_baseline,
    })
}

/// Tag index 0 as the original and clear the flag everywhere else.
fn mark_baseline(mut entries: Vec<Snapshot>) -> Vec<Snapshot> {
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.is_original = i == 0;
    }
    entries
}

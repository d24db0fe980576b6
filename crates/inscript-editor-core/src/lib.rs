//! Editor-side history model for inscript.
//!
//! Everything in this crate is synchronous and owns no I/O: snapshots, the
//! undo/redo stack, change detection, the persisted record shape, hydration
//! of a freshly opened post, and original-vs-draft diffs.

mod change;
pub mod diff;
mod history;
mod hydrate;
mod record;
mod snapshot;

pub use change::{has_meaningful_change, same_set};
pub use diff::{ChangeKind, DiffChunk, SetDiff, SnapshotDiff, render_unified};
pub use history::HistoryStack;
pub use hydrate::{Baseline, Hydrated, hydrate};
pub use record::DraftRecord;
pub use snapshot::{DocumentFields, DocumentState, Snapshot};

//! Async side of the inscript editor.
//!
//! [`EditorSession`] owns the open post's [`HistoryStack`] and drives the
//! debounced capture, the debounced draft writes and the programmatic-load
//! lock around it. Draft storage and published posts sit behind the
//! [`DraftStore`] and [`PostSource`] traits; the publish sequence is a
//! separate state machine in [`workflow`].
//!
//! [`HistoryStack`]: inscript_editor_core::HistoryStack

mod capture;
mod debounce;
mod engine;
mod posts;
mod session;
mod store;
mod surface;
pub mod workflow;

pub use capture::{CaptureOutcome, DebouncedCapture};
pub use debounce::{Debouncer, TickSink};
pub use engine::{DraftSyncEngine, DraftWrite, LoadState, SyncStatus};
pub use posts::{
    FilePostSource, Frontmatter, MemoryPostSource, PostSource, PostSummary, PublishedPost,
    parse_post,
};
pub use session::{EditorSession, SessionEvent, SessionHandle, SessionView};
pub use store::{DraftStore, FileDraftStore, MemoryDraftStore, validate_post_id};
pub use surface::{EditingSurface, HeadlessSurface, LoadTicket};
pub use workflow::{
    PublishContext, PublishOps, PublishWorkflow, StepOutput, WorkflowPreset, WorkflowState,
    WorkflowStatus, WorkflowStep,
};

//! Mirrors the open post's history to the draft store and guards
//! programmatic loads.
//!
//! The engine is synchronous. It decides *when* a write is due and *what* it
//! contains; the session performs the write on a spawned task and reports the
//! outcome back through [`DraftSyncEngine::complete`]. Record contents are
//! read from the history when the timer fires, never when it is scheduled, so
//! the last write to be issued always carries the newest state.

use inscript_common::{EditorConfig, SyncError};
use inscript_editor_core::{DraftRecord, HistoryStack};
use n0_future::time::Duration;
use smol_str::SmolStr;
use tracing::{debug, info, warn};

use crate::debounce::Debouncer;
use crate::surface::{EditingSurface, LoadTicket};

/// Draft store health as shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SyncStatus {
    /// Nothing to write.
    #[default]
    Idle,
    /// A write is scheduled.
    Pending,
    /// A write is in flight.
    Saving,
    /// The latest write landed.
    Saved,
    /// The latest write failed; the next edit or navigation retries.
    Failed(SmolStr),
}

impl SyncStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Whether content notifications from the editing surface are user edits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    Idle,
    /// A programmatic load is on its way to the surface; its echo must not
    /// be captured.
    LoadingProgrammatically(LoadTicket),
}

/// A whole-record write, ready to hand to a [`crate::DraftStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct DraftWrite {
    pub post_id: SmolStr,
    pub record: DraftRecord,
    /// Issue order; only the newest write decides the status.
    pub seq: u64,
}

pub struct DraftSyncEngine {
    post_id: Option<SmolStr>,
    sync_delay: Duration,
    cursor_sync_delay: Duration,
    load_ack_timeout: Duration,
    write_timer: Debouncer,
    ack_timer: Debouncer,
    load: LoadState,
    next_ticket: u64,
    issued: u64,
    status: SyncStatus,
    has_draft: bool,
}

impl DraftSyncEngine {
    /// `write_sink` receives write-timer ticks, `ack_sink` receives
    /// load-acknowledgement timeouts.
    pub fn new(
        config: &EditorConfig,
        write_sink: impl Fn(u64) + Send + Sync + 'static,
        ack_sink: impl Fn(u64) + Send + Sync + 'static,
    ) -> Self {
        Self {
            post_id: None,
            sync_delay: config.sync_delay,
            cursor_sync_delay: config.cursor_sync_delay,
            load_ack_timeout: config.load_ack_timeout,
            write_timer: Debouncer::new("draft-sync", write_sink),
            ack_timer: Debouncer::new("load-ack", ack_sink),
            load: LoadState::Idle,
            next_ticket: 0,
            issued: 0,
            status: SyncStatus::Idle,
            has_draft: false,
        }
    }

    /// Start tracking `post_id`. Resets every timer and the load lock.
    pub fn attach(&mut self, post_id: impl Into<SmolStr>, has_draft: bool) {
        self.detach();
        self.post_id = Some(post_id.into());
        self.has_draft = has_draft;
    }

    /// Stop tracking the current post. Pending writes are dropped; use
    /// [`Self::flush`] first to keep them.
    pub fn detach(&mut self) {
        self.write_timer.cancel();
        self.ack_timer.cancel();
        self.post_id = None;
        self.load = LoadState::Idle;
        self.status = SyncStatus::Idle;
        self.has_draft = false;
    }

    pub fn post_id(&self) -> Option<&str> {
        self.post_id.as_deref()
    }

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    /// Whether the store is known to hold a record for the post.
    pub fn has_draft(&self) -> bool {
        self.has_draft
    }

    pub fn load_state(&self) -> LoadState {
        self.load
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.load, LoadState::LoadingProgrammatically(_))
    }

    pub fn write_pending(&self) -> bool {
        self.write_timer.is_pending()
    }

    /// The history gained an entry: schedule a full write.
    ///
    /// Returns false, with nothing scheduled, for a lone baseline; a post
    /// nobody has edited never gets a draft record.
    pub fn on_history_changed(&mut self, history: &HistoryStack) -> bool {
        if self.post_id.is_none() {
            return false;
        }
        if history.len() <= 1 {
            debug!(entries = history.len(), "history has no edits, skipping draft sync");
            self.write_timer.cancel();
            return false;
        }
        self.write_timer.schedule(self.sync_delay);
        self.status = SyncStatus::Pending;
        true
    }

    /// The cursor moved (undo, redo or restore).
    ///
    /// Locks out content notifications, asks the surface to show the entry
    /// at the cursor and schedules a short-delay write of the new cursor.
    pub fn on_cursor_moved(
        &mut self,
        history: &HistoryStack,
        surface: &mut impl EditingSurface,
    ) -> LoadTicket {
        let ticket = self.load_into(surface, &history.current().content);
        if self.post_id.is_some() && history.len() > 1 {
            self.write_timer.schedule(self.cursor_sync_delay);
            self.status = SyncStatus::Pending;
        }
        ticket
    }

    /// Enter the loading state and push `content` to the surface.
    pub fn load_into(&mut self, surface: &mut impl EditingSurface, content: &str) -> LoadTicket {
        self.next_ticket += 1;
        let ticket = LoadTicket::new(self.next_ticket);
        self.load = LoadState::LoadingProgrammatically(ticket);
        self.ack_timer.schedule(self.load_ack_timeout);
        debug!(%ticket, bytes = content.len(), "loading content into editing surface");
        surface.load_content(ticket, content);
        ticket
    }

    /// The surface finished loading. Ignores tickets other than the latest.
    pub fn acknowledge_load(&mut self, ticket: LoadTicket) -> bool {
        match self.load {
            LoadState::LoadingProgrammatically(current) if current == ticket => {
                self.load = LoadState::Idle;
                self.ack_timer.cancel();
                debug!(%ticket, "load acknowledged");
                true
            }
            _ => {
                debug!(%ticket, "ignoring stale load acknowledgement");
                false
            }
        }
    }

    /// Release the lock when the surface never acknowledged.
    pub fn load_timed_out(&mut self, generation: u64) -> bool {
        if !self.ack_timer.accept(generation) {
            return false;
        }
        if let LoadState::LoadingProgrammatically(ticket) = self.load {
            warn!(%ticket, "editing surface never acknowledged load, releasing lock");
            self.load = LoadState::Idle;
            return true;
        }
        false
    }

    /// A write tick arrived. Builds the record from the history as it is now.
    pub fn take_due(&mut self, generation: u64, history: &HistoryStack) -> Option<DraftWrite> {
        if !self.write_timer.accept(generation) {
            return None;
        }
        self.issue(history)
    }

    /// Issue any pending write immediately, as when the post is closed.
    pub fn flush(&mut self, history: &HistoryStack) -> Option<DraftWrite> {
        if !self.write_timer.cancel() {
            return None;
        }
        self.issue(history)
    }

    fn issue(&mut self, history: &HistoryStack) -> Option<DraftWrite> {
        let post_id = self.post_id.clone()?;
        if history.len() <= 1 {
            debug!(%post_id, "history has no edits, skipping draft write");
            self.status = SyncStatus::Idle;
            return None;
        }
        self.issued += 1;
        self.status = SyncStatus::Saving;
        Some(DraftWrite {
            post_id,
            record: history.to_record(),
            seq: self.issued,
        })
    }

    /// Apply the outcome of a write. Local history is never touched; a
    /// failure only changes the status until the next write.
    pub fn complete(&mut self, post_id: &str, seq: u64, result: &Result<(), SyncError>) -> bool {
        if self.post_id.as_deref() != Some(post_id) {
            debug!(post_id, seq, "dropping completion for a post that is no longer open");
            return false;
        }
        let latest = seq == self.issued;
        match result {
            Ok(()) => {
                self.has_draft = true;
                info!(post_id, seq, "draft saved");
                if latest && self.status == SyncStatus::Saving {
                    self.status = SyncStatus::Saved;
                }
            }
            Err(err) => {
                warn!(post_id, seq, error = %err, "draft sync failed");
                if latest && self.status == SyncStatus::Saving {
                    self.status = SyncStatus::Failed(err.to_string().into());
                }
            }
        }
        true
    }

    /// Drop a scheduled write without issuing it. Returns whether one was
    /// pending.
    pub fn cancel_write(&mut self) -> bool {
        let cancelled = self.write_timer.cancel();
        if cancelled && self.status == SyncStatus::Pending {
            self.status = SyncStatus::Idle;
        }
        cancelled
    }

    /// A store operation outside the write path failed.
    pub fn record_failure(&mut self, err: &SyncError) {
        self.status = SyncStatus::Failed(err.to_string().into());
    }

    /// The draft record was deleted out from under the engine.
    pub fn mark_discarded(&mut self) {
        self.write_timer.cancel();
        self.has_draft = false;
        self.status = SyncStatus::Idle;
    }
}

impl std::fmt::Debug for DraftSyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftSyncEngine")
            .field("post_id", &self.post_id)
            .field("load", &self.load)
            .field("issued", &self.issued)
            .field("status", &self.status)
            .field("has_draft", &self.has_draft)
            .finish()
    }
}

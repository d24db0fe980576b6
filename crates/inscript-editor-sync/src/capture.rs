//! Coalesces bursts of edit events into single history entries.

use chrono::{DateTime, Utc};
use inscript_editor_core::{DocumentState, HistoryStack, has_meaningful_change};
use n0_future::time::Duration;
use tracing::debug;

use crate::debounce::Debouncer;

/// What happened when a capture tick was processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The tick was superseded or cancelled.
    Stale,
    /// The live state matches the entry at the cursor.
    Unchanged,
    /// A new entry was appended at `index`.
    Appended { index: usize },
}

/// One quiet-period timer per open post; a new notification replaces the
/// pending one instead of queueing behind it.
#[derive(Debug)]
pub struct DebouncedCapture {
    delay: Duration,
    timer: Debouncer,
}

impl DebouncedCapture {
    pub fn new(delay: Duration, sink: impl Fn(u64) + Send + Sync + 'static) -> Self {
        Self {
            delay,
            timer: Debouncer::new("capture", sink),
        }
    }

    /// An edit happened; restart the quiet period.
    pub fn notify(&mut self) -> u64 {
        self.timer.schedule(self.delay)
    }

    pub fn cancel(&mut self) -> bool {
        self.timer.cancel()
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_pending()
    }

    /// Handle a delivered tick.
    ///
    /// `candidate` is only called for a live tick, so the snapshot reflects
    /// the state at fire time rather than at the last notification.
    pub fn fire(
        &mut self,
        generation: u64,
        candidate: impl FnOnce() -> DocumentState,
        history: &mut HistoryStack,
        now: DateTime<Utc>,
    ) -> CaptureOutcome {
        if !self.timer.accept(generation) {
            return CaptureOutcome::Stale;
        }

        let candidate = candidate();
        if !has_meaningful_change(&candidate, history.current()) {
            debug!(cursor = history.cursor(), "no meaningful change, skipping capture");
            return CaptureOutcome::Unchanged;
        }

        history.append(candidate.capture(now));
        debug!(
            entries = history.len(),
            cursor = history.cursor(),
            "captured history entry"
        );
        CaptureOutcome::Appended {
            index: history.cursor(),
        }
    }
}

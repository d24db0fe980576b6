//! Generation-tagged one-shot timers.
//!
//! A [`Debouncer`] never touches editor state itself. When its quiet period
//! elapses it hands the generation it was scheduled with to a sink (usually a
//! mailbox sender); the owner then calls [`Debouncer::accept`] to find out
//! whether that tick is still the live one. Rescheduling or cancelling bumps
//! the generation, so ticks that were already queued when the timer moved on
//! are recognised as stale and dropped.

use std::sync::Arc;

use n0_future::task::{self, JoinHandle};
use n0_future::time::{self, Duration};
use tracing::trace;

/// Receives the generation of a timer that has fired.
pub type TickSink = Arc<dyn Fn(u64) + Send + Sync>;

pub struct Debouncer {
    label: &'static str,
    sink: TickSink,
    generation: u64,
    pending: bool,
    task: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(label: &'static str, sink: impl Fn(u64) + Send + Sync + 'static) -> Self {
        Self {
            label,
            sink: Arc::new(sink),
            generation: 0,
            pending: false,
            task: None,
        }
    }

    /// (Re)start the quiet period. Any previously scheduled tick is
    /// superseded. Returns the generation the new tick will carry.
    pub fn schedule(&mut self, delay: Duration) -> u64 {
        self.abort_task();
        self.generation += 1;
        self.pending = true;

        let generation = self.generation;
        let sink = self.sink.clone();
        self.task = Some(task::spawn(async move {
            time::sleep(delay).await;
            sink(generation);
        }));
        trace!(timer = self.label, generation, ?delay, "timer scheduled");
        generation
    }

    /// Drop the pending tick, if any. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        let was_pending = self.pending;
        self.abort_task();
        self.generation += 1;
        self.pending = false;
        if was_pending {
            trace!(timer = self.label, "timer cancelled");
        }
        was_pending
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Claim a delivered tick. True exactly once, for the latest scheduled
    /// generation, and only while it has not been cancelled.
    pub fn accept(&mut self, generation: u64) -> bool {
        if self.pending && generation == self.generation {
            self.pending = false;
            self.task = None;
            true
        } else {
            trace!(
                timer = self.label,
                generation,
                current = self.generation,
                "dropping stale tick"
            );
            false
        }
    }

    fn abort_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.abort_task();
    }
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("label", &self.label)
            .field("generation", &self.generation)
            .field("pending", &self.pending)
            .finish()
    }
}

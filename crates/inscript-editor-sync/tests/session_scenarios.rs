use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use inscript_common::EditorConfig;
use inscript_editor_core::{Baseline, DocumentState, DraftRecord};
use inscript_editor_sync::{
    EditorSession, LoadTicket, MemoryDraftStore, MemoryPostSource, SessionHandle, SyncStatus,
};
use tokio::sync::mpsc;
use tokio::time::sleep;

struct Harness {
    handle: SessionHandle,
    store: MemoryDraftStore,
    posts: MemoryPostSource,
    loads: mpsc::UnboundedReceiver<(LoadTicket, String)>,
}

impl Harness {
    fn new() -> Self {
        let store = MemoryDraftStore::new();
        let posts = MemoryPostSource::new();
        posts.insert("a.md", baseline("A", "<p>x</p>"));
        posts.insert("b.md", baseline("B", "<p>b</p>"));

        let (tx, loads) = mpsc::unbounded_channel();
        let surface = move |ticket: LoadTicket, content: &str| {
            let _ = tx.send((ticket, content.to_string()));
        };
        let handle = EditorSession::spawn(
            EditorConfig::default(),
            Arc::new(store.clone()),
            Arc::new(posts.clone()),
            surface,
        );
        Self {
            handle,
            store,
            posts,
            loads,
        }
    }

    /// Take the next load pushed to the surface and acknowledge it.
    async fn ack(&mut self) -> String {
        let (ticket, content) = self.loads.recv().await.unwrap();
        self.handle.load_acknowledged(ticket).unwrap();
        content
    }

    async fn open(&mut self, post_id: &str) {
        self.handle.open(post_id).await.unwrap();
        self.ack().await;
    }

    /// Type `content` and wait past the capture delay.
    async fn edit(&self, content: &str) {
        self.handle.content_changed(content).unwrap();
        sleep(Duration::from_millis(1100)).await;
    }
}

fn baseline(title: &str, content: &str) -> Baseline {
    Baseline {
        title: title.into(),
        content: content.into(),
        ..Default::default()
    }
}

fn contents(record: &DraftRecord) -> Vec<&str> {
    record
        .entries
        .iter()
        .map(|entry| entry.content.as_str())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_fresh_post_loads_clean() {
    let mut h = Harness::new();
    let view = h.handle.open("a.md").await.unwrap();
    assert_eq!(view.entries, 1);
    assert_eq!(view.cursor, 0);
    assert!(!view.dirty);
    assert!(!view.can_undo);
    assert_eq!(h.ack().await, "<p>x</p>");
}

#[tokio::test(start_paused = true)]
async fn test_edit_is_captured_then_synced() {
    let mut h = Harness::new();
    h.open("a.md").await;

    h.edit("<p>y</p>").await;
    let view = h.handle.view().await.unwrap();
    assert_eq!((view.entries, view.cursor), (2, 1));
    assert!(view.dirty);
    assert_eq!(view.sync, SyncStatus::Pending);
    assert_eq!(h.store.write_count(), 0);

    sleep(Duration::from_millis(2500)).await;
    let record = h.store.get("a.md").unwrap();
    assert_eq!(contents(&record), ["<p>x</p>", "<p>y</p>"]);
    assert_eq!(record.cursor, Some(1));
    let view = h.handle.view().await.unwrap();
    assert_eq!(view.sync, SyncStatus::Saved);
    assert!(view.has_draft);
}

#[tokio::test(start_paused = true)]
async fn test_rapid_typing_becomes_one_entry() {
    let mut h = Harness::new();
    h.open("a.md").await;

    for content in ["<p>x1</p>", "<p>x12</p>", "<p>x123</p>"] {
        h.handle.content_changed(content).unwrap();
        sleep(Duration::from_millis(300)).await;
    }
    sleep(Duration::from_millis(1000)).await;

    let history = h.handle.history().await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history.current().content, "<p>x123</p>");
}

#[tokio::test(start_paused = true)]
async fn test_undo_writes_cursor_without_new_entry() {
    let mut h = Harness::new();
    h.open("a.md").await;
    h.edit("<p>y</p>").await;
    sleep(Duration::from_millis(2500)).await;
    assert_eq!(h.store.write_count(), 1);

    let view = h.handle.undo().await.unwrap();
    assert_eq!(view.cursor, 0);
    assert!(view.loading);

    // The surface re-emits the loaded content, slightly normalized, before
    // it acknowledges. That echo must not become an entry.
    let (ticket, content) = h.loads.recv().await.unwrap();
    assert_eq!(content, "<p>x</p>");
    h.handle.content_changed("<p>x</p>\n").unwrap();
    h.handle.load_acknowledged(ticket).unwrap();

    sleep(Duration::from_millis(600)).await;
    assert_eq!(h.store.write_count(), 2);
    let record = h.store.get("a.md").unwrap();
    assert_eq!(record.entries.len(), 2);
    assert_eq!(record.cursor, Some(0));

    sleep(Duration::from_millis(3000)).await;
    let history = h.handle.history().await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history.cursor(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_untouched_post_never_writes() {
    let mut h = Harness::new();
    h.open("a.md").await;

    sleep(Duration::from_secs(10)).await;
    let view = h.handle.undo().await.unwrap();
    assert_eq!(view.cursor, 0);
    h.handle.redo().await.unwrap();
    h.handle.restore(0).await.unwrap();
    sleep(Duration::from_secs(5)).await;

    assert_eq!(h.store.write_count(), 0);
    assert!(!h.store.contains("a.md"));
}

#[tokio::test(start_paused = true)]
async fn test_edit_after_undo_drops_redo_branch() {
    let mut h = Harness::new();
    h.open("a.md").await;
    h.edit("<p>y</p>").await;
    h.edit("<p>z</p>").await;

    h.handle.undo().await.unwrap();
    assert_eq!(h.ack().await, "<p>y</p>");
    h.edit("<p>w</p>").await;

    let history = h.handle.history().await.unwrap();
    let record = history.to_record();
    assert_eq!(contents(&record), ["<p>x</p>", "<p>y</p>", "<p>w</p>"]);
    assert_eq!(history.cursor(), 2);
    assert!(!history.can_redo());
}

#[tokio::test(start_paused = true)]
async fn test_restore_keeps_later_entries() {
    let mut h = Harness::new();
    h.open("a.md").await;
    h.edit("<p>y</p>").await;
    h.edit("<p>z</p>").await;

    let view = h.handle.restore(0).await.unwrap();
    assert_eq!((view.cursor, view.entries), (0, 3));
    assert!(view.dirty);
    assert!(view.can_redo);
    assert_eq!(h.ack().await, "<p>x</p>");

    let view = h.handle.restore(99).await.unwrap();
    assert_eq!(view.cursor, 2);
    assert_eq!(h.ack().await, "<p>z</p>");
}

#[tokio::test(start_paused = true)]
async fn test_failed_sync_keeps_history_and_recovers() {
    let mut h = Harness::new();
    h.open("a.md").await;
    h.store.set_failure(Some("offline"));

    h.edit("<p>y</p>").await;
    sleep(Duration::from_millis(2500)).await;
    let view = h.handle.view().await.unwrap();
    assert!(view.sync.is_failed());
    assert_eq!(view.entries, 2);
    assert!(!h.store.contains("a.md"));

    h.store.set_failure(None);
    h.edit("<p>z</p>").await;
    sleep(Duration::from_millis(2500)).await;
    let view = h.handle.view().await.unwrap();
    assert_eq!(view.sync, SyncStatus::Saved);
    let record = h.store.get("a.md").unwrap();
    assert_eq!(contents(&record), ["<p>x</p>", "<p>y</p>", "<p>z</p>"]);
}

#[tokio::test(start_paused = true)]
async fn test_switching_posts_cancels_pending_capture() {
    let mut h = Harness::new();
    h.open("a.md").await;
    h.handle.content_changed("<p>y</p>").unwrap();
    sleep(Duration::from_millis(500)).await;

    h.open("b.md").await;
    sleep(Duration::from_secs(5)).await;
    assert_eq!(h.store.write_count(), 0);

    let view = h.handle.open("a.md").await.unwrap();
    assert_eq!(view.entries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_flushes_pending_write() {
    let mut h = Harness::new();
    h.open("a.md").await;
    h.edit("<p>y</p>").await;
    assert_eq!(h.store.write_count(), 0);

    h.handle.close().await.unwrap();
    assert_eq!(h.store.write_count(), 1);
    assert_eq!(h.store.get("a.md").unwrap().entries.len(), 2);
    assert_eq!(h.handle.view().await.unwrap().post_id, None);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(h.store.write_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_late_completion_does_not_touch_next_post() {
    let mut h = Harness::new();
    h.store.set_latency(Some(Duration::from_secs(5)));
    h.open("a.md").await;
    h.edit("<p>y</p>").await;
    sleep(Duration::from_millis(2100)).await;
    assert_eq!(h.handle.view().await.unwrap().sync, SyncStatus::Saving);

    h.open("b.md").await;
    sleep(Duration::from_secs(6)).await;

    assert!(h.store.contains("a.md"));
    let view = h.handle.view().await.unwrap();
    assert_eq!(view.post_id.as_deref(), Some("b.md"));
    assert_eq!(view.sync, SyncStatus::Idle);
    assert!(!view.has_draft);
}

#[tokio::test(start_paused = true)]
async fn test_discard_published_post_returns_to_baseline() {
    let mut h = Harness::new();
    h.open("a.md").await;
    h.edit("<p>y</p>").await;
    sleep(Duration::from_millis(2500)).await;
    assert!(h.store.contains("a.md"));

    let view = h.handle.discard().await.unwrap();
    assert_eq!(view.entries, 1);
    assert!(!view.dirty);
    assert!(!view.has_draft);
    assert!(!h.store.contains("a.md"));
    assert_eq!(h.ack().await, "<p>x</p>");
}

#[tokio::test(start_paused = true)]
async fn test_discard_unpublished_post_keeps_first_entry() {
    let mut h = Harness::new();
    h.handle.create("fresh.md", "Fresh").await.unwrap();
    h.ack().await;
    h.edit("<p>hello</p>").await;
    sleep(Duration::from_millis(2500)).await;
    assert_eq!(h.store.get("fresh.md").unwrap().entries.len(), 2);

    let view = h.handle.discard().await.unwrap();
    assert!(view.unpublished);
    assert_eq!(view.entries, 1);
    assert!(!h.store.contains("fresh.md"));
}

#[tokio::test(start_paused = true)]
async fn test_unpublished_post_hydrates_from_draft() {
    let mut h = Harness::new();
    h.handle.create("fresh.md", "Fresh").await.unwrap();
    h.ack().await;
    h.edit("<p>hello</p>").await;
    h.handle.close().await.unwrap();

    let view = h.handle.open("fresh.md").await.unwrap();
    assert!(view.unpublished);
    assert_eq!((view.entries, view.cursor), (2, 1));
    assert_eq!(view.title, "Fresh");
    let history = h.handle.history().await.unwrap();
    assert!(history.baseline().is_original);
    assert_eq!(history.baseline().content, "");
}

#[tokio::test(start_paused = true)]
async fn test_outdated_draft_is_reconciled_and_persisted() {
    let mut h = Harness::new();
    h.posts.insert("a.md", baseline("A", "<p>x2</p>"));
    let stale = DraftRecord::new(
        vec![
            DocumentState::new("<p>x</p>", "A").capture(Utc::now()),
            DocumentState::new("<p>y</p>", "A").capture(Utc::now()),
        ],
        1,
    );
    h.store.insert("a.md", stale);

    let view = h.handle.open("a.md").await.unwrap();
    assert_eq!((view.entries, view.cursor), (3, 2));
    assert!(view.dirty);
    assert_eq!(h.ack().await, "<p>y</p>");

    sleep(Duration::from_millis(2500)).await;
    let record = h.store.get("a.md").unwrap();
    assert_eq!(contents(&record), ["<p>x2</p>", "<p>x</p>", "<p>y</p>"]);
    assert!(record.entries[0].is_original);
    assert_eq!(record.cursor, Some(2));
}

#[tokio::test(start_paused = true)]
async fn test_subscribers_see_dirty_flag() {
    let mut h = Harness::new();
    let mut views = h.handle.subscribe();
    h.open("a.md").await;
    assert!(!views.borrow_and_update().dirty);

    h.edit("<p>y</p>").await;
    assert!(views.has_changed().unwrap());
    assert!(views.borrow_and_update().dirty);
}

#[tokio::test(start_paused = true)]
async fn test_diff_against_original() {
    let mut h = Harness::new();
    h.open("a.md").await;
    h.handle.set_tags(["rust"]).unwrap();
    h.edit("<p>y</p>").await;

    let diff = h.handle.diff(None).await.unwrap();
    assert!(diff.has_changes());
    assert_eq!(diff.tags.added, vec!["rust"]);
    assert_eq!(h.handle.diff(Some(99)).await.unwrap(), diff);
    assert!(!h.handle.diff(Some(0)).await.unwrap().has_changes());
}

#[tokio::test(start_paused = true)]
async fn test_close_flush_lands_after_slow_write() {
    let mut h = Harness::new();
    h.open("a.md").await;
    h.store.set_latency(Some(Duration::from_secs(5)));
    h.edit("<p>y</p>").await;
    sleep(Duration::from_millis(2100)).await;
    assert_eq!(h.handle.view().await.unwrap().sync, SyncStatus::Saving);

    h.store.set_latency(None);
    h.edit("<p>z</p>").await;
    h.handle.close().await.unwrap();
    let record = h.store.get("a.md").unwrap();
    assert_eq!(contents(&record), ["<p>x</p>", "<p>y</p>", "<p>z</p>"]);

    sleep(Duration::from_secs(6)).await;
    let record = h.store.get("a.md").unwrap();
    assert_eq!(contents(&record), ["<p>x</p>", "<p>y</p>", "<p>z</p>"]);
    assert_eq!(h.store.write_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cursor_write_waits_for_slower_full_write() {
    let mut h = Harness::new();
    h.open("a.md").await;
    h.store.set_latency(Some(Duration::from_secs(5)));
    h.edit("<p>y</p>").await;
    sleep(Duration::from_millis(2100)).await;

    h.store.set_latency(None);
    h.handle.undo().await.unwrap();
    h.ack().await;
    sleep(Duration::from_secs(6)).await;

    let writes = h.store.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].1.cursor, Some(1));
    assert_eq!(h.store.get("a.md").unwrap().cursor, Some(0));
    assert_eq!(h.handle.view().await.unwrap().sync, SyncStatus::Saved);
}

#[tokio::test(start_paused = true)]
async fn test_failed_discard_keeps_draft_state() {
    let mut h = Harness::new();
    h.open("a.md").await;
    h.edit("<p>y</p>").await;
    sleep(Duration::from_millis(2500)).await;
    assert!(h.handle.view().await.unwrap().has_draft);

    h.store.set_failure(Some("offline"));
    assert!(h.handle.discard().await.is_err());
    let view = h.handle.view().await.unwrap();
    assert!(view.has_draft);
    assert!(view.sync.is_failed());
    assert_eq!(view.entries, 2);
    assert!(h.store.contains("a.md"));

    h.store.set_failure(None);
    let view = h.handle.discard().await.unwrap();
    assert!(!view.has_draft);
    assert!(!h.store.contains("a.md"));
}

#[tokio::test(start_paused = true)]
async fn test_delete_removes_post_and_draft() {
    let mut h = Harness::new();
    h.open("a.md").await;
    h.edit("<p>y</p>").await;
    sleep(Duration::from_millis(2500)).await;
    assert!(h.store.contains("a.md"));

    h.handle.delete().await.unwrap();
    assert!(!h.posts.contains("a.md"));
    assert!(!h.store.contains("a.md"));
    assert_eq!(h.handle.view().await.unwrap().post_id, None);
    assert!(h.handle.open("a.md").await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_pending_write_does_not_recreate_deleted_draft() {
    let mut h = Harness::new();
    h.open("a.md").await;
    h.edit("<p>y</p>").await;
    assert_eq!(h.handle.view().await.unwrap().sync, SyncStatus::Pending);

    h.handle.delete().await.unwrap();
    sleep(Duration::from_secs(5)).await;
    assert_eq!(h.store.write_count(), 0);
    assert!(!h.store.contains("a.md"));
}

#[tokio::test(start_paused = true)]
async fn test_delete_waits_for_write_in_flight() {
    let mut h = Harness::new();
    h.open("a.md").await;
    h.store.set_latency(Some(Duration::from_secs(5)));
    h.edit("<p>y</p>").await;
    sleep(Duration::from_millis(2100)).await;
    assert_eq!(h.handle.view().await.unwrap().sync, SyncStatus::Saving);

    h.handle.delete().await.unwrap();
    assert_eq!(h.store.write_count(), 1);
    sleep(Duration::from_secs(6)).await;
    assert!(!h.store.contains("a.md"));
    assert_eq!(h.handle.view().await.unwrap().post_id, None);
}

#[tokio::test(start_paused = true)]
async fn test_delete_without_open_post_fails() {
    let h = Harness::new();
    assert!(h.handle.delete().await.is_err());
    assert!(h.posts.contains("a.md"));
}

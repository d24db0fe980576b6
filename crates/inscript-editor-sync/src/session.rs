//! The editing session: single owner of the open post's history.
//!
//! Everything that touches the history goes through one mailbox and is
//! handled in order by [`EditorSession::run`]: editor notifications, user
//! commands, timer ticks and write completions alike. Nothing else holds a
//! reference to the history, so there is no locking and no stale-closure
//! problem; late arrivals are recognised by their timer generation or by the
//! epoch they were scheduled in.

use std::sync::Arc;

use chrono::Utc;
use inscript_common::{EditorConfig, InscriptError, LoadError, Result, SyncError};
use inscript_editor_core::{
    DocumentState, HistoryStack, Snapshot, SnapshotDiff, has_meaningful_change, hydrate,
};
use n0_future::task::{self, JoinHandle};
use smol_str::SmolStr;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::capture::{CaptureOutcome, DebouncedCapture};
use crate::engine::{DraftSyncEngine, DraftWrite, SyncStatus};
use crate::posts::{Frontmatter, PostSource};
use crate::store::{DraftStore, validate_post_id};
use crate::surface::{EditingSurface, LoadTicket};
use crate::workflow::PublishContext;

/// Read-only projection of the session for UI and callers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionView {
    pub post_id: Option<SmolStr>,
    /// Live field values, including edits not yet captured.
    pub title: SmolStr,
    pub tags: Vec<SmolStr>,
    pub categories: Vec<SmolStr>,
    pub cursor: usize,
    pub entries: usize,
    pub can_undo: bool,
    pub can_redo: bool,
    pub dirty: bool,
    pub unpublished: bool,
    pub has_draft: bool,
    /// A programmatic load has not been acknowledged yet.
    pub loading: bool,
    pub sync: SyncStatus,
}

type Reply<T> = oneshot::Sender<Result<T>>;

/// Everything the session reacts to.
#[derive(Debug)]
pub enum SessionEvent {
    Open {
        post_id: SmolStr,
        reply: Reply<SessionView>,
    },
    Create {
        post_id: SmolStr,
        title: SmolStr,
        reply: Reply<SessionView>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
    Discard {
        reply: Reply<SessionView>,
    },
    Delete {
        reply: Reply<()>,
    },
    ContentChanged {
        content: String,
    },
    TitleChanged {
        title: SmolStr,
    },
    TagsChanged {
        tags: Vec<SmolStr>,
    },
    CategoriesChanged {
        categories: Vec<SmolStr>,
    },
    Undo {
        reply: Reply<SessionView>,
    },
    Redo {
        reply: Reply<SessionView>,
    },
    Restore {
        index: usize,
        reply: Reply<SessionView>,
    },
    LoadAcknowledged {
        ticket: LoadTicket,
    },
    View {
        reply: oneshot::Sender<SessionView>,
    },
    History {
        reply: Reply<HistoryStack>,
    },
    Diff {
        index: Option<usize>,
        reply: Reply<SnapshotDiff>,
    },
    PublishContext {
        reply: Reply<PublishContext>,
    },
    CaptureDue {
        generation: u64,
    },
    SyncDue {
        generation: u64,
    },
    LoadTimeout {
        generation: u64,
    },
    SyncCompleted {
        epoch: u64,
        post_id: SmolStr,
        seq: u64,
        result: std::result::Result<(), SyncError>,
    },
}

#[derive(Debug, Clone, Copy)]
enum Navigation {
    Undo,
    Redo,
    Restore(usize),
}

struct OpenPost {
    post_id: SmolStr,
    history: HistoryStack,
    /// What the editing surface and metadata fields currently show.
    live: DocumentState,
    unpublished: bool,
}

pub struct EditorSession<S, P, E> {
    store: Arc<S>,
    posts: Arc<P>,
    surface: E,
    events: mpsc::WeakUnboundedSender<SessionEvent>,
    capture: DebouncedCapture,
    engine: DraftSyncEngine,
    post: Option<OpenPost>,
    epoch: u64,
    /// Most recently spawned draft write. Each write waits on the one before
    /// it, so awaiting this settles them all.
    last_write: Option<JoinHandle<()>>,
    view: watch::Sender<SessionView>,
}

impl<S, P, E> EditorSession<S, P, E>
where
    S: DraftStore,
    P: PostSource,
    E: EditingSurface,
{
    /// Start a session on its own task and return its handle. The session
    /// stops once every handle has been dropped.
    pub fn spawn(config: EditorConfig, store: Arc<S>, posts: Arc<P>, surface: E) -> SessionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(SessionView::default());
        let weak = tx.downgrade();

        let session = Self {
            store,
            posts,
            surface,
            capture: DebouncedCapture::new(
                config.capture_delay,
                tick_sink(&weak, |generation| SessionEvent::CaptureDue { generation }),
            ),
            engine: DraftSyncEngine::new(
                &config,
                tick_sink(&weak, |generation| SessionEvent::SyncDue { generation }),
                tick_sink(&weak, |generation| SessionEvent::LoadTimeout { generation }),
            ),
            events: weak,
            post: None,
            epoch: 0,
            last_write: None,
            view: view_tx,
        };
        task::spawn(session.run(rx));

        SessionHandle {
            events: tx,
            view: view_rx,
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionEvent>) {
        debug!("editor session started");
        while let Some(event) = rx.recv().await {
            self.handle(event).await;
            self.publish_view();
        }
        self.close_post().await;
        debug!("editor session stopped");
    }

    async fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Open { post_id, reply } => {
                let result = self.open(post_id).await;
                let _ = reply.send(result);
            }
            SessionEvent::Create {
                post_id,
                title,
                reply,
            } => {
                let result = self.create(post_id, title).await;
                let _ = reply.send(result);
            }
            SessionEvent::Close { reply } => {
                self.close_post().await;
                let _ = reply.send(());
            }
            SessionEvent::Discard { reply } => {
                let result = self.discard().await;
                let _ = reply.send(result);
            }
            SessionEvent::Delete { reply } => {
                let result = self.delete().await;
                let _ = reply.send(result);
            }
            SessionEvent::ContentChanged { content } => self.content_changed(content),
            SessionEvent::TitleChanged { title } => self.edit_metadata(|live| live.title = title),
            SessionEvent::TagsChanged { tags } => self.edit_metadata(|live| live.tags = tags),
            SessionEvent::CategoriesChanged { categories } => {
                self.edit_metadata(|live| live.categories = categories)
            }
            SessionEvent::Undo { reply } => {
                let _ = reply.send(self.navigate(Navigation::Undo));
            }
            SessionEvent::Redo { reply } => {
                let _ = reply.send(self.navigate(Navigation::Redo));
            }
            SessionEvent::Restore { index, reply } => {
                let _ = reply.send(self.navigate(Navigation::Restore(index)));
            }
            SessionEvent::LoadAcknowledged { ticket } => {
                self.engine.acknowledge_load(ticket);
            }
            SessionEvent::View { reply } => {
                let _ = reply.send(self.view());
            }
            SessionEvent::History { reply } => {
                let result = self
                    .post
                    .as_ref()
                    .map(|post| post.history.clone())
                    .ok_or(InscriptError::NoPost);
                let _ = reply.send(result);
            }
            SessionEvent::Diff { index, reply } => {
                let _ = reply.send(self.diff(index));
            }
            SessionEvent::PublishContext { reply } => {
                let _ = reply.send(self.publish_context());
            }
            SessionEvent::CaptureDue { generation } => self.capture_due(generation),
            SessionEvent::SyncDue { generation } => self.sync_due(generation),
            SessionEvent::LoadTimeout { generation } => {
                self.engine.load_timed_out(generation);
            }
            SessionEvent::SyncCompleted {
                epoch,
                post_id,
                seq,
                result,
            } => {
                if epoch != self.epoch {
                    debug!(%post_id, seq, "dropping write completion from an earlier post");
                    return;
                }
                self.engine.complete(&post_id, seq, &result);
            }
        }
    }

    async fn open(&mut self, post_id: SmolStr) -> Result<SessionView> {
        self.close_post().await;

        let baseline = self.posts.load_post(&post_id).await?;
        let stored = self
            .store
            .read_draft(&post_id)
            .await
            .map_err(|source| LoadError::Draft {
                post_id: post_id.clone(),
                source,
            })?;
        let has_draft = stored.as_ref().is_some_and(|record| !record.is_empty());

        let hydrated = hydrate(&post_id, baseline.as_ref(), stored, Utc::now())?;
        info!(
            %post_id,
            entries = hydrated.history.len(),
            cursor = hydrated.history.cursor(),
            unpublished = hydrated.unpublished,
            "post loaded"
        );

        self.install(post_id, hydrated.history, hydrated.unpublished, has_draft);
        if hydrated.prepended_baseline {
            if let Some(post) = &self.post {
                self.engine.on_history_changed(&post.history);
            }
        }
        Ok(self.view())
    }

    async fn create(&mut self, post_id: SmolStr, title: SmolStr) -> Result<SessionView> {
        validate_post_id(&post_id)?;
        self.close_post().await;

        let baseline = Snapshot::original(DocumentState::new("", title), Utc::now());
        info!(%post_id, "new post created");
        self.install(post_id, HistoryStack::new(baseline), true, false);
        Ok(self.view())
    }

    fn install(&mut self, post_id: SmolStr, history: HistoryStack, unpublished: bool, has_draft: bool) {
        self.engine.attach(post_id.clone(), has_draft);
        let live = history.current().document();
        self.engine.load_into(&mut self.surface, &live.content);
        self.post = Some(OpenPost {
            post_id,
            history,
            live,
            unpublished,
        });
    }

    /// Cancel the pending capture, write out any pending draft and forget
    /// the post. The flush goes out after every spawned write has landed;
    /// its outcome is not applied anywhere.
    async fn close_post(&mut self) {
        self.capture.cancel();
        self.epoch += 1;
        self.settle_writes().await;

        let Some(post) = self.post.take() else {
            self.engine.detach();
            return;
        };
        if let Some(write) = self.engine.flush(&post.history) {
            debug!(post_id = %write.post_id, entries = write.record.entries.len(), "flushing pending draft write");
            if let Err(err) = self.store.write_draft(&write.post_id, &write.record).await {
                warn!(post_id = %write.post_id, error = %err, "draft flush failed");
            }
        }
        self.engine.detach();
        info!(post_id = %post.post_id, "post closed");
    }

    /// Delete the draft record and fall back to the baseline.
    async fn discard(&mut self) -> Result<SessionView> {
        let post_id = self
            .post
            .as_ref()
            .map(|post| post.post_id.clone())
            .ok_or(InscriptError::NoPost)?;

        self.capture.cancel();
        let pending = self.engine.cancel_write();
        self.settle_writes().await;
        if let Err(err) = self.store.delete_draft(&post_id).await {
            self.delete_failed(pending, &err);
            return Err(err.into());
        }
        self.engine.mark_discarded();
        info!(%post_id, "draft discarded");

        let unpublished = self.post.as_ref().is_some_and(|post| post.unpublished);
        if !unpublished {
            return self.open(post_id).await;
        }

        // Nothing on disk to re-read; the first entry is all there is.
        self.epoch += 1;
        let Some(mut post) = self.post.take() else {
            return Err(InscriptError::NoPost);
        };
        post.history.clear_history();
        self.install(post.post_id, post.history, true, false);
        Ok(self.view())
    }

    /// Remove the published post and its draft record, then close it
    /// without flushing.
    async fn delete(&mut self) -> Result<()> {
        let post_id = self
            .post
            .as_ref()
            .map(|post| post.post_id.clone())
            .ok_or(InscriptError::NoPost)?;

        self.capture.cancel();
        let pending = self.engine.cancel_write();
        self.settle_writes().await;

        let removed = match self.posts.delete_post(&post_id).await {
            Ok(removed) => removed,
            Err(err) => {
                warn!(%post_id, error = %err, "post removal failed");
                if pending {
                    self.resume_write();
                }
                return Err(err.into());
            }
        };
        if let Some(post) = self.post.as_mut() {
            post.unpublished = true;
        }
        if let Err(err) = self.store.delete_draft(&post_id).await {
            self.delete_failed(pending, &err);
            return Err(err.into());
        }

        self.epoch += 1;
        self.post = None;
        self.engine.detach();
        info!(%post_id, removed_file = removed, "post deleted");
        Ok(())
    }

    /// The draft record survived a delete: keep the post open, re-arm the
    /// write that was cancelled for it and report the failure.
    fn delete_failed(&mut self, pending: bool, err: &SyncError) {
        warn!(error = %err, "draft delete failed");
        if pending {
            self.resume_write();
        }
        self.engine.record_failure(err);
    }

    fn resume_write(&mut self) {
        if let Some(post) = &self.post {
            self.engine.on_history_changed(&post.history);
        }
    }

    /// Wait for spawned writes so a following write or delete cannot be
    /// overtaken.
    async fn settle_writes(&mut self) {
        if let Some(handle) = self.last_write.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "draft write task failed");
            }
        }
    }

    fn content_changed(&mut self, content: String) {
        let Some(post) = self.post.as_mut() else {
            debug!("content change with no post open");
            return;
        };
        if self.engine.is_loading() {
            debug!("ignoring content change during programmatic load");
            return;
        }
        if post.live.content == content {
            return;
        }
        post.live.content = content;
        self.capture.notify();
    }

    /// Title, tag and category edits. These come from fields the surface
    /// does not own, so they are accepted even while a load is pending.
    fn edit_metadata(&mut self, apply: impl FnOnce(&mut DocumentState)) {
        let Some(post) = self.post.as_mut() else {
            debug!("metadata change with no post open");
            return;
        };
        apply(&mut post.live);
        self.capture.notify();
    }

    fn navigate(&mut self, navigation: Navigation) -> Result<SessionView> {
        let post = self.post.as_mut().ok_or(InscriptError::NoPost)?;
        let before = post.history.cursor();
        match navigation {
            Navigation::Undo => post.history.undo(),
            Navigation::Redo => post.history.redo(),
            Navigation::Restore(index) => post.history.restore(index),
        };

        let moved = post.history.cursor() != before;
        if !moved && !has_meaningful_change(&post.live, post.history.current()) {
            debug!(cursor = before, ?navigation, "cursor unchanged");
            return Ok(self.view());
        }

        self.capture.cancel();
        post.live = post.history.current().document();
        self.engine.on_cursor_moved(&post.history, &mut self.surface);
        info!(
            post_id = %post.post_id,
            from = before,
            to = post.history.cursor(),
            "cursor moved"
        );
        Ok(self.view())
    }

    fn capture_due(&mut self, generation: u64) {
        let Some(post) = self.post.as_mut() else {
            return;
        };
        let outcome = self
            .capture
            .fire(generation, || post.live.clone(), &mut post.history, Utc::now());
        if let CaptureOutcome::Appended { .. } = outcome {
            self.engine.on_history_changed(&post.history);
        }
    }

    fn sync_due(&mut self, generation: u64) {
        let Some(post) = self.post.as_ref() else {
            return;
        };
        if let Some(write) = self.engine.take_due(generation, &post.history) {
            self.spawn_write(write);
        }
    }

    fn spawn_write(&mut self, write: DraftWrite) {
        let store = self.store.clone();
        let events = self.events.clone();
        let epoch = self.epoch;
        debug!(
            post_id = %write.post_id,
            entries = write.record.entries.len(),
            cursor = ?write.record.cursor,
            seq = write.seq,
            "issuing draft write"
        );

        let previous = self.last_write.take();
        let handle = task::spawn(async move {
            if let Some(previous) = previous {
                if let Err(err) = previous.await {
                    warn!(error = %err, "draft write task failed");
                }
            }
            let result = store.write_draft(&write.post_id, &write.record).await;
            if let Some(events) = events.upgrade() {
                let _ = events.send(SessionEvent::SyncCompleted {
                    epoch,
                    post_id: write.post_id,
                    seq: write.seq,
                    result,
                });
            }
        });
        self.last_write = Some(handle);
    }

    fn diff(&self, index: Option<usize>) -> Result<SnapshotDiff> {
        let post = self.post.as_ref().ok_or(InscriptError::NoPost)?;
        let history = &post.history;
        let index = index.unwrap_or(history.cursor()).min(history.last_index());
        let selected = history.get(index).unwrap_or_else(|| history.current());
        Ok(SnapshotDiff::between(history.baseline(), selected))
    }

    /// What a save would write right now, including uncaptured edits.
    fn publish_context(&self) -> Result<PublishContext> {
        let post = self.post.as_ref().ok_or(InscriptError::NoPost)?;
        let created = post.unpublished.then(|| post.history.baseline().timestamp);
        Ok(PublishContext {
            post_id: post.post_id.clone(),
            frontmatter: Frontmatter {
                title: post.live.title.clone(),
                tags: post.live.tags.clone(),
                categories: post.live.categories.clone(),
                created,
                modified: None,
            },
            content: post.live.content.clone(),
        })
    }

    fn view(&self) -> SessionView {
        let Some(post) = &self.post else {
            return SessionView::default();
        };
        let history = &post.history;
        SessionView {
            post_id: Some(post.post_id.clone()),
            title: post.live.title.clone(),
            tags: post.live.tags.clone(),
            categories: post.live.categories.clone(),
            cursor: history.cursor(),
            entries: history.len(),
            can_undo: history.can_undo(),
            can_redo: history.can_redo(),
            dirty: history.is_dirty(),
            unpublished: post.unpublished,
            has_draft: self.engine.has_draft(),
            loading: self.engine.is_loading(),
            sync: self.engine.status().clone(),
        }
    }

    fn publish_view(&self) {
        let view = self.view();
        self.view.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }
}

fn tick_sink(
    events: &mpsc::WeakUnboundedSender<SessionEvent>,
    make: fn(u64) -> SessionEvent,
) -> impl Fn(u64) + Send + Sync + 'static {
    let events = events.clone();
    move |generation| {
        if let Some(events) = events.upgrade() {
            let _ = events.send(make(generation));
        }
    }
}

/// Cloneable front door to a running [`EditorSession`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<SessionEvent>,
    view: watch::Receiver<SessionView>,
}

impl SessionHandle {
    fn send(&self, event: SessionEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| InscriptError::SessionClosed)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> SessionEvent) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx))?;
        rx.await.map_err(|_| InscriptError::SessionClosed)
    }

    /// Open a post, hydrating its history from the baseline and any stored
    /// draft. On failure no post is open.
    pub async fn open(&self, post_id: impl Into<SmolStr>) -> Result<SessionView> {
        let post_id = post_id.into();
        self.request(|reply| SessionEvent::Open { post_id, reply })
            .await?
    }

    /// Start a new, unpublished post with an empty baseline.
    pub async fn create(
        &self,
        post_id: impl Into<SmolStr>,
        title: impl Into<SmolStr>,
    ) -> Result<SessionView> {
        let post_id = post_id.into();
        let title = title.into();
        self.request(|reply| SessionEvent::Create {
            post_id,
            title,
            reply,
        })
        .await?
    }

    /// Close the open post, writing out any pending draft first.
    pub async fn close(&self) -> Result<()> {
        self.request(|reply| SessionEvent::Close { reply }).await
    }

    /// Delete the open post's draft and collapse to its baseline.
    pub async fn discard(&self) -> Result<SessionView> {
        self.request(|reply| SessionEvent::Discard { reply }).await?
    }

    /// Delete the open post: its published file and its draft record. No
    /// post is open afterwards. On failure the post stays open.
    pub async fn delete(&self) -> Result<()> {
        self.request(|reply| SessionEvent::Delete { reply }).await?
    }

    /// The editing surface reports new content.
    pub fn content_changed(&self, content: impl Into<String>) -> Result<()> {
        self.send(SessionEvent::ContentChanged {
            content: content.into(),
        })
    }

    pub fn set_title(&self, title: impl Into<SmolStr>) -> Result<()> {
        self.send(SessionEvent::TitleChanged {
            title: title.into(),
        })
    }

    pub fn set_tags<I, T>(&self, tags: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<SmolStr>,
    {
        self.send(SessionEvent::TagsChanged {
            tags: tags.into_iter().map(Into::into).collect(),
        })
    }

    pub fn set_categories<I, T>(&self, categories: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<SmolStr>,
    {
        self.send(SessionEvent::CategoriesChanged {
            categories: categories.into_iter().map(Into::into).collect(),
        })
    }

    pub async fn undo(&self) -> Result<SessionView> {
        self.request(|reply| SessionEvent::Undo { reply }).await?
    }

    pub async fn redo(&self) -> Result<SessionView> {
        self.request(|reply| SessionEvent::Redo { reply }).await?
    }

    /// Move the cursor to `index` (clamped) without dropping later entries.
    pub async fn restore(&self, index: usize) -> Result<SessionView> {
        self.request(|reply| SessionEvent::Restore { index, reply })
            .await?
    }

    /// The editing surface has finished the load identified by `ticket`.
    pub fn load_acknowledged(&self, ticket: LoadTicket) -> Result<()> {
        self.send(SessionEvent::LoadAcknowledged { ticket })
    }

    pub async fn view(&self) -> Result<SessionView> {
        self.request(|reply| SessionEvent::View { reply }).await
    }

    /// A copy of the open post's history.
    pub async fn history(&self) -> Result<HistoryStack> {
        self.request(|reply| SessionEvent::History { reply }).await?
    }

    /// Baseline versus the entry at `index`, or at the cursor when `None`.
    pub async fn diff(&self, index: Option<usize>) -> Result<SnapshotDiff> {
        self.request(|reply| SessionEvent::Diff { index, reply })
            .await?
    }

    pub async fn publish_context(&self) -> Result<PublishContext> {
        self.request(|reply| SessionEvent::PublishContext { reply })
            .await?
    }

    /// Receive a new [`SessionView`] after every change.
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use inscript_editor_core::Baseline;

    use super::*;
    use crate::posts::MemoryPostSource;
    use crate::store::MemoryDraftStore;
    use crate::surface::HeadlessSurface;

    fn spawn() -> (SessionHandle, MemoryDraftStore, MemoryPostSource) {
        let store = MemoryDraftStore::new();
        let posts = MemoryPostSource::new();
        posts.insert(
            "a.md",
            Baseline {
                title: "A".into(),
                content: "<p>x</p>".into(),
                ..Default::default()
            },
        );
        let handle = EditorSession::spawn(
            EditorConfig::default(),
            Arc::new(store.clone()),
            Arc::new(posts.clone()),
            HeadlessSurface,
        );
        (handle, store, posts)
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_without_post() {
        let (handle, _, _) = spawn();
        assert!(matches!(handle.undo().await, Err(InscriptError::NoPost)));
        assert!(matches!(handle.history().await, Err(InscriptError::NoPost)));
        assert!(matches!(handle.discard().await, Err(InscriptError::NoPost)));
        assert_eq!(handle.view().await.unwrap(), SessionView::default());
        handle.content_changed("<p>ignored</p>").unwrap();
        handle.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unacknowledged_load_blocks_edits_until_timeout() {
        let (handle, _, _) = spawn();
        let view = handle.open("a.md").await.unwrap();
        assert!(view.loading);

        handle.content_changed("<p>echo</p>").unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let view = handle.view().await.unwrap();
        assert!(!view.loading);
        assert_eq!(view.entries, 1);

        handle.content_changed("<p>typed</p>").unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(handle.view().await.unwrap().entries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_metadata_edits_are_not_locked_out() {
        let (handle, _, _) = spawn();
        handle.open("a.md").await.unwrap();

        handle.set_tags(["rust"]).unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let history = handle.history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.current().tags, vec![SmolStr::new("rust")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_post_leaves_session_empty() {
        let (handle, _, _) = spawn();
        handle.open("a.md").await.unwrap();
        let err = handle.open("ghost.md").await.unwrap_err();
        assert!(matches!(err, InscriptError::Load(LoadError::NotFound { .. })));
        assert_eq!(handle.view().await.unwrap().post_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_rejects_path_like_ids() {
        let (handle, _, _) = spawn();
        let err = handle.create("../evil.md", "x").await.unwrap_err();
        assert!(matches!(err, InscriptError::Sync(SyncError::InvalidPostId { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_context_reflects_live_state() {
        let (handle, _, _) = spawn();
        handle.open("a.md").await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        handle.set_title("Renamed").unwrap();
        handle.content_changed("<p>draft</p>").unwrap();
        let context = handle.publish_context().await.unwrap();
        assert_eq!(context.post_id, "a.md");
        assert_eq!(context.frontmatter.title, "Renamed");
        assert_eq!(context.content, "<p>draft</p>");
        assert_eq!(context.frontmatter.created, None);
    }
}

//! Captured document states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// The editable fields of a post, without capture metadata.
///
/// This is what the editing surface and metadata fields produce on every
/// edit; it only becomes a [`Snapshot`] once a capture decides to keep it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentState {
    pub content: String,
    pub title: SmolStr,
    pub tags: Vec<SmolStr>,
    pub categories: Vec<SmolStr>,
}

impl DocumentState {
    pub fn new(content: impl Into<String>, title: impl Into<SmolStr>) -> Self {
        Self {
            content: content.into(),
            title: title.into(),
            tags: Vec::new(),
            categories: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    /// Freeze this state into a non-original snapshot taken at `at`.
    pub fn capture(self, at: DateTime<Utc>) -> Snapshot {
        Snapshot {
            content: self.content,
            title: self.title,
            tags: self.tags,
            categories: self.categories,
            timestamp: at,
            is_original: false,
        }
    }
}

/// An immutable captured document state.
///
/// Once a snapshot is in a `HistoryStack` it is only ever handed out by
/// shared reference; edits always produce a new snapshot.
///
/// Serialized field names match the draft record format; `html` is accepted
/// as an alias for `content` for records written by older editors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default, alias = "html")]
    pub content: String,

    #[serde(default)]
    pub title: SmolStr,

    /// Display order is preserved; equality ignores it.
    #[serde(default)]
    pub tags: Vec<SmolStr>,

    #[serde(default)]
    pub categories: Vec<SmolStr>,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// True only for the snapshot of the last published state.
    #[serde(default)]
    pub is_original: bool,
}

impl Snapshot {
    /// Build the baseline snapshot for a published post.
    pub fn original(state: DocumentState, at: DateTime<Utc>) -> Self {
        Self {
            is_original: true,
            ..state.capture(at)
        }
    }

    /// The editable fields of this snapshot.
    pub fn document(&self) -> DocumentState {
        DocumentState {
            content: self.content.clone(),
            title: self.title.clone(),
            tags: self.tags.clone(),
            categories: self.categories.clone(),
        }
    }
}

/// Read access to the fields the change detector compares.
pub trait DocumentFields {
    fn content(&self) -> &str;
    fn title(&self) -> &str;
    fn tags(&self) -> &[SmolStr];
    fn categories(&self) -> &[SmolStr];
}

impl DocumentFields for Snapshot {
    fn content(&self) -> &str {
        &self.content
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn tags(&self) -> &[SmolStr] {
        &self.tags
    }

    fn categories(&self) -> &[SmolStr] {
        &self.categories
    }
}

impl DocumentFields for DocumentState {
    fn content(&self) -> &str {
        &self.content
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn tags(&self) -> &[SmolStr] {
        &self.tags
    }

    fn categories(&self) -> &[SmolStr] {
        &self.categories
    }
}

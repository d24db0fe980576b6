//! Published posts: markdown files with an optional YAML frontmatter block.

use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use inscript_common::{InscriptError, LoadError};
use inscript_editor_core::{Baseline, DraftRecord};
use smol_str::SmolStr;
use tracing::{debug, info, warn};
use yaml_rust2::yaml::Hash;
use yaml_rust2::{Yaml, YamlEmitter, YamlLoader};

use crate::store::{DraftStore, FileDraftStore, validate_post_id};

/// Source of published baselines.
pub trait PostSource: Send + Sync + 'static {
    /// The published state of `post_id`, or `None` when the post has never
    /// been published.
    fn load_post(
        &self,
        post_id: &str,
    ) -> impl Future<Output = Result<Option<Baseline>, LoadError>> + Send;

    /// Remove the published post. Returns whether there was one to remove.
    fn delete_post(&self, post_id: &str) -> impl Future<Output = Result<bool, LoadError>> + Send;
}

/// The frontmatter fields the editor manages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontmatter {
    pub title: SmolStr,
    pub tags: Vec<SmolStr>,
    pub categories: Vec<SmolStr>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

/// A parsed post file.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedPost {
    pub post_id: SmolStr,
    pub frontmatter: Frontmatter,
    pub body: String,
}

impl PublishedPost {
    pub fn baseline(&self) -> Baseline {
        Baseline {
            title: self.frontmatter.title.clone(),
            content: self.body.clone(),
            tags: self.frontmatter.tags.clone(),
            categories: self.frontmatter.categories.clone(),
            created: self.frontmatter.created,
        }
    }
}

/// One row of a post listing.
#[derive(Debug, Clone, PartialEq)]
pub struct PostSummary {
    pub post_id: SmolStr,
    pub title: SmolStr,
    pub has_draft: bool,
    /// Draft-only post with no file under the posts directory.
    pub unpublished: bool,
    pub modified: Option<DateTime<Utc>>,
}

/// Posts stored as `<root>/<post_id>`.
#[derive(Debug, Clone)]
pub struct FilePostSource {
    root: PathBuf,
}

impl FilePostSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, post_id: &str) -> Result<PathBuf, LoadError> {
        validate_post_id(post_id).map_err(|_| LoadError::InvalidPostId {
            post_id: post_id.into(),
        })?;
        Ok(self.root.join(post_id))
    }

    async fn read_text(&self, post_id: &str) -> Result<Option<String>, LoadError> {
        let path = self.path_for(post_id)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(LoadError::Io {
                post_id: post_id.into(),
                path,
                source,
            }),
        }
    }

    /// Parse the file for `post_id`, if there is one.
    pub async fn read_post(&self, post_id: &str) -> Result<Option<PublishedPost>, LoadError> {
        match self.read_text(post_id).await? {
            Some(text) => parse_post(post_id, &text).map(Some),
            None => Ok(None),
        }
    }

    /// Write `content` back to disk under `frontmatter`, then drop the
    /// post's draft record.
    ///
    /// Keys the editor does not manage are carried over from the existing
    /// file, as is its `created` stamp; `modified` is always set to now.
    /// A failure to remove the draft is logged and otherwise ignored.
    pub async fn save_record<S: DraftStore>(
        &self,
        drafts: &S,
        post_id: &str,
        frontmatter: &Frontmatter,
        content: &str,
    ) -> Result<Frontmatter, InscriptError> {
        let path = self.path_for(post_id)?;
        let existing = match self.read_text(post_id).await? {
            Some(text) => {
                let (yaml, _) = split_frontmatter(&text);
                match yaml {
                    Some(yaml) => load_mapping(post_id, yaml)?,
                    None => Hash::new(),
                }
            }
            None => Hash::new(),
        };

        let now = Utc::now();
        let (doc, saved) = merge_frontmatter(existing, frontmatter, now);

        let mut header = String::new();
        YamlEmitter::new(&mut header)
            .dump(&Yaml::Hash(doc))
            .map_err(|e| LoadError::Frontmatter {
                post_id: post_id.into(),
                message: e.to_string(),
            })?;

        let mut file = header;
        file.push_str("\n---\n");
        file.push_str(content);
        if !content.ends_with('\n') {
            file.push('\n');
        }

        let io_err = |path: &Path, source| LoadError::Io {
            post_id: post_id.into(),
            path: path.to_path_buf(),
            source,
        };
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| io_err(&self.root, e))?;
        tokio::fs::write(&path, file)
            .await
            .map_err(|e| io_err(&path, e))?;
        info!(post_id, path = %path.display(), "post saved");

        if let Err(err) = drafts.delete_draft(post_id).await {
            warn!(post_id, error = %err, "failed to clear draft after save");
        }
        Ok(saved)
    }

    /// Every published post plus every draft-only post, sorted by id.
    pub async fn list_posts(&self, drafts: &FileDraftStore) -> Result<Vec<PostSummary>, InscriptError> {
        let draft_ids = drafts.list_drafts().await?;
        let mut posts = Vec::new();

        let io_err = |source| LoadError::Io {
            post_id: SmolStr::default(),
            path: self.root.clone(),
            source,
        };
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => Some(dir),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(io_err(e).into()),
        };

        if let Some(dir) = dir.as_mut() {
            while let Some(entry) = dir.next_entry().await.map_err(io_err)? {
                let name = entry.file_name();
                let Some(post_id) = name.to_str() else { continue };
                if !post_id.ends_with(".md") || post_id.starts_with('.') {
                    continue;
                }
                let Some(post) = self.read_post(post_id).await? else { continue };
                posts.push(PostSummary {
                    has_draft: draft_ids.iter().any(|d| d == post_id),
                    post_id: post.post_id,
                    title: post.frontmatter.title,
                    unpublished: false,
                    modified: post.frontmatter.modified,
                });
            }
        }

        for draft_id in draft_ids {
            if posts.iter().any(|p| p.post_id == draft_id) {
                continue;
            }
            let Some(record) = drafts.read_draft(&draft_id).await? else { continue };
            posts.push(orphan_summary(draft_id, &record));
        }

        posts.sort_by(|a, b| a.post_id.cmp(&b.post_id));
        Ok(posts)
    }
}

impl PostSource for FilePostSource {
    async fn load_post(&self, post_id: &str) -> Result<Option<Baseline>, LoadError> {
        let post = self.read_post(post_id).await?;
        if post.is_none() {
            debug!(post_id, "no published file");
        }
        Ok(post.map(|post| post.baseline()))
    }

    async fn delete_post(&self, post_id: &str) -> Result<bool, LoadError> {
        let path = self.path_for(post_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(post_id, "post file removed");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(LoadError::Remove {
                post_id: post_id.into(),
                path,
                source,
            }),
        }
    }
}

/// In-process post source.
#[derive(Debug, Clone, Default)]
pub struct MemoryPostSource {
    posts: Arc<Mutex<HashMap<SmolStr, Baseline>>>,
}

impl MemoryPostSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn posts(&self) -> MutexGuard<'_, HashMap<SmolStr, Baseline>> {
        self.posts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, post_id: impl Into<SmolStr>, baseline: Baseline) {
        self.posts().insert(post_id.into(), baseline);
    }

    pub fn contains(&self, post_id: &str) -> bool {
        self.posts().contains_key(post_id)
    }
}

impl PostSource for MemoryPostSource {
    async fn load_post(&self, post_id: &str) -> Result<Option<Baseline>, LoadError> {
        Ok(self.posts().get(post_id).cloned())
    }

    async fn delete_post(&self, post_id: &str) -> Result<bool, LoadError> {
        Ok(self.posts().remove(post_id).is_some())
    }
}

/// Split and parse a post file.
pub fn parse_post(post_id: &str, text: &str) -> Result<PublishedPost, LoadError> {
    let (yaml, body) = split_frontmatter(text);
    let doc = match yaml {
        Some(yaml) => load_mapping(post_id, yaml)?,
        None => Hash::new(),
    };
    let doc = Yaml::Hash(doc);

    let title = scalar(&doc["title"])
        .map(SmolStr::from)
        .unwrap_or_else(|| file_stem(post_id));

    Ok(PublishedPost {
        post_id: post_id.into(),
        frontmatter: Frontmatter {
            title,
            tags: string_list(&doc["tags"]),
            categories: string_list(&doc["categories"]),
            created: timestamp(post_id, "created", &doc["created"]),
            modified: timestamp(post_id, "modified", &doc["modified"]),
        },
        body: body.to_string(),
    })
}

/// Separate a leading `---` delimited block from the body.
fn split_frontmatter(text: &str) -> (Option<&str>, &str) {
    let Some(rest) = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
    else {
        return (None, text);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let body = &rest[offset + line.len()..];
            let body = body
                .strip_prefix('\n')
                .or_else(|| body.strip_prefix("\r\n"))
                .unwrap_or(body);
            return (Some(&rest[..offset]), body);
        }
        offset += line.len();
    }
    (None, text)
}

fn load_mapping(post_id: &str, yaml: &str) -> Result<Hash, LoadError> {
    let docs = YamlLoader::load_from_str(yaml).map_err(|e| LoadError::Frontmatter {
        post_id: post_id.into(),
        message: e.to_string(),
    })?;
    match docs.into_iter().next() {
        None | Some(Yaml::Null) => Ok(Hash::new()),
        Some(Yaml::Hash(hash)) => Ok(hash),
        Some(_) => Err(LoadError::Frontmatter {
            post_id: post_id.into(),
            message: "frontmatter is not a mapping".to_string(),
        }),
    }
}

fn scalar(yaml: &Yaml) -> Option<String> {
    match yaml {
        Yaml::String(s) | Yaml::Real(s) => Some(s.clone()),
        Yaml::Integer(i) => Some(i.to_string()),
        Yaml::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A sequence of scalars, or a single scalar.
fn string_list(yaml: &Yaml) -> Vec<SmolStr> {
    match yaml {
        Yaml::Array(items) => items.iter().filter_map(scalar).map(SmolStr::from).collect(),
        other => scalar(other).map(SmolStr::from).into_iter().collect(),
    }
}

fn timestamp(post_id: &str, field: &str, yaml: &Yaml) -> Option<DateTime<Utc>> {
    let raw = scalar(yaml)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    warn!(post_id, field, value = %raw, "unparseable frontmatter timestamp");
    None
}

fn file_stem(post_id: &str) -> SmolStr {
    Path::new(post_id)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(SmolStr::from)
        .unwrap_or_else(|| SmolStr::from(post_id))
}

fn rfc3339(at: DateTime<Utc>) -> Yaml {
    Yaml::String(at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn string_array(items: &[SmolStr]) -> Yaml {
    Yaml::Array(items.iter().map(|s| Yaml::String(s.to_string())).collect())
}

/// Apply the managed fields to an existing frontmatter mapping.
fn merge_frontmatter(
    mut doc: Hash,
    frontmatter: &Frontmatter,
    now: DateTime<Utc>,
) -> (Hash, Frontmatter) {
    let key = |k: &str| Yaml::String(k.to_string());

    doc.insert(key("title"), Yaml::String(frontmatter.title.to_string()));
    doc.insert(key("tags"), string_array(&frontmatter.tags));
    doc.insert(key("categories"), string_array(&frontmatter.categories));

    let existing_created = doc
        .get(&key("created"))
        .and_then(scalar)
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|dt| dt.with_timezone(&Utc));
    let created = match existing_created {
        Some(created) => Some(created),
        None if doc.contains_key(&key("created")) => None,
        None => {
            let created = frontmatter.created.unwrap_or(now);
            doc.insert(key("created"), rfc3339(created));
            Some(created)
        }
    };
    doc.insert(key("modified"), rfc3339(now));

    let saved = Frontmatter {
        created,
        modified: Some(now),
        ..frontmatter.clone()
    };
    (doc, saved)
}

/// Listing row for a draft whose post has no file.
fn orphan_summary(post_id: SmolStr, record: &DraftRecord) -> PostSummary {
    let latest = record
        .entries
        .get(record.cursor_or_last())
        .or_else(|| record.entries.last());
    PostSummary {
        title: latest
            .map(|s| s.title.clone())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| file_stem(&post_id)),
        modified: latest.map(|s| s.timestamp),
        post_id,
        has_draft: true,
        unpublished: true,
    }
}

//! Original-vs-draft comparison for the history browser.
//!
//! Content is compared at line level (raw body) and word level (body with
//! markup stripped); titles at word level; tags and categories as sets.

use std::fmt::Write;

use smol_str::SmolStr;

use crate::snapshot::Snapshot;

/// Above this many LCS cells the diff falls back to remove-all/add-all for
/// the differing middle section.
const MAX_LCS_CELLS: usize = 4_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Unchanged,
    Added,
    Removed,
}

/// A run of consecutive tokens with the same change kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffChunk {
    pub kind: ChangeKind,
    pub text: String,
}

/// Membership changes between two tag or category lists.
///
/// Each list keeps the order of the side it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetDiff {
    pub added: Vec<SmolStr>,
    pub removed: Vec<SmolStr>,
    pub unchanged: Vec<SmolStr>,
}

impl SetDiff {
    pub fn between(old: &[SmolStr], new: &[SmolStr]) -> Self {
        Self {
            added: new.iter().filter(|x| !old.contains(x)).cloned().collect(),
            removed: old.iter().filter(|x| !new.contains(x)).cloned().collect(),
            unchanged: old.iter().filter(|x| new.contains(x)).cloned().collect(),
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.unchanged.is_empty()
    }
}

/// Everything the history browser shows for one selected entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub old_title: SmolStr,
    pub new_title: SmolStr,
    pub title: Vec<DiffChunk>,
    pub tags: SetDiff,
    pub categories: SetDiff,
    /// Raw content, line by line.
    pub lines: Vec<DiffChunk>,
    /// Visible text, word by word.
    pub words: Vec<DiffChunk>,
}

impl SnapshotDiff {
    /// Compare `selected` against the `original` (usually the baseline).
    pub fn between(original: &Snapshot, selected: &Snapshot) -> Self {
        Self {
            old_title: original.title.clone(),
            new_title: selected.title.clone(),
            title: diff_words(&original.title, &selected.title),
            tags: SetDiff::between(&original.tags, &selected.tags),
            categories: SetDiff::between(&original.categories, &selected.categories),
            lines: diff_lines(&original.content, &selected.content),
            words: diff_words(&strip_tags(&original.content), &strip_tags(&selected.content)),
        }
    }

    pub fn has_changes(&self) -> bool {
        self.old_title != self.new_title
            || self.tags.has_changes()
            || self.categories.has_changes()
            || self.lines.iter().any(|c| c.kind != ChangeKind::Unchanged)
    }
}

/// Line-level diff.
pub fn diff_lines(old: &str, new: &str) -> Vec<DiffChunk> {
    let old: Vec<&str> = old.lines().collect();
    let new: Vec<&str> = new.lines().collect();
    merge(diff_tokens(&old, &new), "\n")
}

/// Word-level diff; whitespace is normalized to single spaces.
pub fn diff_words(old: &str, new: &str) -> Vec<DiffChunk> {
    let old: Vec<&str> = old.split_whitespace().collect();
    let new: Vec<&str> = new.split_whitespace().collect();
    merge(diff_tokens(&old, &new), " ")
}

/// Visible text of an HTML fragment: tags become whitespace and the common
/// entities are decoded.
pub fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Plain-text rendering for terminals.
pub fn render_unified(diff: &SnapshotDiff) -> String {
    let mut out = String::new();
    if diff.old_title == diff.new_title {
        let _ = writeln!(out, "title: {}", diff.new_title);
    } else {
        let _ = writeln!(out, "title: {} -> {}", diff.old_title, diff.new_title);
    }
    render_set(&mut out, "tags", &diff.tags);
    render_set(&mut out, "categories", &diff.categories);

    out.push_str("--- original\n+++ selected\n");
    for chunk in &diff.lines {
        let prefix = match chunk.kind {
            ChangeKind::Unchanged => "  ",
            ChangeKind::Added => "+ ",
            ChangeKind::Removed => "- ",
        };
        for line in chunk.text.split('\n') {
            let _ = writeln!(out, "{prefix}{line}");
        }
    }
    out
}

fn render_set(out: &mut String, label: &str, diff: &SetDiff) {
    if diff.is_empty() {
        return;
    }
    let items: Vec<String> = diff
        .added
        .iter()
        .map(|t| format!("+{t}"))
        .chain(diff.removed.iter().map(|t| format!("-{t}")))
        .chain(diff.unchanged.iter().map(|t| format!("={t}")))
        .collect();
    let _ = writeln!(out, "{label}: {}", items.join(" "));
}

fn merge(ops: Vec<(ChangeKind, &str)>, sep: &str) -> Vec<DiffChunk> {
    let mut chunks: Vec<DiffChunk> = Vec::new();
    for (kind, token) in ops {
        match chunks.last_mut() {
            Some(last) if last.kind == kind => {
                last.text.push_str(sep);
                last.text.push_str(token);
            }
            _ => chunks.push(DiffChunk {
                kind,
                text: token.to_string(),
            }),
        }
    }
    chunks
}

/// LCS diff with common prefix/suffix trimmed first.
fn diff_tokens<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<(ChangeKind, &'a str)> {
    let prefix = old
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    let mut ops: Vec<(ChangeKind, &'a str)> = Vec::with_capacity(old.len() + new.len());
    ops.extend(old[..prefix].iter().map(|t| (ChangeKind::Unchanged, *t)));

    let (a, b) = (old_mid.len(), new_mid.len());
    if a.saturating_mul(b) > MAX_LCS_CELLS {
        ops.extend(old_mid.iter().map(|t| (ChangeKind::Removed, *t)));
        ops.extend(new_mid.iter().map(|t| (ChangeKind::Added, *t)));
    } else {
        let width = b + 1;
        let mut lcs = vec![0u32; (a + 1) * width];
        for i in (0..a).rev() {
            for j in (0..b).rev() {
                lcs[i * width + j] = if old_mid[i] == new_mid[j] {
                    lcs[(i + 1) * width + j + 1] + 1
                } else {
                    lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
                };
            }
        }

        let (mut i, mut j) = (0, 0);
        while i < a && j < b {
            if old_mid[i] == new_mid[j] {
                ops.push((ChangeKind::Unchanged, old_mid[i]));
                i += 1;
                j += 1;
            } else if lcs[(i + 1) * width + j] >= lcs[i * width + j + 1] {
                ops.push((ChangeKind::Removed, old_mid[i]));
                i += 1;
            } else {
                ops.push((ChangeKind::Added, new_mid[j]));
                j += 1;
            }
        }
        ops.extend(old_mid[i..].iter().map(|t| (ChangeKind::Removed, *t)));
        ops.extend(new_mid[j..].iter().map(|t| (ChangeKind::Added, *t)));
    }

    ops.extend(old[old.len() - suffix..].iter().map(|t| (ChangeKind::Unchanged, *t)));
    ops
}

//! Core data types shared by every store backend and the command layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A stored note.
///
/// The embedding vector itself is kept outside the record; `has_embedding`
/// only reports whether one is currently present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub user_id: Option<String>,
    pub team_id: Option<String>,
    /// Repository root the note was captured in.
    pub project_path: Option<String>,
    /// Directory relative to `project_path`.
    pub path: Option<String>,
    pub git_commit: Option<String>,
    pub git_branch: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub has_embedding: bool,
}

impl Note {
    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Input for [`NoteStore::insert_note`](crate::store::NoteStore::insert_note).
#[derive(Debug, Clone, Default)]
pub struct NewNote {
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub user_id: Option<String>,
    pub team_id: Option<String>,
    pub project_path: Option<String>,
    pub path: Option<String>,
    pub git_commit: Option<String>,
    pub git_branch: Option<String>,
}

/// Partial update for an existing note. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct NoteEdit {
    pub title: Option<String>,
    pub body: Option<String>,
}

impl NoteEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.body.is_none()
    }
}

/// Scope shared by list, text search, and candidate queries.
#[derive(Debug, Clone, Default)]
pub struct NoteFilter {
    pub team_id: Option<String>,
    pub tag: Option<String>,
    pub limit: Option<usize>,
}

impl NoteFilter {
    pub fn team(team_id: Option<String>) -> Self {
        Self {
            team_id,
            ..Self::default()
        }
    }

    pub fn matches(&self, note: &Note) -> bool {
        if let Some(team) = &self.team_id {
            if note.team_id.as_deref() != Some(team.as_str()) {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !note.has_tag(tag) {
                return false;
            }
        }
        true
    }
}

/// Trim, drop empties, de-duplicate, and sort tag labels.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

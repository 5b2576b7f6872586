//! In-memory [`NoteStore`] implementation for tests.
//!
//! Notes live in a `Vec` behind `std::sync::RwLock`, kept in insertion order.
//! Keyword search is a case-insensitive substring match over title and body,
//! plus an exact tag match.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::models::{normalize_tags, NewNote, Note, NoteEdit, NoteFilter};
use crate::search::Candidate;

use super::NoteStore;

struct StoredVector {
    vector: Vec<f32>,
    model: String,
}

/// In-memory store for tests.
pub struct InMemoryStore {
    notes: RwLock<Vec<Note>>,
    vectors: RwLock<HashMap<String, StoredVector>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            notes: RwLock::new(Vec::new()),
            vectors: RwLock::new(HashMap::new()),
        }
    }

    fn read_notes(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<Note>>> {
        self.notes.read().map_err(|_| anyhow!("note store lock poisoned"))
    }

    fn write_notes(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<Note>>> {
        self.notes.write().map_err(|_| anyhow!("note store lock poisoned"))
    }

    fn read_vectors(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, StoredVector>>> {
        self.vectors
            .read()
            .map_err(|_| anyhow!("vector store lock poisoned"))
    }

    fn write_vectors(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, StoredVector>>> {
        self.vectors
            .write()
            .map_err(|_| anyhow!("vector store lock poisoned"))
    }

    /// Newest first; later inserts win ties.
    fn newest_first(notes: &[Note], filter: &NoteFilter, pred: impl Fn(&Note) -> bool) -> Vec<Note> {
        let mut out: Vec<Note> = notes
            .iter()
            .rev()
            .filter(|n| filter.matches(n) && pred(n))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        out
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NoteStore for InMemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn insert_note(&self, note: &NewNote) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let stored = Note {
            id: id.clone(),
            title: note.title.clone(),
            body: note.body.clone(),
            tags: normalize_tags(&note.tags),
            user_id: note.user_id.clone(),
            team_id: note.team_id.clone(),
            project_path: note.project_path.clone(),
            path: note.path.clone(),
            git_commit: note.git_commit.clone(),
            git_branch: note.git_branch.clone(),
            created_at: now,
            updated_at: now,
            has_embedding: false,
        };
        self.write_notes()?.push(stored);
        Ok(id)
    }

    async fn get_note(&self, id: &str) -> Result<Option<Note>> {
        Ok(self.read_notes()?.iter().find(|n| n.id == id).cloned())
    }

    async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<Note>> {
        Ok(self
            .read_notes()?
            .iter()
            .filter(|n| n.id.starts_with(prefix))
            .take(2)
            .cloned()
            .collect())
    }

    async fn list_notes(&self, filter: &NoteFilter) -> Result<Vec<Note>> {
        let notes = self.read_notes()?;
        Ok(Self::newest_first(&notes, filter, |_| true))
    }

    async fn search_text(&self, query: &str, filter: &NoteFilter) -> Result<Vec<Note>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let notes = self.read_notes()?;
        Ok(Self::newest_first(&notes, filter, |n| {
            n.title.to_lowercase().contains(&needle)
                || n.body.to_lowercase().contains(&needle)
                || n.tags.iter().any(|t| t.to_lowercase() == needle)
        }))
    }

    async fn update_note(&self, id: &str, edit: &NoteEdit) -> Result<Option<Note>> {
        let updated = {
            let mut notes = self.write_notes()?;
            let Some(note) = notes.iter_mut().find(|n| n.id == id) else {
                return Ok(None);
            };
            let mut changed = false;
            if let Some(title) = &edit.title {
                changed |= *title != note.title;
                note.title = title.clone();
            }
            if let Some(body) = &edit.body {
                changed |= *body != note.body;
                note.body = body.clone();
            }
            if changed {
                note.updated_at = Utc::now();
                note.has_embedding = false;
            }
            (note.clone(), changed)
        };
        if updated.1 {
            self.write_vectors()?.remove(id);
        }
        Ok(Some(updated.0))
    }

    async fn notes_missing_embedding(
        &self,
        model: &str,
        dims: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Note>> {
        let notes = self.read_notes()?;
        let vectors = self.read_vectors()?;
        Ok(notes
            .iter()
            .filter(|n| {
                vectors
                    .get(&n.id)
                    .map_or(true, |v| v.model != model || v.vector.len() != dims)
            })
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn set_embedding(&self, id: &str, vector: &[f32], model: &str) -> Result<()> {
        {
            let mut notes = self.write_notes()?;
            let note = notes
                .iter_mut()
                .find(|n| n.id == id)
                .ok_or_else(|| anyhow!("note not found: {}", id))?;
            note.has_embedding = true;
        }
        self.write_vectors()?.insert(
            id.to_string(),
            StoredVector {
                vector: vector.to_vec(),
                model: model.to_string(),
            },
        );
        Ok(())
    }

    async fn list_candidates_with_embeddings(
        &self,
        filter: &NoteFilter,
    ) -> Result<Vec<Candidate<Note>>> {
        let notes = self.read_notes()?;
        let vectors = self.read_vectors()?;
        let scope = NoteFilter {
            limit: None,
            ..filter.clone()
        };
        Ok(Self::newest_first(&notes, &scope, |_| true)
            .into_iter()
            .map(|n| {
                let vector = vectors.get(&n.id).map(|v| v.vector.clone());
                Candidate::new(n, vector)
            })
            .collect())
    }
}

//! Storage abstraction for cli-unites.
//!
//! The [`NoteStore`] trait defines every persistence operation the command
//! layer needs, so the local SQLite database, the hosted REST backend, and
//! the in-memory test store are interchangeable.
//!
//! Implementations must be `Send + Sync` to work with async runtimes, and the
//! trait stays object-safe so commands can hold a `Box<dyn NoteStore>`.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{NewNote, Note, NoteEdit, NoteFilter};
use crate::search::Candidate;

/// Abstract storage backend for notes.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_note`](NoteStore::insert_note) | Create a note, returning its id |
/// | [`get_note`](NoteStore::get_note) | Fetch a note by exact id |
/// | [`find_by_prefix`](NoteStore::find_by_prefix) | Fetch up to two notes whose id starts with a prefix |
/// | [`list_notes`](NoteStore::list_notes) | Newest-first listing within a filter |
/// | [`search_text`](NoteStore::search_text) | Keyword search over title, body, and tags |
/// | [`update_note`](NoteStore::update_note) | Edit title/body, clearing the embedding |
/// | [`notes_missing_embedding`](NoteStore::notes_missing_embedding) | Notes that need a (new) vector |
/// | [`set_embedding`](NoteStore::set_embedding) | Store a vector for a note |
/// | [`list_candidates_with_embeddings`](NoteStore::list_candidates_with_embeddings) | Notes with their vectors, for ranking |
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Short backend label used in status output (`"local"`, `"supabase"`).
    fn backend_name(&self) -> &'static str;

    async fn insert_note(&self, note: &NewNote) -> Result<String>;

    async fn get_note(&self, id: &str) -> Result<Option<Note>>;

    /// At most two matches are returned, which is enough to detect ambiguity.
    async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<Note>>;

    async fn list_notes(&self, filter: &NoteFilter) -> Result<Vec<Note>>;

    async fn search_text(&self, query: &str, filter: &NoteFilter) -> Result<Vec<Note>>;

    /// Returns the updated note, or `None` if no note has this id.
    ///
    /// Changing the title or body clears the stored embedding.
    async fn update_note(&self, id: &str, edit: &NoteEdit) -> Result<Option<Note>>;

    /// Notes without an embedding, or whose embedding came from another model
    /// or has a length other than `dims`.
    async fn notes_missing_embedding(
        &self,
        model: &str,
        dims: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Note>>;

    async fn set_embedding(&self, id: &str, vector: &[f32], model: &str) -> Result<()>;

    /// Every note in scope paired with its vector (`None` when absent).
    async fn list_candidates_with_embeddings(
        &self,
        filter: &NoteFilter,
    ) -> Result<Vec<Candidate<Note>>>;
}

/// Resolve a full id or unique id prefix to a note.
pub async fn resolve_note<S: NoteStore + ?Sized>(store: &S, key: &str) -> Result<Note> {
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("note id must not be empty");
    }
    if let Some(note) = store.get_note(key).await? {
        return Ok(note);
    }
    let mut matches = store.find_by_prefix(key).await?;
    match matches.len() {
        0 => anyhow::bail!("note not found: {}", key),
        1 => Ok(matches.remove(0)),
        _ => anyhow::bail!("note id prefix '{}' is ambiguous; use more characters", key),
    }
}

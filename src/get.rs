//! Note retrieval and editing by id or unique id prefix.
//!
//! Used by the `notes show` and `notes edit` commands.

use anyhow::{bail, Result};

use cli_unites_core::models::{Note, NoteEdit};
use cli_unites_core::store::{resolve_note, NoteStore};

use crate::config::Config;
use crate::embed_cmd;
use crate::output;

pub async fn run_show(store: &dyn NoteStore, key: &str) -> Result<()> {
    let note = resolve_note(store, key).await?;
    print!("{}", output::note_detail(&note));
    Ok(())
}

/// Apply `edit` to the note `key` resolves to. Returns the updated note and
/// whether its title or body actually changed.
pub async fn edit_note(store: &dyn NoteStore, key: &str, edit: &NoteEdit) -> Result<(Note, bool)> {
    if edit.is_empty() {
        bail!("Nothing to edit: pass --title and/or --body");
    }
    let edit = NoteEdit {
        title: edit.title.as_deref().map(|t| t.trim().to_string()),
        body: edit.body.clone(),
    };
    if edit.title.as_deref().is_some_and(str::is_empty) {
        bail!("Note title must not be empty");
    }

    let current = resolve_note(store, key).await?;
    let updated = match store.update_note(&current.id, &edit).await? {
        Some(note) => note,
        None => bail!("note not found: {}", key),
    };
    let changed = updated.title != current.title || updated.body != current.body;
    Ok((updated, changed))
}

pub async fn run_edit(
    config: &Config,
    store: &dyn NoteStore,
    key: &str,
    title: Option<String>,
    body: Option<String>,
) -> Result<()> {
    let edit = NoteEdit { title, body };
    let (note, changed) = edit_note(store, key, &edit).await?;

    if !changed {
        println!("Note {} unchanged.", note.id);
        return Ok(());
    }

    println!("Updated note {}", note.id);
    if embed_cmd::embed_note_inline(store, &config.embedding, &note).await {
        println!("  embedding: regenerated");
    } else {
        println!("  embedding: cleared (run `notes embed pending`)");
    }
    Ok(())
}

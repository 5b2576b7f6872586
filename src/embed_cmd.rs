use anyhow::{bail, Result};

use cli_unites_core::models::Note;
use cli_unites_core::store::NoteStore;

use crate::config::EmbeddingConfig;
use crate::embedding::{self, EmbeddingProvider};

/// Outcome of storing one batch of vectors.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EmbedCounts {
    pub embedded: u64,
    /// Vectors dropped because their length differed from `embedding.dims`.
    pub skipped: u64,
    pub failed: u64,
}

impl EmbedCounts {
    fn add(&mut self, other: EmbedCounts) {
        self.embedded += other.embedded;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Embed `notes` in batches and store each vector whose length matches the
/// configured dimensionality.
pub async fn embed_notes(
    store: &dyn NoteStore,
    provider: &dyn EmbeddingProvider,
    config: &EmbeddingConfig,
    notes: &[Note],
    batch_size: usize,
) -> Result<EmbedCounts> {
    let mut counts = EmbedCounts::default();
    let model_name = provider.model_name().to_string();

    for batch in notes.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch
            .iter()
            .map(|n| embedding::note_text(&n.title, &n.body))
            .collect();

        match embedding::embed_texts(provider, config, &texts).await {
            Ok(vectors) => {
                counts.add(store_vectors(store, batch, &vectors, &model_name, config.dims).await?);
            }
            Err(e) => {
                tracing::warn!(error = %e, "embedding batch failed");
                counts.failed += batch.len() as u64;
            }
        }
    }

    Ok(counts)
}

/// Store `vectors[i]` for `notes[i]`, skipping vectors whose length is not
/// `dims`.
pub async fn store_vectors(
    store: &dyn NoteStore,
    notes: &[Note],
    vectors: &[Vec<f32>],
    model_name: &str,
    dims: usize,
) -> Result<EmbedCounts> {
    let mut counts = EmbedCounts::default();
    if vectors.len() < notes.len() {
        tracing::warn!(
            expected = notes.len(),
            received = vectors.len(),
            "embedding response is missing vectors"
        );
        counts.failed += (notes.len() - vectors.len()) as u64;
    }
    for (note, vector) in notes.iter().zip(vectors.iter()) {
        if vector.len() != dims {
            tracing::warn!(
                note_id = %note.id,
                expected = dims,
                actual = vector.len(),
                "embedding has wrong dimensionality; not stored"
            );
            counts.skipped += 1;
            continue;
        }
        store.set_embedding(&note.id, vector, model_name).await?;
        counts.embedded += 1;
    }
    Ok(counts)
}

/// Find and embed notes that are missing embeddings.
pub async fn run_embed_pending(
    store: &dyn NoteStore,
    config: &EmbeddingConfig,
    limit: Option<usize>,
    batch_size_override: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    if !config.is_enabled() {
        bail!("Embedding provider is disabled. Set embedding.provider in config.json.");
    }

    let provider = embedding::create_provider(config)?;
    let batch_size = batch_size_override.unwrap_or(config.batch_size);
    if batch_size == 0 {
        bail!("--batch-size must be > 0");
    }

    let pending = store
        .notes_missing_embedding(provider.model_name(), config.dims, limit)
        .await?;

    if dry_run {
        println!("embed pending (dry-run)");
        println!("  notes needing embeddings: {}", pending.len());
        return Ok(());
    }

    if pending.is_empty() {
        println!("embed pending");
        println!("  all notes up to date");
        return Ok(());
    }

    let counts = embed_notes(store, provider.as_ref(), config, &pending, batch_size).await?;

    println!("embed pending");
    println!("  total pending: {}", pending.len());
    println!("  embedded: {}", counts.embedded);
    if counts.skipped > 0 {
        println!("  skipped (wrong dimensions): {}", counts.skipped);
    }
    println!("  failed: {}", counts.failed);
    Ok(())
}

/// Embed one freshly written note. Non-fatal on failure; returns whether a
/// vector was stored.
pub async fn embed_note_inline(store: &dyn NoteStore, config: &EmbeddingConfig, note: &Note) -> bool {
    if !config.is_enabled() || !config.embed_on_write {
        return false;
    }

    let provider = match embedding::create_provider(config) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "could not create embedding provider");
            return false;
        }
    };

    match embed_notes(store, provider.as_ref(), config, std::slice::from_ref(note), 1).await {
        Ok(counts) => counts.embedded == 1,
        Err(e) => {
            tracing::warn!(note_id = %note.id, error = %e, "could not store embedding");
            false
        }
    }
}

use anyhow::{bail, Result};
use serde::Serialize;

use cli_unites_core::models::{Note, NoteFilter};
use cli_unites_core::search::{rank_candidates, RankParams};
use cli_unites_core::store::NoteStore;

use crate::config::Config;
use crate::embedding;
use crate::output;

/// Team scope for a search: the current team unless `all_teams`.
fn search_scope(config: &Config, all_teams: bool) -> NoteFilter {
    if all_teams {
        NoteFilter::default()
    } else {
        NoteFilter::team(config.current_team().map(str::to_string))
    }
}

pub async fn run_search(
    config: &Config,
    store: &dyn NoteStore,
    query: &str,
    all_teams: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let notes = store
        .search_text(query, &search_scope(config, all_teams))
        .await?;
    if notes.is_empty() {
        println!("No notes matched \"{}\".", query.trim());
        return Ok(());
    }
    output::print_note_list(&notes);
    Ok(())
}

/// A note scored against a semantic query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredNote {
    pub note: Note,
    pub similarity: f64,
}

/// Embed `query`, fetch candidates in scope, and rank them on the client.
pub async fn semantic_search(
    config: &Config,
    store: &dyn NoteStore,
    query: &str,
    params: &RankParams,
    all_teams: bool,
) -> Result<Vec<ScoredNote>> {
    if !config.embedding.is_enabled() {
        bail!("Semantic search requires embeddings. Set embedding.provider in config.json.");
    }
    let provider = embedding::create_provider(&config.embedding)?;
    let query_vec = embedding::embed_query(provider.as_ref(), &config.embedding, query).await?;

    let candidates = store
        .list_candidates_with_embeddings(&search_scope(config, all_teams))
        .await?;
    let ranked = rank_candidates(&query_vec, config.embedding.dims, &candidates, params)?;
    tracing::debug!(
        candidates = candidates.len(),
        matches = ranked.len(),
        threshold = params.threshold,
        "ranked semantic candidates"
    );

    Ok(ranked
        .into_iter()
        .map(|r| ScoredNote {
            note: r.record.clone(),
            similarity: r.similarity,
        })
        .collect())
}

pub async fn run_semantic_search(
    config: &Config,
    store: &dyn NoteStore,
    query: &str,
    limit: Option<usize>,
    threshold: Option<f64>,
    all_teams: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    let params = RankParams {
        threshold: threshold.unwrap_or(config.search.threshold),
        limit: limit.unwrap_or(config.search.limit),
    };

    let results = semantic_search(config, store, query, &params, all_teams).await?;
    if results.is_empty() {
        println!(
            "No notes above {} similarity. Try a lower --threshold or run `notes embed pending`.",
            output::similarity_percent(params.threshold)
        );
        return Ok(());
    }

    for scored in &results {
        println!(
            "{:>5}  {}",
            output::similarity_percent(scored.similarity),
            output::note_line(&scored.note)
        );
        if let Some(preview) = output::body_preview(&scored.note.body, 72) {
            println!("       {}", preview);
        }
    }
    Ok(())
}

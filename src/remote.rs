//! Hosted [`NoteStore`] implementation over the platform's PostgREST API.
//!
//! Every request goes to `{supabase_url}/rest/v1/{table}` with the project
//! key in `apikey` and the user's session token (or the project key) as the
//! bearer token. Embeddings are pgvector columns; they are written as text
//! literals and read back from either the text or the JSON-array form.
//!
//! Ranking happens on the client like the local backend, so the server only
//! filters by team, tag, and embedding presence.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use cli_unites_core::embedding::{format_vector_literal, parse_vector_literal};
use cli_unites_core::models::{normalize_tags, NewNote, Note, NoteEdit, NoteFilter};
use cli_unites_core::search::Candidate;
use cli_unites_core::store::NoteStore;

use crate::config::Config;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Row shape returned by the notes table.
#[derive(Debug, Deserialize)]
struct RemoteNote {
    id: String,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    team_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    git_commit: Option<String>,
    #[serde(default)]
    git_branch: Option<String>,
    #[serde(default)]
    project_path: Option<String>,
    #[serde(default)]
    path: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    body_embedding: Option<serde_json::Value>,
}

impl RemoteNote {
    fn into_candidate(self) -> Candidate<Note> {
        let vector = self.body_embedding.as_ref().and_then(parse_remote_vector);
        let note = Note {
            has_embedding: vector.is_some(),
            id: self.id,
            title: self.title,
            body: self.body.unwrap_or_default(),
            tags: normalize_tags(self.tags.unwrap_or_default()),
            user_id: self.user_id,
            team_id: self.team_id,
            project_path: self.project_path,
            path: self.path,
            git_commit: self.git_commit,
            git_branch: self.git_branch,
            created_at: self.created_at,
            updated_at: self.updated_at.unwrap_or(self.created_at),
        };
        Candidate::new(note, vector)
    }

    fn into_note(self) -> Note {
        self.into_candidate().record
    }
}

/// Decode a pgvector value: text literal or JSON array. Anything else is
/// treated as absent.
fn parse_remote_vector(value: &serde_json::Value) -> Option<Vec<f32>> {
    match value {
        serde_json::Value::String(s) => parse_vector_literal(s),
        serde_json::Value::Array(_) => serde_json::from_value(value.clone()).ok(),
        _ => None,
    }
}

/// Quote a value for use inside a PostgREST `or=(...)` list.
fn quote_filter_value(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Query parameters restricting a request to a filter's team and tag.
fn scope_params(filter: &NoteFilter) -> Vec<(String, String)> {
    let mut params = Vec::new();
    if let Some(team) = &filter.team_id {
        params.push(("team_id".to_string(), format!("eq.{}", team)));
    }
    if let Some(tag) = filter.tag.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        params.push(("tags".to_string(), format!("cs.{{{}}}", quote_filter_value(tag))));
    }
    params
}

fn text_search_param(query: &str) -> (String, String) {
    let q = query.trim();
    let pattern = quote_filter_value(&format!("*{}*", q));
    let tag = quote_filter_value(q);
    (
        "or".to_string(),
        format!("(title.ilike.{p},body.ilike.{p},tags.cs.{{{t}}})", p = pattern, t = tag),
    )
}

/// PostgREST-backed note store.
pub struct RemoteStore {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    bearer: String,
}

impl RemoteStore {
    pub fn new(base_url: &str, table: &str, api_key: &str, auth_token: Option<&str>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/rest/v1/{}", base_url.trim_end_matches('/'), table),
            api_key: api_key.to_string(),
            bearer: auth_token.unwrap_or(api_key).to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let url = config.supabase_url().ok_or_else(|| {
            anyhow!("Supabase backend selected but no URL is configured (run `notes auth --supabase-url` or set SUPABASE_URL)")
        })?;
        let key = config.supabase_key().ok_or_else(|| {
            anyhow!("Supabase backend selected but no key is configured (run `notes auth --supabase-key` or set SUPABASE_KEY)")
        })?;
        Self::new(
            &url,
            &config.supabase_note_table,
            &key,
            config.auth_token.as_deref(),
        )
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        self.client
            .request(method, &self.endpoint)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.bearer))
    }

    async fn send(request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await.context("Supabase request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Supabase API error {}: {}", status, body);
        }
        Ok(response)
    }

    async fn fetch_rows(&self, params: Vec<(String, String)>) -> Result<Vec<RemoteNote>> {
        let request = self.request(reqwest::Method::GET).query(&params);
        let rows: Vec<RemoteNote> = Self::send(request)
            .await?
            .json()
            .await
            .context("Invalid Supabase response")?;
        tracing::debug!(rows = rows.len(), "fetched remote notes");
        Ok(rows)
    }

    async fn patch(&self, id: &str, body: serde_json::Value) -> Result<Vec<RemoteNote>> {
        let request = self
            .request(reqwest::Method::PATCH)
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(&body);
        Ok(Self::send(request).await?.json().await?)
    }
}

fn with_order_and_limit(
    mut params: Vec<(String, String)>,
    order: &str,
    limit: Option<usize>,
) -> Vec<(String, String)> {
    params.push(("select".to_string(), "*".to_string()));
    params.push(("order".to_string(), order.to_string()));
    if let Some(n) = limit {
        params.push(("limit".to_string(), n.to_string()));
    }
    params
}

#[async_trait]
impl NoteStore for RemoteStore {
    fn backend_name(&self) -> &'static str {
        "supabase"
    }

    async fn insert_note(&self, note: &NewNote) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let body = serde_json::json!({
            "id": id,
            "title": note.title,
            "body": note.body,
            "tags": normalize_tags(&note.tags),
            "user_id": note.user_id,
            "team_id": note.team_id,
            "project_path": note.project_path,
            "path": note.path,
            "git_commit": note.git_commit,
            "git_branch": note.git_branch,
            "created_at": now,
            "updated_at": now,
        });
        let request = self
            .request(reqwest::Method::POST)
            .header("Prefer", "return=representation")
            .json(&body);
        let rows: Vec<RemoteNote> = Self::send(request).await?.json().await?;
        let stored = rows.into_iter().next().map(|r| r.id).unwrap_or(id);
        tracing::debug!(note_id = %stored, "inserted remote note");
        Ok(stored)
    }

    async fn get_note(&self, id: &str) -> Result<Option<Note>> {
        let params = vec![
            ("id".to_string(), format!("eq.{}", id)),
            ("select".to_string(), "*".to_string()),
            ("limit".to_string(), "1".to_string()),
        ];
        Ok(self.fetch_rows(params).await?.into_iter().next().map(RemoteNote::into_note))
    }

    /// Ids are UUID columns on the platform, so only exact ids resolve.
    async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<Note>> {
        if uuid::Uuid::parse_str(prefix).is_err() {
            return Ok(Vec::new());
        }
        Ok(self.get_note(prefix).await?.into_iter().collect())
    }

    async fn list_notes(&self, filter: &NoteFilter) -> Result<Vec<Note>> {
        let params = with_order_and_limit(scope_params(filter), "created_at.desc", filter.limit);
        Ok(self
            .fetch_rows(params)
            .await?
            .into_iter()
            .map(RemoteNote::into_note)
            .collect())
    }

    async fn search_text(&self, query: &str, filter: &NoteFilter) -> Result<Vec<Note>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let mut params = scope_params(filter);
        params.push(text_search_param(query));
        let params = with_order_and_limit(params, "created_at.desc", filter.limit);
        Ok(self
            .fetch_rows(params)
            .await?
            .into_iter()
            .map(RemoteNote::into_note)
            .collect())
    }

    async fn update_note(&self, id: &str, edit: &NoteEdit) -> Result<Option<Note>> {
        let Some(current) = self.get_note(id).await? else {
            return Ok(None);
        };
        let title = edit.title.clone().unwrap_or_else(|| current.title.clone());
        let body = edit.body.clone().unwrap_or_else(|| current.body.clone());
        if title == current.title && body == current.body {
            return Ok(Some(current));
        }
        let rows = self
            .patch(
                id,
                serde_json::json!({
                    "title": title,
                    "body": body,
                    "updated_at": Utc::now().to_rfc3339(),
                    "body_embedding": null,
                }),
            )
            .await?;
        Ok(rows.into_iter().next().map(RemoteNote::into_note))
    }

    /// The platform stores no model name, so absent vectors and vectors of
    /// the wrong length count. Lengths are only known after decoding, so
    /// the limit is applied here rather than by the server.
    async fn notes_missing_embedding(
        &self,
        _model: &str,
        dims: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Note>> {
        let params = with_order_and_limit(Vec::new(), "created_at.asc", None);
        Ok(self
            .fetch_rows(params)
            .await?
            .into_iter()
            .map(RemoteNote::into_candidate)
            .filter(|c| c.vector.as_ref().map_or(true, |v| v.len() != dims))
            .map(|c| c.record)
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn set_embedding(&self, id: &str, vector: &[f32], _model: &str) -> Result<()> {
        let rows = self
            .patch(
                id,
                serde_json::json!({ "body_embedding": format_vector_literal(vector) }),
            )
            .await?;
        if rows.is_empty() {
            bail!("note not found: {}", id);
        }
        Ok(())
    }

    async fn list_candidates_with_embeddings(
        &self,
        filter: &NoteFilter,
    ) -> Result<Vec<Candidate<Note>>> {
        let mut params = scope_params(filter);
        params.push(("body_embedding".to_string(), "not.is.null".to_string()));
        let params = with_order_and_limit(params, "created_at.desc", None);
        Ok(self
            .fetch_rows(params)
            .await?
            .into_iter()
            .map(RemoteNote::into_candidate)
            .collect())
    }
}

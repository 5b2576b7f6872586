//! SQLite-backed [`NoteStore`] implementation.
//!
//! Maps each [`NoteStore`] operation onto the local schema created by
//! [`run_migrations`](crate::migrate::run_migrations): `notes`, `projects`,
//! `paths`, `tags`, `note_tags`, and the `notes_fts` full-text index.
//! Embeddings live in `notes.body_embedding` as little-endian `f32` BLOBs.

use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use cli_unites_core::embedding::{blob_to_vec, vec_to_blob};
use cli_unites_core::models::{normalize_tags, NewNote, Note, NoteEdit, NoteFilter};
use cli_unites_core::search::Candidate;
use cli_unites_core::store::NoteStore;

use crate::{db, migrate};

/// Columns shared by every note query. Tags are joined with the ASCII unit
/// separator so labels may contain commas.
const NOTE_SELECT: &str = r#"
    SELECT n.id, n.title, n.body, n.user_id, n.team_id,
           p.root AS project_path, pa.rel_path AS path,
           n.git_commit, n.git_branch, n.created_at, n.updated_at,
           n.body_embedding IS NOT NULL AS has_embedding,
           (SELECT group_concat(t.name, char(31))
              FROM note_tags nt JOIN tags t ON t.id = nt.tag_id
             WHERE nt.note_id = n.id) AS tags
    FROM notes n
    LEFT JOIN projects p ON p.id = n.project_id
    LEFT JOIN paths pa ON pa.id = n.path_id
"#;

const NEWEST_FIRST: &str = " ORDER BY n.created_at DESC, n.rowid DESC";

/// SQLite implementation of the [`NoteStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `path` and bring its schema
    /// up to date.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn count_notes(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notes")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn fetch_notes(&self, sql: &str, binds: Vec<Bind>) -> Result<Vec<Note>> {
        let mut query = sqlx::query(sql);
        for bind in binds {
            query = match bind {
                Bind::Text(s) => query.bind(s),
                Bind::Int(i) => query.bind(i),
            };
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(note_from_row).collect()
    }
}

enum Bind {
    Text(String),
    Int(i64),
}

/// `AND ...` clauses restricting a note query to a filter's team and tag.
fn scope_clauses(filter: &NoteFilter, binds: &mut Vec<Bind>) -> String {
    let mut sql = String::new();
    if let Some(team) = &filter.team_id {
        sql.push_str(" AND n.team_id = ?");
        binds.push(Bind::Text(team.clone()));
    }
    if let Some(tag) = filter.tag.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        sql.push_str(
            " AND EXISTS (SELECT 1 FROM note_tags nt JOIN tags t ON t.id = nt.tag_id \
             WHERE nt.note_id = n.id AND t.name = ?)",
        );
        binds.push(Bind::Text(tag.to_string()));
    }
    sql
}

fn limit_clause(limit: Option<usize>, binds: &mut Vec<Bind>) -> &'static str {
    match limit {
        Some(n) => {
            binds.push(Bind::Int(n as i64));
            " LIMIT ?"
        }
        None => "",
    }
}

/// Turn free text into an FTS5 query: every whitespace-separated token is
/// quoted and prefix-matched, and all tokens must match. Tokens without
/// any alphanumeric character are dropped.
pub fn fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .filter(|t| t.chars().any(char::is_alphanumeric))
        .map(|t| format!("\"{}\"*", t.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn note_from_row(row: &SqliteRow) -> Result<Note> {
    let tags: Option<String> = row.try_get("tags")?;
    let tags = tags
        .map(|t| normalize_tags(t.split('\u{1f}')))
        .unwrap_or_default();
    Ok(Note {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        tags,
        user_id: row.try_get("user_id")?,
        team_id: row.try_get("team_id")?,
        project_path: row.try_get("project_path")?,
        path: row.try_get("path")?,
        git_commit: row.try_get("git_commit")?,
        git_branch: row.try_get("git_branch")?,
        created_at: millis_to_datetime(row.try_get("created_at")?),
        updated_at: millis_to_datetime(row.try_get("updated_at")?),
        has_embedding: row.try_get("has_embedding")?,
    })
}

async fn upsert_project(tx: &mut Transaction<'_, Sqlite>, root: &str) -> Result<String> {
    sqlx::query("INSERT OR IGNORE INTO projects (id, root) VALUES (?, ?)")
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(root)
        .execute(&mut **tx)
        .await?;
    let id: String = sqlx::query_scalar("SELECT id FROM projects WHERE root = ?")
        .bind(root)
        .fetch_one(&mut **tx)
        .await?;
    Ok(id)
}

async fn upsert_path(
    tx: &mut Transaction<'_, Sqlite>,
    project_id: &str,
    rel_path: &str,
) -> Result<String> {
    sqlx::query("INSERT OR IGNORE INTO paths (id, project_id, rel_path) VALUES (?, ?, ?)")
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(project_id)
        .bind(rel_path)
        .execute(&mut **tx)
        .await?;
    let id: String =
        sqlx::query_scalar("SELECT id FROM paths WHERE project_id = ? AND rel_path = ?")
            .bind(project_id)
            .bind(rel_path)
            .fetch_one(&mut **tx)
            .await?;
    Ok(id)
}

#[async_trait]
impl NoteStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn insert_note(&self, note: &NewNote) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        let project_id = match note.project_path.as_deref() {
            Some(root) => Some(upsert_project(&mut tx, root).await?),
            None => None,
        };
        let path_id = match (&project_id, note.path.as_deref()) {
            (Some(project), Some(rel)) => Some(upsert_path(&mut tx, project, rel).await?),
            _ => None,
        };

        sqlx::query(
            r#"
            INSERT INTO notes (id, title, body, user_id, team_id, project_id, path_id,
                               git_commit, git_branch, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&note.title)
        .bind(&note.body)
        .bind(&note.user_id)
        .bind(&note.team_id)
        .bind(&project_id)
        .bind(&path_id)
        .bind(&note.git_commit)
        .bind(&note.git_branch)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to insert note")?;

        for tag in normalize_tags(&note.tags) {
            sqlx::query("INSERT OR IGNORE INTO tags (name) VALUES (?)")
                .bind(&tag)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "INSERT OR IGNORE INTO note_tags (note_id, tag_id) SELECT ?, id FROM tags WHERE name = ?",
            )
            .bind(&id)
            .bind(&tag)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(note_id = %id, "inserted note");
        Ok(id)
    }

    async fn get_note(&self, id: &str) -> Result<Option<Note>> {
        let sql = format!("{} WHERE n.id = ?", NOTE_SELECT);
        let mut notes = self.fetch_notes(&sql, vec![Bind::Text(id.to_string())]).await?;
        Ok(notes.pop())
    }

    async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<Note>> {
        let escaped = prefix
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let sql = format!(
            "{} WHERE n.id LIKE ? ESCAPE '\\'{} LIMIT 2",
            NOTE_SELECT, NEWEST_FIRST
        );
        self.fetch_notes(&sql, vec![Bind::Text(format!("{}%", escaped))])
            .await
    }

    async fn list_notes(&self, filter: &NoteFilter) -> Result<Vec<Note>> {
        let mut binds = Vec::new();
        let scope = scope_clauses(filter, &mut binds);
        let limit = limit_clause(filter.limit, &mut binds);
        let sql = format!("{} WHERE 1 = 1{}{}{}", NOTE_SELECT, scope, NEWEST_FIRST, limit);
        self.fetch_notes(&sql, binds).await
    }

    async fn search_text(&self, query: &str, filter: &NoteFilter) -> Result<Vec<Note>> {
        let Some(fts) = fts_query(query) else {
            return Ok(Vec::new());
        };
        let mut binds = vec![Bind::Text(fts), Bind::Text(query.trim().to_string())];
        let scope = scope_clauses(filter, &mut binds);
        let limit = limit_clause(filter.limit, &mut binds);
        let sql = format!(
            "{} WHERE (n.id IN (SELECT note_id FROM notes_fts WHERE notes_fts MATCH ?) \
             OR EXISTS (SELECT 1 FROM note_tags nt JOIN tags t ON t.id = nt.tag_id \
                        WHERE nt.note_id = n.id AND t.name = ?)){}{}{}",
            NOTE_SELECT, scope, NEWEST_FIRST, limit
        );
        self.fetch_notes(&sql, binds).await
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

        // notes_clear_embedding drops the stale vector
        sqlx::query("UPDATE notes SET title = ?, body = ?, updated_at = ? WHERE id = ?")
            .bind(&title)
            .bind(&body)
            .bind(Utc::now().timestamp_millis())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update note")?;

        self.get_note(id).await
    }

    async fn notes_missing_embedding(
        &self,
        model: &str,
        dims: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Note>> {
        // Vectors are stored as little-endian f32, four bytes per component
        let mut binds = vec![
            Bind::Text(model.to_string()),
            Bind::Int((dims * 4) as i64),
        ];
        let limit = limit_clause(limit, &mut binds);
        let sql = format!(
            "{} WHERE n.body_embedding IS NULL OR n.embedding_model IS NOT ? \
             OR length(n.body_embedding) != ? \
             ORDER BY n.created_at ASC, n.rowid ASC{}",
            NOTE_SELECT, limit
        );
        self.fetch_notes(&sql, binds).await
    }

    async fn set_embedding(&self, id: &str, vector: &[f32], model: &str) -> Result<()> {
        let result =
            sqlx::query("UPDATE notes SET body_embedding = ?, embedding_model = ? WHERE id = ?")
                .bind(vec_to_blob(vector))
                .bind(model)
                .bind(id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            bail!("note not found: {}", id);
        }
        Ok(())
    }

    async fn list_candidates_with_embeddings(
        &self,
        filter: &NoteFilter,
    ) -> Result<Vec<Candidate<Note>>> {
        let mut binds = Vec::new();
        let scope = scope_clauses(filter, &mut binds);
        let select = NOTE_SELECT.replacen("SELECT ", "SELECT n.body_embedding AS embedding, ", 1);
        let sql = format!("{} WHERE 1 = 1{}{}", select, scope, NEWEST_FIRST);

        let mut query = sqlx::query(&sql);
        for bind in binds {
            query = match bind {
                Bind::Text(s) => query.bind(s),
                Bind::Int(i) => query.bind(i),
            };
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Option<Vec<u8>> = row.try_get("embedding")?;
            candidates.push(Candidate::new(note_from_row(row)?, blob.map(|b| blob_to_vec(&b))));
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cli_unites_core::search::{rank_candidates, RankParams};
    use tempfile::TempDir;

    async fn open_temp() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(&tmp.path().join("notes.db")).await.unwrap();
        (tmp, store)
    }

    fn new_note(title: &str, body: &str) -> NewNote {
        NewNote {
            title: title.to_string(),
            body: body.to_string(),
            ..NewNote::default()
        }
    }

    #[test]
    fn test_fts_query_quotes_tokens() {
        assert_eq!(fts_query("  "), None);
        assert_eq!(fts_query("deploy fix"), Some("\"deploy\"* \"fix\"*".to_string()));
        assert_eq!(fts_query("say \"hi\""), Some("\"say\"* \"\"\"hi\"\"\"*".to_string()));
    }

    #[tokio::test]
    async fn test_insert_and_get_with_context() {
        let (_tmp, store) = open_temp().await;
        let note = NewNote {
            tags: vec!["ops".into(), "deploy".into(), "ops".into()],
            team_id: Some("team-a".into()),
            project_path: Some("/repo".into()),
            path: Some("src/".into()),
            git_branch: Some("main".into()),
            ..new_note("Release", "Shipped v2")
        };
        let id = store.insert_note(&note).await.unwrap();
        let got = store.get_note(&id).await.unwrap().unwrap();
        assert_eq!(got.tags, vec!["deploy".to_string(), "ops".to_string()]);
        assert_eq!(got.project_path.as_deref(), Some("/repo"));
        assert_eq!(got.path.as_deref(), Some("src/"));
        assert_eq!(got.team_id.as_deref(), Some("team-a"));
        assert!(!got.has_embedding);
        assert_eq!(store.count_notes().await.unwrap(), 1);

        // Second note in the same project reuses the project row
        store.insert_note(&note).await.unwrap();
        let projects: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(projects, 1);
    }

    #[tokio::test]
    async fn test_list_newest_first_with_filters() {
        let (_tmp, store) = open_temp().await;
        let a = store
            .insert_note(&NewNote {
                tags: vec!["ops".into()],
                team_id: Some("t1".into()),
                ..new_note("A", "first")
            })
            .await
            .unwrap();
        let b = store
            .insert_note(&NewNote {
                team_id: Some("t1".into()),
                ..new_note("B", "second")
            })
            .await
            .unwrap();
        store
            .insert_note(&NewNote {
                team_id: Some("t2".into()),
                ..new_note("C", "third")
            })
            .await
            .unwrap();

        let t1 = store.list_notes(&NoteFilter::team(Some("t1".into()))).await.unwrap();
        let ids: Vec<&str> = t1.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec![b.as_str(), a.as_str()]);

        let tagged = store
            .list_notes(&NoteFilter {
                tag: Some("ops".into()),
                ..NoteFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].id, a);

        // Tag matching is exact, not substring
        let partial = store
            .list_notes(&NoteFilter {
                tag: Some("op".into()),
                ..NoteFilter::default()
            })
            .await
            .unwrap();
        assert!(partial.is_empty());

        let limited = store
            .list_notes(&NoteFilter {
                limit: Some(2),
                ..NoteFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_search_text_matches_body_and_tag() {
        let (_tmp, store) = open_temp().await;
        let deploy = store
            .insert_note(&new_note("Deploy", "Rollback procedure for staging"))
            .await
            .unwrap();
        let tagged = store
            .insert_note(&NewNote {
                tags: vec!["oncall".into()],
                ..new_note("Pager", "Escalation list")
            })
            .await
            .unwrap();

        let hits = store.search_text("rollback", &NoteFilter::default()).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, deploy);

        let hits = store.search_text("oncall", &NoteFilter::default()).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, tagged);

        assert!(store.search_text("\"", &NoteFilter::default()).await.unwrap().is_empty());
        assert!(store.search_text("", &NoteFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edit_clears_embedding() {
        let (_tmp, store) = open_temp().await;
        let id = store.insert_note(&new_note("T", "old body")).await.unwrap();
        store.set_embedding(&id, &[1.0, 0.0], "m").await.unwrap();
        assert!(store.get_note(&id).await.unwrap().unwrap().has_embedding);

        let same = NoteEdit {
            title: Some("T".into()),
            body: None,
        };
        assert!(store.update_note(&id, &same).await.unwrap().unwrap().has_embedding);

        let edit = NoteEdit {
            title: None,
            body: Some("new body".into()),
        };
        let updated = store.update_note(&id, &edit).await.unwrap().unwrap();
        assert_eq!(updated.body, "new body");
        assert!(!updated.has_embedding);

        // The full-text index follows the edit
        assert_eq!(store.search_text("new", &NoteFilter::default()).await.unwrap().len(), 1);
        assert!(store.search_text("old", &NoteFilter::default()).await.unwrap().is_empty());

        assert!(store.update_note("missing", &edit).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_embeddings_and_candidates() {
        let (_tmp, store) = open_temp().await;
        let a = store.insert_note(&new_note("A", "a")).await.unwrap();
        let b = store.insert_note(&new_note("B", "b")).await.unwrap();
        let c = store.insert_note(&new_note("C", "c")).await.unwrap();
        store.set_embedding(&a, &[1.0, 0.0], "m").await.unwrap();
        store.set_embedding(&b, &[0.0, 1.0], "other").await.unwrap();

        let missing = store.notes_missing_embedding("m", 2, None).await.unwrap();
        let ids: Vec<&str> = missing.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec![b.as_str(), c.as_str()]);
        assert_eq!(store.notes_missing_embedding("m", 2, Some(1)).await.unwrap().len(), 1);

        let candidates = store
            .list_candidates_with_embeddings(&NoteFilter::default())
            .await
            .unwrap();
        assert_eq!(candidates.len(), 3);
        let ranked = rank_candidates(&[1.0, 0.0], 2, &candidates, &RankParams::default()).unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].record.id, a);

        // A change of dimensionality makes every stored vector stale
        assert_eq!(store.notes_missing_embedding("m", 3, None).await.unwrap().len(), 3);

        assert!(store.set_embedding("missing", &[1.0], "m").await.is_err());
    }

    #[tokio::test]
    async fn test_find_by_prefix() {
        let (_tmp, store) = open_temp().await;
        let id = store.insert_note(&new_note("A", "a")).await.unwrap();
        let found = store.find_by_prefix(&id[..6]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(store.find_by_prefix("%").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let (tmp, store) = open_temp().await;
        store.insert_note(&new_note("A", "a")).await.unwrap();
        store.close().await;
        let reopened = SqliteStore::open(&tmp.path().join("notes.db")).await.unwrap();
        assert_eq!(reopened.count_notes().await.unwrap(), 1);
        assert_eq!(
            reopened.search_text("a", &NoteFilter::default()).await.unwrap().len(),
            1
        );
    }
}

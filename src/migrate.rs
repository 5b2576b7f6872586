use anyhow::Result;
use sqlx::SqlitePool;

/// Create or upgrade the local schema. Safe to run on every open.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Repository roots notes were captured in
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            root TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Directories inside a project
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS paths (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            rel_path TEXT NOT NULL,
            UNIQUE(project_id, rel_path),
            FOREIGN KEY (project_id) REFERENCES projects(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notes (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            user_id TEXT,
            team_id TEXT,
            project_id TEXT,
            path_id TEXT,
            git_commit TEXT,
            git_branch TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            body_embedding BLOB,
            embedding_model TEXT,
            FOREIGN KEY (project_id) REFERENCES projects(id),
            FOREIGN KEY (path_id) REFERENCES paths(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS note_tags (
            note_id TEXT NOT NULL,
            tag_id INTEGER NOT NULL,
            PRIMARY KEY (note_id, tag_id),
            FOREIGN KEY (note_id) REFERENCES notes(id) ON DELETE CASCADE,
            FOREIGN KEY (tag_id) REFERENCES tags(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='notes_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE notes_fts USING fts5(
                note_id UNINDEXED,
                title,
                body
            )
            "#,
        )
        .execute(pool)
        .await?;

        // Backfill notes written before the index existed
        sqlx::query("INSERT INTO notes_fts (note_id, title, body) SELECT id, title, body FROM notes")
            .execute(pool)
            .await?;
    }

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS notes_fts_insert AFTER INSERT ON notes
        BEGIN
            INSERT INTO notes_fts (note_id, title, body) VALUES (new.id, new.title, new.body);
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS notes_fts_update AFTER UPDATE OF title, body ON notes
        BEGIN
            DELETE FROM notes_fts WHERE note_id = old.id;
            INSERT INTO notes_fts (note_id, title, body) VALUES (new.id, new.title, new.body);
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS notes_fts_delete AFTER DELETE ON notes
        BEGIN
            DELETE FROM notes_fts WHERE note_id = old.id;
        END
        "#,
    )
    .execute(pool)
    .await?;

    // A changed title or body invalidates the stored vector
    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS notes_clear_embedding AFTER UPDATE OF title, body ON notes
        WHEN old.title IS NOT new.title OR old.body IS NOT new.body
        BEGIN
            UPDATE notes SET body_embedding = NULL, embedding_model = NULL WHERE id = new.id;
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_notes_created_at ON notes(created_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_notes_team_id ON notes(team_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_note_tags_tag_id ON note_tags(tag_id)")
        .execute(pool)
        .await?;

    tracing::debug!("database schema is up to date");
    Ok(())
}

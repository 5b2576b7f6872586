use anyhow::Result;

use cli_unites_core::models::NewNote;
use cli_unites_core::store::NoteStore;

use crate::config::{Backend, ConfigStore};
use crate::sqlite_store::SqliteStore;

pub const SKIP_ONBOARDING_ENV: &str = "CLI_UNITES_SKIP_ONBOARDING";

struct SampleNote {
    title: &'static str,
    body: &'static str,
    tags: &'static [&'static str],
}

const SAMPLE_NOTES: &[SampleNote] = &[
    SampleNote {
        title: "Welcome to cli-unites",
        body: "Use `notes add` to capture learnings and decisions. Share them with your team for fast onboarding.",
        tags: &["onboarding", "tips"],
    },
    SampleNote {
        title: "Try searching",
        body: "Run `notes search \"git\"` to recall previous debugging sessions.",
        tags: &["search"],
    },
];

fn skip_requested() -> bool {
    std::env::var(SKIP_ONBOARDING_ENV).is_ok_and(|v| v == "1")
}

/// First-run setup for the local backend: seed sample notes into an empty
/// database and remember that onboarding happened.
pub async fn run_if_needed(config: &mut ConfigStore) -> Result<()> {
    if skip_requested()
        || config.config().first_run_completed
        || config.config().backend != Backend::Local
    {
        return Ok(());
    }

    let store = SqliteStore::open(&config.db_path()).await?;
    let seeded = seed_if_empty(&store, config.config().current_team()).await?;
    store.close().await;
    config.mark_first_run_completed()?;

    if seeded > 0 {
        println!("Sample workspace ready ({} notes).", seeded);
        println!("Capture your own note with `notes add \"First win\" --body \"What we shipped\"`");
        if let Some(team) = config.config().current_team() {
            println!("Team: {}", team);
        }
        println!();
    }
    Ok(())
}

/// Insert the sample notes when the store has none. Returns how many were
/// written.
pub async fn seed_if_empty(store: &SqliteStore, team_id: Option<&str>) -> Result<usize> {
    if store.count_notes().await? > 0 {
        return Ok(0);
    }
    for sample in SAMPLE_NOTES {
        store
            .insert_note(&NewNote {
                title: sample.title.to_string(),
                body: sample.body.to_string(),
                tags: sample.tags.iter().map(|t| t.to_string()).collect(),
                team_id: team_id.map(str::to_string),
                ..NewNote::default()
            })
            .await?;
    }
    tracing::debug!(count = SAMPLE_NOTES.len(), "seeded sample notes");
    Ok(SAMPLE_NOTES.len())
}

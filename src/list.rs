//! `notes list` and `notes activity`.

use anyhow::Result;

use cli_unites_core::models::{Note, NoteFilter};
use cli_unites_core::store::NoteStore;

use crate::config::Config;
use crate::output;

pub const DEFAULT_ACTIVITY_LIMIT: usize = 5;

pub async fn run_list(
    config: &Config,
    store: &dyn NoteStore,
    tag: Option<String>,
    limit: Option<usize>,
    team: Option<String>,
) -> Result<()> {
    let filter = NoteFilter {
        team_id: team.or_else(|| config.current_team().map(str::to_string)),
        tag,
        limit,
    };
    let notes = store.list_notes(&filter).await?;

    if notes.is_empty() {
        println!("No notes found.");
        return Ok(());
    }
    output::print_note_list(&notes);
    Ok(())
}

/// Result of an activity lookup.
#[derive(Debug)]
pub enum Activity {
    Team { team: String, notes: Vec<Note> },
    /// No team selected; recent notes from every team.
    AllTeams(Vec<Note>),
}

pub async fn recent_activity(
    config: &Config,
    store: &dyn NoteStore,
    team: Option<String>,
    limit: usize,
) -> Result<Activity> {
    let team = team.or_else(|| config.current_team().map(str::to_string));
    let filter = NoteFilter {
        team_id: team.clone(),
        tag: None,
        limit: Some(limit),
    };
    let notes = store.list_notes(&filter).await?;
    Ok(match team {
        Some(team) => Activity::Team { team, notes },
        None => Activity::AllTeams(notes),
    })
}

pub async fn run_activity(
    config: &Config,
    store: &dyn NoteStore,
    team: Option<String>,
    limit: usize,
) -> Result<()> {
    match recent_activity(config, store, team, limit).await? {
        Activity::Team { team, notes } => {
            if notes.is_empty() {
                println!("No notes found for team {}.", team);
                return Ok(());
            }
            println!("Recent activity for team {}:", team);
            output::print_note_list(&notes);
        }
        Activity::AllTeams(notes) => {
            if notes.is_empty() {
                println!("No notes recorded yet. Run `notes add` to create one.");
                return Ok(());
            }
            tracing::warn!(
                "No team selected; showing recent notes across all teams. Use `notes team --set <id>` to pick one."
            );
            println!("Recent activity (all teams):");
            output::print_note_list(&notes);
        }
    }
    Ok(())
}

use std::io::{BufRead, Read, Write};

use anyhow::{bail, Context, Result};

use cli_unites_core::models::NewNote;
use cli_unites_core::store::NoteStore;

use crate::config::Config;
use crate::context::{self, GitContext};
use crate::embed_cmd;

/// Arguments of `notes add`.
#[derive(Debug, Clone, Default)]
pub struct AddArgs {
    pub title: String,
    pub body: Option<String>,
    pub allow_empty: bool,
    pub tags: Vec<String>,
}

/// Body from `--body`, else piped stdin, else one interactive line.
fn read_body(explicit: Option<String>) -> Result<String> {
    if let Some(body) = explicit {
        return Ok(body);
    }

    if !atty::is(atty::Stream::Stdin) {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read note body from stdin")?;
        return Ok(buf);
    }

    print!("Note body: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

/// Trim the body and reject an empty one unless allowed.
pub fn finalize_body(raw: &str, allow_empty: bool) -> Result<String> {
    let body = raw.trim();
    if body.is_empty() && !allow_empty {
        bail!("No note content provided");
    }
    Ok(body.to_string())
}

/// Assemble the note to insert from arguments, config, and git context.
pub fn build_note(args: &AddArgs, body: String, config: &Config, git: GitContext) -> Result<NewNote> {
    let title = args.title.trim();
    if title.is_empty() {
        bail!("Note title must not be empty");
    }
    Ok(NewNote {
        title: title.to_string(),
        body,
        tags: args.tags.clone(),
        user_id: config.current_user_id.clone(),
        team_id: config.current_team().map(str::to_string),
        project_path: git.root,
        path: git.relative_path,
        git_commit: git.commit,
        git_branch: git.branch,
    })
}

pub async fn run_add(config: &Config, store: &dyn NoteStore, args: AddArgs) -> Result<()> {
    let raw = read_body(args.body.clone())?;
    let body = finalize_body(&raw, args.allow_empty)?;
    let note = build_note(&args, body, config, context::current_context())?;

    let id = store.insert_note(&note).await?;
    println!("Saved note {} ({})", id, store.backend_name());

    if let Some(team) = &note.team_id {
        println!("  team: {}", team);
    }
    if let Some(branch) = &note.git_branch {
        println!("  branch: {}", branch);
    }

    if config.embedding.embed_on_write && config.embedding.is_enabled() {
        match store.get_note(&id).await? {
            Some(saved) => {
                if embed_cmd::embed_note_inline(store, &config.embedding, &saved).await {
                    println!("  embedding: stored");
                } else {
                    println!("  embedding: pending (run `notes embed pending`)");
                }
            }
            None => tracing::warn!(note_id = %id, "saved note could not be read back"),
        }
    }
    Ok(())
}

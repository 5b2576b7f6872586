//! # cli-unites CLI (`notes`)
//!
//! Capture project notes with git context and find them again by keyword
//! or meaning.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `notes init` | Create or upgrade the local database |
//! | `notes add "<title>"` | Save a note (body from `--body`, stdin, or a prompt) |
//! | `notes list` | List notes for the current team |
//! | `notes activity` | Recent notes for the current or selected team |
//! | `notes search "<query>"` | Keyword search |
//! | `notes semantic-search "<query>"` | Similarity search over embeddings |
//! | `notes show <id>` | Print one note |
//! | `notes edit <id>` | Change a note's title or body |
//! | `notes embed pending` | Backfill missing embeddings |
//! | `notes team` | Show or switch the current team |
//! | `notes auth` | Store credentials and backend settings |
//! | `notes logout` | Forget stored tokens |
//!
//! ## Examples
//!
//! ```bash
//! notes add "Fixed flaky deploy" --body "Pinned the runner image" -t ci
//! git log -1 --format=%B | notes add "Release notes"
//! notes semantic-search "why did deploys fail" --threshold 0.3
//! notes team --set 7f3c... --name platform
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cli_unites::add::{self, AddArgs};
use cli_unites::config::{AuthUpdate, Backend, ConfigStore};
use cli_unites::sqlite_store::SqliteStore;
use cli_unites::team::TeamAction;
use cli_unites::{auth, backend, embed_cmd, get, list, onboarding, search, team};

/// cli-unites: unite your team with query-able project notes.
///
/// State lives in `~/.cli-unites/` (override with `--config-dir` or
/// `CLI_UNITES_CONFIG_DIR`).
#[derive(Parser)]
#[command(
    name = "notes",
    about = "Unite your team with query-able project notes",
    version
)]
struct Cli {
    /// Enable debug logging (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding `config.json` and the default database.
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the local database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Add a note.
    ///
    /// The body comes from `--body`, else from piped stdin, else from an
    /// interactive prompt. Git commit, branch, and repository path are
    /// attached automatically.
    Add {
        /// Note title.
        title: String,

        /// Note body.
        #[arg(long)]
        body: Option<String>,

        /// Save the note even when the body is empty.
        #[arg(long)]
        allow_empty: bool,

        /// Tag to attach (repeatable).
        #[arg(short = 't', long = "tag")]
        tags: Vec<String>,
    },

    /// List notes, newest first.
    List {
        /// Only notes with this exact tag.
        #[arg(short = 't', long)]
        tag: Option<String>,

        /// Maximum number of notes to show.
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Team id (defaults to the current team).
        #[arg(long)]
        team: Option<String>,
    },

    /// Show recent notes for the current or selected team.
    Activity {
        /// Team id (defaults to the current team).
        #[arg(long)]
        team: Option<String>,

        /// Number of notes to show.
        #[arg(short = 'n', long, default_value_t = list::DEFAULT_ACTIVITY_LIMIT)]
        limit: usize,
    },

    /// Keyword search over titles, bodies, and tags.
    Search {
        query: String,

        /// Search every team instead of the current one.
        #[arg(long)]
        all_teams: bool,
    },

    /// Rank notes by semantic similarity to a query.
    SemanticSearch {
        query: String,

        /// Maximum number of results (default from config, 10).
        #[arg(short = 'l', long)]
        limit: Option<usize>,

        /// Minimum similarity, exclusive (default from config, 0.5).
        #[arg(long)]
        threshold: Option<f64>,

        /// Search every team instead of the current one.
        #[arg(long)]
        all_teams: bool,
    },

    /// Print a note by id or unique id prefix.
    Show { id: String },

    /// Edit a note's title and/or body. Clears its embedding.
    Edit {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        body: Option<String>,
    },

    /// Manage embedding vectors.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Display or update the current team.
    Team {
        /// Switch to this team id.
        #[arg(long, conflicts_with_all = ["recent", "clear"])]
        set: Option<String>,

        /// Display name remembered for the team.
        #[arg(long, requires = "set")]
        name: Option<String>,

        /// List recently used teams, most recent first.
        #[arg(long, conflicts_with = "clear")]
        recent: bool,

        /// Unset the current team.
        #[arg(long)]
        clear: bool,
    },

    /// Store credentials and backend settings. Without options, prints the
    /// current (sanitized) settings.
    Auth {
        /// Session token used as the bearer token for the hosted backend.
        #[arg(long)]
        token: Option<String>,

        #[arg(long)]
        refresh_token: Option<String>,

        /// Also selects this team as the current team.
        #[arg(long)]
        team_id: Option<String>,

        #[arg(long)]
        supabase_url: Option<String>,

        #[arg(long)]
        supabase_key: Option<String>,

        #[arg(long, value_enum)]
        backend: Option<Backend>,

        /// Print the sanitized settings after updating.
        #[arg(long)]
        show: bool,
    },

    /// Clear stored auth tokens.
    Logout,

    /// Print a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Embedding management subcommands.
#[derive(Subcommand)]
enum EmbedAction {
    /// Embed notes that have no embedding (or one from another model).
    Pending {
        /// Maximum number of notes to embed in this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Override the batch size from config (number of texts per call).
        #[arg(long)]
        batch_size: Option<usize>,

        /// Show counts without performing any embedding.
        #[arg(long)]
        dry_run: bool,
    },
}

fn init_tracing(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let mut config = ConfigStore::open(cli.config_dir.as_deref());
    tracing::debug!(path = %config.path().display(), "loaded config");

    // Commands that don't need a note store
    match cli.command {
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "notes", &mut std::io::stdout());
            Ok(())
        }
        Commands::Init => {
            let path = config.db_path();
            let store = SqliteStore::open(&path).await?;
            store.close().await;
            println!("Database initialized at {}", path.display());
            Ok(())
        }
        Commands::Team {
            set,
            name,
            recent,
            clear,
        } => {
            let action = match (set, recent, clear) {
                (Some(id), _, _) => TeamAction::Set { id, name },
                (None, true, _) => TeamAction::Recent,
                (None, false, true) => TeamAction::Clear,
                (None, false, false) => TeamAction::Show,
            };
            team::run_team(&mut config, action)
        }
        Commands::Auth {
            token,
            refresh_token,
            team_id,
            supabase_url,
            supabase_key,
            backend,
            show,
        } => {
            let update = AuthUpdate {
                auth_token: token,
                refresh_token,
                team_id,
                supabase_url,
                supabase_key,
                backend,
            };
            auth::run_auth(&mut config, update, show)
        }
        Commands::Logout => auth::run_logout(&mut config),
        command => run_with_store(config, command).await,
    }
}

async fn run_with_store(mut config: ConfigStore, command: Commands) -> Result<()> {
    if let Err(e) = onboarding::run_if_needed(&mut config).await {
        tracing::warn!(error = %e, "onboarding failed");
    }

    let store = backend::open_store(&config).await?;
    let cfg = config.config();

    match command {
        Commands::Add {
            title,
            body,
            allow_empty,
            tags,
        } => {
            let args = AddArgs {
                title,
                body,
                allow_empty,
                tags,
            };
            add::run_add(cfg, store.as_ref(), args).await?;
        }
        Commands::List { tag, limit, team } => {
            list::run_list(cfg, store.as_ref(), tag, limit, team).await?;
        }
        Commands::Activity { team, limit } => {
            list::run_activity(cfg, store.as_ref(), team, limit).await?;
        }
        Commands::Search { query, all_teams } => {
            search::run_search(cfg, store.as_ref(), &query, all_teams).await?;
        }
        Commands::SemanticSearch {
            query,
            limit,
            threshold,
            all_teams,
        } => {
            search::run_semantic_search(cfg, store.as_ref(), &query, limit, threshold, all_teams)
                .await?;
        }
        Commands::Show { id } => {
            get::run_show(store.as_ref(), &id).await?;
        }
        Commands::Edit { id, title, body } => {
            get::run_edit(cfg, store.as_ref(), &id, title, body).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending {
                limit,
                batch_size,
                dry_run,
            } => {
                embed_cmd::run_embed_pending(
                    store.as_ref(),
                    &cfg.embedding,
                    limit,
                    batch_size,
                    dry_run,
                )
                .await?;
            }
        },
        Commands::Init
        | Commands::Team { .. }
        | Commands::Auth { .. }
        | Commands::Logout
        | Commands::Completions { .. } => unreachable!("handled before opening a store"),
    }

    Ok(())
}

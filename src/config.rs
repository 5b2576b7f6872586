//! JSON-backed CLI state: auth tokens, team selection, backend and
//! embedding settings.
//!
//! The file lives at `<config dir>/config.json`, where the directory is the
//! `--config-dir` flag, else `CLI_UNITES_CONFIG_DIR`, else
//! `~/.cli-unites`. [`ConfigStore`] is opened once per command and passed
//! down explicitly.
//!
//! A file that cannot be parsed is never fatal: a warning is logged and
//! defaults are used. `null` values fall back to their defaults, unknown
//! keys are preserved when the file is written back, and version-1 files
//! are upgraded in place.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const CONFIG_DIR_ENV: &str = "CLI_UNITES_CONFIG_DIR";
pub const DB_PATH_ENV: &str = "CLI_UNITES_DB_PATH";
pub const CONFIG_FILENAME: &str = "config.json";
pub const DB_FILENAME: &str = "notes.db";
pub const CONFIG_VERSION: u32 = 2;
pub const RECENT_TEAMS_LIMIT: usize = 5;

/// Which persistence layer commands talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Local,
    Supabase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentTeam {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub switched_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub config_version: u32,
    pub auth_token: Option<String>,
    pub refresh_token: Option<String>,
    pub current_user_id: Option<String>,
    pub session_expires_at: Option<String>,
    /// Legacy key, kept equal to `current_team_id`.
    pub team_id: Option<String>,
    pub current_team_id: Option<String>,
    pub recent_teams: Vec<RecentTeam>,
    /// Legacy list of team ids, most recent first.
    pub team_history: Vec<String>,
    pub backend: Backend,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub supabase_note_table: String,
    pub db_path: Option<PathBuf>,
    pub first_run_completed: bool,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_version: CONFIG_VERSION,
            auth_token: None,
            refresh_token: None,
            current_user_id: None,
            session_expires_at: None,
            team_id: None,
            current_team_id: None,
            recent_teams: Vec::new(),
            team_history: Vec::new(),
            backend: Backend::Local,
            supabase_url: None,
            supabase_key: None,
            supabase_note_table: "notes".to_string(),
            db_path: None,
            first_run_completed: false,
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `disabled`, `hash`, `openai`, or `ollama`.
    pub provider: String,
    pub model: Option<String>,
    pub dims: usize,
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
    /// Base URL for `ollama` (default `http://localhost:11434`).
    pub url: Option<String>,
    /// Embed new and edited notes immediately instead of waiting for
    /// `embed pending`.
    pub embed_on_write: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hash".to_string(),
            model: None,
            dims: 384,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
            url: None,
            embed_on_write: true,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn validate(&self) -> Result<()> {
        match self.provider.as_str() {
            "disabled" => return Ok(()),
            "hash" => {}
            "openai" | "ollama" => {
                if self.model.is_none() {
                    bail!(
                        "embedding.model must be specified when provider is '{}'",
                        self.provider
                    );
                }
            }
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, hash, openai, or ollama.",
                other
            ),
        }
        if self.dims == 0 {
            bail!("embedding.dims must be > 0");
        }
        if self.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub threshold: f64,
    pub limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            threshold: cli_unites_core::search::DEFAULT_THRESHOLD,
            limit: cli_unites_core::search::DEFAULT_LIMIT,
        }
    }
}

impl Config {
    pub fn current_team(&self) -> Option<&str> {
        self.current_team_id
            .as_deref()
            .or(self.team_id.as_deref())
    }

    /// Config value, else the `SUPABASE_URL` environment variable.
    pub fn supabase_url(&self) -> Option<String> {
        non_empty(self.supabase_url.clone()).or_else(|| non_empty(std::env::var("SUPABASE_URL").ok()))
    }

    /// Config value, else the `SUPABASE_KEY` environment variable.
    pub fn supabase_key(&self) -> Option<String> {
        non_empty(self.supabase_key.clone()).or_else(|| non_empty(std::env::var("SUPABASE_KEY").ok()))
    }

    pub fn sync_configured(&self) -> bool {
        self.supabase_url().is_some() && self.supabase_key().is_some()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Field updates accepted by `notes auth`.
#[derive(Debug, Clone, Default)]
pub struct AuthUpdate {
    pub auth_token: Option<String>,
    pub refresh_token: Option<String>,
    pub team_id: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub backend: Option<Backend>,
}

impl AuthUpdate {
    /// Names of the fields this update touches, in display order.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.auth_token.is_some() {
            names.push("auth_token");
        }
        if self.refresh_token.is_some() {
            names.push("refresh_token");
        }
        if self.team_id.is_some() {
            names.push("team_id");
        }
        if self.supabase_url.is_some() {
            names.push("supabase_url");
        }
        if self.supabase_key.is_some() {
            names.push("supabase_key");
        }
        if self.backend.is_some() {
            names.push("backend");
        }
        names
    }

    pub fn is_empty(&self) -> bool {
        self.field_names().is_empty()
    }
}

/// Loaded configuration plus the location it is persisted to.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
    path: PathBuf,
    config: Config,
}

/// Directory hosting the config file: explicit path, else
/// `CLI_UNITES_CONFIG_DIR`, else `~/.cli-unites`.
pub fn resolve_config_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.trim().is_empty() {
            return expand_home(&dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cli-unites")
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

impl ConfigStore {
    /// Resolve the config directory and load the file in it.
    pub fn open(explicit_dir: Option<&Path>) -> Self {
        Self::open_in(resolve_config_dir(explicit_dir))
    }

    /// Load `<dir>/config.json`, falling back to defaults when it is missing
    /// or unreadable.
    pub fn open_in(dir: PathBuf) -> Self {
        let path = dir.join(CONFIG_FILENAME);
        let config = load_file(&path);
        Self { dir, path, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// SQLite file: `CLI_UNITES_DB_PATH`, else `db_path` from the config,
    /// else `<config dir>/notes.db`.
    pub fn db_path(&self) -> PathBuf {
        if let Ok(p) = std::env::var(DB_PATH_ENV) {
            if !p.trim().is_empty() {
                return expand_home(&p);
            }
        }
        self.config
            .db_path
            .clone()
            .unwrap_or_else(|| self.dir.join(DB_FILENAME))
    }

    /// Write the config atomically: temp file in the same directory,
    /// fsync, then rename over the old file.
    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create config directory: {}", self.dir.display()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .context("Failed to create temporary config file")?;
        serde_json::to_writer_pretty(&mut tmp, &self.config)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to write config file: {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), "saved config");
        Ok(())
    }

    pub fn update_auth(&mut self, update: &AuthUpdate) -> Result<()> {
        if let Some(token) = &update.auth_token {
            self.config.auth_token = Some(token.clone());
        }
        if let Some(token) = &update.refresh_token {
            self.config.refresh_token = Some(token.clone());
        }
        if let Some(url) = &update.supabase_url {
            self.config.supabase_url = Some(url.clone());
        }
        if let Some(key) = &update.supabase_key {
            self.config.supabase_key = Some(key.clone());
        }
        if let Some(backend) = update.backend {
            self.config.backend = backend;
        }
        if let Some(team) = &update.team_id {
            self.apply_current_team(Some(team.clone()), None);
        }
        self.config.config_version = CONFIG_VERSION;
        self.save()
    }

    /// Select a team (or clear the selection with `None`) and persist.
    pub fn set_current_team(&mut self, team_id: Option<String>, name: Option<String>) -> Result<()> {
        self.apply_current_team(team_id, name);
        self.save()
    }

    pub fn clear_tokens(&mut self) -> Result<()> {
        self.config.auth_token = None;
        self.config.refresh_token = None;
        self.config.session_expires_at = None;
        self.save()
    }

    pub fn mark_first_run_completed(&mut self) -> Result<()> {
        self.config.first_run_completed = true;
        self.save()
    }

    fn apply_current_team(&mut self, team_id: Option<String>, name: Option<String>) {
        self.config.current_team_id = team_id.clone();
        self.config.team_id = team_id.clone();

        let Some(id) = team_id else {
            return;
        };

        let existing_name = self
            .config
            .recent_teams
            .iter()
            .find(|t| t.id == id)
            .and_then(|t| t.name.clone());

        let entry = RecentTeam {
            id: id.clone(),
            name: name.or(existing_name),
            switched_at: Utc::now().to_rfc3339(),
        };
        self.config.recent_teams.retain(|t| t.id != id);
        self.config.recent_teams.insert(0, entry);
        self.config.recent_teams.truncate(RECENT_TEAMS_LIMIT);

        self.config.team_history.retain(|t| *t != id);
        self.config.team_history.insert(0, id);
        self.config.team_history.truncate(RECENT_TEAMS_LIMIT);
    }
}

fn load_file(path: &Path) -> Config {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Config::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not read config; using defaults");
            return Config::default();
        }
    };
    match parse_config(&content) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "config file is corrupt; using defaults");
            Config::default()
        }
    }
}

/// Parse config JSON: drop `null` fields, migrate old versions, then decode.
pub fn parse_config(content: &str) -> Result<Config> {
    let value: serde_json::Value = serde_json::from_str(content).context("invalid JSON")?;
    let serde_json::Value::Object(mut map) = value else {
        bail!("config root must be a JSON object");
    };
    map.retain(|_, v| !v.is_null());

    let version = map
        .get("config_version")
        .and_then(|v| v.as_u64())
        .unwrap_or(1);
    if version < 2 {
        migrate_v1_to_v2(&mut map);
    }
    map.insert("config_version".to_string(), CONFIG_VERSION.into());

    let config: Config =
        serde_json::from_value(serde_json::Value::Object(map)).context("invalid config fields")?;
    Ok(config)
}

fn migrate_v1_to_v2(map: &mut serde_json::Map<String, serde_json::Value>) {
    tracing::info!("Upgrading CLI config with team support (v1 -> v2).");
    if !map.contains_key("current_team_id") {
        if let Some(team) = map.get("team_id").cloned() {
            map.insert("current_team_id".to_string(), team);
        }
    }

    let has_recent = map
        .get("recent_teams")
        .and_then(|v| v.as_array())
        .is_some_and(|a| !a.is_empty());
    if has_recent {
        return;
    }
    let history: Vec<String> = map
        .get("team_history")
        .and_then(|v| v.as_array())
        .map(|a| {
            a.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    if history.is_empty() {
        return;
    }
    let now = Utc::now().to_rfc3339();
    let recent: Vec<serde_json::Value> = history
        .iter()
        .take(RECENT_TEAMS_LIMIT)
        .map(|id| serde_json::json!({ "id": id, "name": null, "switched_at": now }))
        .collect();
    map.insert("recent_teams".to_string(), serde_json::Value::Array(recent));
}

use anyhow::Result;

use crate::config::ConfigStore;

/// What `notes team` was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeamAction {
    Show,
    Set { id: String, name: Option<String> },
    Recent,
    Clear,
}

pub fn run_team(config: &mut ConfigStore, action: TeamAction) -> Result<()> {
    match action {
        TeamAction::Set { id, name } => {
            let id = id.trim().to_string();
            if id.is_empty() {
                anyhow::bail!("Team id must not be empty");
            }
            config.set_current_team(Some(id.clone()), name.clone())?;
            match name {
                Some(name) => println!("Current team set to {} ({})", id, name),
                None => println!("Current team set to {}", id),
            }
        }
        TeamAction::Clear => {
            config.set_current_team(None, None)?;
            println!("Cleared current team.");
        }
        TeamAction::Recent => {
            let cfg = config.config();
            if cfg.recent_teams.is_empty() {
                println!("No previously used teams yet.");
                return Ok(());
            }
            let current = cfg.current_team();
            for (idx, team) in cfg.recent_teams.iter().enumerate() {
                let marker = if Some(team.id.as_str()) == current { "*" } else { " " };
                let name = team
                    .name
                    .as_deref()
                    .map(|n| format!(" ({})", n))
                    .unwrap_or_default();
                println!("{} {}. {}{}", marker, idx + 1, team.id, name);
            }
        }
        TeamAction::Show => match config.config().current_team() {
            Some(team) => println!("Current team: {}", team),
            None => println!("No team configured. Use `notes team --set <id>` to pick one."),
        },
    }
    Ok(())
}

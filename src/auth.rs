//! `notes auth` and `notes logout`.
//!
//! Credentials are stored in the config file as-is; printed views truncate
//! tokens and mask keys.

use anyhow::Result;

use crate::config::{AuthUpdate, Backend, ConfigStore};
use crate::output::{mask_secret, truncate_token};

/// Label/value pairs describing the config without exposing secrets.
pub fn sanitized_summary(store: &ConfigStore) -> Vec<(&'static str, String)> {
    let cfg = store.config();
    let token = |t: &Option<String>| {
        t.as_deref()
            .filter(|t| !t.is_empty())
            .map(truncate_token)
            .unwrap_or_else(|| "(not set)".to_string())
    };
    let backend = match cfg.backend {
        Backend::Local => "local",
        Backend::Supabase => "supabase",
    };

    let mut rows = vec![
        ("config", store.path().display().to_string()),
        ("backend", backend.to_string()),
        ("auth_token", token(&cfg.auth_token)),
        ("refresh_token", token(&cfg.refresh_token)),
        (
            "current_team_id",
            cfg.current_team().unwrap_or("(none)").to_string(),
        ),
        (
            "supabase_url",
            cfg.supabase_url().unwrap_or_else(|| "(not set)".to_string()),
        ),
        (
            "supabase_key",
            mask_secret(cfg.supabase_key().as_deref()).to_string(),
        ),
    ];
    if cfg.backend == Backend::Local {
        rows.push(("database", store.db_path().display().to_string()));
    }
    rows.push((
        "embedding",
        format!("{} ({} dims)", cfg.embedding.provider, cfg.embedding.dims),
    ));
    rows
}

fn print_summary(store: &ConfigStore) {
    for (label, value) in sanitized_summary(store) {
        println!("{:<16} {}", format!("{}:", label), value);
    }
}

pub fn run_auth(store: &mut ConfigStore, update: AuthUpdate, show: bool) -> Result<()> {
    if !update.is_empty() {
        store.update_auth(&update)?;
        println!("Updated {}.", update.field_names().join(", "));
    }
    if show || update.is_empty() {
        print_summary(store);
    }
    Ok(())
}

pub fn run_logout(store: &mut ConfigStore) -> Result<()> {
    store.clear_tokens()?;
    println!("Logged out. Auth tokens cleared.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn value<'a>(rows: &'a [(&'static str, String)], label: &str) -> &'a str {
        rows.iter()
            .find(|(l, _)| *l == label)
            .map(|(_, v)| v.as_str())
            .unwrap()
    }

    #[test]
    fn test_summary_hides_secrets() {
        let tmp = TempDir::new().unwrap();
        let mut store = ConfigStore::open_in(tmp.path().to_path_buf());
        store
            .update_auth(&AuthUpdate {
                auth_token: Some("eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9".into()),
                supabase_key: Some("service-role-secret".into()),
                team_id: Some("team-9".into()),
                ..AuthUpdate::default()
            })
            .unwrap();

        let rows = sanitized_summary(&store);
        assert_eq!(value(&rows, "auth_token"), "eyJhbGciOiJI...");
        assert_eq!(value(&rows, "supabase_key"), "***");
        assert_eq!(value(&rows, "current_team_id"), "team-9");
        assert_eq!(value(&rows, "refresh_token"), "(not set)");
        assert!(rows.iter().all(|(_, v)| !v.contains("service-role-secret")));
    }

    #[test]
    fn test_logout_clears_tokens() {
        let tmp = TempDir::new().unwrap();
        let mut store = ConfigStore::open_in(tmp.path().to_path_buf());
        run_auth(
            &mut store,
            AuthUpdate {
                auth_token: Some("a".into()),
                refresh_token: Some("b".into()),
                ..AuthUpdate::default()
            },
            false,
        )
        .unwrap();
        run_logout(&mut store).unwrap();
        let reloaded = ConfigStore::open_in(tmp.path().to_path_buf());
        assert!(reloaded.config().auth_token.is_none());
        assert!(reloaded.config().refresh_token.is_none());
    }
}

use anyhow::Result;

use cli_unites_core::store::NoteStore;

use crate::config::{Backend, ConfigStore};
use crate::remote::RemoteStore;
use crate::sqlite_store::SqliteStore;

/// Open the store selected by `backend` in the config.
pub async fn open_store(config: &ConfigStore) -> Result<Box<dyn NoteStore>> {
    match config.config().backend {
        Backend::Local => {
            let path = config.db_path();
            tracing::debug!(path = %path.display(), "using local backend");
            Ok(Box::new(SqliteStore::open(&path).await?))
        }
        Backend::Supabase => {
            tracing::debug!("using supabase backend");
            Ok(Box::new(RemoteStore::from_config(config.config())?))
        }
    }
}

//! CLI subcommand implementations.

pub mod clear;
pub mod dashboard;
pub mod errors;
pub mod ingest;
pub mod serve;
pub mod sessions;

use anyhow::{Context, Result};
use ua_db::Database;
use ua_directory::Directory;

use crate::Config;
use crate::service::Analytics;

/// Validates the configuration and opens the database, creating its directory.
pub fn open_analytics(config: &Config) -> Result<Analytics<Directory>> {
    let settings = config.settings().context("invalid configuration")?;

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    let db = Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;

    let directory = Directory::from_url(config.directory_url.as_deref(), config.directory_timeout())
        .context("invalid directory configuration")?;
    if !directory.is_enabled() {
        tracing::debug!("user directory disabled");
    }

    Ok(Analytics::new(db, directory, settings))
}

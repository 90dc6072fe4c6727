//! Serve command: runs the HTTP API.

use anyhow::Result;
use ua_directory::Directory;

use crate::Config;
use crate::api;
use crate::service::Analytics;

pub async fn run(config: &Config, analytics: Analytics<Directory>) -> Result<()> {
    tracing::info!(
        database = %config.database_path.display(),
        policy = %analytics.settings().open_session_policy,
        version = env!("CARGO_PKG_VERSION"),
        "starting analytics server"
    );
    api::serve(config.listen_addr, analytics).await
}

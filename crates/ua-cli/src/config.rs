//! Configuration loading and management.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use ua_core::{DashboardOptions, DisplayOffset, OnlineWindow, OpenSessionPolicy, ValidationError};

/// Upper bound for the recent-activity feed.
const MAX_RECENT_ACTIVITY: usize = 200;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Address the HTTP server binds to.
    pub listen_addr: SocketAddr,
    /// Seconds since the last event during which a user counts as online.
    pub online_window_secs: u64,
    pub recent_activity_limit: usize,
    pub popular_actions_limit: usize,
    pub recent_errors_limit: usize,
    /// Fixed offset from UTC, in minutes, used for rendered timestamps.
    pub display_offset_minutes: i32,
    /// User ids that are acknowledged but never aggregated.
    pub placeholder_user_ids: Vec<String>,
    pub open_session_policy: OpenSessionPolicy,
    /// Base URL of the user directory. Unset disables profile enrichment.
    pub directory_url: Option<String>,
    pub directory_timeout_secs: u64,
    /// Emit logs as JSON lines.
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("analytics.db"),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            online_window_secs: OnlineWindow::DEFAULT_SECS,
            recent_activity_limit: 30,
            popular_actions_limit: 10,
            recent_errors_limit: 50,
            display_offset_minutes: DisplayOffset::DEFAULT_MINUTES,
            placeholder_user_ids: vec!["anonymous".to_string()],
            open_session_policy: OpenSessionPolicy::default(),
            directory_url: None,
            directory_timeout_secs: 5,
            log_json: false,
        }
    }
}

/// Validated settings the engine runs with.
#[derive(Debug, Clone)]
pub struct Settings {
    pub dashboard: DashboardOptions,
    pub recent_activity_limit: usize,
    pub popular_actions_limit: usize,
    pub recent_errors_limit: usize,
    pub placeholder_user_ids: Vec<String>,
    pub open_session_policy: OpenSessionPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        let config = Config::default();
        Self {
            dashboard: DashboardOptions::default(),
            recent_activity_limit: config.recent_activity_limit,
            popular_actions_limit: config.popular_actions_limit,
            recent_errors_limit: config.recent_errors_limit,
            placeholder_user_ids: config.placeholder_user_ids,
            open_session_policy: config.open_session_policy,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (UA_*)
        figment = figment.merge(Env::prefixed("UA_"));

        figment.extract()
    }

    /// Checks value ranges and returns the settings the engine uses.
    pub fn settings(&self) -> Result<Settings, ValidationError> {
        let online_window = OnlineWindow::from_secs(self.online_window_secs)?;
        let display_offset = DisplayOffset::from_minutes(self.display_offset_minutes)?;
        let positive = |field: &'static str, value: usize| {
            if value == 0 {
                Err(ValidationError::OutOfRange {
                    field,
                    reason: "must be greater than zero".to_string(),
                })
            } else {
                Ok(value)
            }
        };
        if self.directory_timeout_secs == 0 {
            return Err(ValidationError::OutOfRange {
                field: "directory_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Settings {
            dashboard: DashboardOptions {
                online_window,
                display_offset,
            },
            recent_activity_limit: positive("recent_activity_limit", self.recent_activity_limit)?
                .min(MAX_RECENT_ACTIVITY),
            popular_actions_limit: positive("popular_actions_limit", self.popular_actions_limit)?,
            recent_errors_limit: positive("recent_errors_limit", self.recent_errors_limit)?,
            placeholder_user_ids: self
                .placeholder_user_ids
                .iter()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect(),
            open_session_policy: self.open_session_policy,
        })
    }

    pub const fn directory_timeout(&self) -> Duration {
        Duration::from_secs(self.directory_timeout_secs)
    }
}

/// Returns the platform-specific config directory for ua.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ua"))
}

/// Returns the platform-specific data directory for ua.
///
/// On Linux: `~/.local/share/ua`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("ua"))
}

//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Usage analytics engine.
///
/// Ingests client lifecycle events, pairs them into sessions and serves
/// presence and usage statistics.
#[derive(Debug, Parser)]
#[command(name = "ua", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP API.
    Serve,

    /// Print the dashboard.
    Dashboard {
        /// Output the raw JSON payload.
        #[arg(long)]
        json: bool,
    },

    /// Delete all events, profiles and logged errors.
    Clear,

    /// Show recently logged errors.
    Errors {
        /// Maximum number of rows (defaults to `recent_errors_limit`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Record a single event.
    Ingest {
        /// User the event belongs to.
        #[arg(long)]
        user: String,

        /// Event kind (e.g. `session_start`, `view_build`).
        #[arg(long)]
        action: String,

        /// Event details as a JSON object.
        #[arg(long)]
        details: Option<String>,

        /// Client timestamp (ISO-8601). Defaults to now.
        #[arg(long)]
        timestamp: Option<String>,
    },

    /// List a user's sessions, newest first.
    Sessions {
        /// User whose sessions to list.
        #[arg(long)]
        user: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ingest_arguments() {
        let cli = Cli::try_parse_from([
            "ua",
            "--verbose",
            "ingest",
            "--user",
            "42",
            "--action",
            "session_start",
            "--details",
            r#"{"platform":"ios"}"#,
        ])
        .unwrap();

        assert!(cli.verbose);
        let Some(Commands::Ingest {
            user,
            action,
            details,
            timestamp,
        }) = cli.command
        else {
            panic!("expected ingest command");
        };
        assert_eq!(user, "42");
        assert_eq!(action, "session_start");
        assert_eq!(details.as_deref(), Some(r#"{"platform":"ios"}"#));
        assert_eq!(timestamp, None);
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli =
            Cli::try_parse_from(["ua", "dashboard", "--json", "--config", "ua.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("ua.toml")));
        assert!(matches!(cli.command, Some(Commands::Dashboard { json: true })));
    }
}

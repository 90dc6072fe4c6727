use std::io::Write;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};

use ua_cli::commands::{self, clear, dashboard, errors, ingest, serve, sessions};
use ua_cli::{Cli, Commands, Config};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        // No subcommand, show help
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    ua_cli::logging::init(cli.verbose, config.log_json);
    tracing::debug!(?config, "loaded configuration");

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(run(command, &config))
}

async fn run(command: Commands, config: &Config) -> Result<()> {
    let analytics = commands::open_analytics(config)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match command {
        Commands::Serve => serve::run(config, analytics).await?,
        Commands::Dashboard { json } => dashboard::run(&mut out, &analytics, json).await?,
        Commands::Clear => clear::run(&mut out, &analytics).await?,
        Commands::Errors { limit } => errors::run(&mut out, &analytics, limit).await?,
        Commands::Ingest {
            user,
            action,
            details,
            timestamp,
        } => {
            let args = ingest::IngestArgs {
                user,
                action,
                details,
                timestamp,
            };
            ingest::run(&mut out, &analytics, args).await?;
        }
        Commands::Sessions { user } => sessions::run(&mut out, &analytics, &user).await?,
    }

    out.flush()?;
    Ok(())
}

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use prio_core::{Clock, SystemClock};
use tracing_subscriber::EnvFilter;

use prio_cli::commands::{duel, import, lists, standings, status};
use prio_cli::{Cli, Commands, Config};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(prio_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = prio_db::Database::open(&config.database_path).with_context(|| {
        format!("failed to open {}", config.database_path.display())
    })?;
    Ok((db, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logs go to stderr so command output stays machine-readable.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let (mut db, config) = open_database(cli.config.as_deref())?;
    let now = SystemClock.now();
    let mut stdout = io::stdout().lock();

    match command {
        Commands::Status => status::run(&mut stdout, &db, &config, now)?,
        Commands::Import => {
            let summary = import::run(io::stdin().lock(), &mut db)?;
            writeln!(
                stdout,
                "Imported {} items ({} already present, {} new lists)",
                summary.items_inserted, summary.items_skipped, summary.lists_created
            )?;
        }
        Commands::Lists { action } => lists::run(&mut stdout, &mut db, action.as_ref())?,
        Commands::Duel(args) => {
            duel::run(io::stdin().lock(), &mut stdout, &mut db, &config, args.mode, now)?;
        }
        Commands::Standings(args) => standings::run(&mut stdout, &db, args)?,
    }

    Ok(())
}

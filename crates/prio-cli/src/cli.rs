//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::duel::DuelArgs;
use crate::commands::lists::ListsAction;
use crate::commands::standings::StandingsArgs;

/// Duel-based prioritization.
///
/// Shows two or more items at a time and learns what matters most from your
/// picks, keeping an Elo rating per item.
#[derive(Debug, Parser)]
#[command(name = "prio", version, about, long_about = None)]
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
    /// Show remaining duels and enabled lists.
    Status,

    /// Import items as JSON lines from stdin.
    Import,

    /// Show lists or toggle whether they take part in duels.
    Lists {
        #[command(subcommand)]
        action: Option<ListsAction>,
    },

    /// Run one duel round interactively.
    Duel(DuelArgs),

    /// Show items ordered by rating.
    Standings(StandingsArgs),
}

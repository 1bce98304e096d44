//! Standings command for showing items best first.

use std::io::Write;

use anyhow::Result;
use clap::Args;

use prio_core::{ListId, standings};
use prio_db::Database;

#[derive(Debug, Args)]
pub struct StandingsArgs {
    /// Only show items from this list.
    #[arg(long)]
    pub list: Option<String>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run<W: Write>(writer: &mut W, db: &Database, args: &StandingsArgs) -> Result<()> {
    let list_id = args.list.as_deref().map(ListId::new).transpose()?;
    let items = db.list_items(list_id.as_ref())?;
    let ranked = standings(&items);

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&ranked)?)?;
        return Ok(());
    }

    if ranked.is_empty() {
        writeln!(writer, "No items.")?;
        return Ok(());
    }

    let width = ranked.len().to_string().len();
    for standing in &ranked {
        writeln!(
            writer,
            "{:>width$}. {:>6.1}  {} ({})",
            standing.position, standing.item.rating, standing.item.title, standing.item.list_id
        )?;
    }
    Ok(())
}

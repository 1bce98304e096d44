//! Status command for showing today's allowance and the enabled lists.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use prio_db::Database;

use crate::Config;

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<()> {
    let remaining = config
        .quota_tracker()
        .remaining(db, now)
        .context("failed to read quota")?;
    let lists = db.list_lists()?;

    writeln!(writer, "Prioritization status")?;
    writeln!(writer, "Database: {}", config.database_path.display())?;
    match config.daily_limit {
        Some(limit) if limit > 0 => writeln!(writer, "Duels left today: {remaining} of {limit}")?,
        _ => writeln!(writer, "Duels left today: {remaining}")?,
    }

    let enabled: Vec<_> = lists.iter().filter(|list| list.duel_enabled).collect();
    if enabled.is_empty() {
        writeln!(writer, "No lists enabled for duels.")?;
        return Ok(());
    }

    writeln!(writer, "Enabled lists:")?;
    for list in enabled {
        writeln!(writer, "- {} ({} items)", list.id, list.item_count)?;
    }

    Ok(())
}

//! Duel command: one interactive round on stdin.
//!
//! Candidates are numbered from 1. In winner mode a single number picks the
//! preferred item; in ranking mode every number is given once, best first.
//! `r` lets the engine decide, `s` skips the round and `q` (or end of input)
//! cancels it. Neither skipping nor cancelling spends a duel.

use std::collections::HashSet;
use std::io::{BufRead, Write};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::Args;

use prio_core::{
    DuelCandidateSet, DuelError, DuelMode, DuelSession, DuelVerdict, ItemId, RoundOutcome,
    RoundResult,
};
use prio_db::Database;

use crate::Config;

#[derive(Debug, Args)]
pub struct DuelArgs {
    /// Pick a single winner out of two, or rank several items.
    #[arg(long, default_value_t = DuelMode::Winner)]
    pub mode: DuelMode,
}

/// What the user typed, once understood.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Choice {
    Verdict(DuelVerdict),
    Cancel,
}

pub fn run<R: BufRead, W: Write>(
    mut reader: R,
    writer: &mut W,
    db: &mut Database,
    config: &Config,
    mode: DuelMode,
    now: DateTime<Utc>,
) -> Result<()> {
    let enabled = db.enabled_list_ids()?;
    let mut session = DuelSession::new(
        &mut *db,
        config.quota_tracker(),
        config.duel_settings(enabled),
        config.rng(),
    );

    let candidates = match session.start(mode, now) {
        Ok(candidates) => candidates,
        Err(DuelError::QuotaExhausted) => {
            writeln!(writer, "No duels left today. Come back tomorrow.")?;
            return Ok(());
        }
        Err(DuelError::NoAvailableLists) => {
            writeln!(
                writer,
                "No lists enabled for duels. Enable one with `prio lists enable <id>`."
            )?;
            return Ok(());
        }
        Err(DuelError::NotEnoughItems { found }) => {
            writeln!(
                writer,
                "Not enough items to duel: found {found}, need at least 2."
            )?;
            return Ok(());
        }
        Err(err) => return Err(err).context("failed to start a round"),
    };

    write_candidates(writer, mode, &candidates)?;
    session.acknowledge()?;

    let verdict = loop {
        write!(writer, "{}", prompt(mode, candidates.len()))?;
        writer.flush()?;

        let mut line = String::new();
        if reader.read_line(&mut line).context("failed to read choice")? == 0 {
            writeln!(writer)?;
            break None;
        }
        match parse_choice(line.trim(), mode, &candidates) {
            Ok(Choice::Verdict(verdict)) => break Some(verdict),
            Ok(Choice::Cancel) => break None,
            Err(err) => writeln!(writer, "{err}")?,
        }
    };

    let Some(verdict) = verdict else {
        session.cancel()?;
        writeln!(writer, "Round cancelled.")?;
        return Ok(());
    };

    let result = session
        .submit(verdict, now)
        .context("failed to resolve the round")?;
    drop(session);

    match result {
        RoundResult::Skipped => writeln!(writer, "Round skipped.")?,
        RoundResult::Completed(outcome) => {
            write_outcome(writer, &outcome)?;
            let remaining = config
                .quota_tracker()
                .remaining(&*db, now)
                .context("failed to read quota")?;
            writeln!(writer, "Duels left today: {remaining}")?;
        }
    }
    Ok(())
}

fn prompt(mode: DuelMode, count: usize) -> String {
    match mode {
        DuelMode::Winner => {
            format!("Pick the winner [1-{count}], r = random, s = skip, q = quit: ")
        }
        DuelMode::Ranking => {
            format!("Rank all {count} best first (e.g. 2 1 3), r = random, s = skip, q = quit: ")
        }
    }
}

fn write_candidates<W: Write>(
    writer: &mut W,
    mode: DuelMode,
    candidates: &DuelCandidateSet,
) -> Result<()> {
    writeln!(writer, "Round ({mode} mode):")?;
    for (idx, item) in candidates.items().iter().enumerate() {
        writeln!(
            writer,
            "  {}. {} ({}, {:.1})",
            idx + 1,
            item.title,
            item.list_id,
            item.rating
        )?;
    }
    Ok(())
}

fn write_outcome<W: Write>(writer: &mut W, outcome: &RoundOutcome) -> Result<()> {
    let title = |id: &ItemId| {
        outcome
            .items
            .iter()
            .find(|item| &item.id == id)
            .map_or_else(|| id.to_string(), |item| item.title.clone())
    };

    match &outcome.verdict {
        DuelVerdict::Winner(id) => writeln!(writer, "Winner: {}", title(id))?,
        DuelVerdict::Ranking(order) => {
            let order: Vec<String> = order.iter().map(title).collect();
            writeln!(writer, "Order: {}", order.join(" > "))?;
        }
        DuelVerdict::Skip | DuelVerdict::RandomOutcome => {}
    }

    for delta in &outcome.deltas {
        writeln!(
            writer,
            "  {}: {:.1} -> {:.1} ({:+.1})",
            title(&delta.item_id),
            delta.before,
            delta.after,
            delta.change()
        )?;
    }
    Ok(())
}

fn parse_choice(input: &str, mode: DuelMode, candidates: &DuelCandidateSet) -> Result<Choice> {
    match input.to_ascii_lowercase().as_str() {
        "q" | "quit" => return Ok(Choice::Cancel),
        "s" | "skip" => return Ok(Choice::Verdict(DuelVerdict::Skip)),
        "r" | "random" => return Ok(Choice::Verdict(DuelVerdict::RandomOutcome)),
        _ => {}
    }

    let count = candidates.len();
    let mut picks = Vec::new();
    for token in input.split(|c: char| c.is_whitespace() || c == ',') {
        if token.is_empty() {
            continue;
        }
        let position: usize = match token.parse() {
            Ok(position) if (1..=count).contains(&position) => position,
            _ => bail!("Pick a number between 1 and {count}."),
        };
        picks.push(candidates.items()[position - 1].id.clone());
    }

    match mode {
        DuelMode::Winner => match picks.as_slice() {
            [winner] => Ok(Choice::Verdict(DuelVerdict::Winner(winner.clone()))),
            _ => bail!("Pick exactly one number between 1 and {count}."),
        },
        DuelMode::Ranking => {
            let distinct: HashSet<&ItemId> = picks.iter().collect();
            if picks.len() != count || distinct.len() != count {
                bail!("Give each number from 1 to {count} exactly once.");
            }
            Ok(Choice::Verdict(DuelVerdict::Ranking(picks)))
        }
    }
}

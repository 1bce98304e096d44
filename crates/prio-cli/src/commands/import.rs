//! Import command for seeding lists and items from JSON lines.
//!
//! Each line is `{"list": "...", "title": "...", "id": "...", "rating": 1200.0}`
//! where `id` and `rating` are optional. Lists are created on first sight.
//! Items whose ID already exists are left untouched.

use std::collections::BTreeSet;
use std::io::BufRead;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use prio_core::{DEFAULT_RATING, Item, ItemId, ListId};
use prio_db::Database;

/// Counts reported after an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub lists_created: usize,
    pub items_inserted: usize,
    pub items_skipped: usize,
}

pub fn run<R: BufRead>(reader: R, db: &mut Database) -> Result<ImportSummary> {
    let items = parse_items(reader)?;

    let list_ids: BTreeSet<&ListId> = items.iter().map(|item| &item.list_id).collect();
    let mut lists_created = 0;
    for list_id in list_ids {
        if db.ensure_list(list_id, list_id.as_str())? {
            lists_created += 1;
        }
    }

    let items_inserted = db.insert_items(&items).context("failed to insert items")?;
    let summary = ImportSummary {
        lists_created,
        items_inserted,
        items_skipped: items.len() - items_inserted,
    };
    tracing::info!(?summary, "import finished");
    Ok(summary)
}

fn parse_items<R: BufRead>(reader: R) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let parsed: ImportItem = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid JSON on line {}", idx + 1))?;
        let item = parsed
            .into_item()
            .with_context(|| format!("invalid item on line {}", idx + 1))?;
        items.push(item);
    }
    Ok(items)
}

#[derive(Debug, Deserialize)]
struct ImportItem {
    list: String,
    title: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    rating: Option<f64>,
}

impl ImportItem {
    fn into_item(self) -> Result<Item> {
        let title = self.title.trim();
        if title.is_empty() {
            bail!("title cannot be empty");
        }
        let list_id = ListId::new(self.list.trim())?;
        let id = match self.id {
            Some(id) => ItemId::new(id)?,
            None => derived_id(&list_id, title)?,
        };
        let rating = self.rating.unwrap_or(DEFAULT_RATING);
        if !rating.is_finite() {
            bail!("rating must be a finite number");
        }
        Ok(Item::new(id, title, list_id).with_rating(rating))
    }
}

/// `work` + `Write the Q3 report!` becomes `work/write-the-q3-report`.
fn derived_id(list_id: &ListId, title: &str) -> Result<ItemId> {
    let mut slug = String::with_capacity(title.len());
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        bail!("cannot derive an id from title {title:?}; provide one");
    }
    Ok(ItemId::new(format!("{list_id}/{slug}"))?)
}

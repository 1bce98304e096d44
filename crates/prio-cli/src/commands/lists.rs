//! Lists command for showing lists and toggling duel eligibility.

use std::io::Write;

use anyhow::{Result, bail};
use clap::Subcommand;

use prio_core::ListId;
use prio_db::Database;

#[derive(Debug, Subcommand)]
pub enum ListsAction {
    /// Let a list's items appear in duels.
    Enable {
        /// List ID.
        id: String,
    },
    /// Keep a list's items out of duels.
    Disable {
        /// List ID.
        id: String,
    },
}

pub fn run<W: Write>(writer: &mut W, db: &mut Database, action: Option<&ListsAction>) -> Result<()> {
    match action {
        None => show(writer, db),
        Some(ListsAction::Enable { id }) => toggle(writer, db, id, true),
        Some(ListsAction::Disable { id }) => toggle(writer, db, id, false),
    }
}

fn show<W: Write>(writer: &mut W, db: &Database) -> Result<()> {
    let lists = db.list_lists()?;
    if lists.is_empty() {
        writeln!(writer, "No lists yet. Import items with `prio import`.")?;
        return Ok(());
    }
    for list in lists {
        let mark = if list.duel_enabled { "x" } else { " " };
        writeln!(
            writer,
            "[{mark}] {} - {} ({} items)",
            list.id, list.name, list.item_count
        )?;
    }
    Ok(())
}

fn toggle<W: Write>(writer: &mut W, db: &mut Database, id: &str, enabled: bool) -> Result<()> {
    let list_id = ListId::new(id)?;
    if !db.set_list_enabled(&list_id, enabled)? {
        bail!("unknown list: {list_id}");
    }
    tracing::info!(list = %list_id, enabled, "updated list");
    let state = if enabled { "enabled" } else { "disabled" };
    writeln!(writer, "Duels {state} for {list_id}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;
    use prio_core::{Item, ItemId};

    fn setup() -> Database {
        let mut db = Database::open_in_memory().unwrap();
        let work = ListId::new("work").unwrap();
        db.ensure_list(&work, "Work").unwrap();
        db.ensure_list(&ListId::new("home").unwrap(), "Home").unwrap();
        db.insert_items(&[Item::new(ItemId::new("w1").unwrap(), "Write report", work)])
            .unwrap();
        db
    }

    fn render(db: &mut Database, action: Option<&ListsAction>) -> String {
        let mut output = Vec::new();
        run(&mut output, db, action).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn shows_lists_with_their_state() {
        let mut db = setup();
        db.set_list_enabled(&ListId::new("home").unwrap(), false)
            .unwrap();
        assert_snapshot!(render(&mut db, None), @r"
        [ ] home - Home (0 items)
        [x] work - Work (1 items)
        ");
    }

    #[test]
    fn toggling_updates_the_list() {
        let mut db = setup();
        let disable = ListsAction::Disable {
            id: "work".to_string(),
        };
        assert_snapshot!(render(&mut db, Some(&disable)), @"Duels disabled for work");
        assert_eq!(
            db.enabled_list_ids().unwrap(),
            vec![ListId::new("home").unwrap()]
        );
    }

    #[test]
    fn toggling_unknown_list_fails() {
        let mut db = setup();
        let enable = ListsAction::Enable {
            id: "garden".to_string(),
        };
        let err = run(&mut Vec::new(), &mut db, Some(&enable)).unwrap_err();
        assert_eq!(err.to_string(), "unknown list: garden");
    }

    #[test]
    fn empty_database_hints_at_import() {
        let mut db = Database::open_in_memory().unwrap();
        assert_snapshot!(render(&mut db, None), @"No lists yet. Import items with `prio import`.");
    }
}

//! Stable total order over a collection.

use std::cmp::Ordering;

use serde::Serialize;

use crate::types::Item;

/// An item and its 1-based position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Standing {
    pub position: usize,
    #[serde(flatten)]
    pub item: Item,
}

/// Orders items best first.
///
/// Highest rating wins; equal ratings fall back to title, then ID, so the
/// same collection always produces the same order.
pub fn standings(items: &[Item]) -> Vec<Standing> {
    let mut sorted: Vec<Item> = items.to_vec();
    sorted.sort_by(compare);
    sorted
        .into_iter()
        .enumerate()
        .map(|(idx, item)| Standing {
            position: idx + 1,
            item,
        })
        .collect()
}

fn compare(a: &Item, b: &Item) -> Ordering {
    b.rating
        .total_cmp(&a.rating)
        .then_with(|| a.title.cmp(&b.title))
        .then_with(|| a.id.cmp(&b.id))
}

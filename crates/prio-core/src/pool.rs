//! Candidate selection for the next round.
//!
//! Items are drawn without replacement using exponential keys
//! (`ln(u) / weight`, largest keys win). An item's weight grows with the time
//! since it last took part in a duel, so stale items surface more often
//! without ever locking fresh ones out.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::error::DuelError;
use crate::store::Store;
use crate::types::{DuelCandidateSet, Item, ListId};

/// Staleness beyond this many days does not raise an item's weight further.
/// Items never dueled count as this stale.
pub const MAX_STALENESS_DAYS: f64 = 30.0;

/// Draws candidate sets from the lists enabled for duels.
#[derive(Debug, Clone, Copy)]
pub struct DuelPool<'a> {
    enabled_lists: &'a [ListId],
}

impl<'a> DuelPool<'a> {
    pub const fn new(enabled_lists: &'a [ListId]) -> Self {
        Self { enabled_lists }
    }

    pub const fn has_lists(&self) -> bool {
        !self.enabled_lists.is_empty()
    }

    /// Loads eligible items and draws up to `cards` of them.
    ///
    /// Never mutates the store.
    pub fn draw<S: Store + ?Sized, R: Rng>(
        &self,
        store: &S,
        cards: usize,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<DuelCandidateSet, DuelError> {
        if !self.has_lists() {
            return Err(DuelError::NoAvailableLists);
        }
        let items = self.eligible(store.load_items(self.enabled_lists)?);
        if items.len() < 2 {
            return Err(DuelError::NotEnoughItems { found: items.len() });
        }

        let available = items.len();
        let picked = sample_by_staleness(items, cards.max(2), now, rng);
        tracing::debug!(
            drawn = picked.len(),
            ids = ?picked.iter().map(|item| item.id.as_str()).collect::<Vec<_>>(),
            "drew duel candidates"
        );
        DuelCandidateSet::new(picked).map_err(|_| DuelError::NotEnoughItems { found: available })
    }

    /// Drops items outside the enabled lists and repeated IDs.
    fn eligible(&self, items: Vec<Item>) -> Vec<Item> {
        let mut seen = HashSet::new();
        items
            .into_iter()
            .filter(|item| self.enabled_lists.contains(&item.list_id))
            .filter(|item| seen.insert(item.id.clone()))
            .collect()
    }
}

/// Selection weight of an item at `now`. Always at least 1.
pub fn staleness_weight(item: &Item, now: DateTime<Utc>) -> f64 {
    let days = item.last_dueled_at.map_or(MAX_STALENESS_DAYS, |at| {
        #[expect(
            clippy::cast_precision_loss,
            reason = "minute counts are far below 2^52"
        )]
        let minutes = now.signed_duration_since(at).num_minutes() as f64;
        (minutes / 1440.0).clamp(0.0, MAX_STALENESS_DAYS)
    });
    1.0 + days
}

fn sample_by_staleness<R: Rng>(
    items: Vec<Item>,
    cards: usize,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Vec<Item> {
    let mut keyed: Vec<(f64, Item)> = items
        .into_iter()
        .map(|item| {
            // 1 - [0, 1) keeps u away from zero.
            let u: f64 = 1.0 - rng.random::<f64>();
            (u.ln() / staleness_weight(&item, now), item)
        })
        .collect();
    keyed.sort_by(|a, b| b.0.total_cmp(&a.0));
    keyed.truncate(cards);
    keyed.into_iter().map(|(_, item)| item).collect()
}

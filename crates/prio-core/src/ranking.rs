//! Turning a full ranking into pairwise Elo updates.
//!
//! A ranking of N items is N·(N−1)/2 implied duels, one per pair, won by the
//! higher-ranked item. Every pair is scored against the ratings the items had
//! before the round, and each item's contributions are summed once at the
//! end. Contributions are added smallest first so the floating-point result
//! is bit-identical whatever order the pairs were processed in.

use crate::rating::{Outcome, pair_delta};
use crate::types::{Item, RatingDelta};

/// An implied duel inside a ranking, as positions in the ranked slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RankedPair {
    pub winner: usize,
    pub loser: usize,
}

/// Every pair implied by ranking `n` items, in position order.
pub fn ranking_pairs(n: usize) -> Vec<RankedPair> {
    let mut pairs = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for winner in 0..n {
        for loser in winner + 1..n {
            pairs.push(RankedPair { winner, loser });
        }
    }
    pairs
}

/// Applies `pairs` to `ratings` using only the pre-round values.
///
/// `pairs` may come in any order. Indices must be within `ratings`.
pub fn apply_pairs(ratings: &[f64], pairs: &[RankedPair], k_factor: f64) -> Vec<f64> {
    let mut contributions: Vec<Vec<f64>> = vec![Vec::new(); ratings.len()];
    for pair in pairs {
        let delta = pair_delta(
            ratings[pair.winner],
            ratings[pair.loser],
            Outcome::AWins,
            k_factor,
        );
        contributions[pair.winner].push(delta);
        contributions[pair.loser].push(-delta);
    }

    ratings
        .iter()
        .zip(contributions)
        .map(|(before, mut deltas)| {
            deltas.sort_by(f64::total_cmp);
            before + deltas.into_iter().sum::<f64>()
        })
        .collect()
}

/// Rating changes for a ranking, best item first.
///
/// Returns one delta per ranked item, in the same order, carrying that item's
/// net change over all N·(N−1)/2 implied pairs. Individual pair results are
/// not kept; the audit trail records the net change per item.
pub fn aggregate_ranking(ranked: &[&Item], k_factor: f64) -> Vec<RatingDelta> {
    let before: Vec<f64> = ranked.iter().map(|item| item.rating).collect();
    let after = apply_pairs(&before, &ranking_pairs(ranked.len()), k_factor);
    ranked
        .iter()
        .zip(before.into_iter().zip(after))
        .map(|(item, (before, after))| RatingDelta {
            item_id: item.id.clone(),
            before,
            after,
        })
        .collect()
}

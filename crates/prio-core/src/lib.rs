//! Core prioritization engine.
//!
//! This crate contains the fundamental types and logic for:
//! - Rating: Elo expectation and pairwise updates
//! - Pool: drawing duel candidates from enabled lists
//! - Quota: the daily duel allowance
//! - Session: the round state machine tying everything together
//! - Ranking: turning a full ordering into pairwise updates
//! - Standings: the stable total order of a collection

mod error;
pub mod pool;
pub mod quota;
pub mod ranking;
pub mod rating;
pub mod session;
pub mod standings;
pub mod store;
pub mod types;

pub use error::DuelError;
pub use pool::DuelPool;
pub use quota::{DayBoundary, QuotaError, QuotaState, QuotaTracker, Remaining};
pub use ranking::{RankedPair, aggregate_ranking, apply_pairs, ranking_pairs};
pub use rating::{DEFAULT_K_FACTOR, Outcome, expected_score, update_pair};
pub use session::{
    DEFAULT_CARDS_PER_ROUND, DuelSession, DuelSettings, RoundOutcome, RoundResult, SessionPhase,
};
pub use standings::{Standing, standings};
pub use store::{Clock, FixedClock, Store, StoreError, SystemClock};
pub use types::{
    DEFAULT_RATING, DuelCandidateSet, DuelMode, DuelVerdict, Item, ItemId, ListId, RatingDelta,
    ValidationError,
};

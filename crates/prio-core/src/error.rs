//! Errors returned by the duel engine.
//!
//! Every variant is an expected outcome the caller can recover from. None of
//! them carries user-facing text beyond its `Display`.

use thiserror::Error;

use crate::quota::QuotaError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum DuelError {
    /// No list is enabled for duels.
    #[error("no list is enabled for duels")]
    NoAvailableLists,

    /// Fewer than two eligible items exist across the enabled lists.
    #[error("not enough items to duel: found {found}, need at least 2")]
    NotEnoughItems { found: usize },

    /// Today's duel allowance is used up.
    #[error("daily duel quota exhausted")]
    QuotaExhausted,

    /// The verdict does not fit the current round. Indicates a caller bug.
    #[error("invalid verdict: {reason}")]
    InvalidVerdict { reason: String },

    /// The store failed. The session keeps its state so the call can be retried.
    #[error("persistence failed")]
    Persistence(#[from] StoreError),

    /// `start` was called while a round is still open.
    #[error("a round is already in progress")]
    RoundInProgress,

    /// `submit` or `cancel` was called with no open round.
    #[error("no round is in progress")]
    NoActiveRound,
}

impl From<QuotaError> for DuelError {
    fn from(err: QuotaError) -> Self {
        match err {
            QuotaError::Exhausted => Self::QuotaExhausted,
            QuotaError::Store(source) => Self::Persistence(source),
        }
    }
}

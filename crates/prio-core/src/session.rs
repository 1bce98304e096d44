//! The duel round state machine.
//!
//! ```text
//! Idle → Presenting → AwaitingVerdict → Resolving → Completed
//!           │               │
//!           └→ Cancelled ←──┤
//!                           └→ Skipped
//! ```
//!
//! Resolution is "validate verdict → consume quota → reload ratings →
//! compute deltas → persist". Deltas are scored against the ratings stored at
//! resolution time, not the ones drawn at `start`, so rounds resolved by other
//! sessions sharing the store in between are built upon rather than lost.
//!
//! Quota is consumed before ratings are written. If writing fails afterwards
//! the consumed duel is not refunded; the session stays in `Resolving` and a
//! retry reloads and persists the same verdict without consuming again.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::error::DuelError;
use crate::pool::DuelPool;
use crate::quota::{QuotaError, QuotaState, QuotaTracker};
use crate::ranking::aggregate_ranking;
use crate::rating::{DEFAULT_K_FACTOR, Outcome, update_pair};
use crate::store::{Store, StoreError};
use crate::types::{DuelCandidateSet, DuelMode, DuelVerdict, Item, ItemId, ListId, RatingDelta};

/// Default number of cards shown in ranking mode.
pub const DEFAULT_CARDS_PER_ROUND: usize = 3;

/// Knobs for a duel session.
#[derive(Debug, Clone, PartialEq)]
pub struct DuelSettings {
    /// Lists the user enabled for duels.
    pub enabled_lists: Vec<ListId>,
    /// Cards per ranking round. Winner rounds always use two.
    pub cards_per_round: usize,
    /// Maximum rating points moved by a single pairwise result.
    pub k_factor: f64,
    /// Panic on invalid verdicts instead of returning an error.
    pub strict_verdicts: bool,
}

impl Default for DuelSettings {
    fn default() -> Self {
        Self {
            enabled_lists: Vec::new(),
            cards_per_round: DEFAULT_CARDS_PER_ROUND,
            k_factor: DEFAULT_K_FACTOR,
            strict_verdicts: cfg!(debug_assertions),
        }
    }
}

impl DuelSettings {
    pub fn with_lists(enabled_lists: Vec<ListId>) -> Self {
        Self {
            enabled_lists,
            ..Self::default()
        }
    }

    /// Number of candidates to draw for `mode`.
    pub fn cards_for(&self, mode: DuelMode) -> usize {
        match mode {
            DuelMode::Winner => 2,
            DuelMode::Ranking => self.cards_per_round.max(2),
        }
    }
}

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Presenting,
    AwaitingVerdict,
    Resolving,
    Completed,
    Skipped,
    Cancelled,
}

impl SessionPhase {
    /// Whether a round is open in this phase.
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            Self::Presenting | Self::AwaitingVerdict | Self::Resolving
        )
    }
}

/// Everything a resolved round changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundOutcome {
    pub mode: DuelMode,
    /// The concrete verdict, after any random resolution.
    pub verdict: DuelVerdict,
    pub deltas: Vec<RatingDelta>,
    /// Updated snapshots of every candidate, in draw order.
    pub items: Vec<Item>,
    pub quota: QuotaState,
    pub resolved_at: DateTime<Utc>,
}

/// What `submit` produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundResult {
    Completed(RoundOutcome),
    Skipped,
}

#[derive(Debug, Clone)]
struct Round {
    mode: DuelMode,
    candidates: DuelCandidateSet,
}

#[derive(Debug, Clone)]
struct PendingResolution {
    verdict: DuelVerdict,
    resolved_at: DateTime<Utc>,
    /// Set once the duel has been charged to the quota.
    quota: Option<QuotaState>,
}

#[derive(Debug, Clone)]
enum State {
    Idle,
    Presenting(Round),
    AwaitingVerdict(Round),
    Resolving(Round, PendingResolution),
    Completed(RoundOutcome),
    Skipped(Round),
    Cancelled(Round),
}

impl State {
    const fn phase(&self) -> SessionPhase {
        match self {
            Self::Idle => SessionPhase::Idle,
            Self::Presenting(_) => SessionPhase::Presenting,
            Self::AwaitingVerdict(_) => SessionPhase::AwaitingVerdict,
            Self::Resolving(..) => SessionPhase::Resolving,
            Self::Completed(_) => SessionPhase::Completed,
            Self::Skipped(_) => SessionPhase::Skipped,
            Self::Cancelled(_) => SessionPhase::Cancelled,
        }
    }

    const fn round(&self) -> Option<&Round> {
        match self {
            Self::Presenting(round)
            | Self::AwaitingVerdict(round)
            | Self::Resolving(round, _)
            | Self::Skipped(round)
            | Self::Cancelled(round) => Some(round),
            Self::Idle | Self::Completed(_) => None,
        }
    }
}

/// Drives one duel round at a time against a store.
pub struct DuelSession<S, R> {
    store: S,
    quota: QuotaTracker,
    settings: DuelSettings,
    rng: R,
    state: State,
}

impl<S: Store, R: Rng> DuelSession<S, R> {
    pub const fn new(store: S, quota: QuotaTracker, settings: DuelSettings, rng: R) -> Self {
        Self {
            store,
            quota,
            settings,
            rng,
            state: State::Idle,
        }
    }

    pub const fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    pub const fn settings(&self) -> &DuelSettings {
        &self.settings
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Candidates of the current or last unresolved round.
    pub fn candidates(&self) -> Option<&DuelCandidateSet> {
        self.state.round().map(|round| &round.candidates)
    }

    pub fn mode(&self) -> Option<DuelMode> {
        match &self.state {
            State::Completed(outcome) => Some(outcome.mode),
            state => state.round().map(|round| round.mode),
        }
    }

    pub const fn outcome(&self) -> Option<&RoundOutcome> {
        match &self.state {
            State::Completed(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Draws candidates for a new round.
    ///
    /// Allowed from `Idle` and from any finished round. On failure the
    /// session keeps its previous state.
    pub fn start(
        &mut self,
        mode: DuelMode,
        now: DateTime<Utc>,
    ) -> Result<DuelCandidateSet, DuelError> {
        if self.phase().is_active() {
            return Err(DuelError::RoundInProgress);
        }

        let pool = DuelPool::new(&self.settings.enabled_lists);
        if !pool.has_lists() {
            return Err(DuelError::NoAvailableLists);
        }
        if self.quota.remaining(&self.store, now)?.is_exhausted() {
            return Err(DuelError::QuotaExhausted);
        }

        let cards = self.settings.cards_for(mode);
        let candidates = pool.draw(&self.store, cards, now, &mut self.rng)?;
        tracing::debug!(%mode, cards = candidates.len(), "round presenting");
        self.state = State::Presenting(Round {
            mode,
            candidates: candidates.clone(),
        });
        Ok(candidates)
    }

    /// Marks the candidates as shown to the user.
    pub fn acknowledge(&mut self) -> Result<(), DuelError> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Presenting(round) => {
                self.state = State::AwaitingVerdict(round);
                Ok(())
            }
            other => {
                let phase = other.phase();
                self.state = other;
                match phase {
                    SessionPhase::AwaitingVerdict => Ok(()),
                    SessionPhase::Resolving => Err(DuelError::RoundInProgress),
                    _ => Err(DuelError::NoActiveRound),
                }
            }
        }
    }

    /// Records a verdict for the open round and resolves it.
    ///
    /// Calling again after the round resolved returns the earlier result
    /// without touching ratings again. Calling again while `Resolving`
    /// retries the pending resolution, ignoring the new verdict.
    pub fn submit(
        &mut self,
        verdict: DuelVerdict,
        now: DateTime<Utc>,
    ) -> Result<RoundResult, DuelError> {
        match &self.state {
            State::Completed(outcome) => return Ok(RoundResult::Completed(outcome.clone())),
            State::Skipped(_) => return Ok(RoundResult::Skipped),
            State::Resolving(..) => return self.retry(),
            State::Idle | State::Cancelled(_) => return Err(DuelError::NoActiveRound),
            State::Presenting(_) | State::AwaitingVerdict(_) => {}
        }

        if verdict == DuelVerdict::Skip {
            if let State::Presenting(round) | State::AwaitingVerdict(round) =
                std::mem::replace(&mut self.state, State::Idle)
            {
                self.state = State::Skipped(round);
            }
            tracing::debug!("round skipped");
            return Ok(RoundResult::Skipped);
        }

        let Some(round) = self.state.round() else {
            return Err(DuelError::NoActiveRound);
        };
        let verdict = match verdict {
            DuelVerdict::RandomOutcome => random_verdict(round, &mut self.rng),
            verdict => verdict,
        };
        if let Err(reason) = compute_deltas(round, &verdict, self.settings.k_factor) {
            return Err(self.reject(reason));
        }

        if let State::Presenting(round) | State::AwaitingVerdict(round) =
            std::mem::replace(&mut self.state, State::Idle)
        {
            self.state = State::Resolving(
                round,
                PendingResolution {
                    verdict,
                    resolved_at: now,
                    quota: None,
                },
            );
        }
        self.retry()
    }

    /// Finishes a round left in `Resolving` by a failed store call.
    pub fn retry(&mut self) -> Result<RoundResult, DuelError> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Resolving(round, pending) => self.resolve(round, pending),
            State::Completed(outcome) => {
                let result = RoundResult::Completed(outcome.clone());
                self.state = State::Completed(outcome);
                Ok(result)
            }
            other => {
                self.state = other;
                Err(DuelError::NoActiveRound)
            }
        }
    }

    /// Abandons the open round. Free: no quota, ratings or timestamps change.
    pub fn cancel(&mut self) -> Result<(), DuelError> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Presenting(round) | State::AwaitingVerdict(round) => {
                tracing::debug!("round cancelled");
                self.state = State::Cancelled(round);
                Ok(())
            }
            other => {
                let err = if matches!(other, State::Resolving(..)) {
                    DuelError::RoundInProgress
                } else {
                    DuelError::NoActiveRound
                };
                self.state = other;
                Err(err)
            }
        }
    }

    fn resolve(
        &mut self,
        round: Round,
        mut pending: PendingResolution,
    ) -> Result<RoundResult, DuelError> {
        let quota = match pending.quota.clone() {
            Some(quota) => quota,
            None => match self.quota.consume(&mut self.store, pending.resolved_at) {
                Ok(quota) => {
                    pending.quota = Some(quota.clone());
                    quota
                }
                Err(QuotaError::Exhausted) => {
                    tracing::debug!("quota ran out while resolving; round aborted");
                    self.state = State::Idle;
                    return Err(DuelError::QuotaExhausted);
                }
                Err(QuotaError::Store(err)) => {
                    self.state = State::Resolving(round, pending);
                    return Err(err.into());
                }
            },
        };

        let (current, deltas) = match self.persist(&round, &pending) {
            Ok(scored) => scored,
            Err(err) => {
                tracing::warn!(error = %err, "failed to persist round; quota already charged");
                self.state = State::Resolving(round, pending);
                return Err(err.into());
            }
        };

        let outcome = build_outcome(current, pending, deltas, quota);
        tracing::debug!(
            mode = %outcome.mode,
            deltas = outcome.deltas.len(),
            "round completed"
        );
        self.state = State::Completed(outcome.clone());
        Ok(RoundResult::Completed(outcome))
    }

    /// Scores the verdict against the stored ratings and writes the result.
    fn persist(
        &mut self,
        round: &Round,
        pending: &PendingResolution,
    ) -> Result<(Round, Vec<RatingDelta>), StoreError> {
        let current = self.reload(round)?;
        let deltas = compute_deltas(&current, &pending.verdict, self.settings.k_factor)
            .map_err(StoreError::new)?;
        self.store.save_rating_deltas(&deltas, pending.resolved_at)?;
        Ok((current, deltas))
    }

    /// The round's candidates with their currently stored ratings.
    fn reload(&self, round: &Round) -> Result<Round, StoreError> {
        let mut lists: Vec<ListId> = round
            .candidates
            .items()
            .iter()
            .map(|item| item.list_id.clone())
            .collect();
        lists.sort();
        lists.dedup();
        let stored = self.store.load_items(&lists)?;

        let items = round
            .candidates
            .items()
            .iter()
            .map(|candidate| {
                stored
                    .iter()
                    .find(|item| item.id == candidate.id)
                    .cloned()
                    .ok_or_else(|| StoreError::new(format!("{} no longer exists", candidate.id)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let candidates = DuelCandidateSet::new(items)
            .map_err(|err| StoreError::with_source("reloaded candidates are invalid", err))?;
        Ok(Round {
            mode: round.mode,
            candidates,
        })
    }

    fn reject(&self, reason: String) -> DuelError {
        tracing::warn!(%reason, "rejected verdict");
        assert!(!self.settings.strict_verdicts, "invalid verdict: {reason}");
        DuelError::InvalidVerdict { reason }
    }
}

fn random_verdict<R: Rng>(round: &Round, rng: &mut R) -> DuelVerdict {
    let mut order: Vec<ItemId> = round.candidates.ids().cloned().collect();
    order.shuffle(rng);
    match round.mode {
        DuelMode::Winner => DuelVerdict::Winner(order.swap_remove(0)),
        DuelMode::Ranking => DuelVerdict::Ranking(order),
    }
}

fn compute_deltas(
    round: &Round,
    verdict: &DuelVerdict,
    k_factor: f64,
) -> Result<Vec<RatingDelta>, String> {
    let candidates = &round.candidates;
    match (round.mode, verdict) {
        (DuelMode::Winner, DuelVerdict::Winner(winner_id)) => {
            let winner = candidates
                .get(winner_id)
                .ok_or_else(|| format!("{winner_id} is not a candidate"))?;
            let loser = candidates
                .items()
                .iter()
                .find(|item| item.id != winner.id)
                .ok_or_else(|| "winner round has no opponent".to_string())?;
            let (winner_after, loser_after) =
                update_pair(winner.rating, loser.rating, Outcome::AWins, k_factor);
            Ok(vec![
                RatingDelta {
                    item_id: winner.id.clone(),
                    before: winner.rating,
                    after: winner_after,
                },
                RatingDelta {
                    item_id: loser.id.clone(),
                    before: loser.rating,
                    after: loser_after,
                },
            ])
        }
        (DuelMode::Ranking, DuelVerdict::Ranking(order)) => {
            if order.len() != candidates.len() {
                return Err(format!(
                    "ranking lists {} items but the round has {}",
                    order.len(),
                    candidates.len()
                ));
            }
            let mut seen = HashSet::with_capacity(order.len());
            let mut ranked = Vec::with_capacity(order.len());
            for id in order {
                if !seen.insert(id) {
                    return Err(format!("{id} is ranked twice"));
                }
                let item = candidates
                    .get(id)
                    .ok_or_else(|| format!("{id} is not a candidate"))?;
                ranked.push(item);
            }
            Ok(aggregate_ranking(&ranked, k_factor))
        }
        (mode, verdict) => Err(format!("{verdict:?} does not fit a {mode} round")),
    }
}

fn build_outcome(
    round: Round,
    pending: PendingResolution,
    deltas: Vec<RatingDelta>,
    quota: QuotaState,
) -> RoundOutcome {
    let after: HashMap<&ItemId, f64> = deltas
        .iter()
        .map(|delta| (&delta.item_id, delta.after))
        .collect();
    let items = round
        .candidates
        .items()
        .iter()
        .map(|item| {
            let mut item = item.clone();
            if let Some(rating) = after.get(&item.id) {
                item.rating = *rating;
            }
            item.last_dueled_at = Some(pending.resolved_at);
            item
        })
        .collect();
    RoundOutcome {
        mode: round.mode,
        verdict: pending.verdict,
        deltas,
        items,
        quota,
        resolved_at: pending.resolved_at,
    }
}

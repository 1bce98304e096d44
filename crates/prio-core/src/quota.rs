//! Daily duel allowance.
//!
//! The stored counter is only rewritten when a duel is consumed. Reads after
//! midnight see a fresh allowance without touching the store.

use std::fmt;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{Store, StoreError};

/// Which midnight starts a new quota day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayBoundary {
    #[default]
    Utc,
    /// The machine's local time zone.
    Local,
}

impl DayBoundary {
    /// Calendar date of `now` under this boundary.
    pub fn date_of(self, now: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::Utc => now.date_naive(),
            Self::Local => now.with_timezone(&Local).date_naive(),
        }
    }
}

/// Persisted quota counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaState {
    /// Day `duels_used_today` applies to. `None` until the first duel.
    pub date: Option<NaiveDate>,
    pub duels_used_today: u32,
    /// `None` or zero means unlimited.
    pub daily_limit: Option<u32>,
}

impl QuotaState {
    /// Duels used on `today`, treating a stale date as a fresh day.
    pub fn used_on(&self, today: NaiveDate) -> u32 {
        if self.date == Some(today) {
            self.duels_used_today
        } else {
            0
        }
    }

    /// Remaining allowance on `today` under `daily_limit`.
    pub fn remaining_on(&self, today: NaiveDate, daily_limit: Option<u32>) -> Remaining {
        match daily_limit {
            None | Some(0) => Remaining::Unlimited,
            Some(limit) => Remaining::Limited(limit.saturating_sub(self.used_on(today))),
        }
    }

    /// The state after spending one duel on `today`, or `None` if none is left.
    pub fn consume_on(&self, today: NaiveDate, daily_limit: Option<u32>) -> Option<Self> {
        if self.remaining_on(today, daily_limit).is_exhausted() {
            return None;
        }
        Some(Self {
            date: Some(today),
            duels_used_today: self.used_on(today).saturating_add(1),
            daily_limit,
        })
    }
}

/// How many more duels may resolve today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "count")]
pub enum Remaining {
    Unlimited,
    Limited(u32),
}

impl Remaining {
    pub const fn is_exhausted(self) -> bool {
        matches!(self, Self::Limited(0))
    }
}

impl fmt::Display for Remaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => write!(f, "unlimited"),
            Self::Limited(count) => write!(f, "{count}"),
        }
    }
}

/// Quota consumption failures.
#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("daily duel quota exhausted")]
    Exhausted,
    #[error("failed to persist quota state")]
    Store(#[from] StoreError),
}

/// Gates how many rounds may resolve per calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaTracker {
    daily_limit: Option<u32>,
    boundary: DayBoundary,
}

impl QuotaTracker {
    pub const fn new(daily_limit: Option<u32>, boundary: DayBoundary) -> Self {
        Self {
            daily_limit,
            boundary,
        }
    }

    pub const fn unlimited() -> Self {
        Self::new(None, DayBoundary::Utc)
    }

    pub const fn daily_limit(&self) -> Option<u32> {
        self.daily_limit
    }

    /// Remaining allowance at `now`. Never writes.
    pub fn remaining<S: Store + ?Sized>(
        &self,
        store: &S,
        now: DateTime<Utc>,
    ) -> Result<Remaining, StoreError> {
        if self.is_unlimited() {
            return Ok(Remaining::Unlimited);
        }
        let state = store.load_quota_state()?;
        Ok(state.remaining_on(self.boundary.date_of(now), self.daily_limit))
    }

    /// Spends one duel of today's allowance and persists the new state.
    ///
    /// The check and the write happen in one store call, so a duel spent
    /// through another session sharing the store is never spent twice.
    pub fn consume<S: Store + ?Sized>(
        &self,
        store: &mut S,
        now: DateTime<Utc>,
    ) -> Result<QuotaState, QuotaError> {
        let today = self.boundary.date_of(now);
        let next = store
            .try_consume_quota(today, self.daily_limit)?
            .ok_or(QuotaError::Exhausted)?;
        tracing::debug!(
            date = %today,
            used = next.duels_used_today,
            limit = ?self.daily_limit,
            "consumed duel quota"
        );
        Ok(next)
    }

    const fn is_unlimited(&self) -> bool {
        matches!(self.daily_limit, None | Some(0))
    }
}

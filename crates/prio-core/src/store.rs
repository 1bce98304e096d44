//! Collaborators the engine consumes: persistence and time.

use std::error::Error as StdError;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::quota::QuotaState;
use crate::types::{Item, ListId, RatingDelta};

/// A failed store operation.
///
/// Backends wrap their own error type so the engine can report it without
/// knowing how items are stored.
#[derive(Debug, Error)]
#[error("{context}")]
pub struct StoreError {
    context: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl StoreError {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            source: None,
        }
    }

    pub fn with_source(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Persistence for items and the daily quota.
///
/// Implementations must make `save_rating_deltas` all-or-nothing: either every
/// delta is written together with the new `last_dueled_at`, or none is. A
/// delta whose `before` no longer matches the stored rating fails the whole
/// save, so a round scored against ratings another session has since changed
/// is never written over them.
///
/// Stores shared between sessions must override `try_consume_quota` with an
/// atomic version.
pub trait Store {
    /// Loads every item that belongs to one of `list_ids`.
    fn load_items(&self, list_ids: &[ListId]) -> Result<Vec<Item>, StoreError>;

    /// Writes new ratings and stamps `last_dueled_at` on every item in `deltas`.
    fn save_rating_deltas(
        &mut self,
        deltas: &[RatingDelta],
        last_dueled_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Loads the quota state, or the default state if none was saved yet.
    fn load_quota_state(&self) -> Result<QuotaState, StoreError>;

    fn save_quota_state(&mut self, state: &QuotaState) -> Result<(), StoreError>;

    /// Spends one duel on `today` if `daily_limit` allows it.
    ///
    /// Returns the saved state, or `None` when today's allowance is used up.
    /// The default reads then writes; it is only safe for a store owned by a
    /// single session.
    fn try_consume_quota(
        &mut self,
        today: NaiveDate,
        daily_limit: Option<u32>,
    ) -> Result<Option<QuotaState>, StoreError> {
        let Some(next) = self.load_quota_state()?.consume_on(today, daily_limit) else {
            return Ok(None);
        };
        self.save_quota_state(&next)?;
        Ok(Some(next))
    }
}

impl<T: Store + ?Sized> Store for &mut T {
    fn load_items(&self, list_ids: &[ListId]) -> Result<Vec<Item>, StoreError> {
        (**self).load_items(list_ids)
    }

    fn save_rating_deltas(
        &mut self,
        deltas: &[RatingDelta],
        last_dueled_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        (**self).save_rating_deltas(deltas, last_dueled_at)
    }

    fn load_quota_state(&self) -> Result<QuotaState, StoreError> {
        (**self).load_quota_state()
    }

    fn save_quota_state(&mut self, state: &QuotaState) -> Result<(), StoreError> {
        (**self).save_quota_state(state)
    }

    fn try_consume_quota(
        &mut self,
        today: NaiveDate,
        daily_limit: Option<u32>,
    ) -> Result<Option<QuotaState>, StoreError> {
        (**self).try_consume_quota(today, daily_limit)
    }
}

/// Source of the current time.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

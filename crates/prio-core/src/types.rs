//! Core type definitions with validation.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rating given to items that have never been dueled.
pub const DEFAULT_RATING: f64 = 1200.0;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// Invalid duel mode value.
    #[error("invalid duel mode: {value}")]
    InvalidDuelMode { value: String },

    /// A candidate set needs at least two members.
    #[error("a duel needs at least 2 candidates, got {count}")]
    TooFewCandidates { count: usize },

    /// The same item appeared twice in a candidate set.
    #[error("duplicate candidate: {id}")]
    DuplicateCandidate { id: String },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated item identifier.
    ///
    /// Item IDs are opaque and stable. The core never mints them; they come
    /// from whatever layer manages lists.
    ItemId, "item ID"
);

define_string_id!(
    /// A validated list identifier.
    ListId, "list ID"
);

/// Something the user wants to prioritize: a task, a habit, a list entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub title: String,

    /// Elo rating. Unbounded in both directions.
    #[serde(default = "default_rating")]
    pub rating: f64,

    pub list_id: ListId,

    /// When this item last took part in a resolved duel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_dueled_at: Option<DateTime<Utc>>,
}

const fn default_rating() -> f64 {
    DEFAULT_RATING
}

impl Item {
    /// Creates an item that has never been dueled.
    pub fn new(id: ItemId, title: impl Into<String>, list_id: ListId) -> Self {
        Self {
            id,
            title: title.into(),
            rating: DEFAULT_RATING,
            list_id,
            last_dueled_at: None,
        }
    }

    /// Returns the same item with a different rating.
    #[must_use]
    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = rating;
        self
    }
}

/// The shape of a duel round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuelMode {
    /// Two items, one preferred item.
    Winner,
    /// N items, a full best-to-worst order.
    Ranking,
}

impl DuelMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Winner => "winner",
            Self::Ranking => "ranking",
        }
    }
}

impl fmt::Display for DuelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DuelMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "winner" => Ok(Self::Winner),
            "ranking" => Ok(Self::Ranking),
            _ => Err(ValidationError::InvalidDuelMode {
                value: s.to_string(),
            }),
        }
    }
}

/// The items drawn for a single round.
///
/// Always holds at least two items and never the same item twice.
#[derive(Debug, Clone, PartialEq)]
pub struct DuelCandidateSet(Vec<Item>);

impl DuelCandidateSet {
    pub fn new(items: Vec<Item>) -> Result<Self, ValidationError> {
        if items.len() < 2 {
            return Err(ValidationError::TooFewCandidates { count: items.len() });
        }
        let mut seen = HashSet::with_capacity(items.len());
        for item in &items {
            if !seen.insert(&item.id) {
                return Err(ValidationError::DuplicateCandidate {
                    id: item.id.to_string(),
                });
            }
        }
        Ok(Self(items))
    }

    pub fn items(&self) -> &[Item] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.0.iter().any(|item| &item.id == id)
    }

    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.0.iter().find(|item| &item.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &ItemId> {
        self.0.iter().map(|item| &item.id)
    }
}

/// What the user decided about a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "items")]
pub enum DuelVerdict {
    /// Winner mode: the preferred item.
    Winner(ItemId),
    /// Ranking mode: every candidate, best first.
    Ranking(Vec<ItemId>),
    /// Leave the round without effect.
    Skip,
    /// Let the engine pick a uniformly random winner or order.
    RandomOutcome,
}

/// One rating change, kept for auditing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingDelta {
    pub item_id: ItemId,
    pub before: f64,
    pub after: f64,
}

impl RatingDelta {
    /// Signed change in rating.
    pub fn change(&self) -> f64 {
        self.after - self.before
    }
}

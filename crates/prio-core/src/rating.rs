//! Elo arithmetic.
//!
//! Pure functions only. Ratings are never clamped; an item can drift below
//! zero if it keeps losing.

/// Maximum rating points a single comparison can move.
pub const DEFAULT_K_FACTOR: f64 = 32.0;

/// Result of a comparison, from the point of view of the first item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    AWins,
    Draw,
    BWins,
}

impl Outcome {
    /// Actual score credited to item A.
    pub const fn score(self) -> f64 {
        match self {
            Self::AWins => 1.0,
            Self::Draw => 0.5,
            Self::BWins => 0.0,
        }
    }

    /// The same outcome seen from item B.
    #[must_use]
    pub const fn reversed(self) -> Self {
        match self {
            Self::AWins => Self::BWins,
            Self::Draw => Self::Draw,
            Self::BWins => Self::AWins,
        }
    }
}

/// Probability that A beats B under the logistic Elo model.
pub fn expected_score(rating_a: f64, rating_b: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((rating_b - rating_a) / 400.0))
}

/// Applies one comparison to a pair of ratings.
///
/// Whatever A gains, B loses.
pub fn update_pair(rating_a: f64, rating_b: f64, outcome: Outcome, k_factor: f64) -> (f64, f64) {
    let delta = pair_delta(rating_a, rating_b, outcome, k_factor);
    (rating_a + delta, rating_b - delta)
}

/// Points transferred to A (negative when A loses points).
pub(crate) fn pair_delta(rating_a: f64, rating_b: f64, outcome: Outcome, k_factor: f64) -> f64 {
    k_factor * (outcome.score() - expected_score(rating_a, rating_b))
}

//! Configuration loading and management.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use prio_core::{
    DEFAULT_CARDS_PER_ROUND, DEFAULT_K_FACTOR, DayBoundary, DuelSettings, ListId, QuotaTracker,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,

    /// Duels allowed per day. Unlimited when unset.
    pub daily_limit: Option<u32>,

    /// Cards shown per ranking round.
    pub cards_per_round: usize,

    /// Maximum rating points moved by a single pairwise result.
    pub k_factor: f64,

    /// Whether the quota day starts at UTC or local midnight.
    pub day_boundary: DayBoundary,

    /// Fixed seed for candidate draws and random outcomes.
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("prio.db"),
            daily_limit: None,
            cards_per_round: DEFAULT_CARDS_PER_ROUND,
            k_factor: DEFAULT_K_FACTOR,
            day_boundary: DayBoundary::Local,
            seed: None,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // PRIO_DATABASE_PATH, PRIO_DAILY_LIMIT, ...
        figment = figment.merge(Env::prefixed("PRIO_"));

        figment.extract()
    }

    pub const fn quota_tracker(&self) -> QuotaTracker {
        QuotaTracker::new(self.daily_limit, self.day_boundary)
    }

    pub fn duel_settings(&self, enabled_lists: Vec<ListId>) -> DuelSettings {
        DuelSettings {
            cards_per_round: self.cards_per_round,
            k_factor: self.k_factor,
            ..DuelSettings::with_lists(enabled_lists)
        }
    }

    /// Seeded when `seed` is set, otherwise drawn from the thread RNG.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        }
    }
}

/// Returns the platform-specific config directory for prio.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("prio"))
}

/// Returns the platform-specific data directory for prio.
///
/// On Linux: `~/.local/share/prio`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("prio"))
}

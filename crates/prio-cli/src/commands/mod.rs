//! CLI subcommand implementations.

pub mod duel;
pub mod import;
pub mod lists;
pub mod standings;
pub mod status;

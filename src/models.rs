// server/src/models.rs
//
// Shared domain types for the cosmic war systems: factions, season outcomes,
// contribution-rate settings, and the typed errors the aggregator surfaces.

use spacetimedb::SpacetimeType;
use std::fmt;

/// The two opposing sides players contribute to.
#[derive(SpacetimeType, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Faction {
    Light,
    Dark,
}

impl Faction {
    /// Stable lowercase name for logs and wide events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Faction::Light => "light",
            Faction::Dark => "dark",
        }
    }
}

impl fmt::Display for Faction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a closed season. `Draw` when the faction totals are equal.
#[derive(SpacetimeType, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeasonOutcome {
    Light,
    Dark,
    Draw,
}

impl SeasonOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeasonOutcome::Light => "light",
            SeasonOutcome::Dark => "dark",
            SeasonOutcome::Draw => "draw",
        }
    }
}

/// The fixed set of values a player may choose for their contribution rate.
/// Any other value sent by a client is ignored without a state change.
pub const CONTRIBUTION_RATE_OPTIONS: [u8; 5] = [10, 25, 50, 75, 100];

/// Contribution rate assigned to newly registered players.
pub const DEFAULT_CONTRIBUTION_RATE: u8 = 25;

/// Returns true if `rate` is one of the allowed contribution-rate settings.
pub fn is_valid_contribution_rate(rate: u8) -> bool {
    CONTRIBUTION_RATE_OPTIONS.contains(&rate)
}

/// Errors the contribution aggregator returns to its caller. Contribution
/// samples are periodic re-sent values, so callers are expected to drop the
/// event on error rather than retry in a loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContributeError {
    /// No season currently has `ended_at` unset; the event had no effect.
    NoActiveSeason,
}

impl fmt::Display for ContributeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContributeError::NoActiveSeason => f.write_str("No active season."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rate_is_an_allowed_option() {
        assert!(is_valid_contribution_rate(DEFAULT_CONTRIBUTION_RATE));
    }

    #[test]
    fn out_of_set_rates_are_rejected() {
        assert!(!is_valid_contribution_rate(0));
        assert!(!is_valid_contribution_rate(26));
        assert!(!is_valid_contribution_rate(101));
        assert!(is_valid_contribution_rate(100));
    }
}

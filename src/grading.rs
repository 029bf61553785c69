// server/src/grading.rs
//
// Grading engine: maps a player's cumulative season contribution to a named
// tier for their faction, and decides reward eligibility. Pure lookup logic
// with no I/O; any (total, faction) input is valid.

use crate::models::Faction;
use lazy_static::lazy_static;
use std::collections::HashMap;

/// One grade tier: the label and the minimum cumulative contribution for it.
#[derive(Clone, Debug)]
pub struct GradeTier {
    pub label: &'static str,
    pub min_total: u64,
}

/// Rank a grade must reach within its table to qualify for season rewards
/// (the second tier).
pub const REWARD_QUALIFYING_TIER_INDEX: usize = 1;

lazy_static! {
    /// Per-faction tier tables, in ascending threshold order. Both sides share
    /// the same thresholds; only the flavor labels differ.
    pub static ref GRADE_TIERS: HashMap<Faction, Vec<GradeTier>> = {
        let mut tiers = HashMap::new();

        tiers.insert(Faction::Light, vec![
            GradeTier { label: "Spark",     min_total: 100 },
            GradeTier { label: "Glimmer",   min_total: 1_000 },
            GradeTier { label: "Beacon",    min_total: 10_000 },
            GradeTier { label: "Radiant",   min_total: 100_000 },
            GradeTier { label: "Luminary",  min_total: 1_000_000 },
            GradeTier { label: "Celestial", min_total: 10_000_000 },
        ]);

        tiers.insert(Faction::Dark, vec![
            GradeTier { label: "Shade",     min_total: 100 },
            GradeTier { label: "Gloom",     min_total: 1_000 },
            GradeTier { label: "Umbra",     min_total: 10_000 },
            GradeTier { label: "Eclipse",   min_total: 100_000 },
            GradeTier { label: "Nightfall", min_total: 1_000_000 },
            GradeTier { label: "Abyss",     min_total: 10_000_000 },
        ]);

        tiers
    };
}

/// Index of the highest tier whose threshold does not exceed `total`, or
/// `None` when the total is below the lowest threshold.
pub fn grade_index(total: u64, faction: Faction) -> Option<usize> {
    let table = &GRADE_TIERS[&faction];
    table
        .iter()
        .rposition(|tier| tier.min_total <= total)
}

/// Grade label for a cumulative contribution, `None` below the lowest tier.
pub fn grade(total: u64, faction: Faction) -> Option<&'static str> {
    grade_index(total, faction).map(|i| GRADE_TIERS[&faction][i].label)
}

/// True when the total's grade sits at or above the qualifying tier.
pub fn qualifies_for_reward(total: u64, faction: Faction) -> bool {
    grade_index(total, faction)
        .map(|i| i >= REWARD_QUALIFYING_TIER_INDEX)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_lowest_threshold_is_ungraded() {
        assert_eq!(grade(0, Faction::Light), None);
        assert_eq!(grade(99, Faction::Dark), None);
    }

    #[test]
    fn exact_thresholds_reach_their_tier() {
        assert_eq!(grade(100, Faction::Light), Some("Spark"));
        assert_eq!(grade(100, Faction::Dark), Some("Shade"));
        assert_eq!(grade(1_000, Faction::Light), Some("Glimmer"));
        assert_eq!(grade(9_999, Faction::Dark), Some("Gloom"));
        assert_eq!(grade(10_000_000, Faction::Light), Some("Celestial"));
        assert_eq!(grade(u64::MAX, Faction::Dark), Some("Abyss"));
    }

    #[test]
    fn grade_is_monotone_in_total() {
        for faction in [Faction::Light, Faction::Dark] {
            let mut prev = None;
            for total in [0, 50, 100, 999, 1_000, 10_000, 99_999, 100_000, 1_000_000, 10_000_000]
            {
                let idx = grade_index(total, faction);
                assert!(idx >= prev, "grade regressed at total {total}");
                prev = idx;
            }
        }
    }

    #[test]
    fn reward_eligibility_starts_at_the_second_tier() {
        assert!(!qualifies_for_reward(0, Faction::Light));
        assert!(!qualifies_for_reward(100, Faction::Light)); // first tier only
        assert!(qualifies_for_reward(1_000, Faction::Light));
        assert!(!qualifies_for_reward(999, Faction::Dark));
        assert!(qualifies_for_reward(5_000_000, Faction::Dark));
    }
}

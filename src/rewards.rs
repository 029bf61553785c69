// server/src/rewards.rs
//
// Reward settlement for closed seasons, and the claim flow. Settlement ranks
// every contributor within their faction, grades them, marks the top decile,
// computes the prestige bonus, and accumulates that bonus permanently on the
// player. Settlement is idempotent: reward rows for a season are written at
// most once, so a crashed or re-triggered close cannot double-pay.

use spacetimedb::{client_visibility_filter, Filter, Identity, ReducerContext, Table, Timestamp};
use std::collections::HashMap;

use crate::grading;
use crate::models::{Faction, SeasonOutcome};
use crate::season::Season;

// Import table traits
use crate::contribution::contribution as ContributionTableTrait;
use crate::player as PlayerTableTrait;
use crate::rewards::season_reward as SeasonRewardTableTrait;

// --- Configuration Constants ---

/// Share of a faction's contributors counted as top-percentile (rounded up,
/// floor of one player).
const TOP_PERCENTILE_RATIO: f64 = 0.10;

/// Base prestige bonus for qualifying members of the winning faction.
pub const WIN_BASE_BONUS: f64 = 0.10;

/// Base prestige bonus for qualifying players when the season is a draw.
pub const DRAW_BASE_BONUS: f64 = 0.05;

/// Base prestige bonus for qualifying members of the losing faction.
pub const LOSS_BASE_BONUS: f64 = 0.02;

/// Additional bonus for ranking in the top percentile, independent of the
/// season outcome.
pub const TOP_PERCENTILE_BONUS: f64 = 0.10;

// --- Table Definitions ---

/// One settlement record per (player, season). Immutable after creation
/// except for the single `claimed` transition.
#[spacetimedb::table(
    name = season_reward,
    public,
    index(name = idx_reward_player, btree(columns = [player_id])),
    index(name = idx_reward_season, btree(columns = [season_number]))
)]
#[derive(Clone, Debug)]
pub struct SeasonReward {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub player_id: Identity,
    pub season_number: u32,
    pub faction: Faction,
    pub contribution: u64,
    pub rank_in_faction: u32,
    /// Grade label at settlement; `None` below the lowest tier.
    pub grade: Option<String>,
    pub won: bool,
    pub top_percentile: bool,
    pub prestige_bonus: f64,
    pub claimed: bool,
    pub claimed_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// Players only ever see their own reward rows.
#[client_visibility_filter]
const SEASON_REWARD_VISIBILITY: Filter =
    Filter::Sql("SELECT * FROM season_reward WHERE player_id = :sender");

// --- Pure Settlement Math ---

/// Number of ranks counted as top-percentile for a faction of `count`
/// contributors: `max(1, ceil(count * 0.1))`.
pub fn top_percentile_cutoff(count: usize) -> usize {
    ((count as f64 * TOP_PERCENTILE_RATIO).ceil() as usize).max(1)
}

/// Prestige bonus and `won` flag for one player. Non-qualifying grades earn
/// nothing regardless of outcome; the top-percentile bonus is additive.
pub fn prestige_bonus(
    outcome: SeasonOutcome,
    faction: Faction,
    qualifies: bool,
    top_percentile: bool,
) -> (f64, bool) {
    if !qualifies {
        return (0.0, false);
    }
    let (base, won) = match (outcome, faction) {
        (SeasonOutcome::Light, Faction::Light) | (SeasonOutcome::Dark, Faction::Dark) => {
            (WIN_BASE_BONUS, true)
        }
        (SeasonOutcome::Draw, _) => (DRAW_BASE_BONUS, false),
        _ => (LOSS_BASE_BONUS, false),
    };
    let bonus = if top_percentile {
        base + TOP_PERCENTILE_BONUS
    } else {
        base
    };
    (bonus, won)
}

// --- Settlement ---

/// Writes the reward rows for a closed season and applies prestige bonuses.
/// Re-running for an already-settled season is a logged no-op.
pub fn settle_season(
    ctx: &ReducerContext,
    closed: &Season,
    outcome: SeasonOutcome,
) -> Result<(), String> {
    let rewards = ctx.db.season_reward();
    if rewards
        .idx_reward_season()
        .filter(&closed.season_number)
        .next()
        .is_some()
    {
        log::info!(
            "[Settle] Season {} already settled; skipping.",
            closed.season_number
        );
        return Ok(());
    }

    // A player who contributed to both sides in one season is settled once,
    // under the faction holding their larger total (ties favor Light for
    // determinism). Their smaller total still counts in the faction sums,
    // which were folded in at contribution time.
    let mut per_player: HashMap<Identity, (Faction, u64)> = HashMap::new();
    for row in ctx
        .db
        .contribution()
        .idx_contribution_season()
        .filter(&closed.season_number)
    {
        per_player
            .entry(row.player_id)
            .and_modify(|(faction, total)| {
                if row.total > *total || (row.total == *total && row.faction == Faction::Light) {
                    *faction = row.faction;
                    *total = row.total;
                }
            })
            .or_insert((row.faction, row.total));
    }

    let mut rows_written = 0u32;
    let mut bonus_applied = 0.0f64;

    for faction in [Faction::Light, Faction::Dark] {
        let mut standings: Vec<(Identity, u64)> = per_player
            .iter()
            .filter(|(_, (f, _))| *f == faction)
            .map(|(id, (_, total))| (*id, *total))
            .collect();
        // Descending total; identity order keeps ties deterministic.
        standings.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let cutoff = top_percentile_cutoff(standings.len());

        for (i, (player_id, total)) in standings.iter().enumerate() {
            let rank = (i + 1) as u32;
            let top_percentile = (i + 1) <= cutoff;
            let qualifies = grading::qualifies_for_reward(*total, faction);
            let (bonus, won) = prestige_bonus(outcome, faction, qualifies, top_percentile);

            rewards.insert(SeasonReward {
                id: 0, // auto_inc
                player_id: *player_id,
                season_number: closed.season_number,
                faction,
                contribution: *total,
                rank_in_faction: rank,
                grade: grading::grade(*total, faction).map(str::to_string),
                won,
                top_percentile,
                prestige_bonus: bonus,
                claimed: false,
                claimed_at: None,
                created_at: ctx.timestamp,
            });
            rows_written += 1;

            if bonus > 0.0 {
                apply_prestige_bonus(ctx, *player_id, bonus);
                bonus_applied += bonus;
            }
        }
    }

    log::info!(
        "[Settle] Season {} settled: {} rewards, {:.2} total prestige bonus.",
        closed.season_number,
        rows_written,
        bonus_applied
    );
    Ok(())
}

/// Permanent prestige only ever accumulates; past bonuses are never reduced.
fn apply_prestige_bonus(ctx: &ReducerContext, player_id: Identity, bonus: f64) {
    let players = ctx.db.player();
    match players.identity().find(&player_id) {
        Some(mut player) => {
            player.permanent_prestige_bonus += bonus;
            players.identity().update(player);
        }
        None => log::warn!(
            "[Settle] No player row for {:?}; prestige bonus {} not applied.",
            player_id,
            bonus
        ),
    }
}

// --- Reducers ---

/// Claims a settled reward for the sender. A reward that does not exist, is
/// owned by someone else, or was already claimed is a logged no-op - the
/// `claimed` flag is never toggled back.
#[spacetimedb::reducer]
pub fn claim_reward(ctx: &ReducerContext, reward_id: u64) -> Result<(), String> {
    let rewards = ctx.db.season_reward();
    let mut reward = match rewards.id().find(&reward_id) {
        Some(r) if r.player_id == ctx.sender => r,
        _ => {
            log::warn!(
                "[Claim] Reward {} not found for {:?}.",
                reward_id,
                ctx.sender
            );
            return Ok(());
        }
    };

    if reward.claimed {
        log::warn!(
            "[Claim] Reward {} already claimed by {:?}.",
            reward_id,
            ctx.sender
        );
        return Ok(());
    }

    reward.claimed = true;
    reward.claimed_at = Some(ctx.timestamp);
    let season_number = reward.season_number;
    let bonus = reward.prestige_bonus;
    rewards.id().update(reward);

    log::info!(
        "[Claim] {:?} claimed season {} reward (bonus {:.2}).",
        ctx.sender,
        season_number,
        bonus
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cutoff_rounds_up_with_a_floor_of_one() {
        assert_eq!(top_percentile_cutoff(0), 1);
        assert_eq!(top_percentile_cutoff(1), 1);
        // Two players: ceil(0.2) = 1, so only the leader is top-percentile.
        assert_eq!(top_percentile_cutoff(2), 1);
        assert_eq!(top_percentile_cutoff(10), 1);
        assert_eq!(top_percentile_cutoff(11), 2);
        assert_eq!(top_percentile_cutoff(100), 10);
        assert_eq!(top_percentile_cutoff(101), 11);
    }

    #[test]
    fn non_qualifying_grades_earn_nothing() {
        let (bonus, won) = prestige_bonus(SeasonOutcome::Light, Faction::Light, false, true);
        assert_eq!(bonus, 0.0);
        assert!(!won);
    }

    #[test]
    fn winner_top_percentile_stacks_bonuses() {
        // Qualifying light contributor in the top decile of the winning side.
        let (bonus, won) = prestige_bonus(SeasonOutcome::Light, Faction::Light, true, true);
        assert!((bonus - 0.20).abs() < 1e-9);
        assert!(won);
    }

    #[test]
    fn losing_side_earns_the_consolation_base() {
        let (bonus, won) = prestige_bonus(SeasonOutcome::Light, Faction::Dark, true, false);
        assert!((bonus - 0.02).abs() < 1e-9);
        assert!(!won);
    }

    #[test]
    fn draws_pay_the_middle_base_to_both_sides() {
        for faction in [Faction::Light, Faction::Dark] {
            let (bonus, won) = prestige_bonus(SeasonOutcome::Draw, faction, true, false);
            assert!((bonus - 0.05).abs() < 1e-9);
            assert!(!won);
        }
    }

    #[test]
    fn top_percentile_bonus_is_outcome_independent() {
        let (win, _) = prestige_bonus(SeasonOutcome::Dark, Faction::Dark, true, true);
        let (loss, _) = prestige_bonus(SeasonOutcome::Dark, Faction::Light, true, true);
        let (draw, _) = prestige_bonus(SeasonOutcome::Draw, Faction::Light, true, true);
        assert!((win - 0.20).abs() < 1e-9);
        assert!((loss - 0.12).abs() < 1e-9);
        assert!((draw - 0.15).abs() < 1e-9);
    }
}

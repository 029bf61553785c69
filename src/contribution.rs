// server/src/contribution.rs
//
// Contribution aggregator: folds periodic contribution samples from clients
// into the active season's faction total and the player's running
// per-season total, and advances the player's daily streak. Raw events are
// never stored; each sample is an increment. The whole update is one reducer
// transaction, so concurrent contributions cannot lose increments.

use spacetimedb::{Identity, ReducerContext, Table, Timestamp};

use crate::calendar::CalendarDate;
use crate::models::{ContributeError, Faction};
use crate::{season, streak};

// Import table traits
use crate::contribution::contribution as ContributionTableTrait;
use crate::player as PlayerTableTrait;
use crate::season::season as SeasonTableTrait;

// --- Table Definitions ---

/// Running total per (player, season, faction). Created on the player's
/// first contribution in a season, incremented afterwards, and never touched
/// again once the season closes.
#[spacetimedb::table(
    name = contribution,
    public,
    index(name = idx_contribution_season, btree(columns = [season_number])),
    index(name = idx_contribution_player, btree(columns = [player_id]))
)]
#[derive(Clone, Debug)]
pub struct Contribution {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub player_id: Identity,
    pub season_number: u32,
    pub faction: Faction,
    pub total: u64,
    pub updated_at: Timestamp,
}

// --- Reducers ---

/// Accepts one contribution sample for the sender. Non-finite or
/// non-positive amounts are ignored without error; fractional amounts are
/// truncated toward zero before persisting. Fails only when no season is
/// open (after giving the lifecycle a chance to roll over), in which case
/// the sample is simply dropped - the client re-sends periodically.
#[spacetimedb::reducer]
pub fn contribute(ctx: &ReducerContext, faction: Faction, amount: f64) -> Result<(), String> {
    // Any caller noticing an overdue season triggers the rollover first, so
    // this sample lands in the correct window.
    season::close_season_if_due(ctx, ctx.timestamp)?;

    match apply_contribution(ctx, ctx.sender, faction, amount, ctx.timestamp) {
        Ok(Some((total_light, total_dark))) => {
            log::info!(
                "[Contribute] player={:?} faction={} amount={} light={} dark={}",
                ctx.sender,
                faction.as_str(),
                amount,
                total_light,
                total_dark
            );
            Ok(())
        }
        // Invalid amounts are silent no-ops, not failures to the event source.
        Ok(None) => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

// --- Aggregation ---

/// Applies one sample and returns the new `(total_light, total_dark)` for
/// broadcast, or `Ok(None)` when the amount was invalid and ignored.
pub fn apply_contribution(
    ctx: &ReducerContext,
    player_id: Identity,
    faction: Faction,
    amount: f64,
    now: Timestamp,
) -> Result<Option<(u64, u64)>, ContributeError> {
    if !amount.is_finite() || amount <= 0.0 {
        log::debug!(
            "[Contribute] Ignoring invalid amount {} from {:?}.",
            amount,
            player_id
        );
        return Ok(None);
    }
    // Truncate toward zero; the economy deals in whole units.
    let delta = amount.floor() as u64;

    let seasons = ctx.db.season();
    let mut open = match season::active_season(ctx) {
        Some(s) => s,
        None => return Err(ContributeError::NoActiveSeason),
    };

    open.add_to_faction(faction, delta);
    let season_number = open.season_number;
    let (total_light, total_dark) = (open.total_light, open.total_dark);
    seasons.season_number().update(open);

    upsert_player_total(ctx, player_id, season_number, faction, delta, now);
    advance_player_streak(ctx, player_id, now);

    season::publish_war_state(ctx, season_number, total_light, total_dark);
    crate::leaderboard::refresh_leaderboard(ctx);
    crate::leaderboard::refresh_profile_row(ctx, player_id, now);

    Ok(Some((total_light, total_dark)))
}

/// Increments the player's running total for the season/faction, creating
/// the row on their first contribution.
fn upsert_player_total(
    ctx: &ReducerContext,
    player_id: Identity,
    season_number: u32,
    faction: Faction,
    delta: u64,
    now: Timestamp,
) {
    let contributions = ctx.db.contribution();
    let existing = contributions
        .idx_contribution_season()
        .filter(&season_number)
        .find(|c| c.player_id == player_id && c.faction == faction);

    match existing {
        Some(mut row) => {
            row.total = row.total.saturating_add(delta);
            row.updated_at = now;
            contributions.id().update(row);
        }
        None => {
            contributions.insert(Contribution {
                id: 0, // auto_inc
                player_id,
                season_number,
                faction,
                total: delta,
                updated_at: now,
            });
        }
    }
}

/// Re-evaluates the daily streak against today's calendar date and persists
/// the outcome on the player row.
fn advance_player_streak(ctx: &ReducerContext, player_id: Identity, now: Timestamp) {
    let players = ctx.db.player();
    let mut player = match players.identity().find(&player_id) {
        Some(p) => p,
        None => {
            // Contribution from an identity that never registered; the total
            // still counts, but there is no streak to track.
            log::warn!(
                "[Contribute] No player row for {:?}; skipping streak update.",
                player_id
            );
            return;
        }
    };

    let today = CalendarDate::from_timestamp(now);
    let new_days = streak::advance_streak(player.streak_days, player.streak_last_date, today);
    if new_days != player.streak_days || player.streak_last_date != Some(today) {
        if new_days == 1 && player.streak_days > 1 {
            log::info!(
                "[Contribute] Streak reset for {:?} (was {} days).",
                player_id,
                player.streak_days
            );
        }
        player.streak_days = new_days;
        player.streak_last_date = Some(today);
        player.last_update = now;
        players.identity().update(player);
    }
}

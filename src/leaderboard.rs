// server/src/leaderboard.rs
//
// Read-only projections over the ledger: the top-20 standings per faction
// for the active season, and a per-player profile row (grade, rank, streak
// state, prestige). Projections are cached in public tables and rebuilt on
// the events that invalidate them: contributions, faction switches, and
// season open/close.

use spacetimedb::{client_visibility_filter, Filter, Identity, ReducerContext, Table, Timestamp};

use crate::calendar::CalendarDate;
use crate::models::Faction;
use crate::{grading, season, streak};

// Import table traits
use crate::contribution::contribution as ContributionTableTrait;
use crate::leaderboard::leaderboard_entry as LeaderboardEntryTableTrait;
use crate::leaderboard::player_profile as PlayerProfileTableTrait;
use crate::player as PlayerTableTrait;

// --- Configuration Constants ---

/// Entries kept per faction.
pub const LEADERBOARD_SIZE: usize = 20;

// --- Table Definitions ---

/// One standings row. Ranks are contiguous from 1 per faction, ordered by
/// descending total with identity as the deterministic tiebreaker.
#[spacetimedb::table(
    name = leaderboard_entry,
    public,
    index(name = idx_leaderboard_season, btree(columns = [season_number]))
)]
#[derive(Clone, Debug)]
pub struct LeaderboardEntry {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub season_number: u32,
    pub faction: Faction,
    pub rank: u32,
    pub player_id: Identity,
    pub display_name: String,
    pub avatar_url: String,
    pub total: u64,
}

/// Per-player profile projection for the active season. One row per player,
/// visible only to its owner.
#[spacetimedb::table(name = player_profile, public)]
#[derive(Clone, Debug)]
pub struct PlayerProfile {
    #[primary_key]
    pub player_id: Identity,
    pub season_number: u32,
    pub faction: Faction,
    pub grade: Option<String>,
    pub contribution: u64,
    /// `1 + count(players strictly ahead)` within the player's faction.
    pub rank_in_faction: u32,
    pub streak_days: u32,
    /// Display multiplier: 1.0 once the streak has lapsed, even though the
    /// stored day count is only corrected on the next contribution.
    pub streak_multiplier: f64,
    pub contribution_rate_percent: u8,
    pub permanent_prestige_bonus: f64,
    pub updated_at: Timestamp,
}

#[client_visibility_filter]
const PLAYER_PROFILE_VISIBILITY: Filter =
    Filter::Sql("SELECT * FROM player_profile WHERE player_id = :sender");

// --- Projections ---

/// Rebuilds both factions' top-20 for the active season (delete + reinsert).
pub fn refresh_leaderboard(ctx: &ReducerContext) {
    let entries = ctx.db.leaderboard_entry();
    let stale: Vec<u64> = entries.iter().map(|e| e.id).collect();
    for id in stale {
        entries.id().delete(&id);
    }

    let open = match season::active_season(ctx) {
        Some(s) => s,
        None => return,
    };

    let players = ctx.db.player();
    for faction in [Faction::Light, Faction::Dark] {
        let mut standings: Vec<(Identity, u64)> = ctx
            .db
            .contribution()
            .idx_contribution_season()
            .filter(&open.season_number)
            .filter(|c| c.faction == faction)
            .map(|c| (c.player_id, c.total))
            .collect();
        standings.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        for (i, (player_id, total)) in standings.iter().take(LEADERBOARD_SIZE).enumerate() {
            let (display_name, avatar_url) = match players.identity().find(player_id) {
                Some(p) => (p.display_name, p.avatar_url),
                None => ("Unknown".to_string(), String::new()),
            };
            entries.insert(LeaderboardEntry {
                id: 0, // auto_inc
                season_number: open.season_number,
                faction,
                rank: (i + 1) as u32,
                player_id: *player_id,
                display_name,
                avatar_url,
                total: *total,
            });
        }
    }
}

/// A player's numeric rank within their faction for the given season:
/// one plus the number of players strictly ahead of them.
pub fn player_rank(ctx: &ReducerContext, season_number: u32, faction: Faction, total: u64) -> u32 {
    let ahead = ctx
        .db
        .contribution()
        .idx_contribution_season()
        .filter(&season_number)
        .filter(|c| c.faction == faction && c.total > total)
        .count();
    (ahead + 1) as u32
}

/// Projects a player row plus their current-season standing into a profile
/// row. Every profile field derives from these inputs alone, so a refresh
/// after any ledger change (contribution, settlement, rate change) always
/// shows the freshest values.
fn build_profile(
    player: &crate::Player,
    season_number: u32,
    contribution: u64,
    rank_in_faction: u32,
    now: Timestamp,
) -> PlayerProfile {
    let today = CalendarDate::from_timestamp(now);
    PlayerProfile {
        player_id: player.identity,
        season_number,
        faction: player.faction,
        grade: grading::grade(contribution, player.faction).map(str::to_string),
        contribution,
        rank_in_faction,
        streak_days: player.streak_days,
        streak_multiplier: streak::display_multiplier(
            player.streak_days,
            player.streak_last_date,
            today,
        ),
        contribution_rate_percent: player.contribution_rate_percent,
        permanent_prestige_bonus: player.permanent_prestige_bonus,
        updated_at: now,
    }
}

/// Rebuilds one player's profile row from the ledger.
pub fn refresh_profile_row(ctx: &ReducerContext, player_id: Identity, now: Timestamp) {
    let players = ctx.db.player();
    let player = match players.identity().find(&player_id) {
        Some(p) => p,
        None => return,
    };

    let open = season::active_season(ctx);
    let (season_number, contribution) = match &open {
        Some(s) => {
            let total = ctx
                .db
                .contribution()
                .idx_contribution_season()
                .filter(&s.season_number)
                .find(|c| c.player_id == player_id && c.faction == player.faction)
                .map(|c| c.total)
                .unwrap_or(0);
            (s.season_number, total)
        }
        None => (0, 0),
    };

    let rank = player_rank(ctx, season_number, player.faction, contribution);
    let profile = build_profile(&player, season_number, contribution, rank, now);

    let profiles = ctx.db.player_profile();
    if profiles.player_id().find(&player_id).is_some() {
        profiles.player_id().update(profile);
    } else {
        profiles.insert(profile);
    }
}

/// Rebuilds every cached profile row. Season close and settlement change
/// prestige, season number, and ranks for all players at once, so the whole
/// projection is invalidated together.
pub fn refresh_all_profiles(ctx: &ReducerContext, now: Timestamp) {
    let cached: Vec<Identity> = ctx.db.player_profile().iter().map(|p| p.player_id).collect();
    for player_id in cached {
        refresh_profile_row(ctx, player_id, now);
    }
}

// --- Reducers ---

/// On-demand profile refresh for the sender (e.g. when opening the profile
/// screen), so the streak multiplier reflects today's date even without a
/// recent contribution.
#[spacetimedb::reducer]
pub fn refresh_player_profile(ctx: &ReducerContext) -> Result<(), String> {
    refresh_profile_row(ctx, ctx.sender, ctx.timestamp);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MICROS_PER_DAY: i64 = 24 * 60 * 60 * 1_000_000;

    fn sample_player(prestige: f64, streak_days: u32, last_date_day: i32) -> crate::Player {
        crate::Player {
            identity: Identity::from_hex(
                "c200000000000000000000000000000000000000000000000000000000000001",
            )
            .unwrap(),
            display_name: "Nova".to_string(),
            avatar_url: String::new(),
            faction: Faction::Light,
            streak_days,
            streak_last_date: Some(CalendarDate {
                days_since_epoch: last_date_day,
            }),
            contribution_rate_percent: 25,
            permanent_prestige_bonus: prestige,
            is_online: true,
            last_update: Timestamp::from_micros_since_unix_epoch(0),
        }
    }

    #[test]
    fn profile_reflects_freshly_granted_prestige_and_new_season() {
        // After settlement the player's prestige grew and the next season
        // opened with a zeroed total; a rebuilt profile must surface both
        // rather than the pre-close values.
        let player = sample_player(0.10, 3, 20_000);
        let now = Timestamp::from_micros_since_unix_epoch(20_000 * MICROS_PER_DAY);

        let profile = build_profile(&player, 5, 0, 1, now);
        assert_eq!(profile.season_number, 5);
        assert_eq!(profile.contribution, 0);
        assert_eq!(profile.grade, None);
        assert!((profile.permanent_prestige_bonus - 0.10).abs() < 1e-9);
        // Streak survived the rollover and still multiplies today.
        assert!((profile.streak_multiplier - 1.2).abs() < 1e-9);
    }

    #[test]
    fn profile_grades_the_supplied_contribution() {
        let player = sample_player(0.0, 1, 20_000);
        let now = Timestamp::from_micros_since_unix_epoch(20_000 * MICROS_PER_DAY);

        let profile = build_profile(&player, 2, 1_500, 4, now);
        assert_eq!(profile.grade.as_deref(), Some("Glimmer"));
        assert_eq!(profile.rank_in_faction, 4);
        assert_eq!(profile.contribution_rate_percent, 25);
    }
}

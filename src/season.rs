// server/src/season.rs
//
// Season lifecycle: opening, live faction totals, and the exactly-once
// close-and-reopen transition. A season is eligible to close once its
// duration has elapsed; closing determines the winner, runs reward
// settlement synchronously against the closed snapshot, and only then opens
// the next season. Close can be triggered by any contribution or by the
// scheduled lifecycle tick - every mutation happens inside one reducer
// transaction and the `ended_at` re-check keeps concurrent triggers safe.

use spacetimedb::spacetimedb_lib::{ScheduleAt, TimeDuration};
use spacetimedb::{ReducerContext, Table, Timestamp};
use std::time::Duration;

use crate::models::{Faction, SeasonOutcome};

// Import table traits
use crate::season::season as SeasonTableTrait;
use crate::season::season_tick_schedule as SeasonTickScheduleTableTrait;
use crate::season::war_state as WarStateTableTrait;

// --- Configuration Constants ---

/// Default competition window for a newly opened season.
pub const SEASON_DURATION_DAYS: u32 = 14;

/// How often the scheduled backstop checks for an overdue season. Contribution
/// traffic usually closes seasons first; the tick covers idle periods.
pub(crate) const SEASON_TICK_INTERVAL_SECS: u64 = 60;

const MICROS_PER_DAY: i64 = 24 * 60 * 60 * 1_000_000;

/// Primary key of the `war_state` singleton row.
const WAR_STATE_ROW: u8 = 0;

// --- Table Definitions ---

/// One recurring competition window. Invariant: at most one row has
/// `ended_at` unset, and season numbers increase strictly from 1.
#[spacetimedb::table(name = season, public)]
#[derive(Clone, Debug)]
pub struct Season {
    #[primary_key]
    pub season_number: u32,
    pub total_light: u64,
    pub total_dark: u64,
    pub started_at: Timestamp,
    pub duration_days: u32,
    /// Set exactly once, at close.
    pub ended_at: Option<Timestamp>,
    /// Recorded together with `ended_at`.
    pub winner: Option<SeasonOutcome>,
}

impl Season {
    /// Explicit faction-to-column mapping; never derived from client strings.
    pub fn faction_total(&self, faction: Faction) -> u64 {
        match faction {
            Faction::Light => self.total_light,
            Faction::Dark => self.total_dark,
        }
    }

    pub fn add_to_faction(&mut self, faction: Faction, delta: u64) {
        match faction {
            Faction::Light => self.total_light = self.total_light.saturating_add(delta),
            Faction::Dark => self.total_dark = self.total_dark.saturating_add(delta),
        }
    }
}

/// Live aggregate snapshot (singleton). Updating this public row is the
/// broadcast: every subscribed connection receives the new totals.
#[spacetimedb::table(name = war_state, public)]
#[derive(Clone, Debug)]
pub struct WarState {
    #[primary_key]
    pub id: u8,
    /// 0 while no season has ever been opened.
    pub season_number: u32,
    pub total_light: u64,
    pub total_dark: u64,
}

// --- Season Lifecycle Tick Schedule Table ---
#[spacetimedb::table(name = season_tick_schedule, scheduled(process_season_lifecycle))]
#[derive(Clone)]
pub struct SeasonTickSchedule {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub scheduled_at: ScheduleAt,
}

// --- Initialization ---

/// Seeds the first season, the war-state singleton, and the lifecycle tick.
/// Idempotent: safe to run on every module publish.
pub fn init_season_system(ctx: &ReducerContext) -> Result<(), String> {
    let seasons = ctx.db.season();
    if seasons.iter().count() == 0 {
        let first = Season {
            season_number: 1,
            total_light: 0,
            total_dark: 0,
            started_at: ctx.timestamp,
            duration_days: SEASON_DURATION_DAYS,
            ended_at: None,
            winner: None,
        };
        match seasons.try_insert(first) {
            Ok(_) => log::info!("[Season] Opened season 1 ({} days).", SEASON_DURATION_DAYS),
            Err(e) => {
                log::error!("[Season] Failed to open season 1: {}", e);
                return Err(format!("Failed to open initial season: {}", e));
            }
        }
    }

    match active_season(ctx) {
        Some(open) => publish_war_state(ctx, open.season_number, open.total_light, open.total_dark),
        // Season 0 with zero totals is the "nothing open" snapshot.
        None => publish_war_state(ctx, 0, 0, 0),
    }

    let schedule_table = ctx.db.season_tick_schedule();
    if schedule_table.iter().count() == 0 {
        log::info!(
            "[Season] Starting lifecycle tick (every {}s).",
            SEASON_TICK_INTERVAL_SECS
        );
        let interval = Duration::from_secs(SEASON_TICK_INTERVAL_SECS);
        if let Err(e) = schedule_table.try_insert(SeasonTickSchedule {
            id: 0,
            scheduled_at: ScheduleAt::Interval(TimeDuration::from(interval)),
        }) {
            // Season close still happens on contribution traffic; the
            // backstop tick is disabled until the next publish.
            log::error!("[Season] Failed to initialize lifecycle tick: {}", e);
        }
    }

    Ok(())
}

// --- Queries ---

/// The single season whose `ended_at` is unset, if any.
pub fn active_season(ctx: &ReducerContext) -> Option<Season> {
    ctx.db.season().iter().find(|s| s.ended_at.is_none())
}

/// Winner by total comparison; equal totals are a draw.
pub fn determine_winner(total_light: u64, total_dark: u64) -> SeasonOutcome {
    if total_light > total_dark {
        SeasonOutcome::Light
    } else if total_dark > total_light {
        SeasonOutcome::Dark
    } else {
        SeasonOutcome::Draw
    }
}

fn season_is_due(season: &Season, now: Timestamp) -> bool {
    let elapsed_micros = now
        .to_micros_since_unix_epoch()
        .saturating_sub(season.started_at.to_micros_since_unix_epoch());
    elapsed_micros >= season.duration_days as i64 * MICROS_PER_DAY
}

// --- Lifecycle Transition ---

/// Closes the active season when its window has elapsed, settles rewards,
/// and opens the next season. No-op when nothing is due. Exactly-once: the
/// `ended_at` check runs inside the reducer transaction, and the reopen
/// insert is guarded by the season-number primary key.
pub fn close_season_if_due(ctx: &ReducerContext, now: Timestamp) -> Result<(), String> {
    let seasons = ctx.db.season();

    let open = match active_season(ctx) {
        Some(s) => s,
        None => return Ok(()),
    };
    if !season_is_due(&open, now) {
        return Ok(());
    }

    // Conditional close: only proceed if this row is still open. A concurrent
    // trigger that committed first already flipped `ended_at`.
    let mut closing = match seasons.season_number().find(&open.season_number) {
        Some(s) if s.ended_at.is_none() => s,
        _ => return Ok(()),
    };

    let outcome = determine_winner(
        closing.faction_total(Faction::Light),
        closing.faction_total(Faction::Dark),
    );
    closing.ended_at = Some(now);
    closing.winner = Some(outcome);
    let closed = closing.clone();
    seasons.season_number().update(closing);

    log::info!(
        "[Season] Closed season {} winner={} light={} dark={}",
        closed.season_number,
        outcome.as_str(),
        closed.total_light,
        closed.total_dark
    );

    // Settlement runs against the stable closed snapshot, before the next
    // season opens. It is idempotent, so a retried close-and-settle after a
    // rolled-back transaction cannot duplicate reward rows.
    crate::rewards::settle_season(ctx, &closed, outcome)?;

    open_next_season(ctx, closed.season_number + 1, now);

    // Push the fresh (zeroed) totals and rebuilt standings to subscribers.
    if let Some(next) = active_season(ctx) {
        publish_war_state(ctx, next.season_number, next.total_light, next.total_dark);
    }
    crate::leaderboard::refresh_leaderboard(ctx);
    // Settlement just granted prestige and the season number moved on; every
    // cached profile row is stale at once.
    crate::leaderboard::refresh_all_profiles(ctx, now);

    Ok(())
}

/// Opens season `season_number`. A duplicate open attempt for the same number
/// loses the primary-key race and is a silent no-op.
fn open_next_season(ctx: &ReducerContext, season_number: u32, now: Timestamp) {
    let next = Season {
        season_number,
        total_light: 0,
        total_dark: 0,
        started_at: now,
        duration_days: SEASON_DURATION_DAYS,
        ended_at: None,
        winner: None,
    };
    match ctx.db.season().try_insert(next) {
        Ok(_) => log::info!("[Season] Opened season {}.", season_number),
        Err(_) => log::debug!(
            "[Season] Season {} already opened by a concurrent trigger.",
            season_number
        ),
    }
}

// --- Broadcast ---

/// Upserts the war-state singleton; subscribers see the change immediately.
pub fn publish_war_state(ctx: &ReducerContext, season_number: u32, total_light: u64, total_dark: u64) {
    let table = ctx.db.war_state();
    let row = WarState {
        id: WAR_STATE_ROW,
        season_number,
        total_light,
        total_dark,
    };
    if table.id().find(&WAR_STATE_ROW).is_some() {
        table.id().update(row);
    } else if let Err(e) = table.try_insert(row) {
        log::error!("[Season] Failed to seed war state row: {}", e);
    }
}

// --- Reducer to Process the Lifecycle Tick (Scheduled) ---
#[spacetimedb::reducer]
pub fn process_season_lifecycle(
    ctx: &ReducerContext,
    _schedule: SeasonTickSchedule,
) -> Result<(), String> {
    // Security check - only allow scheduler to call this
    if ctx.sender != ctx.identity() {
        return Err("process_season_lifecycle may only be called by the scheduler.".to_string());
    }
    close_season_if_due(ctx, ctx.timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_total_wins() {
        assert_eq!(determine_winner(100, 40), SeasonOutcome::Light);
        assert_eq!(determine_winner(40, 100), SeasonOutcome::Dark);
    }

    #[test]
    fn equal_totals_draw() {
        assert_eq!(determine_winner(0, 0), SeasonOutcome::Draw);
        assert_eq!(determine_winner(7_777, 7_777), SeasonOutcome::Draw);
    }

    #[test]
    fn faction_totals_map_to_their_columns() {
        let mut season = Season {
            season_number: 1,
            total_light: 0,
            total_dark: 0,
            started_at: Timestamp::from_micros_since_unix_epoch(0),
            duration_days: SEASON_DURATION_DAYS,
            ended_at: None,
            winner: None,
        };
        season.add_to_faction(Faction::Light, 5);
        season.add_to_faction(Faction::Dark, 9);
        season.add_to_faction(Faction::Light, 2);
        assert_eq!(season.faction_total(Faction::Light), 7);
        assert_eq!(season.faction_total(Faction::Dark), 9);
    }

    #[test]
    fn due_exactly_at_the_duration_boundary() {
        let season = Season {
            season_number: 1,
            total_light: 0,
            total_dark: 0,
            started_at: Timestamp::from_micros_since_unix_epoch(0),
            duration_days: 14,
            ended_at: None,
            winner: None,
        };
        let just_before = Timestamp::from_micros_since_unix_epoch(14 * MICROS_PER_DAY - 1);
        let boundary = Timestamp::from_micros_since_unix_epoch(14 * MICROS_PER_DAY);
        assert!(!season_is_due(&season, just_before));
        assert!(season_is_due(&season, boundary));
    }
}

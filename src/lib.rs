use spacetimedb::{Identity, ReducerContext, Table, Timestamp};

// Declare the calendar-date module
mod calendar;
// Declare the contribution aggregator module
mod contribution;
// Declare the grading engine module
mod grading;
// Declare the leaderboard/profile projection module
mod leaderboard;
// Declare the shared domain types module
mod models;
// Declare the presence/broadcast module
mod presence;
// Declare the reward settlement module
mod rewards;
// Declare the season lifecycle module
mod season;
// Declare the streak tracker module
mod streak;

// Re-export shared types for client bindings
pub use calendar::CalendarDate;
pub use models::{ContributeError, Faction, SeasonOutcome};
pub use models::{CONTRIBUTION_RATE_OPTIONS, DEFAULT_CONTRIBUTION_RATE};

// Re-export contribution reducer
pub use contribution::contribute;

// Re-export reward reducers and types
pub use rewards::{claim_reward, SeasonReward};

// Re-export leaderboard reducer and types
pub use leaderboard::{refresh_player_profile, LeaderboardEntry, PlayerProfile};

// Re-export season types and scheduled reducer
pub use season::{process_season_lifecycle, Season, WarState};

// Re-export presence types
pub use presence::{ActiveConnection, OnlineCounts};

// Import table traits
use crate::player as PlayerTableTrait;

// --- Global Constants ---

/// Maximum accepted display-name length (matches the client limit).
pub const MAX_DISPLAY_NAME_LEN: usize = 32;

// --- Table Definitions ---

/// One row per known player identity. The streak fields are owned by the
/// contribution aggregator; `permanent_prestige_bonus` by reward settlement,
/// and only ever grows.
#[spacetimedb::table(name = player, public)]
#[derive(Clone, Debug)]
pub struct Player {
    #[primary_key]
    pub identity: Identity,
    pub display_name: String,
    pub avatar_url: String,
    /// The side the client's game loop currently contributes to.
    pub faction: Faction,
    pub streak_days: u32,
    pub streak_last_date: Option<CalendarDate>,
    pub contribution_rate_percent: u8,
    pub permanent_prestige_bonus: f64,
    pub is_online: bool,
    pub last_update: Timestamp,
}

// --- Lifecycle Reducers ---

// Called once when the module is published or updated
#[spacetimedb::reducer(init)]
pub fn init_module(ctx: &ReducerContext) -> Result<(), String> {
    log::info!("Initializing module...");

    // Open season 1 if none exists and start the lifecycle tick.
    season::init_season_system(ctx)?;

    // Presence is rebuilt from scratch each run.
    presence::init_presence(ctx)?;

    // Seed the standings projection for the (possibly restored) active season.
    leaderboard::refresh_leaderboard(ctx);

    log::info!("Module initialization complete.");
    Ok(())
}

/// Tracks the new connection, marks a registered player online, and pushes
/// refreshed online counts to everyone.
#[spacetimedb::reducer(client_connected)]
pub fn identity_connected(ctx: &ReducerContext) -> Result<(), String> {
    let client_identity = ctx.sender;
    let connection_id = ctx.connection_id.ok_or_else(|| {
        log::error!(
            "[Connect] Missing ConnectionId in client_connected context for {:?}",
            client_identity
        );
        "Internal error: Missing connection ID on connect".to_string()
    })?;

    let players = ctx.db.player();
    let faction = match players.identity().find(&client_identity) {
        Some(mut player) => {
            let faction = player.faction;
            if !player.is_online {
                player.is_online = true;
                players.identity().update(player);
                log::info!("[Connect] Set player {:?} to online.", client_identity);
            }
            Some(faction)
        }
        None => {
            // Not registered yet; tracked without a faction until
            // register_player runs.
            log::debug!(
                "[Connect] Identity {:?} connected before registration.",
                client_identity
            );
            None
        }
    };

    presence::track_connect(ctx, client_identity, connection_id, faction);
    Ok(())
}

/// Drops the connection from the presence registry (unless a quick reconnect
/// already replaced it) and marks the player offline.
#[spacetimedb::reducer(client_disconnected)]
pub fn identity_disconnected(ctx: &ReducerContext) {
    let sender_id = ctx.sender;
    let disconnecting_connection_id = match ctx.connection_id {
        Some(id) => id,
        None => return,
    };

    if !presence::track_disconnect(ctx, sender_id, disconnecting_connection_id) {
        // The player reconnected before this disconnect processed; the new
        // connection stays tracked and online status is left alone.
        return;
    }

    let players = ctx.db.player();
    if let Some(mut player) = players.identity().find(&sender_id) {
        if player.is_online {
            player.is_online = false;
            players.identity().update(player);
            log::info!("[Disconnect] Set player {:?} to offline.", sender_id);
        }
    }
}

// --- Player Reducers ---

/// Registration and reconnection. The identity provider has already mapped
/// the third-party login to `ctx.sender`; this only records the display
/// profile and the player's chosen faction.
#[spacetimedb::reducer]
pub fn register_player(
    ctx: &ReducerContext,
    display_name: String,
    avatar_url: String,
    faction: Faction,
) -> Result<(), String> {
    let sender_id = ctx.sender;
    let players = ctx.db.player();

    let trimmed = display_name.trim();
    if trimmed.is_empty() {
        return Err("Display name cannot be empty.".to_string());
    }
    if trimmed.len() > MAX_DISPLAY_NAME_LEN {
        return Err(format!(
            "Display name too long (max {} characters).",
            MAX_DISPLAY_NAME_LEN
        ));
    }

    let effective_faction = if let Some(mut existing) = players.identity().find(&sender_id) {
        // Reconnect: refresh the profile fields supplied by the identity
        // provider; game state (streak, prestige, faction) is untouched.
        let kept = existing.faction;
        existing.display_name = trimmed.to_string();
        existing.avatar_url = avatar_url;
        existing.is_online = true;
        existing.last_update = ctx.timestamp;
        players.identity().update(existing);
        log::info!(
            "[Register] Returning player {:?} ({}).",
            sender_id,
            trimmed
        );
        kept
    } else {
        let new_player = Player {
            identity: sender_id,
            display_name: trimmed.to_string(),
            avatar_url,
            faction,
            streak_days: 0,
            streak_last_date: None,
            contribution_rate_percent: DEFAULT_CONTRIBUTION_RATE,
            permanent_prestige_bonus: 0.0,
            is_online: true,
            last_update: ctx.timestamp,
        };
        match players.try_insert(new_player) {
            Ok(_) => log::info!(
                "[Register] New player {:?} ({}) joined faction {}.",
                sender_id,
                trimmed,
                faction.as_str()
            ),
            Err(e) => {
                log::error!("[Register] Failed to insert player {:?}: {}", sender_id, e);
                return Err(format!("Failed to register: {}", e));
            }
        }
        faction
    };

    presence::note_faction_change(ctx, sender_id, effective_faction);
    leaderboard::refresh_profile_row(ctx, sender_id, ctx.timestamp);
    // Standings cache the display name, so pick up any change right away.
    leaderboard::refresh_leaderboard(ctx);
    Ok(())
}

/// Switches the player's active faction. Existing contribution totals stay
/// where they were earned; only future samples flow to the new side.
#[spacetimedb::reducer]
pub fn set_faction(ctx: &ReducerContext, faction: Faction) -> Result<(), String> {
    let players = ctx.db.player();
    let mut player = players
        .identity()
        .find(&ctx.sender)
        .ok_or_else(|| "Player not registered.".to_string())?;

    if player.faction == faction {
        return Ok(());
    }

    let old = player.faction;
    player.faction = faction;
    player.last_update = ctx.timestamp;
    players.identity().update(player);

    log::info!(
        "[Faction] {:?} switched {} -> {}.",
        ctx.sender,
        old.as_str(),
        faction.as_str()
    );

    presence::note_faction_change(ctx, ctx.sender, faction);
    leaderboard::refresh_profile_row(ctx, ctx.sender, ctx.timestamp);
    Ok(())
}

/// Updates the player's contribution-rate setting. A value outside the fixed
/// option set is ignored without a state change, matching how the aggregator
/// treats invalid amounts.
#[spacetimedb::reducer]
pub fn set_contribution_rate(ctx: &ReducerContext, rate: u8) -> Result<(), String> {
    if !models::is_valid_contribution_rate(rate) {
        log::warn!(
            "[Rate] Ignoring invalid contribution rate {} from {:?}.",
            rate,
            ctx.sender
        );
        return Ok(());
    }

    let players = ctx.db.player();
    let mut player = players
        .identity()
        .find(&ctx.sender)
        .ok_or_else(|| "Player not registered.".to_string())?;

    if player.contribution_rate_percent != rate {
        player.contribution_rate_percent = rate;
        player.last_update = ctx.timestamp;
        players.identity().update(player);
        leaderboard::refresh_profile_row(ctx, ctx.sender, ctx.timestamp);
    }
    Ok(())
}

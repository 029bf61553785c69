// server/src/presence.rs
//
// Presence registry: which connections are online and which faction each one
// belongs to, plus the aggregate online counts pushed to every client.
// Presence is process-local state in spirit - it is wiped at module init and
// rebuilt from connect events, so losing it on restart is acceptable.

use spacetimedb::{ConnectionId, Identity, ReducerContext, Table, Timestamp};

use crate::models::Faction;

// Import table traits
use crate::presence::active_connection as ActiveConnectionTableTrait;
use crate::presence::online_counts as OnlineCountsTableTrait;

/// Primary key of the `online_counts` singleton row.
const ONLINE_COUNTS_ROW: u8 = 0;

// --- Table Definitions ---

/// One row per live connection. Anonymous (unregistered) identities are
/// tracked too with no faction; they count toward the overall total only.
#[spacetimedb::table(name = active_connection, public)]
#[derive(Clone, Debug)]
pub struct ActiveConnection {
    #[primary_key]
    pub identity: Identity,
    // The current WebSocket connection for this identity; a stale disconnect
    // after a quick reconnect is detected by comparing this id.
    pub connection_id: ConnectionId,
    /// `None` until the identity registers and picks a side.
    pub faction: Option<Faction>,
    pub connected_at: Timestamp,
}

/// Aggregate online counts (singleton). Updating this public row is the
/// broadcast to all subscribed connections.
#[spacetimedb::table(name = online_counts, public)]
#[derive(Clone, Debug)]
pub struct OnlineCounts {
    #[primary_key]
    pub id: u8,
    pub total: u32,
    pub light: u32,
    pub dark: u32,
}

// --- Initialization ---

/// Clears connection rows left over from a previous process and reseeds the
/// counts. Presence carries no durable state worth preserving.
pub fn init_presence(ctx: &ReducerContext) -> Result<(), String> {
    let connections = ctx.db.active_connection();
    let stale: Vec<Identity> = connections.iter().map(|c| c.identity).collect();
    if !stale.is_empty() {
        log::info!(
            "[Presence] Clearing {} stale connection rows from previous run.",
            stale.len()
        );
        for identity in stale {
            connections.identity().delete(&identity);
        }
    }
    publish_online_counts(ctx);
    Ok(())
}

// --- Registry Updates ---

/// Records a connection (insert or replace) and broadcasts the new counts.
pub fn track_connect(
    ctx: &ReducerContext,
    identity: Identity,
    connection_id: ConnectionId,
    faction: Option<Faction>,
) {
    let connections = ctx.db.active_connection();
    let row = ActiveConnection {
        identity,
        connection_id,
        faction,
        connected_at: ctx.timestamp,
    };
    if connections.identity().find(&identity).is_some() {
        connections.identity().update(row);
    } else if let Err(e) = connections.try_insert(row) {
        log::error!("[Presence] Failed to track connection for {:?}: {}", identity, e);
        return;
    }
    publish_online_counts(ctx);
}

/// Removes a connection if the disconnect belongs to the currently tracked
/// connection id. Returns true when the row was actually removed; a stale
/// disconnect after a quick reconnect leaves the new connection untouched.
pub fn track_disconnect(
    ctx: &ReducerContext,
    identity: Identity,
    connection_id: ConnectionId,
) -> bool {
    let connections = ctx.db.active_connection();
    match connections.identity().find(&identity) {
        Some(current) if current.connection_id == connection_id => {
            connections.identity().delete(&identity);
            publish_online_counts(ctx);
            true
        }
        // Either a newer connection already replaced this one, or the
        // identity disconnected before being tracked. Nothing to undo.
        _ => false,
    }
}

/// Re-tags an online player's connection after a faction switch.
pub fn note_faction_change(ctx: &ReducerContext, identity: Identity, faction: Faction) {
    let connections = ctx.db.active_connection();
    if let Some(mut row) = connections.identity().find(&identity) {
        row.faction = Some(faction);
        connections.identity().update(row);
        publish_online_counts(ctx);
    }
}

// --- Broadcast ---

/// Recounts the registry and upserts the singleton; subscribers see the
/// change immediately. Best-effort: a missed update self-heals on the next
/// presence event.
pub fn publish_online_counts(ctx: &ReducerContext) {
    let (total, light, dark) = count_connections(ctx.db.active_connection().iter().map(|c| c.faction));

    let counts = ctx.db.online_counts();
    let row = OnlineCounts {
        id: ONLINE_COUNTS_ROW,
        total,
        light,
        dark,
    };
    if counts.id().find(&ONLINE_COUNTS_ROW).is_some() {
        counts.id().update(row);
    } else if let Err(e) = counts.try_insert(row) {
        log::error!("[Presence] Failed to seed online counts row: {}", e);
    }
}

/// Tallies `(total, light, dark)`. Connections without a faction contribute
/// to the total only, so anonymous traffic never inflates either side.
fn count_connections(factions: impl IntoIterator<Item = Option<Faction>>) -> (u32, u32, u32) {
    let mut total = 0u32;
    let mut light = 0u32;
    let mut dark = 0u32;
    for faction in factions {
        total += 1;
        match faction {
            Some(Faction::Light) => light += 1,
            Some(Faction::Dark) => dark += 1,
            None => {}
        }
    }
    (total, light, dark)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unaffiliated_connections_count_toward_total_only() {
        let factions = [
            Some(Faction::Light),
            None,
            Some(Faction::Dark),
            None,
            Some(Faction::Light),
        ];
        assert_eq!(count_connections(factions), (5, 2, 1));
    }

    #[test]
    fn empty_registry_counts_zero() {
        assert_eq!(count_connections([]), (0, 0, 0));
    }
}

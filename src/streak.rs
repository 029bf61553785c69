// server/src/streak.rs
//
// Daily contribution streak rules. The stored streak is only ever corrected
// at the next contribution event (lazy reset): a lapsed streak keeps its old
// `streak_days` value in the player row, but the display multiplier already
// reports 1.0 once the streak is no longer active.

use crate::calendar::CalendarDate;

/// Longest streak the multiplier rewards; further days neither grow nor
/// shrink the stored count.
pub const STREAK_CAP_DAYS: u32 = 11;

/// Multiplier gained per consecutive day past the first.
const STREAK_STEP: f64 = 0.1;

/// Ceiling for the streak multiplier (reached exactly at the cap).
const STREAK_MULTIPLIER_MAX: f64 = 2.0;

/// New streak length after a contribution on `today`.
///
/// Same day: unchanged (already counted). First-ever contribution: 1.
/// Exactly one day after the last: +1, capped. Anything else, including a
/// future or otherwise malformed last date: reset to 1.
pub fn advance_streak(
    current_days: u32,
    last_contribution: Option<CalendarDate>,
    today: CalendarDate,
) -> u32 {
    match last_contribution {
        None => 1,
        Some(last) => match today.days_since(last) {
            0 => current_days,
            1 => current_days.saturating_add(1).min(STREAK_CAP_DAYS),
            _ => 1,
        },
    }
}

/// Contribution multiplier for a streak length: `1 + (days - 1) * 0.1`,
/// capped at 2.0.
pub fn multiplier(streak_days: u32) -> f64 {
    if streak_days == 0 {
        return 1.0;
    }
    (1.0 + (streak_days - 1) as f64 * STREAK_STEP).min(STREAK_MULTIPLIER_MAX)
}

/// A streak counts as active only while the most recent contribution was
/// today or yesterday.
pub fn is_active(last_contribution: Option<CalendarDate>, today: CalendarDate) -> bool {
    match last_contribution {
        None => false,
        Some(last) => matches!(today.days_since(last), 0 | 1),
    }
}

/// Multiplier to show on a profile: the real multiplier while the streak is
/// active, otherwise 1.0 (even though the stored count has not been reset yet).
pub fn display_multiplier(
    streak_days: u32,
    last_contribution: Option<CalendarDate>,
    today: CalendarDate,
) -> f64 {
    if is_active(last_contribution, today) {
        multiplier(streak_days)
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(n: i32) -> CalendarDate {
        CalendarDate { days_since_epoch: n }
    }

    #[test]
    fn first_contribution_starts_at_one() {
        assert_eq!(advance_streak(0, None, day(100)), 1);
    }

    #[test]
    fn same_day_leaves_streak_unchanged() {
        assert_eq!(advance_streak(4, Some(day(100)), day(100)), 4);
    }

    #[test]
    fn consecutive_day_increments() {
        assert_eq!(advance_streak(4, Some(day(99)), day(100)), 5);
    }

    #[test]
    fn increment_caps_at_eleven() {
        assert_eq!(advance_streak(11, Some(day(99)), day(100)), 11);
        assert_eq!(advance_streak(10, Some(day(99)), day(100)), 11);
    }

    #[test]
    fn gap_resets_to_one() {
        assert_eq!(advance_streak(8, Some(day(98)), day(100)), 1);
        assert_eq!(advance_streak(8, Some(day(50)), day(100)), 1);
    }

    #[test]
    fn future_last_date_resets_to_one() {
        assert_eq!(advance_streak(8, Some(day(101)), day(100)), 1);
    }

    #[test]
    fn multiplier_matches_the_step_table() {
        assert_eq!(multiplier(0), 1.0);
        assert_eq!(multiplier(1), 1.0);
        assert!((multiplier(3) - 1.2).abs() < 1e-9);
        assert!((multiplier(11) - 2.0).abs() < 1e-9);
        // Values past the cap never exceed the ceiling.
        assert!((multiplier(50) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn streak_is_active_for_today_and_yesterday_only() {
        assert!(is_active(Some(day(100)), day(100)));
        assert!(is_active(Some(day(99)), day(100)));
        assert!(!is_active(Some(day(98)), day(100)));
        assert!(!is_active(None, day(100)));
    }

    #[test]
    fn lapsed_streak_displays_as_one_without_touching_the_count() {
        // Stored value still 8, but the streak lapsed two days ago.
        assert_eq!(display_multiplier(8, Some(day(98)), day(100)), 1.0);
        assert!((display_multiplier(8, Some(day(99)), day(100)) - 1.7).abs() < 1e-9);
    }
}

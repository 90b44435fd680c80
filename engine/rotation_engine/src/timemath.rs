//! Pure round/season date arithmetic.
//!
//! All math here is integer elapsed seconds. Round boundaries sit exactly
//! `round_duration_secs` apart from the chain's start instant; "monthly"
//! cadences are fixed-length windows, never calendar months. The rest of
//! the chain math assumes fixed-length rounds, so this must stay
//! calendar-agnostic.

use chrono::{DateTime, Duration, Utc};

use crate::types::{Chain, TimeWindow};

/// Seconds in a week.
pub const WEEKLY_SECS: i64 = 604_800;
/// Seconds in two weeks.
pub const BI_WEEKLY_SECS: i64 = 1_209_600;
/// Seconds in a 30-day month window.
pub const MONTHLY_SECS: i64 = 2_592_000;
/// Seconds in a 90-day quarter window.
pub const QUARTERLY_SECS: i64 = 7_776_000;
/// 31-day fallback applied to unrecognised cadence names.
pub const DEFAULT_ROUND_SECS: i64 = 2_678_400;

/// Map a named cadence (or raw seconds value) to a round duration.
///
/// Total by construction: upstream configuration delivers round durations
/// as either enum names or bare numbers, and neither shape may abort the
/// chain. Unknown symbolic names fall back to [`DEFAULT_ROUND_SECS`].
pub fn frequency_to_duration(frequency: &str) -> i64 {
    let trimmed = frequency.trim();
    if let Ok(secs) = trimmed.parse::<i64>() {
        if secs > 0 {
            return secs;
        }
        return DEFAULT_ROUND_SECS;
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "weekly" => WEEKLY_SECS,
        "bi-weekly" | "biweekly" => BI_WEEKLY_SECS,
        "monthly" => MONTHLY_SECS,
        "quarterly" => QUARTERLY_SECS,
        _ => DEFAULT_ROUND_SECS,
    }
}

/// End boundary of round `n` (1-indexed): `start + n * round_duration`.
///
/// Round `n` spans `[round_boundary(n - 1), round_boundary(n))`.
pub fn round_boundary(chain: &Chain, n: u32) -> DateTime<Utc> {
    chain.start_date + Duration::seconds(chain.round_duration_secs * i64::from(n))
}

/// Instant the season completes: `start + total_rounds * round_duration`.
pub fn season_end(chain: &Chain) -> DateTime<Utc> {
    round_boundary(chain, chain.total_rounds)
}

/// Derived 1-indexed round at `now`, clamped to `[1, total_rounds]`.
///
/// Instants before the start date count as round 1.
pub fn current_round_at(chain: &Chain, now: DateTime<Utc>) -> u32 {
    let elapsed = (now - chain.start_date).num_seconds();
    if elapsed < 0 {
        return 1;
    }
    let index = elapsed / chain.round_duration_secs + 1;
    (index.min(i64::from(chain.total_rounds))).max(1) as u32
}

/// End boundary of the round active at `now`.
pub fn round_end(chain: &Chain, now: DateTime<Utc>) -> DateTime<Utc> {
    round_boundary(chain, current_round_at(chain, now))
}

/// Non-negative `{days, hours, minutes, seconds}` to `boundary`.
///
/// Once the boundary has passed, every field is 0 — the terminal window the
/// scheduler reads as "advance now".
pub fn remaining(boundary: DateTime<Utc>, now: DateTime<Utc>) -> TimeWindow {
    let secs = (boundary - now).num_seconds().max(0) as u64;
    TimeWindow {
        days: secs / 86_400,
        hours: (secs % 86_400) / 3_600,
        minutes: (secs % 3_600) / 60,
        seconds: secs % 60,
    }
}

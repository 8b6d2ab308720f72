//! Tick arithmetic for milestone thresholds and human-facing ETAs.

/// Ticks before impact at which a nuke is considered midway. Matches the
/// game's fixed nuke flight time of 50000 ticks.
pub const MIDWAY_TICKS: i64 = 25_000;

/// Wall-clock length of the near-land window.
pub const NEAR_LAND_WINDOW_MS: f64 = 60.0 * 60.0 * 1000.0;

/// Relative uncertainty of the tick-to-wallclock estimate.
pub const ETA_UNCERTAINTY: f64 = 0.05;

/// Granularity of the history replay addressing.
pub const HISTORY_CHUNK_TICKS: i64 = 100;

/// Number of ticks in the near-land window at the given tick duration.
///
/// Returns `None` for a non-positive or non-finite duration.
pub fn near_land_window_ticks(tick_duration_ms: f64) -> Option<f64> {
    if tick_duration_ms.is_finite() && tick_duration_ms > 0.0 {
        Some(NEAR_LAND_WINDOW_MS / tick_duration_ms)
    } else {
        None
    }
}

/// Landing tick rounded down to the history chunk that contains it.
pub fn impact_tick(land_time: i64) -> i64 {
    land_time.div_euclid(HISTORY_CHUNK_TICKS) * HISTORY_CHUNK_TICKS
}

/// Estimated arrival window in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EtaWindow {
    pub eta_ticks: i64,
    pub eta_seconds: i64,
    pub early: i64,
    pub late: i64,
}

impl EtaWindow {
    /// Converts the remaining ticks into a wall-clock window around
    /// `now + eta`, widened by [`ETA_UNCERTAINTY`] on both sides.
    pub fn new(land_time: i64, current_time: i64, tick_duration_ms: f64, now: i64) -> Self {
        let eta_ticks = land_time - current_time;
        let eta_seconds = (eta_ticks as f64 * tick_duration_ms / 1000.0).floor() as i64;
        let diff = (eta_seconds as f64 * ETA_UNCERTAINTY).floor() as i64;

        Self {
            eta_ticks,
            eta_seconds,
            early: now + eta_seconds - diff,
            late: now + eta_seconds + diff,
        }
    }
}

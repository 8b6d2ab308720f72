//! Milestone state machine for tracked nukes.
//!
//! [`evaluate`] is a pure function of a stored record and the current time
//! of its shard. It never touches storage or the network, so the caller
//! decides what to do with the milestones it reports and when to persist
//! the updated flags.

use crate::timing::{near_land_window_ticks, MIDWAY_TICKS};
use crate::NukeRecord;

/// One of the three announcements made for every nuke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Milestone {
    /// The nuke was seen for the first time
    Launch,
    /// Fewer than 25000 ticks remain before impact
    Midway,
    /// Less than one wall-clock hour of ticks remains
    NearLand,
}

impl Milestone {
    /// Milestones in the order they are evaluated and announced.
    pub fn all() -> &'static [Milestone] {
        &[Self::Launch, Self::Midway, Self::NearLand]
    }

    /// Headline used in notification titles
    pub fn title(&self) -> &'static str {
        match self {
            Self::Launch => "Nuclear Launch Detected",
            Self::Midway => "Nuke Reached Midway Point",
            Self::NearLand => "Nuclear Impact Imminent",
        }
    }

    fn is_due(&self, record: &NukeRecord, current_time: i64, tick_duration_ms: f64) -> bool {
        match self {
            Self::Launch => true,
            Self::Midway => record.land_time - MIDWAY_TICKS <= current_time,
            Self::NearLand => match near_land_window_ticks(tick_duration_ms) {
                Some(window) => record.land_time as f64 - window <= current_time as f64,
                None => false,
            },
        }
    }
}

/// Outcome of evaluating one record at one point in shard time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// The record with the flags of every fired milestone set
    pub record: NukeRecord,
    /// Milestones that fired, in announcement order
    pub milestones: Vec<Milestone>,
    current_time: i64,
}

impl Evaluation {
    /// True if any milestone fired and the record needs saving.
    pub fn changed(&self) -> bool {
        !self.milestones.is_empty()
    }

    /// True if the nuke has already landed and the record should be dropped.
    pub fn is_expired(&self) -> bool {
        self.record.has_landed(self.current_time)
    }
}

/// Decides which milestones fire for `record` at `current_time`.
///
/// Each milestone whose flag is still unset and whose threshold has been
/// reached fires once, in the order launch, midway, near-land. A record
/// that has not been evaluated for a long time can fire all three in one
/// call. Already-set flags are never cleared.
pub fn evaluate(record: &NukeRecord, current_time: i64, tick_duration_ms: f64) -> Evaluation {
    let mut updated = record.clone();
    let mut milestones = Vec::new();

    for milestone in Milestone::all() {
        if updated.is_announced(*milestone) {
            continue;
        }
        if milestone.is_due(record, current_time, tick_duration_ms) {
            updated.mark_announced(*milestone);
            milestones.push(*milestone);
        }
    }

    Evaluation {
        record: updated,
        milestones,
        current_time,
    }
}

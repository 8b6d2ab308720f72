//! Domain types shared between the announcer service and its tests.
//!
//! Holds the persisted [`NukeRecord`], the game API wire types it is built
//! from, the lifecycle evaluator and the tick arithmetic used to render
//! human-facing ETAs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod lifecycle;
pub mod timing;

pub use lifecycle::{evaluate, Evaluation, Milestone};
pub use timing::{impact_tick, EtaWindow};

/// A nuke in flight as reported by the experimental nukes endpoint.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NukeSighting {
    #[serde(rename = "_id")]
    pub id: String,
    pub room: String,
    pub launch_room_name: String,
    pub land_time: i64,
}

/// A shard and its average tick duration in milliseconds.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ShardInfo {
    pub name: String,
    pub tick: f64,
}

/// Owner of a claimed room.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RoomOwner {
    pub user: String,
    #[serde(default)]
    pub level: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct RoomStat {
    #[serde(default)]
    pub own: Option<RoomOwner>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub username: String,
}

/// Room ownership stats for a set of rooms on one shard.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct MapStats {
    #[serde(default)]
    pub stats: HashMap<String, RoomStat>,
    #[serde(default)]
    pub users: HashMap<String, UserInfo>,
}

/// Resolved owner of a room: username (if the user id is known) and level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    pub username: Option<String>,
    pub level: u32,
}

impl MapStats {
    /// Returns the owner of `room`, or `None` if the room is unclaimed or
    /// absent from the stats.
    pub fn owner_of(&self, room: &str) -> Option<Ownership> {
        let own = self.stats.get(room)?.own.as_ref()?;
        Some(Ownership {
            username: self.users.get(&own.user).map(|u| u.username.clone()),
            level: own.level,
        })
    }
}

/// Persisted lifecycle state of one tracked nuke.
///
/// Identity, location and landing time are fixed at first observation.
/// Attribution is resolved at first observation and only ever filled in
/// while still unknown. The three announcement flags move from `false` to
/// `true` once and never revert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NukeRecord {
    pub id: String,
    pub target_room: String,
    pub shard: String,
    pub launch_room: String,
    pub land_time: i64,
    pub attacker: Option<String>,
    pub defender: Option<String>,
    pub defender_level: Option<u32>,
    pub launch_announced: bool,
    pub midway_announced: bool,
    pub near_land_announced: bool,
}

impl NukeRecord {
    /// Builds a fresh, unannounced record for a sighting on `shard`,
    /// attributing attacker and defender from the current ownership stats.
    pub fn from_sighting(sighting: &NukeSighting, shard: &str, stats: &MapStats) -> Self {
        let attacker = stats.owner_of(&sighting.launch_room_name);
        let defender = stats.owner_of(&sighting.room);

        Self {
            id: sighting.id.clone(),
            target_room: sighting.room.clone(),
            shard: shard.to_string(),
            launch_room: sighting.launch_room_name.clone(),
            land_time: sighting.land_time,
            attacker: attacker.and_then(|o| o.username),
            defender_level: defender.as_ref().map(|o| o.level),
            defender: defender.and_then(|o| o.username),
            launch_announced: false,
            midway_announced: false,
            near_land_announced: false,
        }
    }

    /// True once the shard clock has moved strictly past the landing tick.
    pub fn has_landed(&self, current_time: i64) -> bool {
        self.land_time < current_time
    }

    pub fn is_announced(&self, milestone: Milestone) -> bool {
        match milestone {
            Milestone::Launch => self.launch_announced,
            Milestone::Midway => self.midway_announced,
            Milestone::NearLand => self.near_land_announced,
        }
    }

    pub(crate) fn mark_announced(&mut self, milestone: Milestone) {
        match milestone {
            Milestone::Launch => self.launch_announced = true,
            Milestone::Midway => self.midway_announced = true,
            Milestone::NearLand => self.near_land_announced = true,
        }
    }

    /// Whether attacker or defender is still unresolved.
    pub fn needs_attribution(&self) -> bool {
        self.attacker.is_none() || self.defender.is_none()
    }
}

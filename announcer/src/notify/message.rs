//! Message composition shared by every channel.
//!
//! The layout is fixed; only link and timestamp markup come from the
//! channel the message is built for.

use super::Channel;
use crate::config::DEFAULT_CLIENT_URL;
use shared::{impact_tick, EtaWindow, Milestone, NukeRecord};

/// Color of every nuke notification
pub const NUKE_COLOR: &str = "#FF0000";

/// A composed notification, ready for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub title: String,
    pub text: String,
    pub color: String,
    pub url: String,
}

/// Builds web client URLs for profiles, rooms and history replays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Links {
    base: String,
}

impl Default for Links {
    fn default() -> Self {
        Self::new(DEFAULT_CLIENT_URL)
    }
}

impl Links {
    pub fn new(client_url: &str) -> Self {
        let mut base = client_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Self { base }
    }

    pub fn profile(&self, username: &str) -> String {
        format!("{}#!/profile/{}", self.base, username)
    }

    pub fn room(&self, shard: &str, room: &str) -> String {
        format!("{}#!/room/{}/{}", self.base, shard, room)
    }

    pub fn history(&self, shard: &str, room: &str, tick: i64) -> String {
        format!("{}#!/history/{}/{}?t={}", self.base, shard, room, tick)
    }
}

/// Composes the notification for `milestone` using `channel`'s markup.
pub fn compose(
    channel: &dyn Channel,
    links: &Links,
    record: &NukeRecord,
    milestone: Milestone,
    eta: &EtaWindow,
    debug: bool,
) -> Message {
    let impact = impact_tick(record.land_time);
    let rcl = match record.defender_level {
        Some(level) if level > 0 => format!(" (RCL {})", level),
        _ => String::new(),
    };

    let mut parts = Vec::new();
    if debug {
        parts.push("DEBUG MODE".to_string());
    }
    if let Some(defender) = &record.defender {
        parts.push(format!(
            "Defender: {}",
            channel.format_link(&links.profile(defender), defender)
        ));
    }
    match &record.attacker {
        Some(attacker) => parts.push(format!(
            "Attacker: {}",
            channel.format_link(&links.profile(attacker), attacker)
        )),
        None => parts.push("Attacker: Unknown".to_string()),
    }
    parts.push(format!(
        "Launch Site: {}",
        channel.format_link(
            &links.room(&record.shard, &record.launch_room),
            &format!("{} - {}", record.shard, record.launch_room),
        )
    ));
    parts.push(format!(
        "ETA: {} ticks (between {} to {})",
        eta.eta_ticks,
        channel.format_timestamp(eta.early),
        channel.format_timestamp(eta.late),
    ));
    parts.push(format!(
        "History: {} (Impact time)",
        channel.format_link(
            &links.history(&record.shard, &record.target_room, impact),
            &format!("tick #{}", impact),
        )
    ));

    Message {
        title: format!(
            "{}: {} {}{}",
            milestone.title(),
            record.shard,
            record.target_room,
            rcl
        ),
        text: parts.join("\n"),
        color: NUKE_COLOR.to_string(),
        url: links.room(&record.shard, &record.target_room),
    }
}

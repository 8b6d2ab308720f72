//! Integration tests for complete announce runs
//!
//! These tests drive the orchestrator end to end against a scripted game
//! API, a real SQLite store and recording channels.

use announcer::announcer::{Announcer, RunReport};
use announcer::api::{ApiError, GameApi, NukesByShard};
use announcer::notify::{Channel, ChannelError, Links, Message, Notifier, SlackChannel};
use announcer::store::{NukeStore, SqliteStore};
use async_trait::async_trait;
use shared::{MapStats, NukeRecord, NukeSighting, RoomOwner, RoomStat, ShardInfo, UserInfo};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

const NOW: i64 = 1_700_000_000;

/// Scripted game server. Shards listed in `failing` reject time requests.
#[derive(Default)]
struct FakeGame {
    nukes: Mutex<NukesByShard>,
    times: Mutex<HashMap<String, i64>>,
    ticks: HashMap<String, f64>,
    stats: Mutex<MapStats>,
    failing: HashSet<String>,
    nukes_unavailable: bool,
}

impl FakeGame {
    fn new() -> Self {
        let mut game = Self::default();
        game.ticks.insert("shard2".to_string(), 3000.0);
        game.times.lock().unwrap().insert("shard2".to_string(), 900_000);
        game
    }

    fn with_shard(mut self, name: &str, tick: f64, time: i64) -> Self {
        self.ticks.insert(name.to_string(), tick);
        self.times.lock().unwrap().insert(name.to_string(), time);
        self
    }

    fn add_nuke(&self, shard: &str, id: &str, land_time: i64) {
        self.nukes
            .lock()
            .unwrap()
            .entry(shard.to_string())
            .or_default()
            .push(NukeSighting {
                id: id.to_string(),
                room: "W54N45".to_string(),
                launch_room_name: "W53N44".to_string(),
                land_time,
            });
    }

    fn set_time(&self, shard: &str, time: i64) {
        self.times.lock().unwrap().insert(shard.to_string(), time);
    }

    fn set_owner(&self, room: &str, user_id: &str, username: &str, level: u32) {
        let mut stats = self.stats.lock().unwrap();
        stats.stats.insert(
            room.to_string(),
            RoomStat {
                own: Some(RoomOwner {
                    user: user_id.to_string(),
                    level,
                }),
            },
        );
        stats.users.insert(
            user_id.to_string(),
            UserInfo {
                username: username.to_string(),
            },
        );
    }
}

#[async_trait]
impl GameApi for FakeGame {
    async fn nukes(&self) -> Result<NukesByShard, ApiError> {
        if self.nukes_unavailable {
            return Err(ApiError::Rejected {
                endpoint: "experimental/nukes".to_string(),
                message: "unavailable".to_string(),
            });
        }
        Ok(self.nukes.lock().unwrap().clone())
    }

    async fn shards(&self, _nukes: &NukesByShard) -> Result<Vec<ShardInfo>, ApiError> {
        let mut shards: Vec<ShardInfo> = self
            .ticks
            .iter()
            .map(|(name, tick)| ShardInfo {
                name: name.clone(),
                tick: *tick,
            })
            .collect();
        shards.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(shards)
    }

    async fn time(&self, shard: &str) -> Result<i64, ApiError> {
        if self.failing.contains(shard) {
            return Err(ApiError::Rejected {
                endpoint: "game/time".to_string(),
                message: format!("{} offline", shard),
            });
        }
        Ok(self.times.lock().unwrap()[shard])
    }

    async fn map_stats(&self, _rooms: &[String], _shard: &str) -> Result<MapStats, ApiError> {
        Ok(self.stats.lock().unwrap().clone())
    }
}

/// Channel that records every message it is asked to send.
struct RecordingChannel {
    sent: Arc<Mutex<Vec<Message>>>,
    fail: bool,
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, message: &Message) -> Result<(), ChannelError> {
        if self.fail {
            return Err(ChannelError::Session("delivery refused".to_string()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn format_link(&self, url: &str, label: &str) -> String {
        format!("[{}]({})", label, url)
    }

    fn format_timestamp(&self, unix_seconds: i64) -> String {
        format!("<t:{}>", unix_seconds)
    }
}

fn recording() -> (Box<dyn Channel>, Arc<Mutex<Vec<Message>>>) {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let channel = RecordingChannel {
        sent: Arc::clone(&sent),
        fail: false,
    };
    (Box::new(channel), sent)
}

async fn run_once(game: &FakeGame, store: &SqliteStore) -> (RunReport, Vec<Message>) {
    let (channel, sent) = recording();
    let notifier = Notifier::new(vec![channel], Links::default(), false);
    let report = Announcer::new(game, store, notifier)
        .run_at(NOW)
        .await
        .expect("run should succeed");
    let messages = sent.lock().unwrap().clone();
    (report, messages)
}

fn stored(store: &SqliteStore, shard: &str) -> Vec<NukeRecord> {
    store.find_by_shards(&[shard.to_string()]).unwrap()
}

fn titles(messages: &[Message]) -> Vec<String> {
    messages.iter().map(|m| m.title.clone()).collect()
}

/// RECONCILIATION TESTS
mod reconciliation_tests {
    use super::*;

    /// A fresh far-future nuke produces exactly one launch notification
    #[tokio::test]
    async fn fresh_nuke_announces_launch_only() {
        let game = FakeGame::new();
        game.add_nuke("shard2", "n1", 1_000_000);
        let store = SqliteStore::open_in_memory().unwrap();

        let (report, messages) = run_once(&game, &store).await;

        assert_eq!(report.created, 1);
        assert_eq!(
            titles(&messages),
            vec!["Nuclear Launch Detected: shard2 W54N45"]
        );
        let records = stored(&store, "shard2");
        assert_eq!(records.len(), 1);
        assert!(records[0].launch_announced);
        assert!(!records[0].midway_announced);
        assert!(!records[0].near_land_announced);
    }

    /// Reconciling the same snapshot twice neither duplicates nor re-announces
    #[tokio::test]
    async fn repeated_snapshot_is_idempotent() {
        let game = FakeGame::new();
        game.add_nuke("shard2", "n1", 1_000_000);
        let store = SqliteStore::open_in_memory().unwrap();

        run_once(&game, &store).await;
        let (report, messages) = run_once(&game, &store).await;

        assert_eq!(report.created, 0);
        assert!(messages.is_empty());
        assert_eq!(store.len().unwrap(), 1);
    }

    /// Attribution resolved at first sight is carried into the message
    #[tokio::test]
    async fn attribution_is_resolved_from_ownership() {
        let game = FakeGame::new();
        game.set_owner("W54N45", "u1", "Invader", 5);
        game.set_owner("W53N44", "u2", "Davaned", 8);
        game.add_nuke("shard2", "n1", 1_000_000);
        let store = SqliteStore::open_in_memory().unwrap();

        let (_, messages) = run_once(&game, &store).await;

        assert_eq!(
            messages[0].title,
            "Nuclear Launch Detected: shard2 W54N45 (RCL 5)"
        );
        assert!(messages[0]
            .text
            .contains("Defender: [Invader](https://screeps.com/a/#!/profile/Invader)"));
        assert!(messages[0]
            .text
            .contains("Attacker: [Davaned](https://screeps.com/a/#!/profile/Davaned)"));
    }

    /// Ownership that was unknown at first sight is filled in later, but a
    /// known owner is never replaced
    #[tokio::test]
    async fn missing_attribution_is_backfilled_once() {
        let game = FakeGame::new();
        game.set_owner("W53N44", "u2", "Davaned", 8);
        game.add_nuke("shard2", "n1", 1_000_000);
        let store = SqliteStore::open_in_memory().unwrap();

        run_once(&game, &store).await;
        assert!(stored(&store, "shard2")[0].defender.is_none());

        game.set_owner("W54N45", "u1", "Invader", 5);
        game.set_owner("W53N44", "u3", "NewOwner", 8);
        run_once(&game, &store).await;

        let record = &stored(&store, "shard2")[0];
        assert_eq!(record.defender.as_deref(), Some("Invader"));
        assert_eq!(record.attacker.as_deref(), Some("Davaned"));
    }
}

/// LIFECYCLE TESTS
mod lifecycle_tests {
    use super::*;

    /// An imminent nuke first seen this run announces all milestones in order
    #[tokio::test]
    async fn imminent_nuke_announces_in_order() {
        let game = FakeGame::new();
        game.add_nuke("shard2", "n1", 900_500);
        let store = SqliteStore::open_in_memory().unwrap();

        let (_, messages) = run_once(&game, &store).await;

        assert_eq!(
            titles(&messages),
            vec![
                "Nuclear Launch Detected: shard2 W54N45",
                "Nuke Reached Midway Point: shard2 W54N45",
                "Nuclear Impact Imminent: shard2 W54N45",
            ]
        );
    }

    /// Crossing the midway threshold announces midway exactly once
    #[tokio::test]
    async fn midway_announced_once_after_threshold() {
        let game = FakeGame::new();
        game.add_nuke("shard2", "n1", 1_000_000);
        let store = SqliteStore::open_in_memory().unwrap();
        run_once(&game, &store).await;

        game.set_time("shard2", 975_000);
        let (_, messages) = run_once(&game, &store).await;
        assert_eq!(
            titles(&messages),
            vec!["Nuke Reached Midway Point: shard2 W54N45"]
        );
        let record = &stored(&store, "shard2")[0];
        assert!(record.launch_announced);
        assert!(record.midway_announced);
        assert!(!record.near_land_announced);

        let (_, messages) = run_once(&game, &store).await;
        assert!(messages.is_empty());
    }

    /// ETA window in the body follows the shard tick duration
    #[tokio::test]
    async fn eta_window_is_rendered() {
        let game = FakeGame::new();
        game.add_nuke("shard2", "n1", 1_000_000);
        let store = SqliteStore::open_in_memory().unwrap();

        let (_, messages) = run_once(&game, &store).await;

        let expected = format!(
            "ETA: 100000 ticks (between <t:{}> to <t:{}>)",
            NOW + 300_000 - 15_000,
            NOW + 300_000 + 15_000
        );
        assert!(messages[0].text.contains(&expected));
        assert!(messages[0].text.contains("tick #1000000"));
    }

    /// A landed nuke is removed regardless of its flags
    #[tokio::test]
    async fn landed_nuke_is_removed() {
        let game = FakeGame::new();
        game.add_nuke("shard2", "n1", 1_000_000);
        let store = SqliteStore::open_in_memory().unwrap();
        run_once(&game, &store).await;

        game.set_time("shard2", 1_000_001);
        let (report, messages) = run_once(&game, &store).await;

        assert_eq!(report.expired, 1);
        assert_eq!(messages.len(), 2);
        assert!(store.is_empty().unwrap());
    }

    /// The landing tick itself does not expire the record
    #[tokio::test]
    async fn nuke_on_landing_tick_is_kept() {
        let game = FakeGame::new();
        game.add_nuke("shard2", "n1", 900_000);
        let store = SqliteStore::open_in_memory().unwrap();

        let (report, _) = run_once(&game, &store).await;

        assert_eq!(report.expired, 0);
        assert_eq!(store.len().unwrap(), 1);
    }
}

/// FAILURE HANDLING TESTS
mod failure_tests {
    use super::*;

    /// A shard that fails to fetch is skipped; other shards still progress
    /// and the failed shard's stored records are untouched
    #[tokio::test]
    async fn failing_shard_is_isolated() {
        let mut game = FakeGame::new().with_shard("shard3", 4000.0, 500_000);
        game.add_nuke("shard2", "a", 1_000_000);
        game.add_nuke("shard3", "b", 600_000);
        let store = SqliteStore::open_in_memory().unwrap();
        run_once(&game, &store).await;

        game.failing.insert("shard3".to_string());
        game.set_time("shard2", 975_000);
        game.set_time("shard3", 700_000);
        let (report, messages) = run_once(&game, &store).await;

        assert_eq!(report.shards_failed, 1);
        assert_eq!(report.shards_processed, 1);
        assert_eq!(
            titles(&messages),
            vec!["Nuke Reached Midway Point: shard2 W54N45"]
        );
        let shard3 = stored(&store, "shard3");
        assert_eq!(shard3.len(), 1);
        assert!(!shard3[0].midway_announced);
    }

    /// An unavailable nuke list ends the run cleanly without touching state
    #[tokio::test]
    async fn unavailable_nuke_list_is_not_fatal() {
        let game = FakeGame::new();
        game.add_nuke("shard2", "n1", 1_000_000);
        let store = SqliteStore::open_in_memory().unwrap();
        run_once(&game, &store).await;

        let mut down = FakeGame::new();
        down.nukes_unavailable = true;
        down.set_time("shard2", 2_000_000);
        let (report, messages) = run_once(&down, &store).await;

        assert_eq!(report, RunReport::default());
        assert!(messages.is_empty());
        assert_eq!(store.len().unwrap(), 1);
    }

    /// A failing channel does not stop delivery elsewhere, and the
    /// milestone is still recorded as announced
    #[tokio::test]
    async fn channel_failure_still_persists_flag() {
        let game = FakeGame::new();
        game.add_nuke("shard2", "n1", 1_000_000);
        let store = SqliteStore::open_in_memory().unwrap();

        let (good, sent) = recording();
        let bad: Box<dyn Channel> = Box::new(RecordingChannel {
            sent: Arc::new(Mutex::new(Vec::new())),
            fail: true,
        });
        let notifier = Notifier::new(vec![bad, good], Links::default(), false);
        Announcer::new(&game, &store, notifier)
            .run_at(NOW)
            .await
            .unwrap();

        assert_eq!(sent.lock().unwrap().len(), 1);
        assert!(stored(&store, "shard2")[0].launch_announced);

        let (_, messages) = run_once(&game, &store).await;
        assert!(messages.is_empty());
    }

    /// An unconfigured Slack channel is a no-op next to a working channel
    #[tokio::test]
    async fn unconfigured_channel_is_noop() {
        let game = FakeGame::new();
        game.add_nuke("shard2", "n1", 1_000_000);
        let store = SqliteStore::open_in_memory().unwrap();

        let (good, sent) = recording();
        let slack: Box<dyn Channel> = Box::new(SlackChannel::new(Default::default()).unwrap());
        let notifier = Notifier::new(vec![slack, good], Links::default(), false);
        let report = Announcer::new(&game, &store, notifier)
            .run_at(NOW)
            .await
            .unwrap();

        assert_eq!(report.announcements, 1);
        assert_eq!(sent.lock().unwrap().len(), 1);
    }
}

/// PERSISTENCE TESTS
mod persistence_tests {
    use super::*;

    /// Flags survive a process restart between runs
    #[tokio::test]
    async fn state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nukes.db");
        let game = FakeGame::new();
        game.add_nuke("shard2", "n1", 1_000_000);

        {
            let store = SqliteStore::open(&path).unwrap();
            let (_, messages) = run_once(&game, &store).await;
            assert_eq!(messages.len(), 1);
        }

        let store = SqliteStore::open(&path).unwrap();
        let (_, messages) = run_once(&game, &store).await;
        assert!(messages.is_empty());
        assert!(stored(&store, "shard2")[0].launch_announced);
    }
}

//! Durable nuke records.
//!
//! Records live in a single SQLite table keyed by nuke id with an index on
//! shard. Insertion is `INSERT OR IGNORE`, so reconciling the same snapshot
//! twice (or from two overlapping runs) never duplicates a record or
//! overwrites its identity. Flag updates OR the new values into the stored
//! ones, so a flag that one run has set can never be cleared by another.

use chrono::Utc;
use log::debug;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use shared::NukeRecord;
use std::path::Path;
use thiserror::Error;

pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS nukes (
        id TEXT PRIMARY KEY,
        room TEXT NOT NULL,
        shard TEXT NOT NULL,
        launch_room_name TEXT NOT NULL,
        land_time INTEGER NOT NULL,
        attacker TEXT,
        defender TEXT,
        level INTEGER,
        launch_announced INTEGER NOT NULL DEFAULT 0,
        midway_announced INTEGER NOT NULL DEFAULT 0,
        near_land_announced INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS nukes_shard ON nukes (shard);
";

const COLUMNS: &str = "id, room, shard, launch_room_name, land_time, attacker, defender, level, \
     launch_announced, midway_announced, near_land_announced";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
}

/// Persistence contract for nuke records.
pub trait NukeStore {
    /// Inserts `candidate` unless its id is already stored. Returns the
    /// stored record and whether it was created by this call.
    fn upsert_if_absent(&self, candidate: &NukeRecord) -> Result<(NukeRecord, bool), StoreError>;

    /// Fills attacker, defender and level from `candidate` where the stored
    /// record has none. Returns true if anything changed.
    fn backfill_attribution(&self, candidate: &NukeRecord) -> Result<bool, StoreError>;

    /// All records on any of `shards`, ordered by landing time.
    fn find_by_shards(&self, shards: &[String]) -> Result<Vec<NukeRecord>, StoreError>;

    /// Persists the announcement flags of `record`. Returns false if the
    /// record no longer exists.
    fn save(&self, record: &NukeRecord) -> Result<bool, StoreError>;

    /// Removes a record. Removing an absent id is a no-op.
    fn delete(&self, id: &str) -> Result<(), StoreError>;
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn schema_version(&self) -> Result<i64, StoreError> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let current = self.schema_version()?;
        if current > SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchemaVersion {
                found: current,
                supported: SCHEMA_VERSION,
            });
        }

        if current < 1 {
            self.conn.execute_batch(SCHEMA)?;
            self.conn.execute("PRAGMA user_version = 1", [])?;
        }

        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<NukeRecord>, StoreError> {
        let sql = format!("SELECT {} FROM nukes WHERE id = ?1", COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id], read_record)
            .optional()?)
    }

    /// Number of stored records.
    pub fn len(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM nukes", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<NukeRecord> {
    Ok(NukeRecord {
        id: row.get(0)?,
        target_room: row.get(1)?,
        shard: row.get(2)?,
        launch_room: row.get(3)?,
        land_time: row.get(4)?,
        attacker: row.get(5)?,
        defender: row.get(6)?,
        defender_level: row.get(7)?,
        launch_announced: row.get(8)?,
        midway_announced: row.get(9)?,
        near_land_announced: row.get(10)?,
    })
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

impl NukeStore for SqliteStore {
    fn upsert_if_absent(&self, candidate: &NukeRecord) -> Result<(NukeRecord, bool), StoreError> {
        let timestamp = now();
        let changes = self.conn.execute(
            "
            INSERT OR IGNORE INTO nukes (
                id, room, shard, launch_room_name, land_time,
                attacker, defender, level,
                launch_announced, midway_announced, near_land_announced,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
            ",
            params![
                candidate.id,
                candidate.target_room,
                candidate.shard,
                candidate.launch_room,
                candidate.land_time,
                candidate.attacker,
                candidate.defender,
                candidate.defender_level,
                candidate.launch_announced,
                candidate.midway_announced,
                candidate.near_land_announced,
                timestamp,
            ],
        )?;

        let created = changes > 0;
        if created {
            debug!("Stored new nuke {} on {}", candidate.id, candidate.shard);
            return Ok((candidate.clone(), true));
        }

        match self.get(&candidate.id)? {
            Some(existing) => Ok((existing, false)),
            // Deleted between the insert and the read by an overlapping run
            None => Ok((candidate.clone(), false)),
        }
    }

    fn backfill_attribution(&self, candidate: &NukeRecord) -> Result<bool, StoreError> {
        let changes = self.conn.execute(
            "
            UPDATE nukes SET
                attacker = COALESCE(attacker, ?2),
                defender = COALESCE(defender, ?3),
                level = COALESCE(level, ?4),
                updated_at = ?5
            WHERE id = ?1
              AND ((attacker IS NULL AND ?2 IS NOT NULL)
                OR (defender IS NULL AND ?3 IS NOT NULL)
                OR (level IS NULL AND ?4 IS NOT NULL))
            ",
            params![
                candidate.id,
                candidate.attacker,
                candidate.defender,
                candidate.defender_level,
                now(),
            ],
        )?;
        Ok(changes > 0)
    }

    fn find_by_shards(&self, shards: &[String]) -> Result<Vec<NukeRecord>, StoreError> {
        if shards.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; shards.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM nukes WHERE shard IN ({}) ORDER BY land_time, id",
            COLUMNS, placeholders
        );
        let mut statement = self.conn.prepare(&sql)?;
        let records = statement
            .query_map(params_from_iter(shards.iter()), read_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn save(&self, record: &NukeRecord) -> Result<bool, StoreError> {
        let changes = self.conn.execute(
            "
            UPDATE nukes SET
                launch_announced = launch_announced OR ?2,
                midway_announced = midway_announced OR ?3,
                near_land_announced = near_land_announced OR ?4,
                updated_at = ?5
            WHERE id = ?1
            ",
            params![
                record.id,
                record.launch_announced,
                record.midway_announced,
                record.near_land_announced,
                now(),
            ],
        )?;
        Ok(changes > 0)
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM nukes WHERE id = ?1", params![id])?;
        Ok(())
    }
}

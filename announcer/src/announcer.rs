//! One announce run: fetch, reconcile, evaluate, notify, persist, prune.

use crate::api::{fetch_shard_snapshot, ApiError, GameApi, ScreepsClient, ShardSnapshot};
use crate::config::ServerConfig;
use crate::notify::{Clock, Notifier};
use crate::store::{NukeStore, StoreError};
use chrono::Utc;
use log::{error, info, warn};
use shared::{evaluate, NukeRecord};
use std::collections::BTreeMap;
use thiserror::Error;

/// Failures that end a run with a non-zero exit.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid server url '{0}'")]
    InvalidUrl(String),
}

/// Connects to `server` and runs one pass.
///
/// A server that cannot be reached or refuses the sign-in is logged like any
/// other fetch failure and yields an empty report.
pub async fn run_server(
    server: &ServerConfig,
    store: &dyn NukeStore,
    notifier: Notifier,
) -> Result<RunReport, RunError> {
    let api = match ScreepsClient::connect(server).await {
        Ok(api) => api,
        Err(ApiError::InvalidUrl(url)) => return Err(RunError::InvalidUrl(url)),
        Err(e) => {
            error!("Failed to connect to {}: {}", server.url, e);
            return Ok(RunReport::default());
        }
    };

    Ok(Announcer::new(&api, store, notifier).run().await?)
}

/// Shard clock captured during the fetch phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShardClock {
    pub time: i64,
    pub tick_ms: f64,
}

/// Counters for one run, logged when it finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub shards_processed: usize,
    pub shards_failed: usize,
    pub created: usize,
    pub announcements: usize,
    pub expired: usize,
}

/// Drives a single pass over the game API, the store and the channels.
pub struct Announcer<'a> {
    api: &'a dyn GameApi,
    store: &'a dyn NukeStore,
    notifier: Notifier,
}

impl<'a> Announcer<'a> {
    pub fn new(api: &'a dyn GameApi, store: &'a dyn NukeStore, notifier: Notifier) -> Self {
        Self {
            api,
            store,
            notifier,
        }
    }

    /// Runs one pass using the current wall clock for ETA windows.
    pub async fn run(&mut self) -> Result<RunReport, StoreError> {
        self.run_at(Utc::now().timestamp()).await
    }

    /// Runs one pass with `now` (unix seconds) as the wall clock.
    ///
    /// Fetch failures are logged and skip the affected shard. Store
    /// failures abort the run; channels are disconnected either way.
    pub async fn run_at(&mut self, now: i64) -> Result<RunReport, StoreError> {
        let mut report = RunReport::default();
        let clocks = self.reconcile(&mut report).await?;

        self.notifier.connect_all().await;
        let result = self.process(&clocks, now, &mut report).await;
        self.notifier.disconnect_all().await;
        result?;

        info!(
            "Run complete: {} shards ({} failed), {} new, {} announcements, {} expired",
            report.shards_processed,
            report.shards_failed,
            report.created,
            report.announcements,
            report.expired
        );
        Ok(report)
    }

    /// Fetches every shard and stores any nuke not seen before.
    ///
    /// Returns the clock of each shard that was fetched successfully; only
    /// those shards are evaluated this run.
    async fn reconcile(
        &self,
        report: &mut RunReport,
    ) -> Result<BTreeMap<String, ShardClock>, StoreError> {
        let mut clocks = BTreeMap::new();

        let mut nukes = match self.api.nukes().await {
            Ok(nukes) => nukes,
            Err(e) => {
                error!("Failed to fetch nukes: {}", e);
                return Ok(clocks);
            }
        };
        let shards = match self.api.shards(&nukes).await {
            Ok(shards) => shards,
            Err(e) => {
                error!("Failed to fetch shard info: {}", e);
                return Ok(clocks);
            }
        };

        for info in shards {
            let name = info.name.clone();
            let sightings = nukes.remove(&name).unwrap_or_default();

            match fetch_shard_snapshot(self.api, info, sightings).await {
                Ok(snapshot) => {
                    report.created += self.store_snapshot(&snapshot)?;
                    report.shards_processed += 1;
                    clocks.insert(
                        name,
                        ShardClock {
                            time: snapshot.time,
                            tick_ms: snapshot.info.tick,
                        },
                    );
                }
                Err(e) => {
                    error!("Error processing shard {}: {}", name, e);
                    report.shards_failed += 1;
                }
            }
        }

        Ok(clocks)
    }

    /// Upserts every sighting in `snapshot`. Returns the number created.
    fn store_snapshot(&self, snapshot: &ShardSnapshot) -> Result<usize, StoreError> {
        let mut created = 0;
        for sighting in &snapshot.nukes {
            let candidate = NukeRecord::from_sighting(sighting, &snapshot.info.name, &snapshot.stats);
            let (stored, was_created) = self.store.upsert_if_absent(&candidate)?;

            if was_created {
                info!(
                    "New nuke {} on {}: {} -> {}, lands at {}",
                    stored.id, stored.shard, stored.launch_room, stored.target_room, stored.land_time
                );
                created += 1;
            } else if stored.needs_attribution() && self.store.backfill_attribution(&candidate)? {
                info!("Resolved attribution for nuke {}", stored.id);
            }
        }
        Ok(created)
    }

    async fn process(
        &self,
        clocks: &BTreeMap<String, ShardClock>,
        now: i64,
        report: &mut RunReport,
    ) -> Result<(), StoreError> {
        let shards: Vec<String> = clocks.keys().cloned().collect();

        for record in self.store.find_by_shards(&shards)? {
            let Some(clock) = clocks.get(&record.shard) else {
                continue;
            };

            let evaluation = evaluate(&record, clock.time, clock.tick_ms);
            for milestone in &evaluation.milestones {
                self.notifier
                    .announce(
                        &evaluation.record,
                        *milestone,
                        Clock {
                            time: clock.time,
                            tick_ms: clock.tick_ms,
                            now,
                        },
                    )
                    .await;
                report.announcements += 1;
            }

            if evaluation.is_expired() {
                self.store.delete(&evaluation.record.id)?;
                info!("Nuke {} on {} has landed", record.id, record.shard);
                report.expired += 1;
            } else if evaluation.changed() && !self.store.save(&evaluation.record)? {
                warn!("Nuke {} was removed before its flags were saved", record.id);
            }
        }

        Ok(())
    }
}

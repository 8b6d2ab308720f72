//! # Nuke Announcer
//!
//! Polls a Screeps server for nukes in flight and announces each nuke's
//! lifecycle milestones to Slack and Discord. The binary is meant to be
//! invoked on a fixed schedule (cron, a systemd timer); it keeps no state in
//! memory between invocations.
//!
//! ## Run Structure
//!
//! Each invocation is one pass through [`announcer::Announcer::run`]:
//!
//! 1. **Fetch**: nukes, shard list with tick durations, per-shard time, and
//!    ownership stats for every target and launch room
//! 2. **Reconcile**: each sighting is upserted into the store; known nukes
//!    are left untouched apart from filling in missing attribution
//! 3. **Evaluate**: every stored nuke on a fetched shard runs through the
//!    lifecycle state machine against that shard's clock
//! 4. **Notify**: each milestone that fired is announced on all channels
//! 5. **Persist and prune**: updated flags are saved and landed nukes are
//!    deleted
//!
//! ## Milestones
//!
//! | Milestone    | Fires when                                       |
//! |--------------|--------------------------------------------------|
//! | Launch       | the nuke is first stored                         |
//! | Midway       | `land_time - 25000 <= shard time`                |
//! | Near-land    | less than one wall-clock hour of ticks remains   |
//!
//! Each milestone has a persisted flag, so re-running against the same
//! snapshot never repeats an announcement. A crash between sending and
//! saving can repeat one message on the next run.
//!
//! ## Failure Handling
//!
//! - Game API failures are logged and skip the affected shard; a server
//!   that is unreachable at sign-in ends the run with nothing done
//! - Channel failures are logged per channel; the milestone still counts
//!   as announced
//! - Store failures and an invalid server URL abort the run and surface as
//!   a non-zero exit
//!
//! ## Module Organization
//!
//! - [`api`]: the [`api::GameApi`] seam and the Screeps HTTP client
//! - [`store`]: SQLite persistence of nuke records
//! - [`notify`]: the [`notify::Channel`] trait, Slack and Discord channels,
//!   message composition and fan-out
//! - [`announcer`]: the run orchestrator
//! - [`config`]: the TOML config file
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use announcer::announcer::Announcer;
//! use announcer::api::ScreepsClient;
//! use announcer::config::Settings;
//! use announcer::notify::Notifier;
//! use announcer::store::SqliteStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::load("nuke-announcer.toml")?;
//!     let api = ScreepsClient::connect(settings.server("main")?).await?;
//!     let store = SqliteStore::open("nukes.db")?;
//!     let notifier = Notifier::from_settings(&settings, false)?;
//!
//!     let report = Announcer::new(&api, &store, notifier).run().await?;
//!     println!("{} announcements", report.announcements);
//!     Ok(())
//! }
//! ```

pub mod announcer;
pub mod api;
pub mod config;
pub mod notify;
pub mod store;

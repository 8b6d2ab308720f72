//! Notification channels and fan-out.
//!
//! Every destination implements [`Channel`]: a transport (`connect`,
//! `disconnect`, `send`) plus the two markup primitives the shared message
//! composer needs. [`Notifier`] composes one message per channel for a
//! milestone and delivers them all concurrently, so a slow or failing
//! channel never holds back the others.

pub mod discord;
pub mod message;
pub mod slack;

use crate::config::Settings;
use async_trait::async_trait;
use futures::future::join_all;
use log::{error, info};
use shared::{EtaWindow, Milestone, NukeRecord};
use thiserror::Error;

pub use discord::DiscordChannel;
pub use message::{compose, Links, Message, NUKE_COLOR};
pub use slack::SlackChannel;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Session(String),
}

/// A notification destination.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Establishes a session if the transport needs one. Calling it on an
    /// already connected channel is a no-op.
    async fn connect(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }

    /// Tears the session down.
    async fn disconnect(&mut self) {}

    /// Delivers one message. An unconfigured channel succeeds without
    /// sending anything.
    async fn send(&self, message: &Message) -> Result<(), ChannelError>;

    fn format_link(&self, url: &str, label: &str) -> String;

    fn format_timestamp(&self, unix_seconds: i64) -> String;
}

/// Shard clock values needed to describe a nuke's arrival.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clock {
    /// Current shard tick
    pub time: i64,
    /// Shard tick duration in milliseconds
    pub tick_ms: f64,
    /// Wall clock, unix seconds
    pub now: i64,
}

/// Fans milestone notifications out to all configured channels.
pub struct Notifier {
    channels: Vec<Box<dyn Channel>>,
    links: Links,
    debug: bool,
}

impl Notifier {
    pub fn new(channels: Vec<Box<dyn Channel>>, links: Links, debug: bool) -> Self {
        Self {
            channels,
            links,
            debug,
        }
    }

    /// Builds the Slack and Discord channels from the config file. A
    /// missing section leaves that channel unconfigured.
    pub fn from_settings(settings: &Settings, debug: bool) -> Result<Self, ChannelError> {
        let slack = SlackChannel::new(settings.slack.clone().unwrap_or_default())?;
        let discord = DiscordChannel::new(settings.discord.clone().unwrap_or_default())?;
        Ok(Self::new(
            vec![Box::new(discord), Box::new(slack)],
            Links::new(&settings.client_url),
            debug,
        ))
    }

    pub fn channels(&self) -> usize {
        self.channels.len()
    }

    /// Connects every channel. Failures are logged and leave that channel
    /// disconnected for the run.
    pub async fn connect_all(&mut self) {
        let results = join_all(self.channels.iter_mut().map(|channel| async move {
            let result = channel.connect().await;
            (channel.name().to_string(), result)
        }))
        .await;

        for (name, result) in results {
            if let Err(e) = result {
                error!("Failed to connect {} channel: {}", name, e);
            }
        }
    }

    pub async fn disconnect_all(&mut self) {
        join_all(self.channels.iter_mut().map(|channel| channel.disconnect())).await;
    }

    /// Announces `milestone` for `record` on every channel.
    ///
    /// Returns the number of channels that accepted the message. Delivery
    /// failures are logged per channel and never propagate.
    pub async fn announce(&self, record: &NukeRecord, milestone: Milestone, clock: Clock) -> usize {
        let eta = EtaWindow::new(record.land_time, clock.time, clock.tick_ms, clock.now);

        let deliveries = self.channels.iter().map(|channel| {
            let message = compose(
                channel.as_ref(),
                &self.links,
                record,
                milestone,
                &eta,
                self.debug,
            );
            async move {
                info!("[{}] {}\n{}", channel.name(), message.title, message.text);
                let result = channel.send(&message).await;
                (channel.name(), result)
            }
        });

        let mut delivered = 0;
        for (name, result) in join_all(deliveries).await {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => error!("Failed to send {} notification: {}", name, e),
            }
        }
        delivered
    }
}

//! Discord bot channel.
//!
//! Talks to the Discord REST API with a bot token. `connect` validates the
//! token and resolves the target channel once per run; `send` posts an
//! embed to it.

use super::{Channel, ChannelError, Message};
use crate::config::DiscordConfig;
use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const API_BASE: &str = "https://discord.com/api/v10";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct BotUser {
    username: String,
}

#[derive(Debug, Deserialize)]
struct ChannelInfo {
    id: String,
}

#[derive(Debug, Clone)]
struct Session {
    channel_id: String,
}

pub struct DiscordChannel {
    http: Client,
    api_base: String,
    token: Option<String>,
    channel: Option<String>,
    title_emoji: Option<String>,
    session: Option<Session>,
}

impl DiscordChannel {
    pub fn new(config: DiscordConfig) -> Result<Self, ChannelError> {
        Ok(Self {
            http: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            api_base: API_BASE.to_string(),
            token: config.token,
            channel: config.channel,
            title_emoji: config.title_emoji,
            session: None,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn authorized(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        request.header("Authorization", format!("Bot {}", token))
    }

    fn decorate_title(&self, title: &str) -> String {
        match &self.title_emoji {
            Some(emoji) => format!("{} {} {}", emoji, title, emoji),
            None => title.to_string(),
        }
    }

    fn embed(&self, message: &Message) -> Value {
        json!({
            "embeds": [{
                "title": self.decorate_title(&message.title),
                "description": message.text,
                "url": message.url,
                "color": parse_color(&message.color),
            }],
        })
    }
}

/// Parses `#RRGGBB` into the integer form Discord embeds expect.
fn parse_color(color: &str) -> Option<u32> {
    u32::from_str_radix(color.trim_start_matches('#'), 16).ok()
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn connect(&mut self) -> Result<(), ChannelError> {
        if self.session.is_some() {
            return Ok(());
        }
        let (Some(token), Some(channel)) = (&self.token, &self.channel) else {
            debug!("Discord bot not configured, skipping");
            return Ok(());
        };

        info!("Connecting Discord bot");
        let user: BotUser = self
            .authorized(self.http.get(format!("{}/users/@me", self.api_base)), token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let info: ChannelInfo = self
            .authorized(
                self.http
                    .get(format!("{}/channels/{}", self.api_base, channel)),
                token,
            )
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        info!("Discord bot {} ready on channel {}", user.username, info.id);
        self.session = Some(Session {
            channel_id: info.id,
        });
        Ok(())
    }

    async fn disconnect(&mut self) {
        if self.session.take().is_some() {
            info!("Disconnecting Discord bot");
        }
    }

    async fn send(&self, message: &Message) -> Result<(), ChannelError> {
        let (Some(token), Some(_)) = (&self.token, &self.channel) else {
            debug!("Discord bot not configured, skipping");
            return Ok(());
        };
        let Some(session) = &self.session else {
            return Err(ChannelError::Session(
                "Discord bot is not connected".to_string(),
            ));
        };

        let url = format!("{}/channels/{}/messages", self.api_base, session.channel_id);
        self.authorized(self.http.post(url), token)
            .json(&self.embed(message))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    fn format_link(&self, url: &str, label: &str) -> String {
        format!("[{}]({})", label, url)
    }

    fn format_timestamp(&self, unix_seconds: i64) -> String {
        format!("<t:{}>", unix_seconds)
    }
}

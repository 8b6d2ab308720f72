//! Slack incoming-webhook channel.

use super::{Channel, ChannelError, Message};
use crate::config::SlackConfig;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Posts attachments to a Slack webhook. Stateless: no session to open.
pub struct SlackChannel {
    http: Client,
    webhook: Option<String>,
    channel: Option<String>,
}

impl SlackChannel {
    pub fn new(config: SlackConfig) -> Result<Self, ChannelError> {
        Ok(Self {
            http: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            webhook: config.webhook,
            channel: config.channel,
        })
    }

    fn payload(&self, message: &Message, ts: i64) -> Value {
        let mut payload = json!({
            "text": "",
            "attachments": [{
                "fallback": message.text,
                "text": message.text,
                "title": message.title,
                "title_link": message.url,
                "color": message.color,
                "ts": ts,
            }],
        });
        // Without a channel the webhook posts to its own default
        if let Some(channel) = &self.channel {
            payload["channel"] = json!(channel);
        }
        payload
    }
}

#[async_trait]
impl Channel for SlackChannel {
    fn name(&self) -> &str {
        "slack"
    }

    async fn send(&self, message: &Message) -> Result<(), ChannelError> {
        let Some(webhook) = &self.webhook else {
            debug!("Slack webhook not configured, skipping");
            return Ok(());
        };

        self.http
            .post(webhook)
            .json(&self.payload(message, Utc::now().timestamp()))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    fn format_link(&self, url: &str, label: &str) -> String {
        format!("<{}|{}>", url, label)
    }

    fn format_timestamp(&self, unix_seconds: i64) -> String {
        let fallback = DateTime::<Utc>::from_timestamp(unix_seconds, 0)
            .map(|date| date.to_rfc3339_opts(SecondsFormat::Secs, false))
            .unwrap_or_else(|| unix_seconds.to_string());
        format!("<!date^{}^{{date}} {{time}}|{}>", unix_seconds, fallback)
    }
}

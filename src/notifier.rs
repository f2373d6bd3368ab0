// src/notifier.rs
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::StatusCode;
use serde::Serialize;

use crate::config::Config;
use crate::error::NotifyError;

/// Delivers one text message to a single external channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), NotifyError>;
}

/// Sends `message` and reports, but otherwise ignores, any failure.
pub async fn notify_best_effort(notifier: &dyn Notifier, message: &str) {
    if let Err(e) = notifier.notify(message).await {
        warn!("Failed to deliver notification {:?}: {}", message, e);
    }
}

#[derive(Serialize)]
struct DiscordMessage<'a> {
    content: &'a str,
}

/// Posts messages to a Discord channel as a bot.
pub struct DiscordNotifier {
    client: reqwest::Client,
    api_url: String,
    activated: bool,
    token: Option<String>,
    channel_id: Option<String>,
}

impl DiscordNotifier {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            api_url: config.discord_api_url.trim_end_matches('/').to_string(),
            activated: config.bot_activated,
            token: config.bot_token.clone(),
            channel_id: config.discord_channel_id.clone(),
        }
    }

    /// Token and channel when the bot is fully configured, otherwise the
    /// reason it is skipped.
    fn destination(&self) -> Result<(&str, &str), &'static str> {
        if !self.activated {
            return Err("Discord bot deactivated");
        }
        match (self.token.as_deref(), self.channel_id.as_deref()) {
            (Some(token), Some(channel)) => Ok((token, channel)),
            (None, None) => Err("Bot token and channel ID not set"),
            (None, Some(_)) => Err("Bot token not set"),
            (Some(_), None) => Err("Channel ID not set"),
        }
    }

    fn messages_url(&self, channel_id: &str) -> String {
        format!("{}/channels/{}/messages", self.api_url, channel_id)
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, message: &str) -> Result<(), NotifyError> {
        let (token, channel_id) = match self.destination() {
            Ok(destination) => destination,
            Err(reason) => {
                debug!("{}. Skipping Discord message.", reason);
                return Ok(());
            }
        };

        let response = self
            .client
            .post(self.messages_url(channel_id))
            .header("Authorization", format!("Bot {}", token))
            .json(&DiscordMessage { content: message })
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => {
                debug!("Discord message sent to channel {}", channel_id);
                Ok(())
            }
            status => Err(NotifyError::Status(status.as_u16())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn notifier(activated: bool, token: Option<&str>, channel: Option<&str>) -> DiscordNotifier {
        let config = Config {
            bot_activated: activated,
            bot_token: token.map(str::to_string),
            discord_channel_id: channel.map(str::to_string),
            // Unroutable: any request attempted by a test would fail, not hang on DNS.
            discord_api_url: "http://127.0.0.1:9/api/".to_string(),
            ..Config::default()
        };
        DiscordNotifier::new(reqwest::Client::new(), &config)
    }

    #[test]
    fn reports_missing_destination() {
        assert_eq!(notifier(true, None, None).destination(), Err("Bot token and channel ID not set"));
        assert_eq!(notifier(true, None, Some("1")).destination(), Err("Bot token not set"));
        assert_eq!(notifier(true, Some("t"), None).destination(), Err("Channel ID not set"));
        assert_eq!(notifier(false, Some("t"), Some("1")).destination(), Err("Discord bot deactivated"));
        assert_eq!(notifier(true, Some("t"), Some("1")).destination(), Ok(("t", "1")));
    }

    #[test]
    fn builds_channel_url() {
        assert_eq!(
            notifier(true, Some("t"), Some("42")).messages_url("42"),
            "http://127.0.0.1:9/api/channels/42/messages"
        );
    }

    #[tokio::test]
    async fn unconfigured_notifier_is_a_silent_no_op() {
        notifier(true, None, None).notify("Player joined: Notch").await.unwrap();
        notifier(false, Some("t"), Some("1")).notify("Player joined: Notch").await.unwrap();
    }

    #[test]
    fn serializes_single_content_field() {
        let body = serde_json::to_value(DiscordMessage { content: "Player joined: Notch" }).unwrap();
        assert_eq!(body, serde_json::json!({ "content": "Player joined: Notch" }));
    }

    struct FailingNotifier {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _message: &str) -> Result<(), NotifyError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(NotifyError::Status(500))
        }
    }

    #[tokio::test]
    async fn best_effort_swallows_failures_without_retry() {
        let failing = FailingNotifier { attempts: AtomicUsize::new(0) };
        notify_best_effort(&failing, "hello").await;
        assert_eq!(failing.attempts.load(Ordering::SeqCst), 1);
    }
}

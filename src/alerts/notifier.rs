//! Notification channels
//!
//! A notifier accepts already-rendered text for its platform. Delivery is
//! best-effort: errors are returned to the dispatcher, which logs them.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::render::Platform;
use crate::config::{ChannelConfig, TargetConfig};

const DISCORD_USERNAME: &str = "Solana Multi-Validator Alerts";
const DISCORD_AVATAR_URL: &str = "https://solana.com/src/img/branding/solanaLogoMark.svg";
const TELEGRAM_API: &str = "https://api.telegram.org";

/// Notification channel
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver rendered text
    async fn deliver(&self, text: &str) -> Result<(), NotifierError>;

    /// Platform whose markup this channel expects
    fn platform(&self) -> Platform;

    /// Channel name for identification
    fn name(&self) -> &str;
}

/// Notifier errors
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("Telegram error: {0}")]
    Telegram(String),

    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),
}

/// Build an HTTP client whose requests give up after `timeout`
pub fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to build HTTP client with timeout, using defaults");
            reqwest::Client::new()
        })
}

#[derive(Serialize)]
struct DiscordPayload<'a> {
    content: &'a str,
    username: &'a str,
    avatar_url: &'a str,
}

/// Discord webhook channel
pub struct DiscordNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(client: reqwest::Client, webhook_url: impl Into<String>) -> Self {
        Self {
            client,
            webhook_url: webhook_url.into(),
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn deliver(&self, text: &str) -> Result<(), NotifierError> {
        let payload = DiscordPayload {
            content: text,
            username: DISCORD_USERNAME,
            avatar_url: DISCORD_AVATAR_URL,
        };

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifierError::Webhook(format!("Failed to send webhook: {}", e)))?;

        if !response.status().is_success() {
            return Err(NotifierError::Webhook(format!(
                "Webhook returned status {}",
                response.status()
            )));
        }

        tracing::debug!("Discord message sent");
        Ok(())
    }

    fn platform(&self) -> Platform {
        Platform::Discord
    }

    fn name(&self) -> &str {
        "discord"
    }
}

#[derive(serde::Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram bot channel
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(
        client: reqwest::Client,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: TELEGRAM_API.to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    /// Point at a different Bot API host
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn deliver(&self, text: &str) -> Result<(), NotifierError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("chat_id", self.chat_id.as_str()),
                ("text", text),
                ("parse_mode", "Markdown"),
            ])
            .send()
            .await
            .map_err(|e| {
                NotifierError::Telegram(format!("Failed to send message: {}", e.without_url()))
            })?;

        let body: TelegramResponse = response
            .json()
            .await
            .map_err(|e| {
                NotifierError::Telegram(format!("Invalid response: {}", e.without_url()))
            })?;

        if !body.ok {
            return Err(NotifierError::Telegram(
                body.description
                    .unwrap_or_else(|| "request rejected".to_string()),
            ));
        }

        tracing::debug!(chat_id = %self.chat_id, "Telegram message sent");
        Ok(())
    }

    fn platform(&self) -> Platform {
        Platform::Telegram
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

/// Writes plain-text alerts to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, text: &str) -> Result<(), NotifierError> {
        tracing::warn!("Alert:\n{}", text);
        Ok(())
    }

    fn platform(&self) -> Platform {
        Platform::Plain
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Build the notifiers a target's channels call for
pub fn build_notifiers(
    target: &TargetConfig,
    client: &reqwest::Client,
    telegram_bot_token: Option<&str>,
) -> Vec<Box<dyn Notifier>> {
    let mut notifiers: Vec<Box<dyn Notifier>> = Vec::new();

    for channel in &target.channels {
        match channel {
            ChannelConfig::Discord { webhook_url } => {
                notifiers.push(Box::new(DiscordNotifier::new(client.clone(), webhook_url)));
            }
            ChannelConfig::Telegram { chat_id } => match telegram_bot_token {
                Some(token) => notifiers.push(Box::new(TelegramNotifier::new(
                    client.clone(),
                    token,
                    chat_id,
                ))),
                None => tracing::warn!(
                    validator = %target.id,
                    "Telegram chat configured without a bot token, skipping"
                ),
            },
        }
    }

    notifiers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notification() {
        let notifier = LogNotifier;
        assert!(notifier.deliver("test message").await.is_ok());
        assert_eq!(notifier.platform(), Platform::Plain);
    }

    #[test]
    fn test_build_notifiers() {
        let target = TargetConfig::new("mainnet", "Identity")
            .with_channel(ChannelConfig::Discord {
                webhook_url: "https://discord.test/hook".to_string(),
            })
            .with_channel(ChannelConfig::Telegram {
                chat_id: "-1001".to_string(),
            });
        let client = http_client(Duration::from_secs(1));

        let notifiers = build_notifiers(&target, &client, Some("123:abc"));
        let names: Vec<&str> = notifiers.iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["discord", "telegram"]);

        let notifiers = build_notifiers(&target, &client, None);
        assert_eq!(notifiers.len(), 1);
        assert_eq!(notifiers[0].platform(), Platform::Discord);
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_an_error() {
        let notifier = DiscordNotifier::new(
            http_client(Duration::from_millis(500)),
            "http://127.0.0.1:9/webhook",
        );
        assert!(matches!(
            notifier.deliver("hello").await,
            Err(NotifierError::Webhook(_))
        ));
    }
}

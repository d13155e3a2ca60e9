use anyhow::Context;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::form_urlencoded;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Telegram API error (status {status}): {body}")]
    ApiStatus { status: u16, body: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Deserialize, Debug, Clone)]
pub struct TelegramConfig {
    #[serde(rename = "telegram_bot_token")]
    pub bot_token: Option<String>,
    #[serde(rename = "telegram_chat_id")]
    pub chat_id: Option<String>,
    #[serde(rename = "telegram_base_url", default = "default_base_url")]
    pub base_url: String,
    #[serde(rename = "github_repository", default = "default_repository")]
    pub repository: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            base_url: default_base_url(),
            repository: default_repository(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_repository() -> String {
    "user/repo".to_string()
}

/// What the approval message talks about.
#[derive(Debug, Clone)]
pub struct PostNotice<'a> {
    pub file_name: &'a str,
    pub topic: Option<&'a str>,
    pub model: &'a str,
}

#[derive(Serialize, Debug)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    base_url: String,
    token: String,
    chat_id: String,
    repository: String,
    client: Client,
}

impl TelegramNotifier {
    /// Returns `None` when the bot token or chat id is not configured.
    pub fn new(config: TelegramConfig) -> Result<Option<Self>, NotifyError> {
        let token = config.bot_token.filter(|v| !v.trim().is_empty());
        let chat_id = config.chat_id.filter(|v| !v.trim().is_empty());
        let (token, chat_id) = match (token, chat_id) {
            (Some(token), Some(chat_id)) => (token, chat_id),
            (None, None) => {
                log::info!("telegram not configured, notifications disabled");
                return Ok(None);
            }
            _ => {
                log::warn!(
                    "telegram needs both a bot token and a chat id, notifications disabled"
                );
                return Ok(None);
            }
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build Telegram HTTP client")?;

        Ok(Some(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
            chat_id: chat_id.trim().to_string(),
            repository: config.repository,
            client,
        }))
    }

    pub fn approval_url(&self, file_name: &str) -> String {
        approval_url(&self.repository, file_name)
    }

    pub fn render_message(&self, notice: &PostNotice<'_>) -> String {
        format!(
            "📊 *[The Rich Way] New market post ready*\n\
             Topic: {}\n\
             Model: {}\n\
             File: `{}`\n\n\
             Review the draft, then approve it to publish.\n\n\
             [👉 Approve and publish]({})",
            escape_markdown(notice.topic.unwrap_or("Daily briefing")),
            escape_markdown(notice.model),
            notice.file_name,
            self.approval_url(notice.file_name)
        )
    }

    pub async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let response = self
            .client
            .post(&url)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
                parse_mode: "Markdown",
            })
            .send()
            .await
            .context("Telegram request failed")?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::ApiStatus { status, body });
        }
        Ok(())
    }

    /// Sends the approval message. Failures are logged, never returned.
    pub async fn notify(&self, notice: &PostNotice<'_>) {
        let message = self.render_message(notice);
        match self.send(&message).await {
            Ok(()) => log::info!("sent approval request for {}", notice.file_name),
            Err(err) => log::warn!("failed to send Telegram notification: {:#}", err),
        }
    }
}

/// Link to a pre-filled GitHub issue whose title approves the post.
pub fn approval_url(repository: &str, file_name: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("title", &format!("approve-{}", file_name))
        .append_pair("body", "Submit this issue to publish the post.")
        .finish();
    format!(
        "https://github.com/{}/issues/new?{}",
        repository.trim_matches('/'),
        query
    )
}

/// Escapes the entity characters of Telegram's legacy `Markdown` parse mode.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

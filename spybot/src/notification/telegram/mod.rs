//! Telegram Bot API transport.
//!
//! Delivers and edits messages (`sendMessage`, `editMessageText`) and
//! long-polls inbound commands (`getUpdates`). Rate-limited requests are
//! repeated after the `parameters.retry_after` delay the API returns.

pub mod models;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::transport::{ChatTransport, MessageFlags, MessageHandle};
use crate::{Error, Result};
use models::{ApiResponse, Message, Update};

/// Attempts per call while the API keeps answering 429.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Used when a 429 carries no `retry_after`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Bot API limit on message text, in characters.
const MESSAGE_CHAR_LIMIT: usize = 4096;

const TRUNCATION_MARKER: &str = "\n\n[truncated]";

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Slack added on top of the long-poll timeout for the HTTP request itself.
const LONG_POLL_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub api_base: String,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: TELEGRAM_API_BASE.to_string(),
        }
    }
}

pub struct TelegramTransport {
    config: TelegramConfig,
    client: Client,
}

impl TelegramTransport {
    pub fn new(config: TelegramConfig, client: Client) -> Self {
        Self { config, client }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }

    /// Long-poll for inbound updates with `update_id >= offset`.
    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>> {
        let mut payload = json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            payload["offset"] = json!(offset);
        }

        self.call_with_timeout(
            "getUpdates",
            &payload,
            Some(Duration::from_secs(timeout_secs) + LONG_POLL_GRACE),
        )
        .await
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, payload: &Value) -> Result<T> {
        self.call_with_timeout(method, payload, None).await
    }

    /// Invoke a Bot API method. A 429 answer is retried after the advertised
    /// `retry_after`, at most [`MAX_RATE_LIMIT_RETRIES`] attempts in total.
    async fn call_with_timeout<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &Value,
        timeout: Option<Duration>,
    ) -> Result<T> {
        let url = self.method_url(method);

        for attempt in 1..=MAX_RATE_LIMIT_RETRIES {
            let mut request = self.client.post(&url).json(payload);
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }
            let response = request
                .send()
                .await
                .map_err(|e| Error::transport(format!("{}: {}", method, e)))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| Error::transport(format!("{}: reading body: {}", method, e)))?;
            let parsed = serde_json::from_str::<ApiResponse<T>>(&body).ok();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let wait = parsed
                    .as_ref()
                    .and_then(|r| r.parameters.as_ref())
                    .and_then(|p| p.retry_after)
                    .map_or(DEFAULT_RETRY_AFTER, Duration::from_secs);
                if attempt < MAX_RATE_LIMIT_RETRIES {
                    debug!("{} throttled, retrying in {:?} ({}/{})", method, wait, attempt, MAX_RATE_LIMIT_RETRIES);
                    tokio::time::sleep(wait).await;
                }
                continue;
            }

            return match parsed {
                Some(ApiResponse {
                    ok: true,
                    result: Some(result),
                    ..
                }) if status.is_success() => Ok(result),
                Some(ApiResponse { description, .. }) => {
                    let reason = description.unwrap_or_else(|| status.to_string());
                    warn!("{} rejected ({}): {}", method, status, reason);
                    Err(Error::transport(format!("{}: {}", method, reason)))
                }
                None => {
                    warn!("{} returned {} with unexpected body: {}", method, status, body);
                    Err(Error::transport(format!("{}: HTTP {}", method, status)))
                }
            };
        }

        warn!("{} still throttled after {} attempts", method, MAX_RATE_LIMIT_RETRIES);
        Err(Error::transport(format!(
            "{}: rate limited {} times in a row",
            method, MAX_RATE_LIMIT_RETRIES
        )))
    }
}

fn message_payload(text: &str, flags: MessageFlags) -> Value {
    let mut payload = json!({
        "text": fit_to_limit(text, MESSAGE_CHAR_LIMIT),
    });
    if flags.html {
        payload["parse_mode"] = json!("HTML");
    }
    if flags.disable_link_preview {
        payload["link_preview_options"] = json!({ "is_disabled": true });
    }
    payload
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        flags: MessageFlags,
    ) -> Result<MessageHandle> {
        let mut payload = message_payload(text, flags);
        payload["chat_id"] = json!(chat_id);
        if flags.silent {
            payload["disable_notification"] = json!(true);
        }

        let message: Message = self.call("sendMessage", &payload).await?;
        debug!("Telegram message {} sent to {}", message.message_id, chat_id);

        Ok(MessageHandle {
            chat_id: message.chat.id,
            message_id: message.message_id,
            text: text.to_string(),
        })
    }

    async fn edit_message(
        &self,
        handle: &MessageHandle,
        text: &str,
        flags: MessageFlags,
    ) -> Result<()> {
        let mut payload = message_payload(text, flags);
        payload["chat_id"] = json!(handle.chat_id);
        payload["message_id"] = json!(handle.message_id);

        // editMessageText answers with the edited Message (or `true` for inline messages).
        let _: Value = self.call("editMessageText", &payload).await?;
        debug!(
            "Telegram message {} in {} edited",
            handle.message_id, handle.chat_id
        );
        Ok(())
    }
}

/// Cut `text` to at most `limit` characters, marking the cut.
fn fit_to_limit(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        None => text.to_string(),
        Some(_) => {
            let keep = limit.saturating_sub(TRUNCATION_MARKER.chars().count());
            let mut out: String = text.chars().take(keep).collect();
            out.push_str(TRUNCATION_MARKER);
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_url() {
        spybot_sources::install_rustls_provider();
        let mut config = TelegramConfig::new("123:ABC");
        config.api_base = "http://localhost:8081/".to_string();
        let transport = TelegramTransport::new(config, Client::new());

        assert_eq!(
            transport.method_url("sendMessage"),
            "http://localhost:8081/bot123:ABC/sendMessage"
        );
    }

    #[test]
    fn test_message_payload_flags() {
        let payload = message_payload("hi", MessageFlags::html().without_preview());
        assert_eq!(payload["text"], "hi");
        assert_eq!(payload["parse_mode"], "HTML");
        assert_eq!(payload["link_preview_options"]["is_disabled"], true);

        let payload = message_payload("hi", MessageFlags::PLAIN);
        assert!(payload.get("parse_mode").is_none());
        assert!(payload.get("link_preview_options").is_none());
    }

    #[test]
    fn test_fit_to_limit() {
        assert_eq!(fit_to_limit("hello", 5), "hello");

        let long = "\u{265f}".repeat(5000);
        let cut = fit_to_limit(&long, MESSAGE_CHAR_LIMIT);
        assert_eq!(cut.chars().count(), MESSAGE_CHAR_LIMIT);
        assert!(cut.ends_with(TRUNCATION_MARKER));
        assert!(cut.starts_with('\u{265f}'));
    }
}

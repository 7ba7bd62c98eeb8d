//! Outbound side of the Bot API. The relay only sees [`MessagingChannel`];
//! [`TelegramClient`] is the production implementation.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use shared::telegram::InlineKeyboardMarkup;

use crate::config::TelegramConfig;

#[async_trait]
pub trait MessagingChannel: Send + Sync {
    async fn send_message(&self, chat_id: &str, text: &str, keyboard: Option<&InlineKeyboardMarkup>) -> Result<()>;

    /// Replaces the text and drops any inline keyboard.
    async fn edit_message(&self, chat_id: &str, message_id: i64, text: &str) -> Result<()>;

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    description: Option<String>,
}

pub fn send_message_payload(chat_id: &str, text: &str, keyboard: Option<&InlineKeyboardMarkup>) -> Value {
    let mut payload = json!({ "chat_id": chat_id, "text": text, "parse_mode": "HTML" });
    if let Some(keyboard) = keyboard {
        payload["reply_markup"] = json!(keyboard);
    }
    payload
}

pub fn edit_message_payload(chat_id: &str, message_id: i64, text: &str) -> Value {
    json!({
        "chat_id": chat_id,
        "message_id": message_id,
        "text": text,
        "parse_mode": "HTML",
        "reply_markup": { "inline_keyboard": [] },
    })
}

/// Bot API client. One attempt per call, bounded by the configured timeout.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    endpoint: String,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/bot{}", config.api_base.trim_end_matches('/'), config.bot_token.trim()),
        })
    }

    /// Errors never carry the request URL, which embeds the bot token.
    async fn call(&self, method: &str, payload: Value) -> Result<Value> {
        let response = self
            .http
            .post(format!("{}/{method}", self.endpoint))
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("{method}: {}", e.without_url()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("{method}: {}", e.without_url()))?;
        let parsed: ApiResponse =
            serde_json::from_str(&body).map_err(|_| anyhow!("{method} returned {status} with a non-JSON body"))?;

        if !status.is_success() || !parsed.ok {
            bail!(
                "{method} failed with {status}: {}",
                parsed.description.unwrap_or_else(|| "no description".to_string())
            );
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }

    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<Value> {
        let mut payload = json!({ "url": url });
        if let Some(secret) = secret {
            payload["secret_token"] = json!(secret);
        }
        self.call("setWebhook", payload).await
    }

    pub async fn webhook_info(&self) -> Result<Value> {
        self.call("getWebhookInfo", json!({})).await
    }

    pub async fn delete_webhook(&self) -> Result<Value> {
        self.call("deleteWebhook", json!({ "drop_pending_updates": false })).await
    }
}

#[async_trait]
impl MessagingChannel for TelegramClient {
    async fn send_message(&self, chat_id: &str, text: &str, keyboard: Option<&InlineKeyboardMarkup>) -> Result<()> {
        self.call("sendMessage", send_message_payload(chat_id, text, keyboard)).await?;
        Ok(())
    }

    async fn edit_message(&self, chat_id: &str, message_id: i64, text: &str) -> Result<()> {
        self.call("editMessageText", edit_message_payload(chat_id, message_id, text)).await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<()> {
        self.call(
            "answerCallbackQuery",
            json!({ "callback_query_id": callback_id, "text": text, "show_alert": false }),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::telegram_config;
    use shared::telegram::InlineKeyboardButton;

    #[test]
    fn send_payload_uses_html_and_optional_keyboard() {
        let plain = send_message_payload("-100200", "<b>hi</b>", None);
        assert_eq!(plain["parse_mode"], "HTML");
        assert_eq!(plain["chat_id"], "-100200");
        assert!(plain.get("reply_markup").is_none());

        let keyboard = InlineKeyboardMarkup {
            inline_keyboard: vec![vec![InlineKeyboardButton {
                text: "Accept".into(),
                callback_data: "order:accept:ODR_1".into(),
            }]],
        };
        let with_keyboard = send_message_payload("-100200", "hi", Some(&keyboard));
        assert_eq!(
            with_keyboard["reply_markup"]["inline_keyboard"][0][0]["callback_data"],
            "order:accept:ODR_1"
        );
    }

    #[test]
    fn edit_payload_removes_keyboard() {
        let payload = edit_message_payload("-100200", 77, "done");
        assert_eq!(payload["message_id"], 77);
        assert_eq!(payload["reply_markup"]["inline_keyboard"], json!([]));
    }

    #[tokio::test]
    async fn transport_errors_do_not_leak_the_token() {
        let client = TelegramClient::new(&telegram_config()).unwrap();
        let err = client.send_message("-100200", "hi", None).await.unwrap_err();
        let text = format!("{err:#}");
        assert!(text.starts_with("sendMessage"), "{text}");
        assert!(!text.contains("123:abc"), "{text}");
    }
}

//! Subset of the Telegram Bot API payloads this system sends and receives.
//!
//! Every inbound field is optional: webhook updates arrive in many shapes and
//! a missing field must lead to the update being ignored, not to a 4xx that
//! makes Telegram redeliver it forever.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Update {
    pub update_id: Option<i64>,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Message {
    pub message_id: Option<i64>,
    pub from: Option<User>,
    pub chat: Option<Chat>,
    pub text: Option<String>,
}

impl Message {
    /// Trimmed text, `None` when absent or blank.
    pub fn trimmed_text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn chat_id(&self) -> Option<i64> {
        self.chat.as_ref().and_then(|c| c.id)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: Option<i64>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl User {
    pub fn external_id(&self) -> Option<String> {
        self.id.map(|id| id.to_string())
    }

    pub fn display_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Chat {
    pub id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CallbackQuery {
    pub id: Option<String>,
    pub from: Option<User>,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_updates_deserialize() {
        let update: Update = serde_json::from_str(r#"{"update_id": 7, "message": {"text": "  hi "}}"#).unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.trimmed_text(), Some("hi"));
        assert!(message.from.is_none());
        assert!(message.chat_id().is_none());

        let empty: Update = serde_json::from_str("{}").unwrap();
        assert!(empty.message.is_none() && empty.callback_query.is_none());
    }

    #[test]
    fn display_name_joins_present_parts() {
        let user = User {
            id: Some(42),
            username: None,
            first_name: Some("Sok".into()),
            last_name: Some(" ".into()),
        };
        assert_eq!(user.display_name().as_deref(), Some("Sok"));
        assert_eq!(user.external_id().as_deref(), Some("42"));
        assert_eq!(User::default().display_name(), None);
    }
}

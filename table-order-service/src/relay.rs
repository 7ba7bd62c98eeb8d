//! Notification relay: kitchen messages out, staff button presses and
//! customer chat in. Nothing in here returns an error to its caller; every
//! failure is logged and the update is considered handled.

use shared::telegram::{CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, Message, Update, User};
use shared::{usd_decimal, Money, OrderAction, OrderNotice};
use std::sync::Arc;
use tracing::{info, warn};

use crate::customers::{self, PlatformIdentity};
use crate::db::DbPool;
use crate::error::AppError;
use crate::orders::OrderEngine;
use crate::telegram::MessagingChannel;

const CALLBACK_PREFIX: &str = "order:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackError {
    UnsupportedPrefix,
    InvalidFormat,
    UnknownAction,
}

impl CallbackError {
    pub fn ack_text(self) -> &'static str {
        match self {
            CallbackError::UnsupportedPrefix => "Unsupported action",
            CallbackError::InvalidFormat => "Invalid action format",
            CallbackError::UnknownAction => "Unknown action",
        }
    }
}

/// `order:<action>:<order id>`
pub fn parse_callback_data(data: &str) -> Result<(OrderAction, &str), CallbackError> {
    if !data.starts_with(CALLBACK_PREFIX) {
        return Err(CallbackError::UnsupportedPrefix);
    }
    let parts: Vec<&str> = data.split(':').collect();
    let [_, action, order_id] = parts.as_slice() else {
        return Err(CallbackError::InvalidFormat);
    };
    if order_id.is_empty() {
        return Err(CallbackError::InvalidFormat);
    }
    let action = action.parse::<OrderAction>().map_err(|_| CallbackError::UnknownAction)?;
    Ok((action, *order_id))
}

pub fn callback_data(action: OrderAction, order_id: &str) -> String {
    format!("{CALLBACK_PREFIX}{}:{order_id}", action.as_str())
}

pub fn order_keyboard(order_id: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![vec![
            InlineKeyboardButton { text: "Accept".to_string(), callback_data: callback_data(OrderAction::Accept, order_id) },
            InlineKeyboardButton { text: "Cancel".to_string(), callback_data: callback_data(OrderAction::Cancel, order_id) },
        ]],
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn format_order_message(notice: &OrderNotice) -> String {
    let mut lines = vec![
        "<b>New Order</b>".to_string(),
        format!("Order ID: <code>{}</code>", escape_html(&notice.order_id)),
        format!("Order No: <code>{}</code>", escape_html(&notice.order_no)),
        format!("Table: <b>{}</b>", escape_html(&notice.table_code)),
    ];
    if let Some(note) = notice.note.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        lines.push(format!("Note: <i>{}</i>", escape_html(note)));
    }

    lines.push(String::new());
    lines.push("<b>Items</b>".to_string());
    for item in &notice.items {
        lines.push(format!(
            "- {} x{} (${}) = <b>{}</b>",
            escape_html(&item.product_name),
            item.qty,
            usd_decimal(item.unit_price_usd),
            Money::new(item.line_total_usd, item.line_total_khr),
        ));
    }

    lines.push(String::new());
    lines.push(format!("Total: <b>{}</b>", Money::new(notice.total_usd, notice.total_khr)));
    lines.join("\n")
}

/// `/start [code]`, also in the `/start@bot_name [code]` form group chats send.
fn start_payload(text: &str) -> Option<Option<&str>> {
    let (command, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    let command = command.split_once('@').map_or(command, |(name, _)| name);
    if command != "/start" {
        return None;
    }
    Some(rest.split_whitespace().next())
}

fn who(user: &User, external_id: &str) -> String {
    match user.username.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        Some(handle) => format!("@{}", escape_html(handle)),
        None => format!("<code>{external_id}</code>"),
    }
}

#[derive(Clone)]
pub struct NotificationRelay {
    channel: Arc<dyn MessagingChannel>,
    kitchen_chat_id: String,
    orders: OrderEngine,
    pool: DbPool,
}

impl NotificationRelay {
    pub fn new(channel: Arc<dyn MessagingChannel>, kitchen_chat_id: String, orders: OrderEngine, pool: DbPool) -> Self {
        Self { channel, kitchen_chat_id, orders, pool }
    }

    /// Returns whether the kitchen message went out.
    pub async fn push_new_order(&self, notice: &OrderNotice) -> bool {
        let text = format_order_message(notice);
        let keyboard = order_keyboard(&notice.order_id);
        match self.channel.send_message(&self.kitchen_chat_id, &text, Some(&keyboard)).await {
            Ok(()) => {
                info!(order_id = %notice.order_id, "kitchen notified of new order");
                true
            }
            Err(e) => {
                warn!(order_id = %notice.order_id, error = %e, "failed to notify kitchen of new order");
                false
            }
        }
    }

    pub async fn handle_update(&self, update: Update) {
        if let Some(callback) = update.callback_query {
            self.handle_callback(callback).await;
        }
        if let Some(message) = update.message {
            self.handle_start(&message).await;
            self.handle_freeform(&message).await;
        }
    }

    pub async fn handle_callback(&self, callback: CallbackQuery) {
        let Some(data) = callback.data.as_deref().filter(|d| !d.is_empty()) else {
            return;
        };
        let callback_id = callback.id.as_deref();

        let (action, order_id) = match parse_callback_data(data) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.ack(callback_id, e.ack_text()).await;
                return;
            }
        };

        match self.orders.transition_status(order_id, action).await {
            Ok(order) => {
                let status = order.status.as_str();
                self.ack(callback_id, &format!("Order {status}")).await;
                if let Some(source) = &callback.message {
                    self.mark_message(source, status).await;
                }
            }
            Err(AppError::NotFound(_)) => self.ack(callback_id, "Order not found").await,
            Err(AppError::InvalidTransition { current, .. }) => {
                self.ack(callback_id, &format!("Order is already {current}")).await
            }
            Err(e) => {
                warn!(order_id, action = %action, error = %e, "order action from chat failed");
                self.ack(callback_id, "Order update failed").await;
            }
        }
    }

    /// Appends the new status to the kitchen message; the edit drops the
    /// buttons so the order cannot be actioned twice from the same message.
    async fn mark_message(&self, source: &Message, status: &str) {
        let (Some(chat_id), Some(message_id)) = (source.chat_id(), source.message_id) else {
            return;
        };
        let Some(current) = source.trimmed_text() else {
            return;
        };
        let text = format!("{}\n\nStatus: <b>{status}</b>", escape_html(current));
        if let Err(e) = self.channel.edit_message(&chat_id.to_string(), message_id, &text).await {
            warn!(chat_id, message_id, error = %e, "failed to edit kitchen message");
        }
    }

    async fn ack(&self, callback_id: Option<&str>, text: &str) {
        let Some(callback_id) = callback_id else {
            return;
        };
        if let Err(e) = self.channel.answer_callback(callback_id, text).await {
            warn!(callback_id, error = %e, "failed to answer callback");
        }
    }

    /// `/start [table code]`: record who the customer is and, when a code
    /// came with the deep link, which table they sit at.
    pub async fn handle_start(&self, message: &Message) {
        let Some(payload) = message.trimmed_text().and_then(start_payload) else {
            return;
        };
        let Some(user) = message.from.as_ref() else {
            return;
        };
        let Some(external_id) = user.external_id() else {
            return;
        };

        let identity = PlatformIdentity {
            external_id: external_id.clone(),
            handle: user.username.clone(),
            display_name: user.display_name(),
            table_code: payload.map(str::to_string),
        };
        match self.pool.get().await {
            Ok(mut conn) => {
                if let Err(e) = customers::upsert_from_platform(&mut conn, identity).await {
                    warn!(external_id = %external_id, error = %e, "failed to record customer from /start");
                }
            }
            Err(e) => warn!(external_id = %external_id, error = %e, "no connection to record customer from /start"),
        }

        let chat_id = message.chat_id().map(|id| id.to_string()).unwrap_or_else(|| external_id.clone());
        let reply = match payload {
            Some(code) => format!("Table linked: <b>{}</b>", escape_html(code)),
            None => "Welcome. Use /start &lt;table_code&gt; to link your table.".to_string(),
        };
        if let Err(e) = self.channel.send_message(&chat_id, &reply, None).await {
            warn!(chat_id = %chat_id, error = %e, "failed to reply to /start");
        }
    }

    /// Any text from a customer pings the kitchen with their table.
    pub async fn handle_freeform(&self, message: &Message) {
        let Some(text) = message.trimmed_text() else {
            return;
        };
        let Some(user) = message.from.as_ref() else {
            return;
        };
        let Some(external_id) = user.external_id() else {
            return;
        };

        let table_code = match start_payload(text).flatten() {
            Some(code) => Some(code.to_string()),
            None => self.stored_table_code(&external_id).await,
        };

        let ping = format!(
            "<b>Customer Message</b>\nTable: <b>{}</b>\nUser: {}\nText: <i>{}</i>",
            escape_html(table_code.as_deref().unwrap_or("UNKNOWN")),
            who(user, &external_id),
            escape_html(text),
        );
        if let Err(e) = self.channel.send_message(&self.kitchen_chat_id, &ping, None).await {
            warn!(external_id = %external_id, error = %e, "failed to forward customer message to kitchen");
        }
    }

    async fn stored_table_code(&self, external_id: &str) -> Option<String> {
        let mut conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(external_id, error = %e, "no connection to look up customer table");
                return None;
            }
        };
        customers::last_table_code(&mut conn, external_id)
            .await
            .unwrap_or_else(|e| {
                warn!(external_id, error = %e, "failed to look up customer table");
                None
            })
    }
}

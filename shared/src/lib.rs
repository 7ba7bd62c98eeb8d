use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub mod telegram;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Wires a closed enum with `as_str`/`FromStr` into serde and Display so the
/// text form is defined in exactly one place.
macro_rules! text_enum {
    ($ty:ident) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl From<$ty> for &'static str {
            fn from(value: $ty) -> Self {
                value.as_str()
            }
        }

        impl TryFrom<String> for $ty {
            type Error = ParseEnumError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

/// `text_enum!` plus the Postgres `Text` mapping, for enums stored in a column.
macro_rules! sql_text_enum {
    ($ty:ident) => {
        text_enum!($ty);

        impl ToSql<Text, Pg> for $ty {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                <str as ToSql<Text, Pg>>::to_sql(self.as_str(), out)
            }
        }

        impl FromSql<Text, Pg> for $ty {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                let raw = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
                Ok(raw.parse::<$ty>()?)
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[serde(into = "&'static str", try_from = "String")]
#[diesel(sql_type = Text)]
pub enum OrderStatus {
    Pending,
    Accepted,
    Cancelled,
    Completed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::Pending,
        OrderStatus::Accepted,
        OrderStatus::Cancelled,
        OrderStatus::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Completed => "COMPLETED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Completed)
    }

    /// Staff actions only move an order out of PENDING. Everything else
    /// (COMPLETED, reopening) is an administrative edit, not a transition.
    pub fn apply(self, action: OrderAction) -> Result<OrderStatus, TransitionError> {
        match self {
            OrderStatus::Pending => Ok(action.target()),
            current => Err(TransitionError { current, action }),
        }
    }
}

impl FromStr for OrderStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "ACCEPTED" => Ok(OrderStatus::Accepted),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            "COMPLETED" => Ok(OrderStatus::Completed),
            _ => Err(ParseEnumError { kind: "order status", value: s.to_string() }),
        }
    }
}

sql_text_enum!(OrderStatus);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "&'static str", try_from = "String")]
pub enum OrderAction {
    Accept,
    Cancel,
}

impl OrderAction {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderAction::Accept => "accept",
            OrderAction::Cancel => "cancel",
        }
    }

    pub fn target(self) -> OrderStatus {
        match self {
            OrderAction::Accept => OrderStatus::Accepted,
            OrderAction::Cancel => OrderStatus::Cancelled,
        }
    }
}

impl FromStr for OrderAction {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(OrderAction::Accept),
            "cancel" => Ok(OrderAction::Cancel),
            _ => Err(ParseEnumError { kind: "order action", value: s.to_string() }),
        }
    }
}

text_enum!(OrderAction);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {action} an order that is {current}")]
pub struct TransitionError {
    pub current: OrderStatus,
    pub action: OrderAction,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[serde(into = "&'static str", try_from = "String")]
#[diesel(sql_type = Text)]
pub enum PaymentMethod {
    #[default]
    Cod,
    Khqr,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cod => "COD",
            PaymentMethod::Khqr => "KHQR",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COD" => Ok(PaymentMethod::Cod),
            "KHQR" => Ok(PaymentMethod::Khqr),
            _ => Err(ParseEnumError { kind: "payment method", value: s.to_string() }),
        }
    }
}

sql_text_enum!(PaymentMethod);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[serde(into = "&'static str", try_from = "String")]
#[diesel(sql_type = Text)]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "UNPAID",
            PaymentStatus::Paid => "PAID",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNPAID" => Ok(PaymentStatus::Unpaid),
            "PAID" => Ok(PaymentStatus::Paid),
            _ => Err(ParseEnumError { kind: "payment status", value: s.to_string() }),
        }
    }
}

sql_text_enum!(PaymentStatus);

/// An amount in both currencies. USD is carried in cents and rendered with
/// two decimals; KHR has no minor unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Money {
    pub usd: BigDecimal,
    pub khr: i64,
}

impl Money {
    pub fn new(usd_cents: i64, khr: i64) -> Self {
        Self { usd: usd_decimal(usd_cents), khr }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${} / {}៛", self.usd, group_thousands(self.khr))
    }
}

pub fn usd_decimal(cents: i64) -> BigDecimal {
    BigDecimal::new(cents.into(), 2)
}

pub fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Read-only snapshot of a freshly created order, exactly what the kitchen
/// message needs. Stored as the outbox payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderNotice {
    pub order_id: String,
    pub order_no: String,
    pub table_code: String,
    pub note: Option<String>,
    pub items: Vec<NoticeLine>,
    pub total_usd: i64,
    pub total_khr: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeLine {
    pub product_name: String,
    pub qty: i32,
    pub unit_price_usd: i64,
    pub line_total_usd: i64,
    pub line_total_khr: i64,
}

pub const ORDER_CREATED: &str = "OrderCreated";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub aggregate_id: String,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

impl OutboxEvent {
    pub fn order_created(notice: &OrderNotice) -> serde_json::Result<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            aggregate_id: notice.order_id.clone(),
            event_type: ORDER_CREATED.to_string(),
            event_data: serde_json::to_value(notice)?,
            processed: false,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_orders_accept_actions() {
        assert_eq!(OrderStatus::Pending.apply(OrderAction::Accept), Ok(OrderStatus::Accepted));
        assert_eq!(OrderStatus::Pending.apply(OrderAction::Cancel), Ok(OrderStatus::Cancelled));

        for current in OrderStatus::ALL.into_iter().filter(|s| *s != OrderStatus::Pending) {
            for action in [OrderAction::Accept, OrderAction::Cancel] {
                assert_eq!(current.apply(action), Err(TransitionError { current, action }));
            }
        }
    }

    #[test]
    fn accepting_twice_is_rejected() {
        let accepted = OrderStatus::Pending.apply(OrderAction::Accept).unwrap();
        let err = accepted.apply(OrderAction::Accept).unwrap_err();
        assert_eq!(err.current, OrderStatus::Accepted);
        assert_eq!(err.to_string(), "cannot accept an order that is ACCEPTED");
    }

    #[test]
    fn terminal_states() {
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Completed.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Accepted.is_terminal());
    }

    #[test]
    fn enums_use_their_text_form_in_json() {
        assert_eq!(serde_json::to_string(&OrderStatus::Cancelled).unwrap(), "\"CANCELLED\"");
        assert_eq!(serde_json::to_string(&PaymentMethod::Khqr).unwrap(), "\"KHQR\"");
        assert_eq!(
            serde_json::from_str::<PaymentStatus>("\"PAID\"").unwrap(),
            PaymentStatus::Paid
        );
        assert!(serde_json::from_str::<OrderStatus>("\"pending\"").is_err());
        assert_eq!("cancel".parse::<OrderAction>(), Ok(OrderAction::Cancel));
    }

    #[test]
    fn unknown_text_is_rejected() {
        let err = "SHIPPED".parse::<OrderStatus>().unwrap_err();
        assert_eq!(err.kind, "order status");
        assert!("card".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn order_actions_share_the_text_form_of_stored_enums() {
        assert_eq!(OrderAction::Accept.to_string(), "accept");
        assert_eq!(serde_json::to_string(&OrderAction::Cancel).unwrap(), "\"cancel\"");
        assert_eq!(serde_json::from_str::<OrderAction>("\"accept\"").unwrap(), OrderAction::Accept);
        let err = OrderAction::try_from("ship".to_string()).unwrap_err();
        assert_eq!(err.kind, "order action");
    }

    #[test]
    fn money_renders_cents_and_riel() {
        let money = Money::new(1000, 4_000_000);
        assert_eq!(money.usd.to_string(), "10.00");
        assert_eq!(money.to_string(), "$10.00 / 4,000,000៛");
        assert_eq!(usd_decimal(5).to_string(), "0.05");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(-1234), "-1,234");
    }

    #[test]
    fn order_created_event_carries_the_notice() {
        let notice = OrderNotice {
            order_id: "ODR_1".into(),
            order_no: "ORD-20260101000000-000000000001".into(),
            table_code: "TB001".into(),
            note: None,
            items: vec![],
            total_usd: 0,
            total_khr: 0,
        };
        let event = OutboxEvent::order_created(&notice).unwrap();
        assert_eq!(event.event_type, ORDER_CREATED);
        assert_eq!(event.aggregate_id, "ODR_1");
        assert!(!event.processed);
        let decoded: OrderNotice = serde_json::from_value(event.event_data).unwrap();
        assert_eq!(decoded, notice);
    }
}

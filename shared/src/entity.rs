use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    Paid,
    InProgress,
    Completed,
}

/// Canonical order row as stored. Full deltas carry every field, with
/// absent values serialized as null so a shallow merge overwrites them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub customer_name: String,
    pub phone: String,
    pub address: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub total_amount: f64,
    pub commission: f64,
    pub description: Option<String>,
    pub status: OrderStatus,
    pub assigned_specialist_id: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specialist {
    pub id: i64,
    pub name: Option<String>,
    pub username: Option<String>,
    pub telegram_id: i64,
    pub is_on_shift: bool,
    pub last_shift_started_at: Option<DateTime<Utc>>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub is_banned: bool,
    pub unread_chat_count: u32,
    pub created_at: DateTime<Utc>,
}

impl Specialist {
    /// Time on the current shift, derived at read time. None when off shift.
    pub fn shift_elapsed(&self, now: DateTime<Utc>) -> Option<Duration> {
        if !self.is_on_shift {
            return None;
        }
        self.last_shift_started_at.map(|started| now - started)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SenderType {
    Specialist,
    Operator,
}

impl Default for SenderType {
    fn default() -> Self {
        SenderType::Operator
    }
}

/// Immutable once created. Exactly one of `order_id`/`specialist_id` is set
/// and identifies the thread; ids are assigned in persistence order, so id
/// order is authoritative regardless of delivery order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: i64,
    pub text: String,
    pub sender_type: SenderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialist_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// The thread a chat message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatThread {
    Order(i64),
    Specialist(i64),
}

impl ChatMessage {
    pub fn thread(&self) -> Option<ChatThread> {
        match (self.order_id, self.specialist_id) {
            (Some(order_id), None) => Some(ChatThread::Order(order_id)),
            (None, Some(specialist_id)) => Some(ChatThread::Specialist(specialist_id)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrder {
    pub customer_name: String,
    pub phone: String,
    pub address: String,
    pub total_amount: f64,
    #[serde(default)]
    pub commission: f64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub assigned_specialist_id: Option<i64>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSpecialist {
    pub telegram_id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendChat {
    #[serde(default)]
    pub order_id: Option<i64>,
    #[serde(default)]
    pub specialist_id: Option<i64>,
    #[serde(default)]
    pub sender_type: SenderType,
    pub text: String,
}

/// Partial order update. Absent fields are left untouched by the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commission: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_specialist_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialistPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_on_shift: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_banned: Option<bool>,
}

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use shared::*;
use tokio::sync::Mutex;

pub type StoreResult<T> = Result<T, SyncError>;

/// Durable record of orders, specialists and chat messages. Owns canonical
/// state, assigns monotonically increasing ids and timestamps, and serializes
/// concurrent mutations to the same id. Every read after a write returns the
/// fully committed row.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn create_order(&self, req: CreateOrder) -> StoreResult<Order>;
    async fn patch_order(&self, id: i64, patch: OrderPatch) -> StoreResult<Order>;
    async fn get_order(&self, id: i64) -> StoreResult<Order>;
    async fn list_orders(&self) -> StoreResult<Vec<Order>>;

    async fn create_specialist(&self, req: RegisterSpecialist) -> StoreResult<Specialist>;
    async fn patch_specialist(&self, id: i64, patch: SpecialistPatch) -> StoreResult<Specialist>;
    async fn get_specialist(&self, id: i64) -> StoreResult<Specialist>;
    async fn list_specialists(&self) -> StoreResult<Vec<Specialist>>;
    async fn list_specialists_on_shift(&self) -> StoreResult<Vec<Specialist>>;
    /// All orders ever assigned to the specialist, newest first.
    async fn order_history(&self, specialist_id: i64) -> StoreResult<Vec<Order>>;
    /// The at-most-one IN_PROGRESS order assigned to the specialist.
    async fn active_order(&self, specialist_id: i64) -> StoreResult<Option<Order>>;

    async fn create_chat_message(
        &self,
        thread: ChatThread,
        sender_type: SenderType,
        text: String,
    ) -> StoreResult<ChatMessage>;
    async fn list_chat_messages(&self, thread: ChatThread) -> StoreResult<Vec<ChatMessage>>;
    async fn increment_unread(&self, specialist_id: i64) -> StoreResult<u32>;
}

#[derive(Default)]
struct Tables {
    orders: BTreeMap<i64, Order>,
    specialists: BTreeMap<i64, Specialist>,
    messages: Vec<ChatMessage>,
    next_order_id: i64,
    next_specialist_id: i64,
    next_message_id: i64,
}

/// In-process implementation of the store interface. A single mutex over the
/// tables gives atomic read-after-write per id, which is all the gateway
/// relies on.
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            tables: Mutex::new(Tables::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn create_order(&self, req: CreateOrder) -> StoreResult<Order> {
        let mut tables = self.tables.lock().await;
        tables.next_order_id += 1;
        let order = Order {
            id: tables.next_order_id,
            customer_name: req.customer_name,
            phone: req.phone,
            address: req.address,
            lat: req.lat,
            lng: req.lng,
            total_amount: req.total_amount,
            commission: req.commission,
            description: req.description,
            status: OrderStatus::New,
            assigned_specialist_id: req.assigned_specialist_id,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        };
        tables.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn patch_order(&self, id: i64, patch: OrderPatch) -> StoreResult<Order> {
        let mut tables = self.tables.lock().await;

        // One IN_PROGRESS order per specialist at a time. A patch can break
        // this two ways: starting the order, or reassigning one that is
        // already started, so the check runs on the post-patch state.
        let target = tables.orders.get(&id).ok_or(SyncError::not_found("order", id))?;
        let status = patch.status.unwrap_or(target.status);
        let specialist = patch.assigned_specialist_id.or(target.assigned_specialist_id);
        if status == OrderStatus::InProgress {
            if let Some(sid) = specialist {
                let busy = tables.orders.values().any(|o| {
                    o.id != id
                        && o.status == OrderStatus::InProgress
                        && o.assigned_specialist_id == Some(sid)
                });
                if busy {
                    let field = if patch.status == Some(OrderStatus::InProgress) {
                        "status"
                    } else {
                        "assignedSpecialistId"
                    };
                    return Err(SyncError::validation(
                        field,
                        format!("specialist {sid} already has an order in progress"),
                    ));
                }
            }
        }

        let order = tables
            .orders
            .get_mut(&id)
            .ok_or(SyncError::not_found("order", id))?;

        if let Some(v) = patch.customer_name {
            order.customer_name = v;
        }
        if let Some(v) = patch.phone {
            order.phone = v;
        }
        if let Some(v) = patch.address {
            order.address = v;
        }
        if let Some(v) = patch.lat {
            order.lat = Some(v);
        }
        if let Some(v) = patch.lng {
            order.lng = Some(v);
        }
        if let Some(v) = patch.total_amount {
            order.total_amount = v;
        }
        if let Some(v) = patch.commission {
            order.commission = v;
        }
        if let Some(v) = patch.description {
            order.description = Some(v);
        }
        if let Some(v) = patch.assigned_specialist_id {
            order.assigned_specialist_id = Some(v);
        }
        if let Some(status) = patch.status {
            let now = Utc::now();
            if status == OrderStatus::InProgress && order.status != OrderStatus::InProgress {
                order.started_at = Some(now);
            }
            if order.status == OrderStatus::InProgress && status != OrderStatus::InProgress {
                order.completed_at = Some(now);
            }
            order.status = status;
        }

        Ok(order.clone())
    }

    async fn get_order(&self, id: i64) -> StoreResult<Order> {
        let tables = self.tables.lock().await;
        tables
            .orders
            .get(&id)
            .cloned()
            .ok_or(SyncError::not_found("order", id))
    }

    async fn list_orders(&self) -> StoreResult<Vec<Order>> {
        let tables = self.tables.lock().await;
        // Newest first, matching what the console renders.
        Ok(tables.orders.values().rev().cloned().collect())
    }

    async fn create_specialist(&self, req: RegisterSpecialist) -> StoreResult<Specialist> {
        let mut tables = self.tables.lock().await;
        tables.next_specialist_id += 1;
        let specialist = Specialist {
            id: tables.next_specialist_id,
            name: req.name,
            username: req.username,
            telegram_id: req.telegram_id,
            is_on_shift: false,
            last_shift_started_at: None,
            lat: None,
            lng: None,
            is_banned: false,
            unread_chat_count: 0,
            created_at: Utc::now(),
        };
        tables.specialists.insert(specialist.id, specialist.clone());
        Ok(specialist)
    }

    async fn patch_specialist(&self, id: i64, patch: SpecialistPatch) -> StoreResult<Specialist> {
        let mut tables = self.tables.lock().await;
        let specialist = tables
            .specialists
            .get_mut(&id)
            .ok_or(SyncError::not_found("specialist", id))?;

        if let Some(v) = patch.name {
            specialist.name = Some(v);
        }
        if let Some(v) = patch.username {
            specialist.username = Some(v);
        }
        if let Some(v) = patch.lat {
            specialist.lat = Some(v);
        }
        if let Some(v) = patch.lng {
            specialist.lng = Some(v);
        }
        if let Some(v) = patch.is_banned {
            specialist.is_banned = v;
        }
        if let Some(on_shift) = patch.is_on_shift {
            if on_shift && !specialist.is_on_shift {
                specialist.last_shift_started_at = Some(Utc::now());
            }
            specialist.is_on_shift = on_shift;
        }

        Ok(specialist.clone())
    }

    async fn get_specialist(&self, id: i64) -> StoreResult<Specialist> {
        let tables = self.tables.lock().await;
        tables
            .specialists
            .get(&id)
            .cloned()
            .ok_or(SyncError::not_found("specialist", id))
    }

    async fn list_specialists(&self) -> StoreResult<Vec<Specialist>> {
        let tables = self.tables.lock().await;
        Ok(tables.specialists.values().cloned().collect())
    }

    async fn list_specialists_on_shift(&self) -> StoreResult<Vec<Specialist>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .specialists
            .values()
            .filter(|s| s.is_on_shift && !s.is_banned)
            .cloned()
            .collect())
    }

    async fn order_history(&self, specialist_id: i64) -> StoreResult<Vec<Order>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .orders
            .values()
            .rev()
            .filter(|o| o.assigned_specialist_id == Some(specialist_id))
            .cloned()
            .collect())
    }

    async fn active_order(&self, specialist_id: i64) -> StoreResult<Option<Order>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .orders
            .values()
            .find(|o| {
                o.assigned_specialist_id == Some(specialist_id)
                    && o.status == OrderStatus::InProgress
            })
            .cloned())
    }

    async fn create_chat_message(
        &self,
        thread: ChatThread,
        sender_type: SenderType,
        text: String,
    ) -> StoreResult<ChatMessage> {
        let mut tables = self.tables.lock().await;
        tables.next_message_id += 1;
        let (order_id, specialist_id) = match thread {
            ChatThread::Order(id) => (Some(id), None),
            ChatThread::Specialist(id) => (None, Some(id)),
        };
        let message = ChatMessage {
            id: tables.next_message_id,
            text,
            sender_type,
            order_id,
            specialist_id,
            created_at: Utc::now(),
        };
        tables.messages.push(message.clone());
        Ok(message)
    }

    async fn list_chat_messages(&self, thread: ChatThread) -> StoreResult<Vec<ChatMessage>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .messages
            .iter()
            .filter(|m| m.thread() == Some(thread))
            .cloned()
            .collect())
    }

    async fn increment_unread(&self, specialist_id: i64) -> StoreResult<u32> {
        let mut tables = self.tables.lock().await;
        let specialist = tables
            .specialists
            .get_mut(&specialist_id)
            .ok_or(SyncError::not_found("specialist", specialist_id))?;
        specialist.unread_chat_count += 1;
        Ok(specialist.unread_chat_count)
    }
}

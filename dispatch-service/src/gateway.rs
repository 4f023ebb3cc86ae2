use std::sync::Arc;

use serde::Serialize;
use shared::*;
use tracing::error;

use crate::hub::BroadcastHub;
use crate::router::{route_chat, route_order, route_specialist};
use crate::store::EntityStore;

/// Applies one logical mutation: validate, persist, read back the canonical
/// row, then hand it to the hub for every routed topic. Nothing is broadcast
/// when validation or persistence fails.
pub struct MutationGateway {
    store: Arc<dyn EntityStore>,
    hub: Arc<BroadcastHub>,
}

impl MutationGateway {
    pub fn new(store: Arc<dyn EntityStore>, hub: Arc<BroadcastHub>) -> Self {
        Self { store, hub }
    }

    pub async fn create_order(&self, req: CreateOrder) -> Result<Order, SyncError> {
        require_non_empty("customerName", &req.customer_name)?;
        require_non_empty("phone", &req.phone)?;
        require_non_empty("address", &req.address)?;
        require_amount("totalAmount", req.total_amount)?;
        require_amount("commission", req.commission)?;
        require_coordinate(req.lat, req.lng)?;
        if let Some(specialist_id) = req.assigned_specialist_id {
            self.require_specialist("assignedSpecialistId", specialist_id)
                .await?;
        }

        let order = self.store.create_order(req).await?;
        self.publish_full(EntityKind::Order, &order, route_order(&order));
        Ok(order)
    }

    /// The broadcast value is the complete merged row read back from the
    /// store, never the partial patch itself.
    pub async fn patch_order(&self, id: i64, patch: OrderPatch) -> Result<Order, SyncError> {
        if let Some(name) = &patch.customer_name {
            require_non_empty("customerName", name)?;
        }
        if let Some(amount) = patch.total_amount {
            require_amount("totalAmount", amount)?;
        }
        if let Some(amount) = patch.commission {
            require_amount("commission", amount)?;
        }
        require_coordinate(patch.lat, patch.lng)?;
        if let Some(specialist_id) = patch.assigned_specialist_id {
            self.require_specialist("assignedSpecialistId", specialist_id)
                .await?;
        }

        let order = self.store.patch_order(id, patch).await?;
        self.publish_full(EntityKind::Order, &order, route_order(&order));
        Ok(order)
    }

    pub async fn create_specialist(
        &self,
        req: RegisterSpecialist,
    ) -> Result<Specialist, SyncError> {
        if req.telegram_id <= 0 {
            return Err(SyncError::validation("telegramId", "must be positive"));
        }
        let specialist = self.store.create_specialist(req).await?;
        self.publish_full(
            EntityKind::Specialist,
            &specialist,
            route_specialist(&specialist),
        );
        Ok(specialist)
    }

    /// Shift toggles and location pings both arrive here as patches.
    pub async fn patch_specialist(
        &self,
        id: i64,
        patch: SpecialistPatch,
    ) -> Result<Specialist, SyncError> {
        require_coordinate(patch.lat, patch.lng)?;
        let specialist = self.store.patch_specialist(id, patch).await?;
        self.publish_full(
            EntityKind::Specialist,
            &specialist,
            route_specialist(&specialist),
        );
        Ok(specialist)
    }

    pub async fn send_chat(&self, req: SendChat) -> Result<ChatMessage, SyncError> {
        let text = req.text.trim();
        if text.is_empty() {
            return Err(SyncError::validation("text", "must not be empty"));
        }
        let thread = match (req.order_id, req.specialist_id) {
            (Some(order_id), None) => {
                self.store
                    .get_order(order_id)
                    .await
                    .map_err(|e| reject_missing("orderId", e))?;
                ChatThread::Order(order_id)
            }
            (None, Some(specialist_id)) => {
                self.require_specialist("specialistId", specialist_id)
                    .await?;
                ChatThread::Specialist(specialist_id)
            }
            _ => {
                return Err(SyncError::validation(
                    "orderId",
                    "exactly one of orderId/specialistId must be set",
                ))
            }
        };

        let message = self
            .store
            .create_chat_message(thread, req.sender_type, text.to_string())
            .await?;

        // Persist the derived counter before anything is broadcast, so a
        // store failure here leaves the fan-out untouched.
        let mut unread_bump = None;
        if let ChatThread::Specialist(specialist_id) = thread {
            if message.sender_type == SenderType::Specialist {
                self.store.increment_unread(specialist_id).await?;
                unread_bump = Some(specialist_id);
            }
        }

        for topic in route_chat(&message) {
            match Delta::append(topic, &message) {
                Ok(delta) => {
                    self.hub.publish(delta);
                }
                Err(e) => error!("failed to encode chat delta for {}: {}", topic, e),
            }
        }
        if let Some(specialist_id) = unread_bump {
            self.hub
                .publish(Delta::increment_unread(Topic::Specialists, specialist_id));
        }

        Ok(message)
    }

    fn publish_full<T: Serialize>(&self, kind: EntityKind, entity: &T, topics: Vec<Topic>) {
        for topic in topics {
            match Delta::full(topic, kind, entity) {
                Ok(delta) => {
                    self.hub.publish(delta);
                }
                Err(e) => error!("failed to encode delta for {}: {}", topic, e),
            }
        }
    }

    async fn require_specialist(&self, field: &'static str, id: i64) -> Result<(), SyncError> {
        self.store
            .get_specialist(id)
            .await
            .map(|_| ())
            .map_err(|e| reject_missing(field, e))
    }
}

/// A missing foreign key is the caller's fault, not a lookup miss.
fn reject_missing(field: &'static str, err: SyncError) -> SyncError {
    match err {
        SyncError::NotFound { kind, id } => {
            SyncError::validation(field, format!("{kind} {id} does not exist"))
        }
        other => other,
    }
}

fn require_non_empty(field: &'static str, value: &str) -> Result<(), SyncError> {
    if value.trim().is_empty() {
        return Err(SyncError::validation(field, "must not be empty"));
    }
    Ok(())
}

fn require_amount(field: &'static str, value: f64) -> Result<(), SyncError> {
    if !value.is_finite() || value < 0.0 {
        return Err(SyncError::validation(field, "must be a non-negative number"));
    }
    Ok(())
}

fn require_coordinate(lat: Option<f64>, lng: Option<f64>) -> Result<(), SyncError> {
    if lat.is_some() != lng.is_some() {
        return Err(SyncError::validation("lat", "lat and lng come together"));
    }
    if let Some(lat) = lat {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(SyncError::validation("lat", "out of range"));
        }
    }
    if let Some(lng) = lng {
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(SyncError::validation("lng", "out of range"));
        }
    }
    Ok(())
}

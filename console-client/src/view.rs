use serde_json::Value;
use shared::{ChatMessage, Delta, DeltaOp, EntityKind};
use tracing::debug;

/// Keyed list of order or specialist rows, merged at the JSON level so a
/// partial update can leave fields it does not mention untouched.
#[derive(Debug, Default)]
pub struct EntityList {
    rows: Vec<Value>,
}

impl EntityList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, rows: Vec<Value>) {
        self.rows = rows;
    }

    /// Field-wise shallow merge: fields present in `fields` overwrite, the
    /// rest of the existing row is preserved. Unknown rows are prepended,
    /// the way the console shows a new order at the top of the table.
    pub fn apply(&mut self, fields: &Value) {
        let Some(id) = fields.get("id").filter(|id| !id.is_null()) else {
            debug!("dropping entity delta without an id");
            return;
        };
        match self.rows.iter_mut().find(|row| row.get("id") == Some(id)) {
            Some(row) => {
                if let (Some(row), Some(patch)) = (row.as_object_mut(), fields.as_object()) {
                    for (key, value) in patch {
                        row.insert(key.clone(), value.clone());
                    }
                }
            }
            None => self.rows.insert(0, fields.clone()),
        }
    }

    /// Increment deltas only touch rows we already hold; for an unknown
    /// specialist the true count arrives with the next snapshot.
    pub fn increment_unread(&mut self, specialist_id: i64) {
        let id = Value::from(specialist_id);
        let Some(row) = self
            .rows
            .iter_mut()
            .find(|row| row.get("id") == Some(&id))
            .and_then(|row| row.as_object_mut())
        else {
            debug!("unread increment for unknown specialist {specialist_id}, dropped");
            return;
        };
        let current = row
            .get("unreadChatCount")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        row.insert("unreadChatCount".into(), Value::from(current + 1));
    }

    pub fn rows(&self) -> &[Value] {
        &self.rows
    }

    pub fn get(&self, id: i64) -> Option<&Value> {
        let id = Value::from(id);
        self.rows.iter().find(|row| row.get("id") == Some(&id))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Append-only message list kept in id order. Ids are assigned in
/// persistence order server-side, so sorting by id repairs out-of-order
/// delivery, and a redelivered id is dropped rather than duplicated.
#[derive(Debug, Default)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, mut messages: Vec<ChatMessage>) {
        messages.sort_by_key(|m| m.id);
        messages.dedup_by_key(|m| m.id);
        self.messages = messages;
    }

    pub fn append(&mut self, message: ChatMessage) {
        match self.messages.binary_search_by_key(&message.id, |m| m.id) {
            Ok(_) => debug!("duplicate chat message {} dropped", message.id),
            Err(pos) => self.messages.insert(pos, message),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }
}

/// Locally consistent view of one topic, built from a snapshot and kept
/// current by the delta stream. Merge rules are keyed on entity kind; there
/// is no ordering requirement across kinds.
#[derive(Debug, Default)]
pub struct View {
    orders: EntityList,
    specialists: EntityList,
    chat: ChatLog,
}

impl View {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, delta: &Delta) {
        match delta.operation {
            DeltaOp::Full | DeltaOp::Partial => {
                let Some(fields) = delta.entity.as_ref().or(delta.delta.as_ref()) else {
                    debug!("{:?} delta without a payload on {}", delta.operation, delta.topic);
                    return;
                };
                match delta.entity_kind {
                    EntityKind::Order => self.orders.apply(fields),
                    EntityKind::Specialist => self.specialists.apply(fields),
                    EntityKind::ChatMessage => {
                        debug!("chat messages are append-only, ignoring {:?}", delta.operation)
                    }
                }
            }
            DeltaOp::Append => {
                let parsed = delta
                    .entity
                    .clone()
                    .map(serde_json::from_value::<ChatMessage>);
                match parsed {
                    Some(Ok(message)) => self.chat.append(message),
                    _ => debug!("malformed append on {}", delta.topic),
                }
            }
            DeltaOp::Increment => {
                if let Some(increment) = delta.unread_increment() {
                    self.specialists.increment_unread(increment.specialist_id);
                }
            }
        }
    }

    pub fn orders(&self) -> &EntityList {
        &self.orders
    }

    pub fn specialists(&self) -> &EntityList {
        &self.specialists
    }

    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    pub(crate) fn orders_mut(&mut self) -> &mut EntityList {
        &mut self.orders
    }

    pub(crate) fn specialists_mut(&mut self) -> &mut EntityList {
        &mut self.specialists
    }

    pub(crate) fn chat_mut(&mut self) -> &mut ChatLog {
        &mut self.chat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use shared::{SenderType, Topic};

    fn full_specialist(id: i64, fields: Value) -> Delta {
        let mut entity = json!({ "id": id });
        if let (Some(base), Some(extra)) = (entity.as_object_mut(), fields.as_object()) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }
        Delta {
            topic: Topic::Specialists,
            entity_kind: EntityKind::Specialist,
            operation: DeltaOp::Full,
            entity: Some(entity),
            delta: None,
        }
    }

    fn chat_append(id: i64) -> Delta {
        let message = ChatMessage {
            id,
            text: format!("message {id}"),
            sender_type: SenderType::Specialist,
            order_id: Some(5),
            specialist_id: None,
            created_at: Utc::now(),
        };
        Delta::append(Topic::OrderChat(5), &message).unwrap()
    }

    #[test]
    fn merge_is_idempotent() {
        let mut view = View::new();
        let delta = full_specialist(1, json!({ "isOnShift": true, "unreadChatCount": 2 }));
        view.apply(&delta);
        view.apply(&delta);
        assert_eq!(view.specialists().len(), 1);
        assert_eq!(view.specialists().get(1).unwrap()["unreadChatCount"], 2);
    }

    #[test]
    fn partial_update_preserves_absent_fields() {
        let mut view = View::new();
        view.apply(&full_specialist(
            1,
            json!({ "isOnShift": true, "unreadChatCount": 3, "name": "Petr" }),
        ));

        // A location ping that carries no counter.
        let ping = Delta::partial(
            Topic::Specialists,
            EntityKind::Specialist,
            json!({ "id": 1, "lat": 55.75, "lng": 37.61 }),
        );
        view.apply(&ping);

        let row = view.specialists().get(1).unwrap();
        assert_eq!(row["lat"], 55.75);
        assert_eq!(row["unreadChatCount"], 3);
        assert_eq!(row["name"], "Petr");
    }

    #[test]
    fn unknown_rows_are_prepended() {
        let mut view = View::new();
        view.orders_mut().load(vec![json!({ "id": 1 })]);
        view.apply(&Delta {
            topic: Topic::Orders,
            entity_kind: EntityKind::Order,
            operation: DeltaOp::Full,
            entity: Some(json!({ "id": 2, "status": "NEW" })),
            delta: None,
        });
        assert_eq!(view.orders().rows()[0]["id"], 2);
        assert_eq!(view.orders().rows()[1]["id"], 1);
    }

    #[test]
    fn out_of_order_chat_converges_to_id_order() {
        let mut view = View::new();
        view.apply(&chat_append(102));
        view.apply(&chat_append(101));
        view.apply(&chat_append(102)); // redelivery

        let ids: Vec<i64> = view.chat().messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![101, 102]);
    }

    #[test]
    fn increment_for_unknown_specialist_is_dropped() {
        let mut view = View::new();
        view.apply(&Delta::increment_unread(Topic::Specialists, 9));
        assert!(view.specialists().is_empty());
    }

    #[test]
    fn increment_bumps_existing_row() {
        let mut view = View::new();
        view.apply(&full_specialist(9, json!({ "unreadChatCount": 4 })));
        view.apply(&Delta::increment_unread(Topic::Specialists, 9));
        assert_eq!(view.specialists().get(9).unwrap()["unreadChatCount"], 5);
    }
}

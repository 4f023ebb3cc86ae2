use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ChatMessage, Topic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaOp {
    /// Complete canonical entity; replaces the matching row field-wise.
    Full,
    /// Partial field set; fields absent from the payload are untouched.
    Partial,
    /// Immutable record appended to a thread, deduplicated by id.
    Append,
    /// Numeric bump applied without resending the full row.
    Increment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Order,
    Specialist,
    ChatMessage,
}

/// Payload of an `increment` delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadIncrement {
    pub specialist_id: i64,
}

/// Unit of change broadcast after a mutation. `entity` carries a complete
/// record for full/append operations; `delta` carries the partial field
/// object or increment descriptor otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delta {
    pub topic: Topic,
    pub entity_kind: EntityKind,
    pub operation: DeltaOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<Value>,
}

impl Delta {
    pub fn full<T: Serialize>(
        topic: Topic,
        entity_kind: EntityKind,
        entity: &T,
    ) -> Result<Delta, serde_json::Error> {
        Ok(Delta {
            topic,
            entity_kind,
            operation: DeltaOp::Full,
            entity: Some(serde_json::to_value(entity)?),
            delta: None,
        })
    }

    pub fn partial(topic: Topic, entity_kind: EntityKind, fields: Value) -> Delta {
        Delta {
            topic,
            entity_kind,
            operation: DeltaOp::Partial,
            entity: None,
            delta: Some(fields),
        }
    }

    pub fn append(topic: Topic, message: &ChatMessage) -> Result<Delta, serde_json::Error> {
        Ok(Delta {
            topic,
            entity_kind: EntityKind::ChatMessage,
            operation: DeltaOp::Append,
            entity: Some(serde_json::to_value(message)?),
            delta: None,
        })
    }

    pub fn increment_unread(topic: Topic, specialist_id: i64) -> Delta {
        Delta {
            topic,
            entity_kind: EntityKind::Specialist,
            operation: DeltaOp::Increment,
            entity: None,
            delta: serde_json::to_value(UnreadIncrement { specialist_id }).ok(),
        }
    }

    /// The increment descriptor, when this is an `increment` delta.
    pub fn unread_increment(&self) -> Option<UnreadIncrement> {
        if self.operation != DeltaOp::Increment {
            return None;
        }
        self.delta
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape_on_the_wire() {
        let delta = Delta::increment_unread(Topic::Specialists, 9);
        let json = serde_json::to_value(&delta).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "topic": "specialists.*",
                "entityKind": "specialist",
                "operation": "increment",
                "delta": { "specialistId": 9 },
            })
        );
        assert_eq!(delta.unread_increment(), Some(UnreadIncrement { specialist_id: 9 }));
    }

    #[test]
    fn full_delta_carries_the_entity() {
        #[derive(Serialize)]
        struct Row {
            id: i64,
        }
        let delta = Delta::full(Topic::Orders, EntityKind::Order, &Row { id: 3 }).unwrap();
        assert_eq!(delta.operation, DeltaOp::Full);
        assert_eq!(delta.entity, Some(serde_json::json!({ "id": 3 })));
        assert!(delta.delta.is_none());
    }
}

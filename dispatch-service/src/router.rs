//! Derives the topics a canonical entity must be published to. Pure
//! functions of the entity's current fields; routing the same state twice
//! yields the same set.

use shared::{ChatMessage, Order, Specialist, Topic};

/// An order always reaches the global order list; an assigned order also
/// reaches that specialist's feed.
pub fn route_order(order: &Order) -> Vec<Topic> {
    let mut topics = vec![Topic::Orders];
    if let Some(specialist_id) = order.assigned_specialist_id {
        topics.push(Topic::SpecialistFeed(specialist_id));
    }
    topics
}

pub fn route_specialist(specialist: &Specialist) -> Vec<Topic> {
    vec![Topic::Specialists, Topic::SpecialistFeed(specialist.id)]
}

/// Order-scoped chat stays on its thread. Specialist chat additionally
/// notifies the admin stream, since operators are not all watching every
/// specialist's thread.
pub fn route_chat(message: &ChatMessage) -> Vec<Topic> {
    match (message.order_id, message.specialist_id) {
        (Some(order_id), _) => vec![Topic::OrderChat(order_id)],
        (None, Some(specialist_id)) => vec![
            Topic::SpecialistChat(specialist_id),
            Topic::AdminNotifications,
        ],
        (None, None) => Vec::new(),
    }
}

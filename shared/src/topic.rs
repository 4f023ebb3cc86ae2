use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::TopicParseError;

/// Addressable channel carrying deltas for one slice of state. Not
/// persisted; a single mutation may publish to several topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Every order, for the dispatch console's order list.
    Orders,
    /// Every specialist, for the roster view.
    Specialists,
    /// Updates relevant to one specialist (their orders, their own row).
    SpecialistFeed(i64),
    /// Chat thread scoped to one order.
    OrderChat(i64),
    /// General chat thread with one specialist.
    SpecialistChat(i64),
    /// Operator-wide notification stream.
    AdminNotifications,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Orders => write!(f, "orders.*"),
            Topic::Specialists => write!(f, "specialists.*"),
            Topic::SpecialistFeed(id) => write!(f, "specialist.{}", id),
            Topic::OrderChat(id) => write!(f, "order-chat.{}", id),
            Topic::SpecialistChat(id) => write!(f, "specialist-chat.{}", id),
            Topic::AdminNotifications => write!(f, "admin-notifications"),
        }
    }
}

impl FromStr for Topic {
    type Err = TopicParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "orders.*" => return Ok(Topic::Orders),
            "specialists.*" => return Ok(Topic::Specialists),
            "admin-notifications" => return Ok(Topic::AdminNotifications),
            _ => {}
        }
        // Longer prefixes first: "specialist." is a prefix of none of these,
        // but "specialist-chat." must not be eaten by the feed arm.
        let parsed = if let Some(rest) = s.strip_prefix("order-chat.") {
            rest.parse().ok().map(Topic::OrderChat)
        } else if let Some(rest) = s.strip_prefix("specialist-chat.") {
            rest.parse().ok().map(Topic::SpecialistChat)
        } else if let Some(rest) = s.strip_prefix("specialist.") {
            rest.parse().ok().map(Topic::SpecialistFeed)
        } else {
            None
        };
        parsed.ok_or_else(|| TopicParseError(s.to_string()))
    }
}

impl Serialize for Topic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        key.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_round_trip() {
        let topics = [
            Topic::Orders,
            Topic::Specialists,
            Topic::SpecialistFeed(7),
            Topic::OrderChat(5),
            Topic::SpecialistChat(9),
            Topic::AdminNotifications,
        ];
        for topic in topics {
            let key = topic.to_string();
            assert_eq!(key.parse::<Topic>().unwrap(), topic, "key {key}");
        }
    }

    #[test]
    fn specialist_chat_not_mistaken_for_feed() {
        assert_eq!(
            "specialist-chat.3".parse::<Topic>().unwrap(),
            Topic::SpecialistChat(3)
        );
        assert_eq!(
            "specialist.3".parse::<Topic>().unwrap(),
            Topic::SpecialistFeed(3)
        );
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!("orders".parse::<Topic>().is_err());
        assert!("specialist.abc".parse::<Topic>().is_err());
        assert!("".parse::<Topic>().is_err());
    }

    #[test]
    fn serde_as_string() {
        let json = serde_json::to_string(&Topic::OrderChat(12)).unwrap();
        assert_eq!(json, "\"order-chat.12\"");
        let back: Topic = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Topic::OrderChat(12));
    }
}
